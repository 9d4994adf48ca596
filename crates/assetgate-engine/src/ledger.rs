// Copyright 2026 AssetGate Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Append-only, hash-chained audit ledger.
//!
//! On-disk format: a sequence of records, each a little-endian u32 length
//! prefix followed by the JSON-serialized event. The file is replayed into
//! memory on open. Appends are globally serialized because every event's
//! `prev_hash` derives from the single most recent event across all
//! assets; the sequence id, the chain linkage and the flushed write happen
//! as one step under the append lock.

use std::fs::OpenOptions;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;

use assetgate_core::chain::{compute_event_hash, verify_events, ChainVerification};
use assetgate_core::error::CoreError;
use assetgate_core::model::{
    ApprovalId, AssetId, AuditEvent, CustodyAction, Decision, EventId, SiteId, UserId,
};

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt ledger record at index {index}: {reason}")]
    Corrupt { index: u64, reason: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Fields of an event before the ledger assigns identity and linkage.
#[derive(Debug, Clone)]
pub struct CandidateEvent {
    pub asset_id: AssetId,
    pub actor_user_id: UserId,
    pub action: CustodyAction,
    pub decision: Decision,
    pub site_id: Option<SiteId>,
    pub target_user_id: Option<UserId>,
    pub approval_id: Option<ApprovalId>,
    /// Canonical snapshot JSON, persisted verbatim.
    pub verification_summary: Option<String>,
}

/// Read-side event filter; results are newest first.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub asset_id: Option<AssetId>,
    pub actor_user_id: Option<UserId>,
    pub action: Option<CustodyAction>,
    pub decision: Option<Decision>,
    pub limit: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            asset_id: None,
            actor_user_id: None,
            action: None,
            decision: None,
            limit: 100,
        }
    }
}

impl EventFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        self.asset_id.map_or(true, |id| event.asset_id == id)
            && self
                .actor_user_id
                .map_or(true, |id| event.actor_user_id == id)
            && self.action.map_or(true, |a| event.action == a)
            && self.decision.map_or(true, |d| event.decision == d)
    }
}

#[derive(Debug)]
struct LedgerInner {
    file: std::fs::File,
    events: Vec<AuditEvent>,
}

#[derive(Debug)]
pub struct AuditLedger {
    path: PathBuf,
    inner: Mutex<LedgerInner>,
}

impl AuditLedger {
    /// Open the ledger file, creating it if absent, and replay every record
    /// into memory. A truncated trailing length prefix is treated as a
    /// clean end of file; a truncated or undecodable record body is an
    /// error.
    pub fn open_or_create(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut events = Vec::new();
        let mut reader = BufReader::new(OpenOptions::new().read(true).open(&path)?);
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            reader.read_exact(&mut data)?;
            let event: AuditEvent =
                serde_json::from_slice(&data).map_err(|err| LedgerError::Corrupt {
                    index: events.len() as u64,
                    reason: err.to_string(),
                })?;
            events.push(event);
        }

        Ok(Self {
            path,
            inner: Mutex::new(LedgerInner { file, events }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event: assign the next sequence id, link `prev_hash` to
    /// the current chain head, compute the hash, and persist the record
    /// with a flush — all under the global append lock. On any failure the
    /// provisional sequence slot is released and nothing is retained.
    pub fn append(&self, candidate: CandidateEvent) -> LedgerResult<AuditEvent> {
        let mut inner = self.inner.lock();

        let mut event = AuditEvent {
            id: inner.events.len() as EventId + 1,
            timestamp: Utc::now(),
            asset_id: candidate.asset_id,
            actor_user_id: candidate.actor_user_id,
            action: candidate.action,
            decision: candidate.decision,
            site_id: candidate.site_id,
            target_user_id: candidate.target_user_id,
            approval_id: candidate.approval_id,
            verification_summary: candidate.verification_summary,
            prev_hash: inner.events.last().map(|e| e.hash.clone()),
            hash: String::new(),
        };
        event.hash = compute_event_hash(&event)?;

        let payload = serde_json::to_vec(&event).map_err(CoreError::from)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            LedgerError::Core(CoreError::InvalidArgument(
                "audit record exceeds maximum length".to_string(),
            ))
        })?;
        let mut record = Vec::with_capacity(4 + payload.len());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(&payload);
        inner.file.write_all(&record)?;
        inner.file.flush()?;

        inner.events.push(event.clone());
        Ok(event)
    }

    /// Pure read-side chain audit; mutates nothing.
    pub fn verify_chain(&self) -> ChainVerification {
        let events = self.inner.lock().events.clone();
        verify_events(&events)
    }

    pub fn event(&self, id: EventId) -> Option<AuditEvent> {
        let inner = self.inner.lock();
        inner.events.get(id.checked_sub(1)? as usize).cloned()
    }

    /// Filtered listing, most recent first.
    pub fn events(&self, filter: &EventFilter) -> Vec<AuditEvent> {
        let inner = self.inner.lock();
        inner
            .events
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(filter.limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().events.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }
}
