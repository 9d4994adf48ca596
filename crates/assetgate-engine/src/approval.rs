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

//! Finalization of deferred (STEP_UP) outcomes.
//!
//! Approving replays the transition exactly as frozen at request time:
//! same action, same requester, same site and target, same snapshot.
//! Verification and policy are not re-run. Rejection mutates nothing
//! beyond the approval itself. Either way the resolution is terminal and
//! audited with a reference to the approval.

use chrono::Utc;

use assetgate_core::model::{ApprovalId, ApprovalStatus, Decision, UserId};
use assetgate_core::snapshot::VerificationSnapshot;

use crate::engine::{apply_transition, CustodyEngine, EngineError, EngineResult, TransactionResult};
use crate::ledger::CandidateEvent;
use crate::telemetry::LifecycleEvent;

impl CustodyEngine {
    /// Resolve a pending approval. Double resolution is rejected with
    /// [`EngineError::AlreadyResolved`], not treated as idempotent.
    pub async fn resolve_approval(
        &self,
        approval_id: ApprovalId,
        resolver_id: UserId,
        approved: bool,
        note: Option<String>,
    ) -> EngineResult<TransactionResult> {
        let known = self
            .store()
            .approval(approval_id)
            .ok_or(EngineError::ApprovalNotFound(approval_id))?;
        let resolver = self
            .store()
            .user(resolver_id)
            .ok_or(EngineError::UserNotFound(resolver_id))?;

        // The pending check, the resolution and (for approvals) the replay
        // must be atomic with respect to other writers of this asset.
        let lock = self.locks.for_asset(known.asset_id);
        let guard = lock.lock();

        let mut approval = self
            .store()
            .approval(approval_id)
            .ok_or(EngineError::ApprovalNotFound(approval_id))?;
        if !approval.is_pending() {
            return Err(EngineError::AlreadyResolved {
                id: approval.id,
                status: approval.status,
            });
        }

        approval.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        approval.resolved_by = Some(resolver.id);
        approval.resolved_at = Some(Utc::now());
        approval.resolution_note = note.clone();
        self.store().commit_approval(&approval);

        let snapshot = VerificationSnapshot::from_canonical_json(&approval.verification_summary)?;

        let result = if approved {
            let mut asset = self
                .store()
                .asset(approval.asset_id)
                .ok_or(EngineError::AssetNotFound(approval.asset_id))?;
            apply_transition(
                approval.action,
                &mut asset,
                approval.requester_id,
                approval.site_id,
                approval.target_user_id,
            );
            self.store().commit_asset(&asset);

            let event = self.ledger().append(CandidateEvent {
                asset_id: approval.asset_id,
                actor_user_id: approval.requester_id,
                action: approval.action,
                decision: Decision::Allow,
                site_id: Some(approval.site_id),
                target_user_id: approval.target_user_id,
                approval_id: Some(approval.id),
                verification_summary: Some(approval.verification_summary.clone()),
            })?;

            self.telemetry()
                .record_approval_resolved(ApprovalStatus::Approved.as_str());
            self.telemetry().lifecycle_event(&LifecycleEvent {
                action: approval.action.as_str(),
                decision: Decision::Allow.as_str(),
                rule: "APPROVAL_REPLAY",
                asset_id: approval.asset_id,
                actor_user_id: approval.requester_id,
                event_id: Some(event.id),
                approval_id: Some(approval.id),
            });
            TransactionResult {
                success: true,
                decision: Decision::Allow,
                reason: format!("Approved by {}", resolver.full_name),
                verification: snapshot,
                event_id: Some(event.id),
                approval_id: Some(approval.id),
                message: "Action approved and executed".to_string(),
            }
        } else {
            let event = self.ledger().append(CandidateEvent {
                asset_id: approval.asset_id,
                actor_user_id: approval.requester_id,
                action: approval.action,
                decision: Decision::Deny,
                site_id: Some(approval.site_id),
                target_user_id: approval.target_user_id,
                approval_id: Some(approval.id),
                verification_summary: Some(approval.verification_summary.clone()),
            })?;

            self.telemetry()
                .record_approval_resolved(ApprovalStatus::Rejected.as_str());
            self.telemetry().lifecycle_event(&LifecycleEvent {
                action: approval.action.as_str(),
                decision: Decision::Deny.as_str(),
                rule: "APPROVAL_REJECTED",
                asset_id: approval.asset_id,
                actor_user_id: approval.requester_id,
                event_id: Some(event.id),
                approval_id: Some(approval.id),
            });
            TransactionResult {
                success: false,
                decision: Decision::Deny,
                reason: format!(
                    "Rejected by {}: {}",
                    resolver.full_name,
                    note.as_deref().unwrap_or("No reason provided")
                ),
                verification: snapshot,
                event_id: Some(event.id),
                approval_id: Some(approval.id),
                message: "Action rejected".to_string(),
            }
        };

        drop(guard);
        Ok(result)
    }
}
