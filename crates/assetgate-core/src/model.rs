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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub type AssetId = u64;
pub type SiteId = u64;
pub type UserId = u64;
pub type ApprovalId = u64;
pub type EventId = u64;

/// Custody-changing actions gated by the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustodyAction {
    CheckOut,
    CheckIn,
    Transfer,
    InventoryClose,
}

impl CustodyAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CheckOut => "CHECK_OUT",
            Self::CheckIn => "CHECK_IN",
            Self::Transfer => "TRANSFER",
            Self::InventoryClose => "INVENTORY_CLOSE",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "CHECK_OUT" => Ok(Self::CheckOut),
            "CHECK_IN" => Ok(Self::CheckIn),
            "TRANSFER" => Ok(Self::Transfer),
            "INVENTORY_CLOSE" => Ok(Self::InventoryClose),
            other => Err(CoreError::InvalidArgument(format!(
                "unknown custody action: {other}"
            ))),
        }
    }
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    Deny,
    StepUp,
}

impl Decision {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Deny => "DENY",
            Self::StepUp => "STEP_UP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sensitivity {
    Low,
    Medium,
    High,
}

impl Sensitivity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatus {
    Available,
    CheckedOut,
    Maintenance,
    Retired,
}

impl AssetStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::CheckedOut => "CHECKED_OUT",
            Self::Maintenance => "MAINTENANCE",
            Self::Retired => "RETIRED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    Employee,
}

impl Role {
    /// Roles allowed to act on custody they do not personally hold.
    pub const fn may_override_custodian(self) -> bool {
        matches!(self, Self::Admin | Self::Manager)
    }
}

/// A physical asset whose custody is tracked.
///
/// Invariant: `status == CheckedOut` iff `current_custodian.is_some()`;
/// an `Available` asset has no custodian. Only the transaction engine and
/// the approval resolver mutate these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub tag_id: String,
    pub name: String,
    pub sensitivity: Sensitivity,
    pub status: AssetStatus,
    pub current_custodian: Option<UserId>,
    pub current_site: Option<SiteId>,
}

impl Asset {
    pub fn custody_invariant_holds(&self) -> bool {
        match self.status {
            AssetStatus::CheckedOut => self.current_custodian.is_some(),
            AssetStatus::Available => self.current_custodian.is_none(),
            AssetStatus::Maintenance | AssetStatus::Retired => true,
        }
    }
}

/// A geofenced location. Read-only to the custody core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub geofence_radius_m: f64,
    pub requires_onsite: bool,
}

/// An actor. Read-only to the custody core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub role: Role,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// A step-up approval request.
///
/// Created only when policy returns STEP_UP. Freezes the verification
/// snapshot and every parameter needed to replay the deferred transition.
/// The single PENDING -> {APPROVED, REJECTED} transition is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub created_at: DateTime<Utc>,
    pub asset_id: AssetId,
    pub requester_id: UserId,
    pub action: CustodyAction,
    pub site_id: SiteId,
    pub target_user_id: Option<UserId>,
    /// Canonical JSON of the snapshot frozen at creation.
    pub verification_summary: String,
    pub reason: String,
    pub status: ApprovalStatus,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_note: Option<String>,
}

impl ApprovalRequest {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}

/// One link of the append-only audit chain.
///
/// `id` is a strictly increasing sequence number starting at 1. The record
/// is immutable once written; corrective action is always a new event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub asset_id: AssetId,
    pub actor_user_id: UserId,
    pub action: CustodyAction,
    pub decision: Decision,
    pub site_id: Option<SiteId>,
    pub target_user_id: Option<UserId>,
    pub approval_id: Option<ApprovalId>,
    /// Canonical JSON of the verification snapshot, verbatim.
    pub verification_summary: Option<String>,
    /// Hash of the previous event; `None` only for the first event.
    pub prev_hash: Option<String>,
    /// SHA-256 over the canonical serialization of this event.
    pub hash: String,
}
