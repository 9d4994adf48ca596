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

//! The custody transaction engine.
//!
//! Every operation follows one template: load entities, validate the local
//! precondition, obtain a verification snapshot, evaluate policy, then
//! either apply the transition (ALLOW), open a pending approval (STEP_UP)
//! or record the denial (DENY). The engine is the only writer of asset
//! state; deferred STEP_UP outcomes are finalized later by
//! [`resolve_approval`](CustodyEngine::resolve_approval).

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use assetgate_core::chain::ChainVerification;
use assetgate_core::error::CoreError;
use assetgate_core::model::{
    ApprovalId, ApprovalRequest, ApprovalStatus, Asset, AssetId, AssetStatus, AuditEvent,
    CustodyAction, Decision, EventId, Site, SiteId, User, UserId,
};
use assetgate_core::policy::{PolicyEngine, PolicyInput};
use assetgate_core::snapshot::VerificationSnapshot;

use crate::config::EngineConfig;
use crate::ledger::{AuditLedger, CandidateEvent, EventFilter, LedgerError};
use crate::locks::AssetLocks;
use crate::store::{EntityStore, NewApproval};
use crate::telemetry::{LifecycleEvent, Telemetry, TelemetryError};
use crate::verification::{conservative_timeout_snapshot, NetworkContext, VerificationProvider};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("asset {0} not found")]
    AssetNotFound(AssetId),

    #[error("site {0} not found")]
    SiteNotFound(SiteId),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("approval request {0} not found")]
    ApprovalNotFound(ApprovalId),

    #[error("approval request {id} is already resolved ({status:?})")]
    AlreadyResolved { id: ApprovalId, status: ApprovalStatus },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Outcome of one custody operation as surfaced to callers.
///
/// `event_id` is absent exactly when nothing was audited: entity-not-found
/// never reaches this type, and local precondition rejections return a
/// DENY-shaped result without consulting policy or touching the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResult {
    pub success: bool,
    pub decision: Decision,
    pub reason: String,
    pub verification: VerificationSnapshot,
    pub event_id: Option<EventId>,
    pub approval_id: Option<ApprovalId>,
    pub message: String,
}

/// Local validation failure: DENY-shaped, never audited.
pub(crate) struct PreconditionReject {
    reason: String,
    message: String,
}

impl PreconditionReject {
    fn into_result(self) -> TransactionResult {
        TransactionResult {
            success: false,
            decision: Decision::Deny,
            reason: self.reason,
            verification: VerificationSnapshot::unattempted(),
            event_id: None,
            approval_id: None,
            message: self.message,
        }
    }
}

pub(crate) fn check_precondition(
    action: CustodyAction,
    asset: &Asset,
    actor: &User,
) -> Result<(), PreconditionReject> {
    match action {
        CustodyAction::CheckOut => {
            if asset.status != AssetStatus::Available {
                return Err(PreconditionReject {
                    reason: format!(
                        "Asset is not available for check-out. Current status: {}.",
                        asset.status.as_str()
                    ),
                    message: "Check-out failed: asset not available".to_string(),
                });
            }
        }
        CustodyAction::CheckIn | CustodyAction::Transfer => {
            let failed_verb = match action {
                CustodyAction::CheckIn => "Check-in",
                _ => "Transfer",
            };
            if asset.status != AssetStatus::CheckedOut {
                return Err(PreconditionReject {
                    reason: format!(
                        "Asset is not checked out. Current status: {}.",
                        asset.status.as_str()
                    ),
                    message: format!("{failed_verb} failed: asset not checked out"),
                });
            }
            if asset.current_custodian != Some(actor.id) && !actor.role.may_override_custodian() {
                return Err(PreconditionReject {
                    reason: "Actor is not the current custodian of this asset.".to_string(),
                    message: format!("{failed_verb} failed: not the custodian"),
                });
            }
        }
        // A pure attestation: no status constraint at all.
        CustodyAction::InventoryClose => {}
    }
    Ok(())
}

/// The per-action state transition, shared between the immediate ALLOW
/// path and approval replay (which re-applies it from frozen parameters).
pub(crate) fn apply_transition(
    action: CustodyAction,
    asset: &mut Asset,
    actor_id: UserId,
    site_id: SiteId,
    target_user_id: Option<UserId>,
) {
    match action {
        CustodyAction::CheckOut => {
            asset.status = AssetStatus::CheckedOut;
            asset.current_custodian = Some(actor_id);
            asset.current_site = Some(site_id);
        }
        CustodyAction::CheckIn => {
            asset.status = AssetStatus::Available;
            asset.current_custodian = None;
            asset.current_site = Some(site_id);
        }
        CustodyAction::Transfer => {
            if let Some(target) = target_user_id {
                asset.current_custodian = Some(target);
            }
        }
        CustodyAction::InventoryClose => {}
    }
}

fn allow_message(action: CustodyAction, target: Option<&User>) -> String {
    match action {
        CustodyAction::CheckOut => "Check-out successful".to_string(),
        CustodyAction::CheckIn => "Check-in successful".to_string(),
        CustodyAction::Transfer => match target {
            Some(user) => format!("Transfer to {} successful", user.full_name),
            None => "Transfer successful".to_string(),
        },
        CustodyAction::InventoryClose => "Inventory close recorded".to_string(),
    }
}

fn step_up_message(action: CustodyAction) -> String {
    match action {
        CustodyAction::CheckOut => "Check-out requires manager approval",
        CustodyAction::CheckIn => "Check-in requires manager approval",
        CustodyAction::Transfer => "Transfer requires manager approval",
        CustodyAction::InventoryClose => "Inventory close requires manager approval",
    }
    .to_string()
}

fn deny_message(action: CustodyAction) -> String {
    match action {
        CustodyAction::CheckOut => "Check-out denied",
        CustodyAction::CheckIn => "Check-in denied",
        CustodyAction::Transfer => "Transfer denied",
        CustodyAction::InventoryClose => "Inventory close denied",
    }
    .to_string()
}

pub struct CustodyEngine {
    store: Arc<dyn EntityStore>,
    provider: Arc<dyn VerificationProvider>,
    ledger: Arc<AuditLedger>,
    policy: PolicyEngine,
    pub(crate) locks: AssetLocks,
    telemetry: Telemetry,
    config: EngineConfig,
}

impl CustodyEngine {
    pub fn new(
        store: Arc<dyn EntityStore>,
        provider: Arc<dyn VerificationProvider>,
        ledger: Arc<AuditLedger>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            provider,
            ledger,
            policy: PolicyEngine::new(),
            locks: AssetLocks::new(),
            telemetry: Telemetry::new(),
            config,
        }
    }

    /// Create the data directory and open (or create) the ledger at its
    /// configured path.
    pub fn open(
        store: Arc<dyn EntityStore>,
        provider: Arc<dyn VerificationProvider>,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        std::fs::create_dir_all(&config.data_dir).map_err(LedgerError::from)?;
        let ledger = Arc::new(AuditLedger::open_or_create(config.ledger_path())?);
        Ok(Self::new(store, provider, ledger, config))
    }

    pub fn ledger(&self) -> &Arc<AuditLedger> {
        &self.ledger
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Start the Prometheus text endpoint when one is configured.
    pub async fn start_metrics(&self) -> EngineResult<Option<tokio::task::JoinHandle<()>>> {
        let Some(listen) = self.config.metrics_listen.as_deref() else {
            return Ok(None);
        };
        let addr: std::net::SocketAddr = listen.parse().map_err(|_| {
            EngineError::InvalidConfig(format!("invalid metrics listen address: {listen}"))
        })?;
        let handle = Arc::new(self.telemetry.clone())
            .spawn_metrics_server(addr)
            .await?;
        Ok(Some(handle))
    }

    pub(crate) fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub async fn check_out(
        &self,
        asset_id: AssetId,
        site_id: SiteId,
        actor_id: UserId,
        context: &NetworkContext,
    ) -> EngineResult<TransactionResult> {
        self.execute(CustodyAction::CheckOut, asset_id, site_id, actor_id, None, context)
            .await
    }

    pub async fn check_in(
        &self,
        asset_id: AssetId,
        site_id: SiteId,
        actor_id: UserId,
        context: &NetworkContext,
    ) -> EngineResult<TransactionResult> {
        self.execute(CustodyAction::CheckIn, asset_id, site_id, actor_id, None, context)
            .await
    }

    pub async fn transfer(
        &self,
        asset_id: AssetId,
        site_id: SiteId,
        actor_id: UserId,
        target_user_id: UserId,
        context: &NetworkContext,
    ) -> EngineResult<TransactionResult> {
        self.execute(
            CustodyAction::Transfer,
            asset_id,
            site_id,
            actor_id,
            Some(target_user_id),
            context,
        )
        .await
    }

    pub async fn inventory_close(
        &self,
        asset_id: AssetId,
        site_id: SiteId,
        actor_id: UserId,
        context: &NetworkContext,
    ) -> EngineResult<TransactionResult> {
        self.execute(
            CustodyAction::InventoryClose,
            asset_id,
            site_id,
            actor_id,
            None,
            context,
        )
        .await
    }

    /// Read-side chain audit of the whole ledger.
    pub fn verify_chain(&self) -> ChainVerification {
        self.telemetry.record_chain_verification();
        self.ledger.verify_chain()
    }

    /// Filtered audit event listing, newest first.
    pub fn events(&self, filter: &EventFilter) -> Vec<AuditEvent> {
        self.ledger.events(filter)
    }

    /// Approval listing, newest first; `None` lists every status.
    pub fn approvals(&self, status: Option<ApprovalStatus>) -> Vec<ApprovalRequest> {
        self.store.approvals(status)
    }

    pub fn approval(&self, id: ApprovalId) -> EngineResult<ApprovalRequest> {
        self.store
            .approval(id)
            .ok_or(EngineError::ApprovalNotFound(id))
    }

    async fn execute(
        &self,
        action: CustodyAction,
        asset_id: AssetId,
        site_id: SiteId,
        actor_id: UserId,
        target_user_id: Option<UserId>,
        context: &NetworkContext,
    ) -> EngineResult<TransactionResult> {
        let asset = self
            .store
            .asset(asset_id)
            .ok_or(EngineError::AssetNotFound(asset_id))?;
        let site = self
            .store
            .site(site_id)
            .ok_or(EngineError::SiteNotFound(site_id))?;
        let actor = self
            .store
            .user(actor_id)
            .ok_or(EngineError::UserNotFound(actor_id))?;
        let target = match target_user_id {
            Some(id) => Some(self.store.user(id).ok_or(EngineError::UserNotFound(id))?),
            None => None,
        };

        // Fast local validation before paying for the network round-trip.
        // The authoritative check runs again under the asset lock.
        if let Err(reject) = check_precondition(action, &asset, &actor) {
            self.telemetry.record_precondition_reject(action.as_str());
            return Ok(reject.into_result());
        }

        // No lock is held across the provider await.
        let snapshot = self.obtain_snapshot(&actor, &site, context).await;
        let verdict = self.policy.evaluate(&PolicyInput::from_snapshot(
            action,
            asset.sensitivity,
            actor.role,
            site.requires_onsite,
            &snapshot,
        ));
        let summary = snapshot.canonical_json()?;

        match verdict.decision {
            Decision::Allow => {
                let lock = self.locks.for_asset(asset_id);
                let guard = lock.lock();
                let mut current = self
                    .store
                    .asset(asset_id)
                    .ok_or(EngineError::AssetNotFound(asset_id))?;
                if let Err(reject) = check_precondition(action, &current, &actor) {
                    drop(guard);
                    self.telemetry.record_precondition_reject(action.as_str());
                    return Ok(reject.into_result());
                }
                apply_transition(action, &mut current, actor.id, site_id, target_user_id);
                self.store.commit_asset(&current);
                let event = self.ledger.append(CandidateEvent {
                    asset_id,
                    actor_user_id: actor.id,
                    action,
                    decision: Decision::Allow,
                    site_id: Some(site_id),
                    target_user_id,
                    approval_id: None,
                    verification_summary: Some(summary),
                })?;
                drop(guard);

                self.telemetry
                    .record_decision(action.as_str(), Decision::Allow.as_str());
                self.telemetry.lifecycle_event(&LifecycleEvent {
                    action: action.as_str(),
                    decision: Decision::Allow.as_str(),
                    rule: verdict.rule.as_str(),
                    asset_id,
                    actor_user_id: actor.id,
                    event_id: Some(event.id),
                    approval_id: None,
                });
                Ok(TransactionResult {
                    success: true,
                    decision: Decision::Allow,
                    reason: verdict.reason,
                    verification: snapshot,
                    event_id: Some(event.id),
                    approval_id: None,
                    message: allow_message(action, target.as_ref()),
                })
            }
            Decision::StepUp => {
                let approval = self.store.insert_approval(NewApproval {
                    asset_id,
                    requester_id: actor.id,
                    action,
                    site_id,
                    target_user_id,
                    verification_summary: summary.clone(),
                    reason: verdict.reason.clone(),
                });
                let event = self.ledger.append(CandidateEvent {
                    asset_id,
                    actor_user_id: actor.id,
                    action,
                    decision: Decision::StepUp,
                    site_id: Some(site_id),
                    target_user_id,
                    approval_id: Some(approval.id),
                    verification_summary: Some(summary),
                })?;

                self.telemetry
                    .record_decision(action.as_str(), Decision::StepUp.as_str());
                self.telemetry.lifecycle_event(&LifecycleEvent {
                    action: action.as_str(),
                    decision: Decision::StepUp.as_str(),
                    rule: verdict.rule.as_str(),
                    asset_id,
                    actor_user_id: actor.id,
                    event_id: Some(event.id),
                    approval_id: Some(approval.id),
                });
                Ok(TransactionResult {
                    success: false,
                    decision: Decision::StepUp,
                    reason: verdict.reason,
                    verification: snapshot,
                    event_id: Some(event.id),
                    approval_id: Some(approval.id),
                    message: step_up_message(action),
                })
            }
            Decision::Deny => {
                let event = self.ledger.append(CandidateEvent {
                    asset_id,
                    actor_user_id: actor.id,
                    action,
                    decision: Decision::Deny,
                    site_id: Some(site_id),
                    target_user_id,
                    approval_id: None,
                    verification_summary: Some(summary),
                })?;

                self.telemetry
                    .record_decision(action.as_str(), Decision::Deny.as_str());
                self.telemetry.lifecycle_event(&LifecycleEvent {
                    action: action.as_str(),
                    decision: Decision::Deny.as_str(),
                    rule: verdict.rule.as_str(),
                    asset_id,
                    actor_user_id: actor.id,
                    event_id: Some(event.id),
                    approval_id: None,
                });
                Ok(TransactionResult {
                    success: false,
                    decision: Decision::Deny,
                    reason: verdict.reason,
                    verification: snapshot,
                    event_id: Some(event.id),
                    approval_id: None,
                    message: deny_message(action),
                })
            }
        }
    }

    async fn obtain_snapshot(
        &self,
        actor: &User,
        site: &Site,
        context: &NetworkContext,
    ) -> VerificationSnapshot {
        let deadline = Duration::from_millis(self.config.verification_timeout_ms);
        match tokio::time::timeout(deadline, self.provider.verify(actor, site, context)).await {
            Ok(snapshot) => snapshot,
            Err(_) => {
                self.telemetry.record_verification_timeout();
                tracing::warn!(
                    actor_id = actor.id,
                    site_id = site.id,
                    timeout_ms = self.config.verification_timeout_ms,
                    "verification provider timed out; using conservative snapshot"
                );
                conservative_timeout_snapshot(self.config.verification_timeout_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgate_core::model::{Role, Sensitivity};

    fn asset(status: AssetStatus, custodian: Option<UserId>) -> Asset {
        Asset {
            id: 41,
            tag_id: "TAG-041".into(),
            name: "Spectrum analyzer".into(),
            sensitivity: Sensitivity::Low,
            status,
            current_custodian: custodian,
            current_site: Some(1),
        }
    }

    fn user(id: UserId, role: Role) -> User {
        User {
            id,
            full_name: format!("user-{id}"),
            role,
            phone_number: None,
        }
    }

    #[test]
    fn check_out_requires_available() {
        let actor = user(7, Role::Employee);
        assert!(check_precondition(
            CustodyAction::CheckOut,
            &asset(AssetStatus::Available, None),
            &actor
        )
        .is_ok());
        for status in [
            AssetStatus::CheckedOut,
            AssetStatus::Maintenance,
            AssetStatus::Retired,
        ] {
            let custodian = (status == AssetStatus::CheckedOut).then_some(9);
            let reject =
                check_precondition(CustodyAction::CheckOut, &asset(status, custodian), &actor)
                    .err()
                    .unwrap();
            assert!(reject.reason.contains(status.as_str()));
        }
    }

    #[test]
    fn check_in_requires_custodian_or_override() {
        let held = asset(AssetStatus::CheckedOut, Some(7));
        assert!(
            check_precondition(CustodyAction::CheckIn, &held, &user(7, Role::Employee)).is_ok()
        );
        assert!(
            check_precondition(CustodyAction::CheckIn, &held, &user(8, Role::Employee)).is_err()
        );
        assert!(check_precondition(CustodyAction::CheckIn, &held, &user(8, Role::Manager)).is_ok());
        assert!(check_precondition(CustodyAction::CheckIn, &held, &user(8, Role::Admin)).is_ok());
    }

    #[test]
    fn inventory_close_has_no_precondition() {
        let actor = user(7, Role::Employee);
        for status in [
            AssetStatus::Available,
            AssetStatus::CheckedOut,
            AssetStatus::Maintenance,
            AssetStatus::Retired,
        ] {
            let custodian = (status == AssetStatus::CheckedOut).then_some(9);
            assert!(check_precondition(
                CustodyAction::InventoryClose,
                &asset(status, custodian),
                &actor
            )
            .is_ok());
        }
    }

    #[test]
    fn transitions_preserve_the_custody_invariant() {
        let mut a = asset(AssetStatus::Available, None);
        apply_transition(CustodyAction::CheckOut, &mut a, 7, 2, None);
        assert_eq!(a.status, AssetStatus::CheckedOut);
        assert_eq!(a.current_custodian, Some(7));
        assert_eq!(a.current_site, Some(2));
        assert!(a.custody_invariant_holds());

        apply_transition(CustodyAction::Transfer, &mut a, 7, 2, Some(9));
        assert_eq!(a.status, AssetStatus::CheckedOut);
        assert_eq!(a.current_custodian, Some(9));
        assert!(a.custody_invariant_holds());

        apply_transition(CustodyAction::CheckIn, &mut a, 9, 3, None);
        assert_eq!(a.status, AssetStatus::Available);
        assert_eq!(a.current_custodian, None);
        assert_eq!(a.current_site, Some(3));
        assert!(a.custody_invariant_holds());

        let before = a.clone();
        apply_transition(CustodyAction::InventoryClose, &mut a, 9, 3, None);
        assert_eq!(a, before);
    }
}
