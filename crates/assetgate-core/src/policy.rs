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

//! Custody authorization policy.
//!
//! Rules are evaluated in priority order and short-circuit: the first
//! matching rule wins and no later rule is consulted.
//! 1. Number mismatch denies outright.
//! 2. Outside the geofence for an on-site action: LOW sensitivity
//!    escalates to step-up, MEDIUM/HIGH deny.
//! 3. HIGH sensitivity with any fraud signal escalates to step-up.
//! 4. MEDIUM sensitivity with a recent SIM swap escalates to step-up.
//! 5. Default allow.

use serde::{Deserialize, Serialize};

use crate::model::{CustodyAction, Decision, Role, Sensitivity};
use crate::snapshot::VerificationSnapshot;

/// Tag of the rule that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyRule {
    NumberMismatch,
    GeofenceOutsideLowSensitivity,
    GeofenceOutside,
    HighSensitivityRiskSignals,
    MediumSensitivitySimSwap,
    DefaultAllow,
}

impl PolicyRule {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NumberMismatch => "NUMBER_MISMATCH",
            Self::GeofenceOutsideLowSensitivity => "GEOFENCE_OUTSIDE_LOW_SENSITIVITY",
            Self::GeofenceOutside => "GEOFENCE_OUTSIDE",
            Self::HighSensitivityRiskSignals => "HIGH_SENSITIVITY_RISK_SIGNALS",
            Self::MediumSensitivitySimSwap => "MEDIUM_SENSITIVITY_SIM_SWAP",
            Self::DefaultAllow => "DEFAULT_ALLOW",
        }
    }
}

/// Everything a policy evaluation may observe.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyInput {
    pub action: CustodyAction,
    pub asset_sensitivity: Sensitivity,
    /// Accepted for future role-based escalation; no current rule reads it.
    /// Preserved as-is pending product clarification.
    pub actor_role: Role,
    pub site_requires_onsite: bool,
    pub number_match: bool,
    pub inside_geofence: bool,
    pub sim_swap_recent: bool,
    pub device_swap_recent: bool,
}

impl PolicyInput {
    pub fn from_snapshot(
        action: CustodyAction,
        asset_sensitivity: Sensitivity,
        actor_role: Role,
        site_requires_onsite: bool,
        snapshot: &VerificationSnapshot,
    ) -> Self {
        Self {
            action,
            asset_sensitivity,
            actor_role,
            site_requires_onsite,
            number_match: snapshot.number_match(),
            inside_geofence: snapshot.inside_geofence(),
            sim_swap_recent: snapshot.sim_swap_recent(),
            device_swap_recent: snapshot.device_swap_recent(),
        }
    }
}

/// Pure output of one evaluation; carries no identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub decision: Decision,
    pub reason: String,
    pub rule: PolicyRule,
}

/// True for actions that must be performed at the site. Currently every
/// defined custody action qualifies.
pub const fn action_requires_onsite(action: CustodyAction) -> bool {
    matches!(
        action,
        CustodyAction::CheckOut
            | CustodyAction::CheckIn
            | CustodyAction::Transfer
            | CustodyAction::InventoryClose
    )
}

/// Stateless decision engine. Construct one instance and share it; it holds
/// no state and performs no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Deterministic, total evaluation of the rule chain.
    pub fn evaluate(&self, input: &PolicyInput) -> PolicyResult {
        if !input.number_match {
            return PolicyResult {
                decision: Decision::Deny,
                reason: "Phone number verification failed. The claimed number does not match \
                         the network-verified number."
                    .to_string(),
                rule: PolicyRule::NumberMismatch,
            };
        }

        if input.site_requires_onsite
            && action_requires_onsite(input.action)
            && !input.inside_geofence
        {
            return match input.asset_sensitivity {
                Sensitivity::Low => PolicyResult {
                    decision: Decision::StepUp,
                    reason: "Device is outside the authorized geofence. Manager approval \
                             required for low-sensitivity assets."
                        .to_string(),
                    rule: PolicyRule::GeofenceOutsideLowSensitivity,
                },
                Sensitivity::Medium | Sensitivity::High => PolicyResult {
                    decision: Decision::Deny,
                    reason: "Device is outside the authorized geofence. On-site presence \
                             required for this action."
                        .to_string(),
                    rule: PolicyRule::GeofenceOutside,
                },
            };
        }

        if input.asset_sensitivity == Sensitivity::High
            && (input.sim_swap_recent || input.device_swap_recent)
        {
            let mut signals = Vec::new();
            if input.sim_swap_recent {
                signals.push("SIM swap");
            }
            if input.device_swap_recent {
                signals.push("device swap");
            }
            return PolicyResult {
                decision: Decision::StepUp,
                reason: format!(
                    "High-sensitivity asset with risk signals detected: {}. Manager approval \
                     required.",
                    signals.join(", ")
                ),
                rule: PolicyRule::HighSensitivityRiskSignals,
            };
        }

        if input.asset_sensitivity == Sensitivity::Medium && input.sim_swap_recent {
            return PolicyResult {
                decision: Decision::StepUp,
                reason: "Medium-sensitivity asset with recent SIM swap detected. Manager \
                         approval required."
                    .to_string(),
                rule: PolicyRule::MediumSensitivitySimSwap,
            };
        }

        PolicyResult {
            decision: Decision::Allow,
            reason: "All verification checks passed. Action authorized.".to_string(),
            rule: PolicyRule::DefaultAllow,
        }
    }
}
