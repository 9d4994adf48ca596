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

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

fn schema_version_default() -> u32 {
    SNAPSHOT_SCHEMA_VERSION
}

/// Outcome of the number-verification check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberVerification {
    pub verified: bool,
    #[serde(rename = "match")]
    pub is_match: bool,
    pub claimed_number: Option<String>,
    pub network_number: Option<String>,
}

/// Outcome of the device-location check against the site geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationVerification {
    pub verified: bool,
    pub inside_geofence: bool,
    pub network_lat: Option<f64>,
    pub network_lon: Option<f64>,
    pub distance_meters: Option<f64>,
}

/// SIM-swap / device-swap fraud signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSignals {
    pub sim_swap_recent: bool,
    pub device_swap_recent: bool,
}

/// The frozen set of risk and identity signals evaluated for one
/// transaction attempt.
///
/// Produced once per attempt, immutable afterward, and persisted verbatim
/// (as canonical JSON) on the resulting audit event and, for STEP_UP
/// outcomes, on the approval request. A fixed, versioned record rather than
/// a free-form payload, so replay after deserialization is type-safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSnapshot {
    #[serde(default = "schema_version_default")]
    pub schema_version: u32,
    pub number_verification: NumberVerification,
    pub location_verification: LocationVerification,
    pub risk_signals: RiskSignals,
    /// Provider annotation, e.g. a timeout marker. Never policy-relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl VerificationSnapshot {
    /// Snapshot attached to results that never reached the provider
    /// (local precondition rejections). All checks read as failed.
    pub fn unattempted() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            number_verification: NumberVerification {
                verified: false,
                is_match: false,
                claimed_number: None,
                network_number: None,
            },
            location_verification: LocationVerification {
                verified: false,
                inside_geofence: false,
                network_lat: None,
                network_lon: None,
                distance_meters: None,
            },
            risk_signals: RiskSignals {
                sim_swap_recent: false,
                device_swap_recent: false,
            },
            note: None,
        }
    }

    pub fn number_match(&self) -> bool {
        self.number_verification.is_match
    }

    pub fn inside_geofence(&self) -> bool {
        self.location_verification.inside_geofence
    }

    pub fn sim_swap_recent(&self) -> bool {
        self.risk_signals.sim_swap_recent
    }

    pub fn device_swap_recent(&self) -> bool {
        self.risk_signals.device_swap_recent
    }

    /// Deterministic key-sorted compact JSON, the form persisted on audit
    /// events and approval requests.
    pub fn canonical_json(&self) -> CoreResult<String> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::to_string(&value)?)
    }

    pub fn from_canonical_json(raw: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
