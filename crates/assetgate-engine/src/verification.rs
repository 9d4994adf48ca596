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

//! Network verification seam.
//!
//! The engine consumes verification as an oracle: one `verify` call per
//! transaction attempt returning a frozen snapshot. Network-backed and
//! simulated implementations are interchangeable behind the trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use assetgate_core::geo::haversine_distance_m;
use assetgate_core::model::{Site, User};
use assetgate_core::snapshot::{
    LocationVerification, NumberVerification, RiskSignals, VerificationSnapshot,
    SNAPSHOT_SCHEMA_VERSION,
};

/// Per-attempt network context supplied by the caller. For the simulated
/// gateway these fields stand in for what the carrier network would
/// report; a network-backed provider may ignore them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkContext {
    pub claimed_phone: Option<String>,
    pub network_phone: Option<String>,
    pub network_lat: Option<f64>,
    pub network_lon: Option<f64>,
    #[serde(default)]
    pub sim_swap_recent: bool,
    #[serde(default)]
    pub device_swap_recent: bool,
}

#[async_trait]
pub trait VerificationProvider: Send + Sync {
    async fn verify(&self, actor: &User, site: &Site, context: &NetworkContext)
        -> VerificationSnapshot;
}

/// Snapshot used when the provider does not answer within the deadline.
/// Every check fails closed, so rule 1 denies the transaction and the
/// denial is audited with the timeout recorded.
pub fn conservative_timeout_snapshot(timeout_ms: u64) -> VerificationSnapshot {
    VerificationSnapshot {
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
            sim_swap_recent: true,
            device_swap_recent: true,
        },
        note: Some(format!(
            "verification provider timed out after {timeout_ms}ms; conservative snapshot"
        )),
    }
}

/// Simulated network gateway.
///
/// Mirrors the carrier APIs from the supplied context: number match,
/// device location against the site geofence (haversine), and SIM/device
/// swap signals. Absent context data resolves permissively, matching the
/// demo behavior of the real provider's sandbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedGateway;

impl SimulatedGateway {
    pub fn new() -> Self {
        Self
    }

    fn verify_number(&self, actor: &User, context: &NetworkContext) -> NumberVerification {
        let claimed = context
            .claimed_phone
            .clone()
            .or_else(|| actor.phone_number.clone());
        let network = context.network_phone.clone();

        let is_match = match (&claimed, &network) {
            (Some(c), Some(n)) => c == n,
            // Not configured: defaults to matching.
            _ => true,
        };

        NumberVerification {
            verified: true,
            is_match,
            claimed_number: claimed,
            network_number: network,
        }
    }

    fn verify_location(&self, site: &Site, context: &NetworkContext) -> LocationVerification {
        match (context.network_lat, context.network_lon) {
            (Some(lat), Some(lon)) => {
                let distance =
                    haversine_distance_m(lat, lon, site.latitude, site.longitude);
                LocationVerification {
                    verified: true,
                    inside_geofence: distance <= site.geofence_radius_m,
                    network_lat: Some(lat),
                    network_lon: Some(lon),
                    distance_meters: Some(distance),
                }
            }
            _ => LocationVerification {
                verified: true,
                inside_geofence: true,
                network_lat: None,
                network_lon: None,
                distance_meters: None,
            },
        }
    }

    fn risk_signals(&self, context: &NetworkContext) -> RiskSignals {
        RiskSignals {
            sim_swap_recent: context.sim_swap_recent,
            device_swap_recent: context.device_swap_recent,
        }
    }
}

#[async_trait]
impl VerificationProvider for SimulatedGateway {
    async fn verify(
        &self,
        actor: &User,
        site: &Site,
        context: &NetworkContext,
    ) -> VerificationSnapshot {
        VerificationSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            number_verification: self.verify_number(actor, context),
            location_verification: self.verify_location(site, context),
            risk_signals: self.risk_signals(context),
            note: None,
        }
    }
}
