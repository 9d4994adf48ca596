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

//! assetgate-core
//!
//! Pure domain core of the AssetGate custody system:
//! - Entity records (assets, sites, users, approvals, audit events)
//! - The custody authorization policy (ALLOW / DENY / STEP_UP)
//! - Hash-chain computation and verification for the audit trail
//! - Geofence math
//!
//! This crate performs no I/O; orchestration, storage and verification
//! providers live in `assetgate-engine`.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod chain;
pub mod error;
pub mod geo;
pub mod model;
pub mod policy;
pub mod snapshot;

pub use crate::chain::{compute_event_hash, verify_events, ChainVerification};
pub use crate::error::{CoreError, CoreResult};
pub use crate::model::{
    ApprovalRequest, ApprovalStatus, Asset, AssetStatus, AuditEvent, CustodyAction, Decision, Role,
    Sensitivity, Site, User,
};
pub use crate::policy::{PolicyEngine, PolicyInput, PolicyResult, PolicyRule};
pub use crate::snapshot::VerificationSnapshot;
