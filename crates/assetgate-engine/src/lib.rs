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

//! assetgate-engine
//!
//! Orchestration layer of the AssetGate custody system: the transaction
//! engine that gates every custody-changing action behind a policy
//! decision, the append-only hash-chained audit ledger it writes to, the
//! approval resolver for deferred (step-up) outcomes, and the seams to the
//! entity store and the network verification provider.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod approval;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod locks;
pub mod store;
pub mod telemetry;
pub mod verification;

pub use crate::config::EngineConfig;
pub use crate::engine::{CustodyEngine, EngineError, EngineResult, TransactionResult};
pub use crate::ledger::{AuditLedger, CandidateEvent, EventFilter, LedgerError};
pub use crate::store::{EntityStore, MemoryStore, NewApproval};
pub use crate::verification::{NetworkContext, SimulatedGateway, VerificationProvider};
