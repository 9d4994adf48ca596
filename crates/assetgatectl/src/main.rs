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

//! Thin operator CLI over the custody engine: a seeded demo scenario,
//! offline chain verification, and audit event dumps.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use assetgate_core::model::{
    ApprovalStatus, Asset, AssetStatus, Decision, Role, Sensitivity, Site, User,
};
use assetgate_engine::ledger::EventFilter;
use assetgate_engine::{
    AuditLedger, CustodyEngine, EngineConfig, MemoryStore, NetworkContext, SimulatedGateway,
    TransactionResult,
};

#[derive(Debug, Parser)]
#[command(name = "assetgatectl")]
#[command(about = "AssetGate custody engine operator tool")]
struct Args {
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a seeded end-to-end custody scenario and verify the chain.
    Demo {
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
        /// Serve Prometheus metrics on this address for the demo's duration.
        #[arg(long)]
        metrics_listen: Option<String>,
    },
    /// Verify the hash chain of an existing ledger file.
    Verify {
        #[arg(long)]
        ledger: PathBuf,
    },
    /// Dump audit events from a ledger file, newest first.
    Events {
        #[arg(long)]
        ledger: PathBuf,
        #[arg(long)]
        asset: Option<u64>,
        #[arg(long)]
        actor: Option<u64>,
        #[arg(long)]
        decision: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

fn seed(store: &MemoryStore) {
    store.insert_site(Site {
        id: 1,
        name: "Central depot".into(),
        latitude: 40.4168,
        longitude: -3.7038,
        geofence_radius_m: 150.0,
        requires_onsite: true,
    });
    store.insert_user(User {
        id: 1,
        full_name: "Marta Iglesias".into(),
        role: Role::Manager,
        phone_number: Some("+34600999888".into()),
    });
    store.insert_user(User {
        id: 2,
        full_name: "Alice Fuentes".into(),
        role: Role::Employee,
        phone_number: Some("+34600111222".into()),
    });
    store.insert_user(User {
        id: 3,
        full_name: "Bruno Vidal".into(),
        role: Role::Employee,
        phone_number: Some("+34600333444".into()),
    });
    let assets = [
        (1, "TAG-001", "Thermal camera", Sensitivity::Low),
        (2, "TAG-002", "Diagnostics laptop", Sensitivity::Medium),
        (3, "TAG-003", "Crypto token vault", Sensitivity::High),
    ];
    for (id, tag, name, sensitivity) in assets {
        store.insert_asset(Asset {
            id,
            tag_id: tag.into(),
            name: name.into(),
            sensitivity,
            status: AssetStatus::Available,
            current_custodian: None,
            current_site: Some(1),
        });
    }
}

fn print_result(label: &str, result: &TransactionResult) -> Result<(), serde_json::Error> {
    println!("== {label}");
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

async fn run_demo(
    data_dir: PathBuf,
    metrics_listen: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(data_dir = %data_dir.display(), "running custody demo scenario");
    let store = Arc::new(MemoryStore::new());
    seed(&store);
    let config = EngineConfig {
        data_dir,
        metrics_listen,
        ..EngineConfig::default()
    };
    let engine = CustodyEngine::open(store, Arc::new(SimulatedGateway::new()), config)?;
    let _metrics = engine.start_metrics().await?;

    let onsite = NetworkContext::default();
    let result = engine.check_out(1, 1, 2, &onsite).await?;
    print_result("check-out (clean signals)", &result)?;

    let result = engine.transfer(1, 1, 2, 3, &onsite).await?;
    print_result("transfer to a colleague", &result)?;

    let result = engine.check_in(1, 1, 3, &onsite).await?;
    print_result("check-in by the new custodian", &result)?;

    // ~1.1 km off-site: LOW sensitivity escalates instead of denying.
    let offsite = NetworkContext {
        network_lat: Some(40.4268),
        network_lon: Some(-3.7038),
        ..NetworkContext::default()
    };
    let deferred = engine.check_out(1, 1, 2, &offsite).await?;
    print_result("check-out outside the geofence", &deferred)?;
    if let Some(approval_id) = deferred.approval_id {
        let result = engine
            .resolve_approval(approval_id, 1, true, Some("confirmed by phone".into()))
            .await?;
        print_result("manager approves the step-up", &result)?;
    }

    let swapped = NetworkContext {
        sim_swap_recent: true,
        ..NetworkContext::default()
    };
    let deferred = engine.check_out(3, 1, 3, &swapped).await?;
    print_result("high-sensitivity check-out after a SIM swap", &deferred)?;
    if let Some(approval_id) = deferred.approval_id {
        let result = engine
            .resolve_approval(approval_id, 1, false, Some("unrecognized device".into()))
            .await?;
        print_result("manager rejects the step-up", &result)?;
    }

    let mismatched = NetworkContext {
        network_phone: Some("+34999000111".into()),
        ..NetworkContext::default()
    };
    let result = engine.check_out(2, 1, 2, &mismatched).await?;
    print_result("check-out with a number mismatch", &result)?;

    let result = engine.inventory_close(2, 1, 1, &onsite).await?;
    print_result("inventory close attestation", &result)?;

    println!("== pending approvals");
    println!(
        "{}",
        serde_json::to_string_pretty(&engine.approvals(Some(ApprovalStatus::Pending)))?
    );

    let report = engine.verify_chain();
    println!("== chain verification");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn parse_decision(raw: &str) -> Result<Decision, Box<dyn std::error::Error>> {
    match raw {
        "ALLOW" => Ok(Decision::Allow),
        "DENY" => Ok(Decision::Deny),
        "STEP_UP" => Ok(Decision::StepUp),
        other => Err(format!("unknown decision: {other}").into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log.clone()))
        .init();

    match args.command {
        Command::Demo {
            data_dir,
            metrics_listen,
        } => run_demo(data_dir, metrics_listen).await?,
        Command::Verify { ledger } => {
            let ledger = AuditLedger::open_or_create(&ledger)?;
            let report = ledger.verify_chain();
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                std::process::exit(1);
            }
        }
        Command::Events {
            ledger,
            asset,
            actor,
            decision,
            limit,
        } => {
            let ledger = AuditLedger::open_or_create(&ledger)?;
            let filter = EventFilter {
                asset_id: asset,
                actor_user_id: actor,
                action: None,
                decision: decision.as_deref().map(parse_decision).transpose()?,
                limit,
            };
            for event in ledger.events(&filter) {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
    }
    Ok(())
}
