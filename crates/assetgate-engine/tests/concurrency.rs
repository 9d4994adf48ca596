use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use assetgate_core::model::{Asset, AssetStatus, Decision, Role, Sensitivity, Site, User};
use assetgate_core::snapshot::VerificationSnapshot;
use assetgate_engine::{
    CustodyEngine, EngineConfig, EntityStore, MemoryStore, NetworkContext, SimulatedGateway,
    VerificationProvider,
};

/// Delegates to the simulated gateway after a delay, so concurrent
/// transactions overlap in the verification phase.
struct SlowGateway {
    delay: Duration,
    inner: SimulatedGateway,
}

#[async_trait]
impl VerificationProvider for SlowGateway {
    async fn verify(
        &self,
        actor: &User,
        site: &Site,
        context: &NetworkContext,
    ) -> VerificationSnapshot {
        tokio::time::sleep(self.delay).await;
        self.inner.verify(actor, site, context).await
    }
}

fn seeded_store(assets: u64) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_site(Site {
        id: 1,
        name: "Central depot".into(),
        latitude: 40.4168,
        longitude: -3.7038,
        geofence_radius_m: 150.0,
        requires_onsite: true,
    });
    for id in [7, 8] {
        store.insert_user(User {
            id,
            full_name: format!("worker-{id}"),
            role: Role::Employee,
            phone_number: None,
        });
    }
    for id in 1..=assets {
        store.insert_asset(Asset {
            id,
            tag_id: format!("TAG-{id:03}"),
            name: "Label printer".into(),
            sensitivity: Sensitivity::Low,
            status: AssetStatus::Available,
            current_custodian: None,
            current_site: Some(1),
        });
    }
    store
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_check_outs_of_one_asset_assign_custody_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = seeded_store(1);
    let provider = Arc::new(SlowGateway {
        delay: Duration::from_millis(100),
        inner: SimulatedGateway::new(),
    });
    let config = EngineConfig {
        data_dir: dir.path().to_path_buf(),
        verification_timeout_ms: 5_000,
        ..EngineConfig::default()
    };
    let engine = Arc::new(CustodyEngine::open(store.clone(), provider, config).expect("engine"));

    // Both attempts pass the fast precondition check and verify in
    // parallel; only one may win the locked check-then-commit.
    let first = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .check_out(1, 1, 7, &NetworkContext::default())
                .await
                .expect("check out")
        })
    };
    let second = {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .check_out(1, 1, 8, &NetworkContext::default())
                .await
                .expect("check out")
        })
    };
    let first = first.await.expect("join");
    let second = second.await.expect("join");

    assert_ne!(
        first.success, second.success,
        "exactly one concurrent check-out may win"
    );
    let (winner, loser) = if first.success {
        (first, second)
    } else {
        (second, first)
    };
    assert_eq!(winner.decision, Decision::Allow);
    assert_eq!(loser.decision, Decision::Deny);
    assert_eq!(loser.event_id, None, "losing attempt is a local rejection");
    assert!(loser.reason.contains("Current status: CHECKED_OUT"));

    let asset = store.asset(1).expect("asset");
    assert_eq!(asset.status, AssetStatus::CheckedOut);
    assert!(asset.custody_invariant_holds());

    // Exactly one audited ALLOW, and the chain is intact.
    assert_eq!(engine.ledger().len(), 1);
    let report = engine.verify_chain();
    assert!(report.valid, "{}", report.message);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn parallel_transactions_across_assets_keep_one_ordered_chain() {
    let dir = tempfile::tempdir().expect("tempdir");
    let total: u64 = 24;
    let store = seeded_store(total);
    let config = EngineConfig {
        data_dir: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let engine = Arc::new(
        CustodyEngine::open(store, Arc::new(SimulatedGateway::new()), config).expect("engine"),
    );

    let mut handles = Vec::new();
    for asset_id in 1..=total {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .inventory_close(asset_id, 1, 7, &NetworkContext::default())
                .await
                .expect("inventory close")
        }));
    }
    for handle in handles {
        let result = handle.await.expect("join");
        assert!(result.success);
    }

    assert_eq!(engine.ledger().len(), total);
    let report = engine.verify_chain();
    assert!(report.valid, "{}", report.message);
    assert_eq!(report.verified_events, total);
}
