use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use assetgate_core::model::AssetId;

/// One mutex per asset id, created on first use.
///
/// The precondition re-check, the state mutation and the dependent ledger
/// append for one asset run under its lock as a single unit; verification
/// round-trips are awaited with no lock held. Lock order is always
/// asset lock, then ledger lock.
#[derive(Debug, Default)]
pub struct AssetLocks {
    map: Mutex<HashMap<AssetId, Arc<Mutex<()>>>>,
}

impl AssetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `asset_id`; lock the returned mutex to enter the asset's
    /// critical section.
    pub fn for_asset(&self, asset_id: AssetId) -> Arc<Mutex<()>> {
        self.map.lock().entry(asset_id).or_default().clone()
    }
}
