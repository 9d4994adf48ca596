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

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use assetgate_core::model::{
    ApprovalId, ApprovalRequest, ApprovalStatus, Asset, AssetId, CustodyAction, Site, SiteId, User,
    UserId,
};

/// Parameters for a new step-up approval; the store assigns identity and
/// creation time.
#[derive(Debug, Clone)]
pub struct NewApproval {
    pub asset_id: AssetId,
    pub requester_id: UserId,
    pub action: CustodyAction,
    pub site_id: SiteId,
    pub target_user_id: Option<UserId>,
    pub verification_summary: String,
    pub reason: String,
}

/// Seam to the entity store. The engine only needs id lookups, commit of
/// Asset and ApprovalRequest mutations, and approval listings; anything
/// answering this contract (relational or in-memory) is interchangeable.
pub trait EntityStore: Send + Sync {
    fn asset(&self, id: AssetId) -> Option<Asset>;
    fn site(&self, id: SiteId) -> Option<Site>;
    fn user(&self, id: UserId) -> Option<User>;

    /// Overwrite the stored asset. Callers hold the asset's lock, which is
    /// what makes check-then-commit atomic.
    fn commit_asset(&self, asset: &Asset);

    fn insert_approval(&self, new: NewApproval) -> ApprovalRequest;
    fn approval(&self, id: ApprovalId) -> Option<ApprovalRequest>;
    fn commit_approval(&self, approval: &ApprovalRequest);
    /// Listing, newest first; `None` lists every status.
    fn approvals(&self, status: Option<ApprovalStatus>) -> Vec<ApprovalRequest>;
}

#[derive(Debug, Default)]
struct StoreState {
    assets: HashMap<AssetId, Asset>,
    sites: HashMap<SiteId, Site>,
    users: HashMap<UserId, User>,
    approvals: HashMap<ApprovalId, ApprovalRequest>,
    next_approval_id: ApprovalId,
}

/// In-memory entity store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_asset(&self, asset: Asset) {
        self.state.write().assets.insert(asset.id, asset);
    }

    pub fn insert_site(&self, site: Site) {
        self.state.write().sites.insert(site.id, site);
    }

    pub fn insert_user(&self, user: User) {
        self.state.write().users.insert(user.id, user);
    }
}

impl EntityStore for MemoryStore {
    fn asset(&self, id: AssetId) -> Option<Asset> {
        self.state.read().assets.get(&id).cloned()
    }

    fn site(&self, id: SiteId) -> Option<Site> {
        self.state.read().sites.get(&id).cloned()
    }

    fn user(&self, id: UserId) -> Option<User> {
        self.state.read().users.get(&id).cloned()
    }

    fn commit_asset(&self, asset: &Asset) {
        self.state.write().assets.insert(asset.id, asset.clone());
    }

    fn insert_approval(&self, new: NewApproval) -> ApprovalRequest {
        let mut state = self.state.write();
        state.next_approval_id += 1;
        let approval = ApprovalRequest {
            id: state.next_approval_id,
            created_at: Utc::now(),
            asset_id: new.asset_id,
            requester_id: new.requester_id,
            action: new.action,
            site_id: new.site_id,
            target_user_id: new.target_user_id,
            verification_summary: new.verification_summary,
            reason: new.reason,
            status: ApprovalStatus::Pending,
            resolved_by: None,
            resolved_at: None,
            resolution_note: None,
        };
        state.approvals.insert(approval.id, approval.clone());
        approval
    }

    fn approval(&self, id: ApprovalId) -> Option<ApprovalRequest> {
        self.state.read().approvals.get(&id).cloned()
    }

    fn commit_approval(&self, approval: &ApprovalRequest) {
        self.state
            .write()
            .approvals
            .insert(approval.id, approval.clone());
    }

    fn approvals(&self, status: Option<ApprovalStatus>) -> Vec<ApprovalRequest> {
        let state = self.state.read();
        let mut out: Vec<ApprovalRequest> = state
            .approvals
            .values()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.id.cmp(&a.id));
        out
    }
}
