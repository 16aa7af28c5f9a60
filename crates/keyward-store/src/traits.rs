//! Store trait: the abstract interface for policy, secret, and block
//! persistence.
//!
//! Every row is append-versioned. Saves reject a version that does not
//! exceed the latest stored version of the same logical key. Unless a method
//! says otherwise, loads and listings return only *current* rows: the latest
//! version of each key, and only if it is not a tombstone.

use std::collections::HashMap;

use async_trait::async_trait;

use keyward_core::{
    AccountId, Block, Group, GroupId, MemberKey, OrgId, Page, Policy, PolicyId, PolicyLock,
    PolicyMember, Secret, SecretId, StreamId,
};
use keyward_perms::{resolve_all, MembershipSnapshot, Resolution};

use crate::error::Result;

/// Result of saving a secret row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretSaved {
    /// Ids whose rows and block streams were physically destroyed because
    /// the saved row took over their name.
    pub purged: Vec<SecretId>,
}

/// The Store trait: async interface for Keyward persistence.
///
/// Async so that a blocking backend can move its work off the runtime;
/// `SqliteStore` runs every call under `spawn_blocking`.
///
/// # Design Notes
///
/// - **One round trip per decision**: [`load_policy_lock`](Store::load_policy_lock)
///   and [`load_membership`](Store::load_membership) return everything a
///   recovery or authorization needs, already joined.
/// - **Destructive renames**: [`save_secret`](Store::save_secret) physically
///   removes other ids that held the saved row's name. There is no undo.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Policies
    // ─────────────────────────────────────────────────────────────────────────

    /// Load the current row of a policy.
    async fn load_policy(&self, org: &OrgId, id: &PolicyId) -> Result<Option<Policy>>;

    /// Load a specific version of a policy, tombstones included.
    async fn load_policy_version(
        &self,
        org: &OrgId,
        id: &PolicyId,
        version: u64,
    ) -> Result<Option<Policy>>;

    /// Append a policy version.
    async fn save_policy(&self, policy: &Policy) -> Result<()>;

    /// List current policies in id order.
    async fn list_policies(&self, org: &OrgId, page: Page) -> Result<Vec<Policy>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Members
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a member version.
    ///
    /// The granting policy must be current and in the same org; so must the
    /// target of a `Proxy` member.
    async fn save_policy_member(&self, member: &PolicyMember) -> Result<()>;

    /// Load the current row for one member of a policy.
    async fn load_policy_member(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        member: &MemberKey,
    ) -> Result<Option<PolicyMember>>;

    /// Latest stored version for one member of a policy, tombstones included.
    async fn latest_member_version(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        member: &MemberKey,
    ) -> Result<Option<u64>>;

    /// List the current members of a policy in member-key order.
    async fn list_policy_members(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        page: Page,
    ) -> Result<Vec<PolicyMember>>;

    /// Current `Proxy` rows, on any policy, whose principal is `proxy`.
    async fn list_proxy_grants_to(&self, org: &OrgId, proxy: &PolicyId) -> Result<Vec<PolicyMember>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Groups
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a group version.
    async fn save_group(&self, group: &Group) -> Result<()>;

    /// Load the current row of a group.
    async fn load_group(&self, org: &OrgId, id: &GroupId) -> Result<Option<Group>>;

    /// List current groups in id order.
    async fn list_groups(&self, org: &OrgId, page: Page) -> Result<Vec<Group>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Joined loads
    // ─────────────────────────────────────────────────────────────────────────

    /// Everything needed to recover `policy` as `account`.
    ///
    /// Walks proxy members outward from the target up to `max_depth` hops.
    /// Returns `None` if the target is not current.
    async fn load_policy_lock(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        account: &AccountId,
        max_depth: usize,
    ) -> Result<Option<PolicyLock>>;

    /// Everything needed to resolve `account`'s actions on `policies`.
    async fn load_membership(
        &self,
        org: &OrgId,
        account: &AccountId,
        policies: &[PolicyId],
        max_depth: usize,
    ) -> Result<MembershipSnapshot>;

    /// Resolved actions for `account` on each of `policies`.
    async fn load_enabled_actions(
        &self,
        org: &OrgId,
        account: &AccountId,
        policies: &[PolicyId],
        max_depth: usize,
    ) -> Result<HashMap<PolicyId, Resolution>> {
        let snapshot = self.load_membership(org, account, policies, max_depth).await?;
        Ok(resolve_all(&snapshot, policies, max_depth))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Secrets
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a secret version, purging other holders of its name.
    ///
    /// **Destructive**: see [`keyward_core::plan_secret_save`].
    async fn save_secret(&self, secret: &Secret) -> Result<SecretSaved>;

    /// Load the latest row of a secret. The row may be a tombstone.
    async fn load_secret_by_id(&self, org: &OrgId, id: &SecretId) -> Result<Option<Secret>>;

    /// Load a specific version of a secret, tombstones included.
    async fn load_secret_version(
        &self,
        org: &OrgId,
        id: &SecretId,
        version: u64,
    ) -> Result<Option<Secret>>;

    /// Load the latest row of the secret holding `name`. The row may be a
    /// tombstone.
    async fn load_secret_by_name(&self, org: &OrgId, name: &str) -> Result<Option<Secret>>;

    /// List current secrets in name order.
    async fn list_secrets(&self, org: &OrgId, page: Page) -> Result<Vec<Secret>>;

    /// Every version of a secret, oldest first.
    async fn list_secret_versions(&self, org: &OrgId, id: &SecretId) -> Result<Vec<Secret>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Blocks
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a batch of blocks to one stream, all or nothing.
    async fn save_blocks(&self, blocks: &[Block]) -> Result<()>;

    /// Load blocks of a stream in ascending index order.
    async fn load_blocks(&self, org: &OrgId, stream: &StreamId, page: Page) -> Result<Vec<Block>>;
}
