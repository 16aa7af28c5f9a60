//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. Rows live in
//! [`VersionLog`] arenas; "current" is always derived, never stored.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::warn;

use keyward_core::{
    plan_secret_save, validate_batch, AccountId, Block, CoreError, Group, GroupId, Member,
    MemberKey, NameHolder, OrgId, Page, Policy, PolicyId, PolicyLock, PolicyMember, Secret,
    SecretId, StreamId, VersionLog, Versioned,
};
use keyward_perms::MembershipSnapshot;

use crate::error::{Result, StoreError};
use crate::join::{build_membership, build_policy_lock, RowSource};
use crate::traits::{SecretSaved, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    policies: VersionLog<Policy>,
    members: VersionLog<PolicyMember>,
    groups: VersionLog<Group>,
    secrets: VersionLog<Secret>,

    /// Blocks by stream, then index.
    blocks: HashMap<(OrgId, StreamId), BTreeMap<u64, Block>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    /// Total blocks held across every stream of every org.
    pub fn block_count(&self) -> Result<usize> {
        Ok(self.read()?.blocks.values().map(BTreeMap::len).sum())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RowSource for MemoryStoreInner {
    fn current_policy(&self, org: &OrgId, id: &PolicyId) -> Result<Option<Policy>> {
        Ok(self.policies.current(&(*org, *id)).cloned())
    }

    fn current_members(&self, org: &OrgId, policy: &PolicyId) -> Result<Vec<PolicyMember>> {
        Ok(self
            .members
            .current_rows()
            .filter(|m| m.org_id == *org && m.policy_id == *policy)
            .cloned()
            .collect())
    }

    fn current_group(&self, org: &OrgId, id: &GroupId) -> Result<Option<Group>> {
        Ok(self.groups.current(&(*org, *id)).cloned())
    }
}

impl MemoryStoreInner {
    fn require_policy(&self, org: &OrgId, id: &PolicyId) -> Result<&Policy> {
        self.policies.current(&(*org, *id)).ok_or_else(|| {
            CoreError::InconsistentReference(format!("policy {} is not current in org {}", id, org))
                .into()
        })
    }

    fn name_holders(&self, org: &OrgId, name: &str) -> Vec<NameHolder> {
        self.secrets
            .latest_rows()
            .filter(|s| s.org_id == *org && s.name == name)
            .map(|s| {
                let mut streams: Vec<StreamId> = self
                    .secrets
                    .history(&s.key())
                    .into_iter()
                    .map(|v| v.stream_id)
                    .collect();
                streams.sort();
                streams.dedup();
                NameHolder {
                    id: s.id,
                    latest_version: s.version,
                    created_at: s.created_at,
                    deleted: s.deleted,
                    streams,
                }
            })
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_policy(&self, org: &OrgId, id: &PolicyId) -> Result<Option<Policy>> {
        self.read()?.current_policy(org, id)
    }

    async fn load_policy_version(
        &self,
        org: &OrgId,
        id: &PolicyId,
        version: u64,
    ) -> Result<Option<Policy>> {
        Ok(self.read()?.policies.get(&(*org, *id), version).cloned())
    }

    async fn save_policy(&self, policy: &Policy) -> Result<()> {
        self.write()?.policies.append(policy.clone())?;
        Ok(())
    }

    async fn list_policies(&self, org: &OrgId, page: Page) -> Result<Vec<Policy>> {
        let inner = self.read()?;
        Ok(page.apply(
            inner
                .policies
                .current_rows()
                .filter(|p| p.org_id == *org)
                .cloned(),
        ))
    }

    async fn save_policy_member(&self, member: &PolicyMember) -> Result<()> {
        let mut inner = self.write()?;

        member.check_belongs_to(inner.require_policy(&member.org_id, &member.policy_id)?)?;
        if let (Member::Proxy { policy_id, .. }, false) = (&member.member, member.deleted) {
            inner.require_policy(&member.org_id, policy_id)?;
        }

        inner.members.append(member.clone())?;
        Ok(())
    }

    async fn load_policy_member(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        member: &MemberKey,
    ) -> Result<Option<PolicyMember>> {
        Ok(self.read()?.members.current(&(*org, *policy, *member)).cloned())
    }

    async fn latest_member_version(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        member: &MemberKey,
    ) -> Result<Option<u64>> {
        Ok(self.read()?.members.latest_version(&(*org, *policy, *member)))
    }

    async fn list_policy_members(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        page: Page,
    ) -> Result<Vec<PolicyMember>> {
        Ok(page.apply(self.read()?.current_members(org, policy)?))
    }

    async fn list_proxy_grants_to(&self, org: &OrgId, proxy: &PolicyId) -> Result<Vec<PolicyMember>> {
        let inner = self.read()?;
        Ok(inner
            .members
            .current_rows()
            .filter(|m| m.org_id == *org && m.member_key() == MemberKey::Proxy(*proxy))
            .cloned()
            .collect())
    }

    async fn save_group(&self, group: &Group) -> Result<()> {
        self.write()?.groups.append(group.clone())?;
        Ok(())
    }

    async fn load_group(&self, org: &OrgId, id: &GroupId) -> Result<Option<Group>> {
        self.read()?.current_group(org, id)
    }

    async fn list_groups(&self, org: &OrgId, page: Page) -> Result<Vec<Group>> {
        let inner = self.read()?;
        Ok(page.apply(
            inner
                .groups
                .current_rows()
                .filter(|g| g.org_id == *org)
                .cloned(),
        ))
    }

    async fn load_policy_lock(
        &self,
        org: &OrgId,
        policy: &PolicyId,
        account: &AccountId,
        max_depth: usize,
    ) -> Result<Option<PolicyLock>> {
        build_policy_lock(&*self.read()?, org, policy, account, max_depth)
    }

    async fn load_membership(
        &self,
        org: &OrgId,
        account: &AccountId,
        policies: &[PolicyId],
        max_depth: usize,
    ) -> Result<MembershipSnapshot> {
        build_membership(&*self.read()?, org, account, policies, max_depth)
    }

    async fn save_secret(&self, secret: &Secret) -> Result<SecretSaved> {
        let mut inner = self.write()?;

        inner.require_policy(&secret.org_id, &secret.policy_id)?;
        let holders = inner.name_holders(&secret.org_id, &secret.name);
        let plan = plan_secret_save(secret, inner.secrets.latest_version(&secret.key()), &holders)?;

        for id in &plan.purge_secrets {
            inner.secrets.purge(&(secret.org_id, *id));
        }
        for stream in &plan.purge_streams {
            inner.blocks.remove(&(secret.org_id, *stream));
        }
        if plan.is_destructive() {
            warn!(
                org = %secret.org_id,
                name = %secret.name,
                purged = ?plan.purge_secrets,
                "secret name taken over, old history purged"
            );
        }

        inner.secrets.append(secret.clone())?;
        Ok(SecretSaved {
            purged: plan.purge_secrets,
        })
    }

    async fn load_secret_by_id(&self, org: &OrgId, id: &SecretId) -> Result<Option<Secret>> {
        Ok(self.read()?.secrets.latest(&(*org, *id)).cloned())
    }

    async fn load_secret_version(
        &self,
        org: &OrgId,
        id: &SecretId,
        version: u64,
    ) -> Result<Option<Secret>> {
        Ok(self.read()?.secrets.get(&(*org, *id), version).cloned())
    }

    async fn load_secret_by_name(&self, org: &OrgId, name: &str) -> Result<Option<Secret>> {
        let inner = self.read()?;
        Ok(inner
            .secrets
            .latest_rows()
            .filter(|s| s.org_id == *org && s.name == name)
            .max_by_key(|s| (!s.deleted, s.version))
            .cloned())
    }

    async fn list_secrets(&self, org: &OrgId, page: Page) -> Result<Vec<Secret>> {
        let inner = self.read()?;
        let mut rows: Vec<Secret> = inner
            .secrets
            .current_rows()
            .filter(|s| s.org_id == *org)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(page.apply(rows))
    }

    async fn list_secret_versions(&self, org: &OrgId, id: &SecretId) -> Result<Vec<Secret>> {
        let inner = self.read()?;
        Ok(inner
            .secrets
            .history(&(*org, *id))
            .into_iter()
            .cloned()
            .collect())
    }

    async fn save_blocks(&self, blocks: &[Block]) -> Result<()> {
        let mut inner = self.write()?;

        let stream_key = match blocks.first() {
            Some(b) => (b.org_id, b.stream_id),
            None => return Err(CoreError::InvalidBatch("empty batch".into()).into()),
        };
        let stored_max = inner
            .blocks
            .get(&stream_key)
            .and_then(|s| s.keys().next_back().copied());
        validate_batch(blocks, stored_max)?;

        let stream = inner.blocks.entry(stream_key).or_default();
        for block in blocks {
            stream.insert(block.index, block.clone());
        }
        Ok(())
    }

    async fn load_blocks(&self, org: &OrgId, stream: &StreamId, page: Page) -> Result<Vec<Block>> {
        let inner = self.read()?;
        Ok(inner
            .blocks
            .get(&(*org, *stream))
            .map(|s| page.apply(s.values().cloned()))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use keyward_core::{Actions, SealFormat, SealedKey, Strength};
    use proptest::prelude::*;

    fn sealed() -> SealedKey {
        SealedKey {
            format: SealFormat::X25519ChaCha20Poly1305,
            ephemeral_public: [0; 32],
            nonce: vec![0; 12],
            ciphertext: vec![0; 48],
        }
    }

    fn policy(org: OrgId) -> Policy {
        Policy {
            org_id: org,
            id: PolicyId::generate(),
            version: 1,
            public_key: [0; 32],
            sealed_secret: sealed(),
            strength: Strength::Standard,
            labels: vec![],
            deleted: false,
        }
    }

    fn user_member(policy: &Policy, account: AccountId) -> PolicyMember {
        PolicyMember {
            org_id: policy.org_id,
            policy_id: policy.id,
            member: Member::User {
                account_id: account,
                wrapped: sealed(),
            },
            actions: Actions::all(),
            version: 1,
            labels: vec![],
            deleted: false,
        }
    }

    fn secret(policy: &Policy, name: &str, version: u64) -> Secret {
        Secret {
            org_id: policy.org_id,
            id: SecretId::generate(),
            policy_id: policy.id,
            author_id: AccountId::generate(),
            name: name.into(),
            version,
            stream_id: StreamId::generate(),
            created_at: 0,
            deleted: false,
        }
    }

    #[tokio::test]
    async fn test_policy_versions() {
        let store = MemoryStore::new();
        let org = OrgId::generate();
        let p = policy(org);

        store.save_policy(&p).await.unwrap();
        store.save_policy(&p.next_version()).await.unwrap();
        assert!(store.save_policy(&p).await.is_err());

        assert_eq!(store.load_policy(&org, &p.id).await.unwrap().unwrap().version, 2);
        store.save_policy(&p.next_version().tombstone()).await.unwrap();
        assert!(store.load_policy(&org, &p.id).await.unwrap().is_none());
        assert!(store.load_policy_version(&org, &p.id, 3).await.unwrap().unwrap().deleted);
    }

    #[tokio::test]
    async fn test_member_requires_current_policy() {
        let store = MemoryStore::new();
        let p = policy(OrgId::generate());

        let err = store
            .save_policy_member(&user_member(&p, AccountId::generate()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(CoreError::InconsistentReference(_))));
    }

    #[tokio::test]
    async fn test_lock_keeps_only_callers_user_rows() {
        let store = MemoryStore::new();
        let org = OrgId::generate();
        let p = policy(org);
        let (alice, bob) = (AccountId::generate(), AccountId::generate());
        store.save_policy(&p).await.unwrap();
        store.save_policy_member(&user_member(&p, alice)).await.unwrap();
        store.save_policy_member(&user_member(&p, bob)).await.unwrap();

        let lock = store.load_policy_lock(&org, &p.id, &alice, 3).await.unwrap().unwrap();
        assert_eq!(lock.members.len(), 1);
        assert_eq!(lock.members[0].member_key(), MemberKey::User(alice));

        assert!(store
            .load_policy_lock(&org, &PolicyId::generate(), &alice, 3)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rename_purges_old_id_and_blocks() {
        let store = MemoryStore::new();
        let org = OrgId::generate();
        let p = policy(org);
        store.save_policy(&p).await.unwrap();

        let old = secret(&p, "/db/password", 1);
        store.save_secret(&old).await.unwrap();
        store
            .save_blocks(&[Block {
                org_id: org,
                stream_id: old.stream_id,
                index: 0,
                payload: Bytes::from_static(b"x"),
            }])
            .await
            .unwrap();

        let new = secret(&p, "/db/password", 1);
        let saved = store.save_secret(&new).await.unwrap();
        assert_eq!(saved.purged, vec![old.id]);

        assert!(store.load_secret_by_id(&org, &old.id).await.unwrap().is_none());
        assert!(store
            .load_blocks(&org, &old.stream_id, Page::first())
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.block_count().unwrap(), 0);
        let listed = store.list_secrets(&org, Page::first()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, new.id);
    }

    #[tokio::test]
    async fn test_newer_holder_keeps_its_name() {
        let store = MemoryStore::new();
        let p = policy(OrgId::generate());
        store.save_policy(&p).await.unwrap();

        let mut held = secret(&p, "/db/password", 1);
        held.created_at = 10;
        store.save_secret(&held).await.unwrap();

        let late = secret(&p, "/db/password", 1);
        let err = store.save_secret(&late).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(CoreError::NameConflict { holder, .. }) if holder == held.id));
    }

    #[tokio::test]
    async fn test_blocks_page_in_order() {
        let store = MemoryStore::new();
        let org = OrgId::generate();
        let stream = StreamId::generate();
        let block = |index| Block {
            org_id: org,
            stream_id: stream,
            index,
            payload: Bytes::new(),
        };

        store.save_blocks(&[block(2), block(0), block(1)]).await.unwrap();
        assert!(store.save_blocks(&[block(2)]).await.is_err());
        store.save_blocks(&[block(3)]).await.unwrap();

        let first = store.load_blocks(&org, &stream, Page::new(0, 2)).await.unwrap();
        let rest = store.load_blocks(&org, &stream, Page::new(0, 2).next()).await.unwrap();
        let indices: Vec<u64> = first.iter().chain(rest.iter()).map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    proptest! {
        #[test]
        fn batches_append_in_index_order(sizes in prop::collection::vec(1u64..4, 1..6)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (org, stream) = (OrgId::generate(), StreamId::generate());

            let (stored, total) = rt.block_on(async {
                let store = MemoryStore::new();
                let mut next = 0u64;
                for size in &sizes {
                    let batch: Vec<Block> = (next..next + size)
                        .rev()
                        .map(|index| Block {
                            org_id: org,
                            stream_id: stream,
                            index,
                            payload: Bytes::from(index.to_be_bytes().to_vec()),
                        })
                        .collect();
                    store.save_blocks(&batch).await.unwrap();
                    next += size;
                }
                let stored = store.load_blocks(&org, &stream, Page::new(0, 64)).await.unwrap();
                (stored, next)
            });

            prop_assert_eq!(stored.len() as u64, total);
            for (i, block) in stored.iter().enumerate() {
                prop_assert_eq!(block.index, i as u64);
            }
        }
    }
}
