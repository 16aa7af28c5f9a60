//! The Vault: unified API for Keyward.
//!
//! The Vault brings together storage, key recovery, and authorization.
//! Every entry point takes an already-verified [`AccountId`]; see
//! [`verify_claim`] for turning a signed claim into one.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use rand::rngs::OsRng;
use tracing::{debug, info, warn};

use keyward_core::{
    plan_secret_save, AccountId, Action, Actions, Block, Ed25519PublicKey, Group, GroupId,
    MemberKey, NameHolder, OrgId, Page, Policy, PolicyId, PolicyLock, PolicyMember, Predicate,
    Secret, SecretId, SignedClaim, StreamId,
};
use keyward_perms::{
    self as perms, Cipher, EncryptionKey, Grantee, PermsError, Resolution, X25519PublicKey,
    X25519StaticSecret,
};
use keyward_store::{SecretSaved, Store};

use crate::config::VaultConfig;
use crate::decorate::{
    decorate_members, decorate_secrets, AccountDirectory, DecoratedMember, DecoratedSecret,
    StoreGroupDirectory,
};
use crate::error::{Result, VaultError};

/// Target used for audit-sensitive events.
pub const AUDIT_TARGET: &str = "keyward::audit";

/// The main Vault struct.
///
/// Provides a unified API for:
/// - Authorizing actions on policies
/// - Creating policies and managing their members
/// - Saving, reading, and listing secrets
/// - Appending and reading encrypted block streams
pub struct Vault<S: Store> {
    /// The storage backend.
    store: Arc<S>,
    /// Configuration.
    config: VaultConfig,
}

impl<S: Store> fmt::Debug for Vault<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault").field("config", &self.config).finish_non_exhaustive()
    }
}

impl<S: Store> Vault<S> {
    /// Create a new vault instance.
    pub fn new(store: S, config: VaultConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: Arc::new(store),
            config,
        })
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authorization
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolved actions of `account` on one policy.
    pub async fn enabled_actions(
        &self,
        org: &OrgId,
        account: &AccountId,
        policy: &PolicyId,
    ) -> Result<Resolution> {
        let resolved = self
            .store
            .load_enabled_actions(org, account, &[*policy], self.config.max_chain_depth)
            .await?;
        Ok(resolved.get(policy).copied().unwrap_or_default())
    }

    /// Require `predicate` to hold for `account` on every policy.
    ///
    /// A caller without `View` on a failing policy gets `NotFound`, exactly
    /// as for a policy that does not exist. A caller with `View` gets
    /// `ChainTooDeep` when a proxy branch was cut off, `Unauthorized`
    /// otherwise.
    pub async fn authorize(
        &self,
        org: &OrgId,
        account: &AccountId,
        predicate: &Predicate,
        policies: &[PolicyId],
    ) -> Result<()> {
        let resolved = self
            .store
            .load_enabled_actions(org, account, policies, self.config.max_chain_depth)
            .await?;

        for policy in policies {
            let resolution = resolved.get(policy).copied().unwrap_or_default();
            if resolution.allows(predicate) {
                continue;
            }
            debug!(
                org = %org,
                account = %account,
                policy = %policy,
                held = ?resolution.actions,
                required = ?predicate,
                "authorization denied"
            );
            if !resolution.actions.contains(Action::View) {
                return Err(not_found("policy", policy));
            }
            if resolution.truncated {
                return Err(VaultError::ChainTooDeep {
                    max_depth: self.config.max_chain_depth,
                });
            }
            return Err(VaultError::Unauthorized(format!(
                "{:?} required on policy {}",
                predicate, policy
            )));
        }
        Ok(())
    }

    /// Authorize against a secret's policies, reporting a hidden secret the
    /// same way as a missing one.
    async fn authorize_secret(
        &self,
        account: &AccountId,
        predicate: &Predicate,
        secret: &Secret,
        policies: &[PolicyId],
    ) -> Result<()> {
        match self.authorize(&secret.org_id, account, predicate, policies).await {
            Err(VaultError::NotFound(_)) => Err(not_found("secret", &secret.id)),
            other => other,
        }
    }

    /// Authorize against the policy of a secret known to the caller only by
    /// name. A hidden secret is reported by that name and nothing else.
    async fn authorize_named(
        &self,
        org: &OrgId,
        account: &AccountId,
        predicate: &Predicate,
        name: &str,
        policy: &PolicyId,
    ) -> Result<()> {
        match self.authorize(org, account, predicate, &[*policy]).await {
            Err(VaultError::NotFound(_)) => Err(VaultError::NotFound(format!("secret {:?}", name))),
            other => other,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Policy Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a policy whose core member is `owner`, holding every action.
    pub async fn create_policy(
        &self,
        org: &OrgId,
        owner: &Grantee,
        labels: Vec<String>,
    ) -> Result<Policy> {
        if let Grantee::Proxy {
            policy_id,
            public_key,
        } = owner
        {
            self.require_proxy_target(org, policy_id, public_key).await?;
        }

        let generated =
            perms::gen_policy(&mut OsRng, *org, owner, self.config.default_strength, labels)?;
        self.store.save_policy(&generated.policy).await?;
        self.store.save_policy_member(&generated.core_member).await?;

        info!(
            org = %org,
            policy = %generated.policy.id,
            strength = generated.policy.strength.as_str(),
            "policy created"
        );
        Ok(generated.policy)
    }

    /// Load a current policy visible to `account`.
    pub async fn load_policy(
        &self,
        org: &OrgId,
        account: &AccountId,
        policy_id: &PolicyId,
    ) -> Result<Policy> {
        self.authorize(org, account, &Predicate::has(Action::View), &[*policy_id])
            .await?;
        self.store
            .load_policy(org, policy_id)
            .await?
            .ok_or_else(|| not_found("policy", policy_id))
    }

    /// List current policies `account` can view.
    ///
    /// Filtering happens after paging, so a page may come back short.
    pub async fn list_policies(
        &self,
        org: &OrgId,
        account: &AccountId,
        page: Page,
    ) -> Result<Vec<Policy>> {
        let policies = self.store.list_policies(org, page).await?;
        let ids: Vec<PolicyId> = policies.iter().map(|p| p.id).collect();
        let visible = self.viewable(org, account, &ids).await?;
        Ok(policies
            .into_iter()
            .filter(|p| visible.contains(&p.id))
            .collect())
    }

    /// Persist a new version of an existing policy row. Requires `Sudo`, or
    /// `Delete` when the row is a tombstone.
    ///
    /// Key material is fixed at creation. A tombstone also purges proxy
    /// grants left pointing at nothing; those grants are returned.
    pub async fn save_policy(&self, actor: &AccountId, policy: &Policy) -> Result<Vec<PolicyMember>> {
        let org = &policy.org_id;
        let action = if policy.deleted { Action::Delete } else { Action::Sudo };
        self.authorize(org, actor, &Predicate::has(action), &[policy.id])
            .await?;
        let current = self
            .store
            .load_policy(org, &policy.id)
            .await?
            .ok_or_else(|| not_found("policy", &policy.id))?;
        if current.public_key != policy.public_key
            || current.sealed_secret != policy.sealed_secret
            || current.strength != policy.strength
        {
            return Err(VaultError::InconsistentReference(format!(
                "key material of policy {} cannot change",
                policy.id
            )));
        }

        self.store.save_policy(policy).await?;
        if !policy.deleted {
            return Ok(Vec::new());
        }
        info!(target: AUDIT_TARGET, org = %org, actor = %actor, policy = %policy.id, "policy deleted");
        self.purge_orphan_grants(org, policy.id).await
    }

    /// Replace a policy's labels. Requires `Sudo`.
    pub async fn relabel_policy(
        &self,
        org: &OrgId,
        actor: &AccountId,
        policy_id: &PolicyId,
        labels: Vec<String>,
    ) -> Result<Policy> {
        let mut next = self.require_policy(org, policy_id).await?.next_version();
        next.labels = labels;
        self.save_policy(actor, &next).await?;
        Ok(next)
    }

    /// Tombstone a policy. Requires `Delete`. Returns the purged grants.
    pub async fn delete_policy(
        &self,
        org: &OrgId,
        actor: &AccountId,
        policy_id: &PolicyId,
    ) -> Result<Vec<PolicyMember>> {
        let tombstone = self.require_policy(org, policy_id).await?.tombstone();
        self.save_policy(actor, &tombstone).await
    }

    async fn require_policy(&self, org: &OrgId, policy_id: &PolicyId) -> Result<Policy> {
        self.store
            .load_policy(org, policy_id)
            .await?
            .ok_or_else(|| not_found("policy", policy_id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Member Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Grant `grantee` on a policy. Requires `Share` and a key chain from
    /// the grantor to the policy.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_member(
        &self,
        org: &OrgId,
        policy_id: &PolicyId,
        grantor: &AccountId,
        grantor_secret: &X25519StaticSecret,
        grantee: &Grantee,
        actions: Actions,
        labels: Vec<String>,
    ) -> Result<PolicyMember> {
        self.authorize(org, grantor, &Predicate::has(Action::Share), &[*policy_id])
            .await?;

        match grantee {
            Grantee::User { .. } => {}
            Grantee::Group { group_id } => {
                self.store
                    .load_group(org, group_id)
                    .await?
                    .ok_or_else(|| not_found("group", group_id))?;
            }
            Grantee::Proxy {
                policy_id: proxy,
                public_key,
            } => self.require_proxy_target(org, proxy, public_key).await?,
        }

        let lock = self.load_lock(org, policy_id, grantor).await?;
        let mut row = perms::add_member(
            &mut OsRng,
            &lock,
            *grantor,
            grantor_secret,
            grantee,
            actions,
            labels,
            self.config.max_chain_depth,
        )
        .map_err(|e| recovery_error(policy_id, e))?;
        row.version = self.next_member_version(org, policy_id, &row.member_key()).await?;
        self.store.save_policy_member(&row).await?;

        info!(
            target: AUDIT_TARGET,
            org = %org,
            grantor = %grantor,
            policy = %policy_id,
            member = ?row.member_key(),
            actions = ?row.actions,
            "member granted"
        );
        Ok(row)
    }

    /// Persist a new version of an existing member row. Requires `Share`.
    ///
    /// Only actions, labels and deletion may change. New members, and their
    /// wrapped key material, come from [`Vault::add_member`], which proves
    /// the grantor can recover the policy. A tombstone also purges proxy
    /// grants left pointing at nothing; those grants are returned.
    pub async fn save_policy_member(
        &self,
        actor: &AccountId,
        member: &PolicyMember,
    ) -> Result<Vec<PolicyMember>> {
        let org = &member.org_id;
        self.authorize(org, actor, &Predicate::has(Action::Share), &[member.policy_id])
            .await?;
        let policy = self.require_policy(org, &member.policy_id).await?;
        member.check_belongs_to(&policy)?;

        let key = member.member_key();
        let current = self
            .store
            .load_policy_member(org, &member.policy_id, &key)
            .await?
            .ok_or_else(|| {
                VaultError::Unauthorized(format!(
                    "{:?} is not a member of policy {}; grant it with add_member",
                    key, member.policy_id
                ))
            })?;
        if current.member != member.member {
            return Err(VaultError::InconsistentReference(format!(
                "key material of member {:?} cannot change",
                key
            )));
        }

        self.store.save_policy_member(member).await?;
        if !member.deleted {
            return Ok(Vec::new());
        }
        info!(
            target: AUDIT_TARGET,
            org = %org,
            actor = %actor,
            policy = %member.policy_id,
            member = ?member.member_key(),
            "member removed"
        );
        self.purge_orphan_grants(org, member.policy_id).await
    }

    /// Change the actions of an existing member. Requires `Share`.
    pub async fn update_member_actions(
        &self,
        org: &OrgId,
        policy_id: &PolicyId,
        actor: &AccountId,
        member: &MemberKey,
        actions: Actions,
    ) -> Result<PolicyMember> {
        let mut next = self.require_member(org, policy_id, member).await?;
        next.version += 1;
        next.actions = actions;
        self.save_policy_member(actor, &next).await?;
        Ok(next)
    }

    /// Remove a member. Requires `Share`. Returns the purged grants.
    pub async fn remove_member(
        &self,
        org: &OrgId,
        policy_id: &PolicyId,
        actor: &AccountId,
        member: &MemberKey,
    ) -> Result<Vec<PolicyMember>> {
        let current = self.require_member(org, policy_id, member).await?;
        self.save_policy_member(actor, &current.tombstone()).await
    }

    /// List current members of a policy. Requires `Share` or `Audit`.
    pub async fn list_members(
        &self,
        org: &OrgId,
        account: &AccountId,
        policy_id: &PolicyId,
        page: Page,
    ) -> Result<Vec<PolicyMember>> {
        self.authorize(
            org,
            account,
            &Predicate::has_any(&[Action::Share, Action::Audit]),
            &[*policy_id],
        )
        .await?;
        Ok(self.store.list_policy_members(org, policy_id, page).await?)
    }

    /// [`Vault::list_members`] with display identities attached.
    pub async fn list_members_decorated<A: AccountDirectory + ?Sized>(
        &self,
        org: &OrgId,
        account: &AccountId,
        policy_id: &PolicyId,
        page: Page,
        accounts: &A,
    ) -> Result<Vec<DecoratedMember>> {
        let members = self.list_members(org, account, policy_id, page).await?;
        let groups = StoreGroupDirectory::new(Arc::clone(&self.store));
        decorate_members(accounts, &groups, org, members).await
    }

    async fn require_member(
        &self,
        org: &OrgId,
        policy_id: &PolicyId,
        member: &MemberKey,
    ) -> Result<PolicyMember> {
        self.store
            .load_policy_member(org, policy_id, member)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("member {:?} of policy {}", member, policy_id)))
    }

    async fn next_member_version(
        &self,
        org: &OrgId,
        policy_id: &PolicyId,
        member: &MemberKey,
    ) -> Result<u64> {
        let latest = self.store.latest_member_version(org, policy_id, member).await?;
        Ok(latest.map_or(1, |v| v + 1))
    }

    async fn require_proxy_target(
        &self,
        org: &OrgId,
        proxy: &PolicyId,
        public_key: &X25519PublicKey,
    ) -> Result<()> {
        let policy = self
            .store
            .load_policy(org, proxy)
            .await?
            .ok_or_else(|| not_found("policy", proxy))?;
        if policy.public_key != *public_key.as_bytes() {
            return Err(VaultError::InconsistentReference(format!(
                "public key does not belong to policy {}",
                proxy
            )));
        }
        Ok(())
    }

    /// Tombstone every proxy grant pointing at a policy nobody can reach,
    /// repeating for the granting policies until nothing changes.
    async fn purge_orphan_grants(&self, org: &OrgId, start: PolicyId) -> Result<Vec<PolicyMember>> {
        let mut purged = Vec::new();
        let mut work = VecDeque::from([start]);

        while let Some(policy_id) = work.pop_front() {
            if !self.is_orphaned(org, &policy_id).await? {
                continue;
            }
            for grant in self.store.list_proxy_grants_to(org, &policy_id).await? {
                if self.store.load_policy(org, &grant.policy_id).await?.is_none() {
                    continue;
                }
                let tombstone = grant.tombstone();
                self.store.save_policy_member(&tombstone).await?;
                warn!(
                    org = %org,
                    policy = %grant.policy_id,
                    proxy = %policy_id,
                    "purged orphaned proxy grant"
                );
                work.push_back(grant.policy_id);
                purged.push(tombstone);
            }
        }
        Ok(purged)
    }

    async fn is_orphaned(&self, org: &OrgId, policy_id: &PolicyId) -> Result<bool> {
        if self.store.load_policy(org, policy_id).await?.is_none() {
            return Ok(true);
        }
        let any = self
            .store
            .list_policy_members(org, policy_id, Page::new(0, 1))
            .await?;
        Ok(any.is_empty())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Group Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a new group version. A tombstone deletes the group.
    pub async fn save_group(&self, group: &Group) -> Result<()> {
        self.store.save_group(group).await?;
        debug!(org = %group.org_id, group = %group.id, version = group.version, "group saved");
        Ok(())
    }

    /// Load a current group.
    pub async fn load_group(&self, org: &OrgId, id: &GroupId) -> Result<Group> {
        self.store
            .load_group(org, id)
            .await?
            .ok_or_else(|| not_found("group", id))
    }

    /// List current groups.
    pub async fn list_groups(&self, org: &OrgId, page: Page) -> Result<Vec<Group>> {
        Ok(self.store.list_groups(org, page).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key Recovery
    // ─────────────────────────────────────────────────────────────────────────

    /// Recover a policy's content key with the account's own key.
    pub async fn recover_content_key(
        &self,
        org: &OrgId,
        policy_id: &PolicyId,
        account: &AccountId,
        account_secret: &X25519StaticSecret,
    ) -> Result<EncryptionKey> {
        self.authorize(org, account, &Predicate::has(Action::View), &[*policy_id])
            .await?;
        let (_, key) = self.unlock(org, policy_id, account, account_secret).await?;
        Ok(key)
    }

    async fn load_lock(
        &self,
        org: &OrgId,
        policy_id: &PolicyId,
        account: &AccountId,
    ) -> Result<PolicyLock> {
        self.store
            .load_policy_lock(org, policy_id, account, self.config.max_chain_depth)
            .await?
            .ok_or_else(|| not_found("policy", policy_id))
    }

    /// Recover the content key without checking action bits.
    async fn unlock(
        &self,
        org: &OrgId,
        policy_id: &PolicyId,
        account: &AccountId,
        account_secret: &X25519StaticSecret,
    ) -> Result<(Policy, EncryptionKey)> {
        let lock = self.load_lock(org, policy_id, account).await?;
        let key = perms::recover_content_key(&lock, *account, account_secret, self.config.max_chain_depth)
            .map_err(|e| recovery_error(policy_id, e))?;
        let policy = lock
            .policy(policy_id)
            .cloned()
            .ok_or_else(|| not_found("policy", policy_id))?;
        Ok((policy, key))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Secret Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a secret row.
    ///
    /// The action required depends on the transition: creating or editing a
    /// live secret needs `Edit`, deleting needs `Delete`, and bringing back a
    /// deleted one needs `Restore`. Moving a secret to another policy needs
    /// the same action on both. Taking over a name held by another id, live
    /// or deleted, needs `Delete` on that id's policy.
    ///
    /// **Destructive**: taking over a name physically purges the previous
    /// holder's rows and blocks.
    pub async fn save_secret(&self, actor: &AccountId, secret: &Secret) -> Result<SecretSaved> {
        self.check_secret_save(actor, secret).await?;
        self.commit_secret(actor, secret).await
    }

    /// Every check [`Vault::save_secret`] makes before touching the store.
    async fn check_secret_save(&self, actor: &AccountId, secret: &Secret) -> Result<()> {
        let org = &secret.org_id;
        let current = self.store.load_secret_by_id(org, &secret.id).await?;
        let action = Predicate::has(required_action(current.as_ref(), secret));

        self.authorize(org, actor, &action, &[secret.policy_id]).await?;
        if let Some(current) = current.as_ref().filter(|c| c.policy_id != secret.policy_id) {
            self.authorize_named(org, actor, &action, &secret.name, &current.policy_id)
                .await?;
        }

        let mut holders = Vec::new();
        if let Some(holder) = self
            .store
            .load_secret_by_name(org, &secret.name)
            .await?
            .filter(|h| h.id != secret.id)
        {
            let delete = Predicate::has(Action::Delete);
            self.authorize_named(org, actor, &delete, &secret.name, &holder.policy_id)
                .await?;
            holders.push(NameHolder::of(&holder));
        }
        plan_secret_save(secret, current.map(|c| c.version), &holders)?;
        Ok(())
    }

    async fn commit_secret(&self, actor: &AccountId, secret: &Secret) -> Result<SecretSaved> {
        let org = &secret.org_id;
        let saved = self.store.save_secret(secret).await?;
        if !saved.purged.is_empty() {
            info!(
                target: AUDIT_TARGET,
                org = %org,
                actor = %actor,
                name = %secret.name,
                purged = ?saved.purged,
                "secret name taken over"
            );
        }
        Ok(saved)
    }

    /// Encrypt `content` into a fresh block stream and save it as the next
    /// version of the secret named `name`, or as a new secret when no live
    /// secret holds the name.
    pub async fn write_secret(
        &self,
        org: &OrgId,
        author: &AccountId,
        author_secret: &X25519StaticSecret,
        policy_id: &PolicyId,
        name: &str,
        content: &[u8],
    ) -> Result<Secret> {
        self.authorize(org, author, &Predicate::has(Action::Edit), &[*policy_id])
            .await?;
        let (policy, key) = self.unlock(org, policy_id, author, author_secret).await?;

        let stream_id = StreamId::generate_with(&mut OsRng);
        let existing = self.store.load_secret_by_name(org, name).await?;
        let row = match existing.filter(|s| !s.deleted) {
            Some(current) => Secret {
                policy_id: *policy_id,
                author_id: *author,
                stream_id,
                created_at: now_millis(),
                ..current.next_version()
            },
            None => Secret {
                org_id: *org,
                id: SecretId::generate_with(&mut OsRng),
                policy_id: *policy_id,
                author_id: *author,
                name: name.to_string(),
                version: 1,
                stream_id,
                created_at: now_millis(),
                deleted: false,
            },
        };

        // Checked before any block lands: a stream no row references is never purged.
        self.check_secret_save(author, &row).await?;
        let blocks = perms::encrypt_content(
            &mut OsRng,
            &key,
            Cipher::from(policy.strength),
            *org,
            stream_id,
            content,
            self.config.block_size,
        )?;
        self.store.save_blocks(&blocks).await?;
        self.commit_secret(author, &row).await?;
        debug!(org = %org, secret = %row.id, version = row.version, blocks = blocks.len(), "secret written");
        Ok(row)
    }

    /// Decrypt the current content of the secret named `name`.
    pub async fn read_secret(
        &self,
        org: &OrgId,
        account: &AccountId,
        account_secret: &X25519StaticSecret,
        name: &str,
    ) -> Result<Vec<u8>> {
        let secret = self.load_secret_by_name(org, account, name).await?;
        self.read_content(account, account_secret, &secret).await
    }

    /// Decrypt a specific version of a secret. Non-latest versions require
    /// `Restore` or `Sudo`.
    pub async fn read_secret_version(
        &self,
        org: &OrgId,
        account: &AccountId,
        account_secret: &X25519StaticSecret,
        id: &SecretId,
        version: u64,
    ) -> Result<Vec<u8>> {
        let secret = self.load_secret_version(org, account, id, version).await?;
        self.read_content(account, account_secret, &secret).await
    }

    async fn read_content(
        &self,
        account: &AccountId,
        account_secret: &X25519StaticSecret,
        secret: &Secret,
    ) -> Result<Vec<u8>> {
        let (_, key) = self
            .unlock(&secret.org_id, &secret.policy_id, account, account_secret)
            .await?;
        let blocks = self.load_stream(&secret.org_id, &secret.stream_id).await?;
        perms::decrypt_content(&key, &blocks).map_err(|e| recovery_error(&secret.policy_id, e))
    }

    async fn load_stream(&self, org: &OrgId, stream: &StreamId) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        let mut page = self.config.first_page();
        loop {
            let batch = self.store.load_blocks(org, stream, page).await?;
            let done = batch.len() < page.limit;
            blocks.extend(batch);
            if done {
                return Ok(blocks);
            }
            page = page.next();
        }
    }

    /// Load the current row of a secret. Requires `View`.
    pub async fn load_secret(&self, org: &OrgId, account: &AccountId, id: &SecretId) -> Result<Secret> {
        let secret = self
            .store
            .load_secret_by_id(org, id)
            .await?
            .filter(|s| !s.deleted)
            .ok_or_else(|| not_found("secret", id))?;
        self.authorize_secret(account, &Predicate::has(Action::View), &secret, &[secret.policy_id])
            .await?;
        Ok(secret)
    }

    /// Load the current secret holding `name`. Requires `View`.
    pub async fn load_secret_by_name(
        &self,
        org: &OrgId,
        account: &AccountId,
        name: &str,
    ) -> Result<Secret> {
        let secret = self
            .store
            .load_secret_by_name(org, name)
            .await?
            .filter(|s| !s.deleted)
            .ok_or_else(|| VaultError::NotFound(format!("secret {:?}", name)))?;
        self.authorize_named(org, account, &Predicate::has(Action::View), name, &secret.policy_id)
            .await?;
        Ok(secret)
    }

    /// Load one version of a secret. The latest version requires `View`;
    /// any older one requires `Restore` or `Sudo` and is audited.
    pub async fn load_secret_version(
        &self,
        org: &OrgId,
        account: &AccountId,
        id: &SecretId,
        version: u64,
    ) -> Result<Secret> {
        let latest = self
            .store
            .load_secret_by_id(org, id)
            .await?
            .ok_or_else(|| not_found("secret", id))?;
        let row = self
            .store
            .load_secret_version(org, id, version)
            .await?
            .filter(|s| !s.deleted)
            .ok_or_else(|| not_found("secret", id))?;

        if row.version == latest.version {
            self.authorize_secret(account, &Predicate::has(Action::View), &row, &[row.policy_id])
                .await?;
            return Ok(row);
        }

        let policies: Vec<PolicyId> = BTreeSet::from([latest.policy_id, row.policy_id])
            .into_iter()
            .collect();
        self.authorize_secret(account, &privileged_read(), &latest, &policies)
            .await?;
        info!(
            target: AUDIT_TARGET,
            org = %org,
            account = %account,
            secret = %id,
            version,
            "historical secret version read"
        );
        Ok(row)
    }

    /// List current secrets `account` can view, in name order.
    ///
    /// Filtering happens after paging, so a page may come back short.
    pub async fn list_secrets(&self, org: &OrgId, account: &AccountId, page: Page) -> Result<Vec<Secret>> {
        let secrets = self.store.list_secrets(org, page).await?;
        let policies: Vec<PolicyId> = secrets
            .iter()
            .map(|s| s.policy_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let visible = self.viewable(org, account, &policies).await?;
        Ok(secrets
            .into_iter()
            .filter(|s| visible.contains(&s.policy_id))
            .collect())
    }

    /// [`Vault::list_secrets`] with author identities attached.
    pub async fn list_secrets_decorated<A: AccountDirectory + ?Sized>(
        &self,
        org: &OrgId,
        account: &AccountId,
        page: Page,
        accounts: &A,
    ) -> Result<Vec<DecoratedSecret>> {
        let secrets = self.list_secrets(org, account, page).await?;
        decorate_secrets(accounts, secrets).await
    }

    /// Every version of a secret, oldest first. Requires `Restore` or
    /// `Sudo` and is audited.
    pub async fn list_secret_versions(
        &self,
        org: &OrgId,
        account: &AccountId,
        id: &SecretId,
    ) -> Result<Vec<Secret>> {
        let latest = self
            .store
            .load_secret_by_id(org, id)
            .await?
            .ok_or_else(|| not_found("secret", id))?;
        self.authorize_secret(account, &privileged_read(), &latest, &[latest.policy_id])
            .await?;

        let versions = self.store.list_secret_versions(org, id).await?;
        info!(
            target: AUDIT_TARGET,
            org = %org,
            account = %account,
            secret = %id,
            versions = versions.len(),
            "secret history listed"
        );
        Ok(versions)
    }

    async fn viewable(
        &self,
        org: &OrgId,
        account: &AccountId,
        policies: &[PolicyId],
    ) -> Result<BTreeSet<PolicyId>> {
        let resolved = self
            .store
            .load_enabled_actions(org, account, policies, self.config.max_chain_depth)
            .await?;
        Ok(resolved
            .into_iter()
            .filter(|(_, r)| r.actions.contains(Action::View))
            .map(|(id, _)| id)
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Block Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append blocks to a secret's current stream. Requires `Edit`.
    pub async fn save_blocks(
        &self,
        org: &OrgId,
        actor: &AccountId,
        secret_id: &SecretId,
        blocks: &[Block],
    ) -> Result<()> {
        let secret = self
            .store
            .load_secret_by_id(org, secret_id)
            .await?
            .filter(|s| !s.deleted)
            .ok_or_else(|| not_found("secret", secret_id))?;
        self.authorize_secret(actor, &Predicate::has(Action::Edit), &secret, &[secret.policy_id])
            .await?;

        if let Some(stray) = blocks
            .iter()
            .find(|b| b.org_id != *org || b.stream_id != secret.stream_id)
        {
            return Err(VaultError::InconsistentReference(format!(
                "block {} is not in stream {} of secret {}",
                stray.index, secret.stream_id, secret_id
            )));
        }
        Ok(self.store.save_blocks(blocks).await?)
    }

    /// Load blocks of a secret's current stream in index order. Requires
    /// `View`.
    pub async fn load_blocks(
        &self,
        org: &OrgId,
        account: &AccountId,
        secret_id: &SecretId,
        page: Page,
    ) -> Result<Vec<Block>> {
        let secret = self.load_secret(org, account, secret_id).await?;
        Ok(self.store.load_blocks(org, &secret.stream_id, page).await?)
    }
}

/// Verify a signed claim for `org` and return the account it names.
pub fn verify_claim(
    claim: &SignedClaim,
    issuer: &Ed25519PublicKey,
    org: &OrgId,
    now: i64,
) -> Result<AccountId> {
    let claim = claim
        .verify(issuer, now)
        .map_err(|e| VaultError::InvalidClaim(e.to_string()))?;
    if claim.org_id != *org {
        return Err(VaultError::InvalidClaim(format!(
            "claim is for org {}, not {}",
            claim.org_id, org
        )));
    }
    Ok(claim.account_id)
}

/// Action needed to move a secret from `current` to `next`.
fn required_action(current: Option<&Secret>, next: &Secret) -> Action {
    match (current.map(|c| c.deleted), next.deleted) {
        (_, true) => Action::Delete,
        (Some(true), false) => Action::Restore,
        (None, false) | (Some(false), false) => Action::Edit,
    }
}

fn privileged_read() -> Predicate {
    Predicate::has_any(&[Action::Restore, Action::Sudo])
}

fn not_found(kind: &str, id: &dyn fmt::Display) -> VaultError {
    VaultError::NotFound(format!("{} {}", kind, id))
}

fn recovery_error(policy: &PolicyId, err: PermsError) -> VaultError {
    if let PermsError::DecryptionFailure(reason) = &err {
        warn!(policy = %policy, reason = %reason, "key material failed to authenticate");
    }
    err.into()
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(deleted: bool) -> Secret {
        Secret {
            org_id: OrgId::generate(),
            id: SecretId::generate(),
            policy_id: PolicyId::generate(),
            author_id: AccountId::generate(),
            name: "/x".into(),
            version: 1,
            stream_id: StreamId::generate(),
            created_at: 0,
            deleted,
        }
    }

    #[test]
    fn test_required_action_table() {
        let (live, dead) = (row(false), row(true));
        assert_eq!(required_action(None, &live), Action::Edit);
        assert_eq!(required_action(Some(&live), &live), Action::Edit);
        assert_eq!(required_action(Some(&live), &dead), Action::Delete);
        assert_eq!(required_action(Some(&dead), &live), Action::Restore);
        assert_eq!(required_action(Some(&dead), &dead), Action::Delete);
    }
}
