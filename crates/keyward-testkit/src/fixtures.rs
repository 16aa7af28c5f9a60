//! Test fixtures and helpers.
//!
//! Common setup code for integration tests and benchmarks.

use std::path::Path;

use rand::rngs::OsRng;

use keyward::perms::{Grantee, X25519StaticSecret};
use keyward::store::{MemoryStore, SqliteStore, Store};
use keyward::{AccountId, Action, Actions, OrgId, Policy, Result, Vault, VaultConfig};

/// An account id paired with its X25519 secret.
#[derive(Clone)]
pub struct TestAccount {
    pub id: AccountId,
    pub key: X25519StaticSecret,
}

impl TestAccount {
    /// Create an account with random id and key.
    pub fn new() -> Self {
        Self {
            id: AccountId::generate(),
            key: X25519StaticSecret::generate(&mut OsRng),
        }
    }

    /// Create a deterministic account from a seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        let mut id = [0u8; 16];
        id.copy_from_slice(&seed[..16]);
        Self {
            id: AccountId::from_bytes(id),
            key: X25519StaticSecret::from_bytes(seed),
        }
    }

    /// This account as a policy member.
    pub fn grantee(&self) -> Grantee {
        Grantee::User {
            account_id: self.id,
            public_key: self.key.public_key(),
        }
    }
}

impl Default for TestAccount {
    fn default() -> Self {
        Self::new()
    }
}

/// Create several accounts with distinct deterministic keys.
pub fn multi_party_accounts(count: usize) -> Vec<TestAccount> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            seed[31] = 0x5a;
            TestAccount::with_seed(seed)
        })
        .collect()
}

/// A vault and the org every fixture call operates in.
pub struct TestFixture<S: Store> {
    pub org: OrgId,
    pub vault: Vault<S>,
}

impl TestFixture<MemoryStore> {
    /// A fresh in-memory vault with default configuration.
    pub fn memory() -> Result<Self> {
        Self::with_store(MemoryStore::new(), VaultConfig::default())
    }
}

impl TestFixture<SqliteStore> {
    /// A SQLite-backed vault at `path`.
    pub fn sqlite(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_store(SqliteStore::open(path)?, VaultConfig::default())
    }
}

impl<S: Store> TestFixture<S> {
    pub fn with_store(store: S, config: VaultConfig) -> Result<Self> {
        Ok(Self {
            org: OrgId::generate(),
            vault: Vault::new(store, config)?,
        })
    }

    /// Create a policy owned by `owner`.
    pub async fn policy(&self, owner: &TestAccount) -> Result<Policy> {
        self.vault.create_policy(&self.org, &owner.grantee(), vec![]).await
    }

    /// Build `hops + 1` policies owned by `owner`, where each policy grants
    /// View to the next as a proxy member and `reader` holds View on the
    /// last. `reader` therefore reaches `chain[0]` through `hops` proxy hops.
    pub async fn proxy_chain(
        &self,
        owner: &TestAccount,
        reader: &TestAccount,
        hops: usize,
    ) -> Result<Vec<Policy>> {
        let view = Actions::of(&[Action::View]);
        let mut chain = Vec::with_capacity(hops + 1);
        for _ in 0..=hops {
            chain.push(self.policy(owner).await?);
        }
        for pair in chain.windows(2) {
            self.vault
                .add_member(
                    &self.org,
                    &pair[0].id,
                    &owner.id,
                    &owner.key,
                    &Grantee::proxy(&pair[1]),
                    view,
                    vec![],
                )
                .await?;
        }
        if let Some(last) = chain.last() {
            self.vault
                .add_member(&self.org, &last.id, &owner.id, &owner.key, &reader.grantee(), view, vec![])
                .await?;
        }
        Ok(chain)
    }
}
