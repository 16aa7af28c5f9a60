//! # Keyward
//!
//! The unified API for Keyward: versioned secrets guarded by policies that
//! can delegate to one another.
//!
//! ## Overview
//!
//! - **Policies**: each policy owns an X25519 key pair and a content key.
//!   Members hold the policy's private key wrapped to their own key.
//! - **Delegation**: a policy can be a member of another policy, so access
//!   can flow through a chain of policies, up to a configured hop limit.
//! - **Authorization**: an account's actions on a policy are the union of
//!   its direct, group, and proxy grants.
//! - **Secrets**: named, versioned rows whose content lives in an encrypted,
//!   append-only block stream.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward::{Vault, VaultConfig};
//! use keyward::core::{AccountId, OrgId};
//! use keyward::perms::{Grantee, X25519StaticSecret};
//! use keyward::store::SqliteStore;
//! use rand::rngs::OsRng;
//!
//! async fn example() -> keyward::Result<()> {
//!     let vault = Vault::new(SqliteStore::open("keyward.db")?, VaultConfig::default())?;
//!
//!     let org = OrgId::generate();
//!     let account = AccountId::generate();
//!     let key = X25519StaticSecret::generate(&mut OsRng);
//!     let owner = Grantee::User { account_id: account, public_key: key.public_key() };
//!
//!     let policy = vault.create_policy(&org, &owner, vec![]).await?;
//!     vault.write_secret(&org, &account, &key, &policy.id, "/db/password", b"hunter2").await?;
//!
//!     let plaintext = vault.read_secret(&org, &account, &key, "/db/password").await?;
//!     assert_eq!(plaintext, b"hunter2");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `keyward::core` - Data model (Policy, Secret, Actions, etc.)
//! - `keyward::perms` - Key material, recovery, and resolution
//! - `keyward::store` - Storage abstraction and SQLite

pub mod config;
pub mod decorate;
pub mod error;
pub mod vault;

// Re-export component crates
pub use keyward_core as core;
pub use keyward_perms as perms;
pub use keyward_store as store;

// Re-export main types for convenience
pub use config::VaultConfig;
pub use decorate::{
    AccountDirectory, AccountIdentity, DecoratedMember, DecoratedSecret, GroupDirectory,
    MemberDisplay, StoreGroupDirectory,
};
pub use error::{Result, VaultError};
pub use vault::{verify_claim, Vault, AUDIT_TARGET};

// Re-export commonly used core types
pub use keyward_core::{
    AccountId, Action, Actions, Block, Group, GroupId, MemberKey, OrgId, Page, Policy, PolicyId,
    PolicyMember, Predicate, Secret, SecretId, StreamId, Strength,
};
