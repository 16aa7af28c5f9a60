//! # Keyward Core
//!
//! The pure data model for Keyward: identifiers, capability bits, policies
//! and their members, groups, secrets and content blocks.
//!
//! This crate does no I/O and no encryption. Key material appears here only
//! as sealed bytes ([`SealedKey`]); sealing and opening live in
//! `keyward-perms`, storage in `keyward-store`.
//!
//! ## Key Types
//!
//! - [`Policy`] - The unit of access control, owning an X25519 key pair
//! - [`PolicyMember`] - A grant from a policy to a [`Member`]
//! - [`Actions`] - Capability bitmask, checked with a [`Predicate`]
//! - [`Secret`] / [`Block`] - Versioned metadata and its encrypted content
//!
//! ## Versioning
//!
//! Every row is append-versioned. See [`versioned`].

pub mod actions;
pub mod block;
pub mod claim;
pub mod crypto;
pub mod error;
pub mod group;
pub mod policy;
pub mod sealed;
pub mod secret;
pub mod types;
pub mod versioned;

pub use actions::{Action, Actions, Predicate};
pub use block::{validate_batch, Block};
pub use claim::{Claim, SignedClaim};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, SigningKeypair};
pub use error::{CoreError, Result};
pub use group::Group;
pub use policy::{Member, MemberKey, MemberType, Policy, PolicyLock, PolicyMember};
pub use sealed::{SealFormat, SealedKey, Strength};
pub use secret::{plan_secret_save, NameHolder, SavePlan, Secret};
pub use types::{AccountId, GroupId, OrgId, Page, PolicyId, SecretId, StreamId, ID_LEN};
pub use versioned::{VersionLog, Versioned};
