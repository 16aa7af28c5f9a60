//! # Keyward Permissions
//!
//! Key material, delegation, and authorization for Keyward policies.
//!
//! ## Encryption Model
//!
//! Every policy owns an X25519 key pair and a symmetric content key:
//!
//! 1. **Content key**: encrypts secret content, block by block ([`envelope`]).
//!    It is sealed to the policy's own public key.
//! 2. **Member wraps**: each `User` or `Proxy` member holds the policy's
//!    private key sealed to the member's public key ([`seal`]).
//!
//! Because a proxy member is itself a policy, wraps nest. Recovering a
//! policy's key may take several unwraps ([`recovery`]).
//!
//! ## Authorization
//!
//! [`access`] resolves an account's capability bits on a policy from a
//! [`MembershipSnapshot`]. It never touches key material.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward_core::{AccountId, OrgId, PolicyLock, Strength};
//! use keyward_perms::{gen_policy, recover_content_key, Grantee, X25519StaticSecret};
//! use rand::rngs::OsRng;
//!
//! let account = AccountId::generate();
//! let secret = X25519StaticSecret::generate(&mut OsRng);
//! let grantee = Grantee::User { account_id: account, public_key: secret.public_key() };
//!
//! let generated = gen_policy(&mut OsRng, OrgId::generate(), &grantee, Strength::Standard, vec![]).unwrap();
//! let lock = PolicyLock {
//!     target: Some(generated.policy.id),
//!     policies: vec![generated.policy],
//!     members: vec![generated.core_member],
//! };
//! let key = recover_content_key(&lock, account, &secret, 3).unwrap();
//! assert_eq!(key.as_bytes(), generated.content_key.as_bytes());
//! ```

pub mod access;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod lifecycle;
pub mod recovery;
pub mod seal;

pub use access::{resolve, resolve_all, MembershipSnapshot, Resolution};
pub use crypto::{
    Cipher, EncryptionKey, EphemeralKeyPair, SharedKey, X25519PublicKey, X25519StaticSecret,
};
pub use envelope::{decrypt_content, encrypt_content, open_block, seal_block, BlockEnvelope};
pub use error::{PermsError, Result};
pub use lifecycle::{add_member, gen_policy, wrap_member, GeneratedPolicy, Grantee};
pub use recovery::{recover_content_key, recover_policy_key};
pub use seal::{open, seal, SealContext, SealTarget, SEAL_DOMAIN};
