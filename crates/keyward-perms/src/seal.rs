//! Sealing key material to an X25519 public key.
//!
//! A seal is a one-shot ECDH: the sender generates an ephemeral key pair,
//! agrees a shared secret with the recipient's public key, derives a wrap
//! key with Blake3 bound to a [`SealContext`], and encrypts 32 bytes of key
//! material. The context is also passed as associated data, so a wrap lifted
//! from one member row onto another fails to open.

use rand::{CryptoRng, RngCore};

use keyward_core::{MemberKey, OrgId, PolicyId, SealFormat, SealedKey};

use crate::crypto::{Cipher, EncryptionKey, EphemeralKeyPair, X25519PublicKey, X25519StaticSecret};
use crate::error::{PermsError, Result};

/// Blake3 `derive_key` domain for wrap keys.
pub const SEAL_DOMAIN: &str = "keyward 2024-06 policy seal v1";

/// What a sealed payload is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealTarget {
    /// The policy's content key, sealed to the policy itself.
    Content,
    /// The policy's private key, sealed to a member.
    Member(MemberKey),
}

/// Binding for one seal: which org, which policy, which slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealContext {
    pub org_id: OrgId,
    pub policy_id: PolicyId,
    pub target: SealTarget,
}

impl SealContext {
    /// Context for a policy's `sealed_secret`.
    pub fn content(org_id: OrgId, policy_id: PolicyId) -> Self {
        Self {
            org_id,
            policy_id,
            target: SealTarget::Content,
        }
    }

    /// Context for a member row's wrap.
    pub fn member(org_id: OrgId, policy_id: PolicyId, member: MemberKey) -> Self {
        Self {
            org_id,
            policy_id,
            target: SealTarget::Member(member),
        }
    }

    /// Fixed-layout encoding fed to the KDF and used as associated data.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + 16 + 1 + 16);
        out.extend_from_slice(self.org_id.as_bytes());
        out.extend_from_slice(self.policy_id.as_bytes());
        match &self.target {
            SealTarget::Content => out.push(0),
            SealTarget::Member(key) => {
                out.push(match key {
                    MemberKey::User(_) => 1,
                    MemberKey::Group(_) => 2,
                    MemberKey::Proxy(_) => 3,
                });
                out.extend_from_slice(key.id_bytes());
            }
        }
        out
    }
}

/// Seal 32 bytes of key material to `recipient`.
pub fn seal<R: RngCore + CryptoRng>(
    rng: &mut R,
    recipient: &X25519PublicKey,
    material: &[u8; 32],
    context: &SealContext,
    format: SealFormat,
) -> Result<SealedKey> {
    let ephemeral = EphemeralKeyPair::generate(rng);
    let ephemeral_public = ephemeral.public_key();

    let ctx = context.to_bytes();
    let wrap_key = ephemeral
        .diffie_hellman(recipient)?
        .derive_encryption_key(SEAL_DOMAIN, &ctx);

    let cipher = Cipher::from(format);
    let nonce = cipher.generate_nonce(rng);
    let ciphertext = wrap_key.encrypt(cipher, &nonce, material, &ctx)?;

    Ok(SealedKey {
        format,
        ephemeral_public: *ephemeral_public.as_bytes(),
        nonce,
        ciphertext,
    })
}

/// Open a seal with the recipient's secret.
pub fn open(
    sealed: &SealedKey,
    recipient: &X25519StaticSecret,
    context: &SealContext,
) -> Result<[u8; 32]> {
    let ctx = context.to_bytes();
    let wrap_key = recipient
        .diffie_hellman(&X25519PublicKey::from_bytes(sealed.ephemeral_public))
        .map_err(|_| PermsError::DecryptionFailure("invalid ephemeral key".into()))?
        .derive_encryption_key(SEAL_DOMAIN, &ctx);

    let bytes = wrap_key.decrypt(sealed.format.into(), &sealed.nonce, &sealed.ciphertext, &ctx)?;

    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        PermsError::DecryptionFailure(format!(
            "invalid key length: expected 32, got {}",
            bytes.len()
        ))
    })
}

/// Seal a policy private key to a member.
pub fn wrap_policy_key<R: RngCore + CryptoRng>(
    rng: &mut R,
    policy_secret: &X25519StaticSecret,
    member_public: &X25519PublicKey,
    context: &SealContext,
    format: SealFormat,
) -> Result<SealedKey> {
    seal(rng, member_public, &policy_secret.to_bytes(), context, format)
}

/// Open a member wrap, checking the result against the policy's public key.
pub fn unwrap_policy_key(
    sealed: &SealedKey,
    member_secret: &X25519StaticSecret,
    context: &SealContext,
    expected_public: &[u8; 32],
) -> Result<X25519StaticSecret> {
    let recovered = X25519StaticSecret::from_bytes(open(sealed, member_secret, context)?);
    if recovered.public_key().as_bytes() != expected_public {
        return Err(PermsError::DecryptionFailure(format!(
            "unwrapped key does not match policy {}",
            context.policy_id
        )));
    }
    Ok(recovered)
}

/// Seal a content key to its policy.
pub fn seal_content_key<R: RngCore + CryptoRng>(
    rng: &mut R,
    content_key: &EncryptionKey,
    policy_public: &X25519PublicKey,
    context: &SealContext,
    format: SealFormat,
) -> Result<SealedKey> {
    seal(rng, policy_public, content_key.as_bytes(), context, format)
}

/// Open a policy's content key.
pub fn open_content_key(
    sealed: &SealedKey,
    policy_secret: &X25519StaticSecret,
    context: &SealContext,
) -> Result<EncryptionKey> {
    open(sealed, policy_secret, context).map(EncryptionKey::from_bytes)
}
