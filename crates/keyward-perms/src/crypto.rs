//! Cryptographic utilities for policy keys and content.
//!
//! Provides X25519 key agreement, Blake3 key derivation, and
//! ChaCha20-Poly1305 / XChaCha20-Poly1305 authenticated encryption. Every
//! constructor that needs randomness takes the RNG explicitly so callers
//! (and tests) control it.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce, XChaCha20Poly1305, XNonce,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use keyward_core::{SealFormat, Strength};

use crate::error::{PermsError, Result};

/// An X25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// An X25519 static secret key.
///
/// Accounts hold one, and so does every policy: a policy's secret is what
/// member wraps carry.
#[derive(Clone)]
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(StaticSecret::random_from_rng(rng))
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// The raw secret bytes. Only ever passed to a seal.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Perform key agreement with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> Result<SharedKey> {
        let shared = self.0.diffie_hellman(&peer_public.to_dalek());
        if !shared.was_contributory() {
            return Err(PermsError::InvalidPublicKey);
        }
        Ok(SharedKey(*shared.as_bytes()))
    }
}

impl std::fmt::Debug for X25519StaticSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "X25519StaticSecret(pub={:?})", self.public_key())
    }
}

/// A shared secret derived from X25519 key agreement.
#[derive(Clone)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive a wrap key bound to `context` under a Blake3 KDF domain.
    pub fn derive_encryption_key(&self, domain: &str, context: &[u8]) -> EncryptionKey {
        let mut hasher = blake3::Hasher::new_derive_key(domain);
        hasher.update(&self.0);
        hasher.update(context);
        EncryptionKey(*hasher.finalize().as_bytes())
    }
}

/// AEAD selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Cipher {
    /// 96-bit nonce.
    ChaCha20Poly1305 = 1,
    /// 192-bit nonce.
    XChaCha20Poly1305 = 2,
}

impl Cipher {
    /// Nonce length in bytes.
    pub const fn nonce_len(self) -> usize {
        match self {
            Cipher::ChaCha20Poly1305 => 12,
            Cipher::XChaCha20Poly1305 => 24,
        }
    }

    /// A fresh random nonce of the right length.
    pub fn generate_nonce<R: RngCore + CryptoRng>(self, rng: &mut R) -> Vec<u8> {
        let mut nonce = vec![0u8; self.nonce_len()];
        rng.fill_bytes(&mut nonce);
        nonce
    }
}

impl From<SealFormat> for Cipher {
    fn from(format: SealFormat) -> Self {
        match format {
            SealFormat::X25519ChaCha20Poly1305 => Cipher::ChaCha20Poly1305,
            SealFormat::X25519XChaCha20Poly1305 => Cipher::XChaCha20Poly1305,
        }
    }
}

impl From<Strength> for Cipher {
    fn from(strength: Strength) -> Self {
        strength.seal_format().into()
    }
}

/// A 256-bit symmetric key.
///
/// Used both as a policy's content key and as the per-seal wrap key. It does
/// not implement `PartialEq`; compare keys by what they decrypt, or through
/// [`EncryptionKey::as_bytes`] in tests.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Generate a new random key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt with associated data.
    pub fn encrypt(&self, cipher: Cipher, nonce: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        check_nonce(cipher, nonce).map_err(PermsError::EncryptionError)?;
        let payload = Payload { msg: plaintext, aad };
        let out = match cipher {
            Cipher::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(&self.0)
                .map_err(|e| PermsError::EncryptionError(e.to_string()))?
                .encrypt(Nonce::from_slice(nonce), payload),
            Cipher::XChaCha20Poly1305 => XChaCha20Poly1305::new_from_slice(&self.0)
                .map_err(|e| PermsError::EncryptionError(e.to_string()))?
                .encrypt(XNonce::from_slice(nonce), payload),
        };
        out.map_err(|e| PermsError::EncryptionError(e.to_string()))
    }

    /// Decrypt with associated data.
    pub fn decrypt(&self, cipher: Cipher, nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        check_nonce(cipher, nonce).map_err(PermsError::DecryptionFailure)?;
        let payload = Payload { msg: ciphertext, aad };
        let out = match cipher {
            Cipher::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(&self.0)
                .map_err(|e| PermsError::DecryptionFailure(e.to_string()))?
                .decrypt(Nonce::from_slice(nonce), payload),
            Cipher::XChaCha20Poly1305 => XChaCha20Poly1305::new_from_slice(&self.0)
                .map_err(|e| PermsError::DecryptionFailure(e.to_string()))?
                .decrypt(XNonce::from_slice(nonce), payload),
        };
        out.map_err(|_| PermsError::DecryptionFailure("authentication failed".into()))
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

fn check_nonce(cipher: Cipher, nonce: &[u8]) -> std::result::Result<(), String> {
    if nonce.len() != cipher.nonce_len() {
        return Err(format!(
            "nonce length {} does not match {:?}",
            nonce.len(),
            cipher
        ));
    }
    Ok(())
}

/// Ephemeral key pair for one-time key agreement.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = EphemeralSecret::random_from_rng(rng);
        let public = X25519PublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Consumes the ephemeral secret (can only be used once).
    pub fn diffie_hellman(self, peer_public: &X25519PublicKey) -> Result<SharedKey> {
        let shared = self.secret.diffie_hellman(&peer_public.to_dalek());
        if !shared.was_contributory() {
            return Err(PermsError::InvalidPublicKey);
        }
        Ok(SharedKey(*shared.as_bytes()))
    }
}
