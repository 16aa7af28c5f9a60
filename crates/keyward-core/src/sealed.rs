//! Sealed key material as it is stored in policy and member rows.
//!
//! This module only describes the data. Sealing and opening live in
//! `keyward-perms`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// AEAD used for a sealed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SealFormat {
    /// X25519 + ChaCha20-Poly1305 with a 96-bit nonce.
    X25519ChaCha20Poly1305 = 1,
    /// X25519 + XChaCha20-Poly1305 with a 192-bit nonce.
    X25519XChaCha20Poly1305 = 2,
}

impl SealFormat {
    /// Nonce length in bytes.
    pub const fn nonce_len(self) -> usize {
        match self {
            SealFormat::X25519ChaCha20Poly1305 => 12,
            SealFormat::X25519XChaCha20Poly1305 => 24,
        }
    }

    /// Convert to the stored byte.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse the stored byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(SealFormat::X25519ChaCha20Poly1305),
            2 => Some(SealFormat::X25519XChaCha20Poly1305),
            _ => None,
        }
    }
}

/// Algorithm parameters chosen when a policy is generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Strength {
    /// ChaCha20-Poly1305 wraps.
    #[default]
    Standard,
    /// XChaCha20-Poly1305 wraps; random nonces are safe at much larger volumes.
    Extended,
}

impl Strength {
    /// The seal format used for wraps created under this strength.
    pub const fn seal_format(self) -> SealFormat {
        match self {
            Strength::Standard => SealFormat::X25519ChaCha20Poly1305,
            Strength::Extended => SealFormat::X25519XChaCha20Poly1305,
        }
    }

    /// Stable string used in storage.
    pub const fn as_str(self) -> &'static str {
        match self {
            Strength::Standard => "standard",
            Strength::Extended => "extended",
        }
    }

    /// Parse the storage string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Strength::Standard),
            "extended" => Some(Strength::Extended),
            _ => None,
        }
    }
}

/// Key material encrypted to an X25519 public key.
///
/// `ephemeral_public` is the sender's one-time key; the recipient combines it
/// with their static secret to derive the unwrap key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    /// AEAD used.
    pub format: SealFormat,

    /// Ephemeral X25519 public key (sender's side of ECDH).
    pub ephemeral_public: [u8; 32],

    /// Nonce, `format.nonce_len()` bytes.
    pub nonce: Vec<u8>,

    /// Ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl SealedKey {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let sealed: Self =
            ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        if sealed.nonce.len() != sealed.format.nonce_len() {
            return Err(CoreError::DecodingError(format!(
                "nonce length {} does not match {:?}",
                sealed.nonce.len(),
                sealed.format
            )));
        }
        Ok(sealed)
    }
}

impl fmt::Debug for SealedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SealedKey({:?}, {} bytes)",
            self.format,
            self.ciphertext.len()
        )
    }
}
