//! Encrypted block envelopes.
//!
//! Secret content is split into fixed-size chunks; each chunk is encrypted
//! under the policy's content key into a [`BlockEnvelope`] and stored as a
//! [`Block`] payload. The associated data binds `(org, stream, index)`, so
//! a block moved to another stream or position fails to decrypt.

use bytes::Bytes;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use keyward_core::{Block, OrgId, StreamId};

use crate::crypto::{Cipher, EncryptionKey};
use crate::error::{PermsError, Result};

const BLOCK_AAD_DOMAIN: &[u8] = b"keyward-block-v1";

/// The serialized form of one encrypted block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEnvelope {
    /// Encryption algorithm used.
    pub cipher: Cipher,

    /// Nonce used for encryption (unique per encryption).
    pub nonce: Vec<u8>,

    /// The encrypted data (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl BlockEnvelope {
    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| PermsError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| PermsError::SerializationError(e.to_string()))
    }
}

fn block_aad(org_id: &OrgId, stream_id: &StreamId, index: u64) -> Vec<u8> {
    let mut aad = Vec::with_capacity(BLOCK_AAD_DOMAIN.len() + 16 + 16 + 8);
    aad.extend_from_slice(BLOCK_AAD_DOMAIN);
    aad.extend_from_slice(org_id.as_bytes());
    aad.extend_from_slice(stream_id.as_bytes());
    aad.extend_from_slice(&index.to_be_bytes());
    aad
}

/// Encrypt one chunk into a block.
pub fn seal_block<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &EncryptionKey,
    cipher: Cipher,
    org_id: OrgId,
    stream_id: StreamId,
    index: u64,
    plaintext: &[u8],
) -> Result<Block> {
    let nonce = cipher.generate_nonce(rng);
    let aad = block_aad(&org_id, &stream_id, index);
    let ciphertext = key.encrypt(cipher, &nonce, plaintext, &aad)?;
    let envelope = BlockEnvelope {
        cipher,
        nonce,
        ciphertext,
    };

    Ok(Block {
        org_id,
        stream_id,
        index,
        payload: Bytes::from(envelope.to_bytes()?),
    })
}

/// Decrypt one block.
pub fn open_block(key: &EncryptionKey, block: &Block) -> Result<Vec<u8>> {
    let envelope = BlockEnvelope::from_bytes(&block.payload)
        .map_err(|e| PermsError::CorruptStream(format!("block {}: {}", block.index, e)))?;
    let aad = block_aad(&block.org_id, &block.stream_id, block.index);
    key.decrypt(envelope.cipher, &envelope.nonce, &envelope.ciphertext, &aad)
}

/// Split content into encrypted blocks numbered from 0.
///
/// Empty content still produces one (empty) block so a stream is never
/// empty.
pub fn encrypt_content<R: RngCore + CryptoRng>(
    rng: &mut R,
    key: &EncryptionKey,
    cipher: Cipher,
    org_id: OrgId,
    stream_id: StreamId,
    content: &[u8],
    block_size: usize,
) -> Result<Vec<Block>> {
    if block_size == 0 {
        return Err(PermsError::EncryptionError("block size must be positive".into()));
    }
    if content.is_empty() {
        return Ok(vec![seal_block(rng, key, cipher, org_id, stream_id, 0, &[])?]);
    }

    content
        .chunks(block_size)
        .enumerate()
        .map(|(index, chunk)| seal_block(rng, key, cipher, org_id, stream_id, index as u64, chunk))
        .collect()
}

/// Decrypt blocks that were loaded in ascending index order.
///
/// The indices must run 0, 1, 2, ... with no gaps.
pub fn decrypt_content(key: &EncryptionKey, blocks: &[Block]) -> Result<Vec<u8>> {
    let mut content = Vec::new();
    for (expected, block) in blocks.iter().enumerate() {
        if block.index != expected as u64 {
            return Err(PermsError::CorruptStream(format!(
                "expected block {}, found {}",
                expected, block.index
            )));
        }
        content.extend_from_slice(&open_block(key, block)?);
    }
    Ok(content)
}
