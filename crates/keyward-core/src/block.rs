//! Encrypted content blocks.
//!
//! A secret's content lives in an append-only stream of blocks keyed by
//! `(org, stream, index)`. Blocks are never rewritten; a new content
//! generation gets a new stream.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::{OrgId, StreamId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub org_id: OrgId,
    pub stream_id: StreamId,
    pub index: u64,
    /// Sealed envelope bytes. Opaque to storage.
    pub payload: Bytes,
}

/// Check a batch before appending it to a stream whose highest stored index
/// is `stored_max`.
///
/// Returns the `(org, stream)` the batch targets. The batch may be in any
/// order; it is rejected if it is empty, spans streams, repeats an index, or
/// reaches back to or below `stored_max`.
pub fn validate_batch(blocks: &[Block], stored_max: Option<u64>) -> Result<(OrgId, StreamId)> {
    let first = blocks
        .first()
        .ok_or_else(|| CoreError::InvalidBatch("empty batch".into()))?;
    let (org_id, stream_id) = (first.org_id, first.stream_id);

    let mut indices = Vec::with_capacity(blocks.len());
    for block in blocks {
        if block.org_id != org_id {
            return Err(CoreError::InvalidBatch(format!(
                "org {} does not match {}",
                block.org_id, org_id
            )));
        }
        if block.stream_id != stream_id {
            return Err(CoreError::stream_mismatch(&stream_id, &block.stream_id));
        }
        indices.push(block.index);
    }

    indices.sort_unstable();
    if indices.windows(2).any(|w| w[0] == w[1]) {
        return Err(CoreError::InvalidBatch("duplicate block index".into()));
    }
    if let (Some(max), Some(lowest)) = (stored_max, indices.first()) {
        if *lowest <= max {
            return Err(CoreError::InvalidBatch(format!(
                "index {} is not after stored index {}",
                lowest, max
            )));
        }
    }

    Ok((org_id, stream_id))
}
