//! Error types for Keyward Core.

use thiserror::Error;

use crate::types::{OrgId, PolicyId, SecretId, StreamId};

/// Core errors: model invariants that do not need storage to check.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("claim expired at {expires_at} (now {now})")]
    ClaimExpired { expires_at: i64, now: i64 },

    #[error("claim not valid until {issued_at} (now {now})")]
    ClaimNotYetValid { issued_at: i64, now: i64 },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("inconsistent reference: {0}")]
    InconsistentReference(String),

    #[error("version conflict: version {attempted} does not follow {latest}")]
    VersionConflict { attempted: u64, latest: u64 },

    #[error("secret name {name:?} is held by newer secret {holder}")]
    NameConflict { name: String, holder: SecretId },

    #[error("invalid block batch: {0}")]
    InvalidBatch(String),
}

impl CoreError {
    /// Build an `InconsistentReference` for mismatched organizations.
    pub fn org_mismatch(expected: &OrgId, found: &OrgId) -> Self {
        CoreError::InconsistentReference(format!("org {} does not match {}", found, expected))
    }

    /// Build an `InconsistentReference` for mismatched policies.
    pub fn policy_mismatch(expected: &PolicyId, found: &PolicyId) -> Self {
        CoreError::InconsistentReference(format!("policy {} does not match {}", found, expected))
    }

    /// Build an `InvalidBatch` for a block outside the batch's stream.
    pub fn stream_mismatch(expected: &StreamId, found: &StreamId) -> Self {
        CoreError::InvalidBatch(format!("stream {} does not match {}", found, expected))
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
