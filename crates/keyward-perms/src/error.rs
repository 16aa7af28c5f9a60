//! Error types for the permissions module.

use thiserror::Error;

/// Errors that can occur during sealing, recovery, and policy generation.
#[derive(Debug, Error)]
pub enum PermsError {
    /// No member chain connects the caller to the policy.
    #[error("no recovery path to policy")]
    NoPath,

    /// Every candidate path was longer than the hop limit.
    #[error("delegation chain exceeds {max_depth} hops")]
    ChainTooDeep { max_depth: usize },

    /// A wrap failed to authenticate or unwrapped to the wrong key.
    #[error("decryption failure: {0}")]
    DecryptionFailure(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Public key is not usable for key agreement.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// The grantee cannot receive the requested grant.
    #[error("invalid grantee: {0}")]
    InvalidGrantee(String),

    /// A block stream is malformed or incomplete.
    #[error("corrupt block stream: {0}")]
    CorruptStream(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] keyward_core::CoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
