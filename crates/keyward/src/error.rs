//! Error types for the Vault.

use keyward_core::{CoreError, SecretId};
use keyward_perms::PermsError;
use keyward_store::StoreError;
use thiserror::Error;

/// Errors that can occur during Vault operations.
///
/// `NotFound` and `Unauthorized` are kept apart on purpose: a caller without
/// `View` on a resource only ever sees `NotFound`.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The resource does not exist, is deleted, or is hidden from the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller may see the resource but lacks the required actions, or
    /// holds no key chain that reaches it.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A wrapped key or block failed to authenticate.
    #[error("decryption failure: {0}")]
    DecryptionFailure(String),

    /// Rows from different orgs or policies were mixed.
    #[error("inconsistent reference: {0}")]
    InconsistentReference(String),

    /// A newer secret already holds the name.
    #[error("secret name {name:?} is held by newer secret {holder}")]
    NameConflict { name: String, holder: SecretId },

    /// Resolution or recovery was cut off by the hop limit.
    #[error("delegation chain exceeds {max_depth} hops")]
    ChainTooDeep { max_depth: usize },

    /// Version does not follow the latest stored one.
    #[error("version conflict: version {attempted} does not follow {latest}")]
    VersionConflict { attempted: u64, latest: u64 },

    /// A block batch was rejected.
    #[error("invalid block batch: {0}")]
    InvalidBatch(String),

    /// A signed claim failed verification.
    #[error("invalid claim: {0}")]
    InvalidClaim(String),

    /// A grant target that cannot hold the grant.
    #[error("invalid grantee: {0}")]
    InvalidGrantee(String),

    /// A stored block stream is incomplete or unreadable.
    #[error("corrupt block stream: {0}")]
    CorruptStream(String),

    /// Encoding or encryption failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// An identity directory lookup failed.
    #[error("directory error: {0}")]
    Directory(String),

    /// Rejected configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<CoreError> for VaultError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InconsistentReference(msg) => VaultError::InconsistentReference(msg),
            CoreError::VersionConflict { attempted, latest } => {
                VaultError::VersionConflict { attempted, latest }
            }
            CoreError::NameConflict { name, holder } => VaultError::NameConflict { name, holder },
            CoreError::InvalidBatch(msg) => VaultError::InvalidBatch(msg),
            CoreError::InvalidSignature
            | CoreError::ClaimExpired { .. }
            | CoreError::ClaimNotYetValid { .. } => VaultError::InvalidClaim(err.to_string()),
            CoreError::InvalidPublicKey
            | CoreError::EncodingError(_)
            | CoreError::DecodingError(_) => VaultError::Crypto(err.to_string()),
        }
    }
}

impl From<PermsError> for VaultError {
    fn from(err: PermsError) -> Self {
        match err {
            PermsError::NoPath => VaultError::Unauthorized("no key chain reaches the policy".into()),
            PermsError::ChainTooDeep { max_depth } => VaultError::ChainTooDeep { max_depth },
            PermsError::DecryptionFailure(msg) => VaultError::DecryptionFailure(msg),
            PermsError::InvalidGrantee(msg) => VaultError::InvalidGrantee(msg),
            PermsError::CorruptStream(msg) => VaultError::CorruptStream(msg),
            PermsError::CoreError(core) => core.into(),
            PermsError::EncryptionError(_)
            | PermsError::InvalidPublicKey
            | PermsError::SerializationError(_) => VaultError::Crypto(err.to_string()),
        }
    }
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(core) => core.into(),
            other => VaultError::Storage(other),
        }
    }
}

/// Result type for Vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_rows_keep_their_kind() {
        let holder = SecretId::generate();
        let err: VaultError = StoreError::Rejected(CoreError::NameConflict {
            name: "/db/password".into(),
            holder,
        })
        .into();
        assert!(matches!(err, VaultError::NameConflict { holder: h, .. } if h == holder));

        let err: VaultError = StoreError::Poisoned("boom".into()).into();
        assert!(matches!(err, VaultError::Storage(_)));
    }

    #[test]
    fn test_recovery_errors_map() {
        assert!(matches!(VaultError::from(PermsError::NoPath), VaultError::Unauthorized(_)));
        assert!(matches!(
            VaultError::from(PermsError::ChainTooDeep { max_depth: 2 }),
            VaultError::ChainTooDeep { max_depth: 2 }
        ));
        assert!(matches!(
            VaultError::from(PermsError::CoreError(CoreError::InvalidBatch("x".into()))),
            VaultError::InvalidBatch(_)
        ));
    }
}
