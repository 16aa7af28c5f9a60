//! Strong type definitions for Keyward.
//!
//! All identifiers are newtypes to prevent misuse at compile time: a
//! `PolicyId` can never be passed where an `AccountId` is expected.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of every identifier in bytes.
pub const ID_LEN: usize = 16;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; ID_LEN]);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self::generate_with(&mut rand::thread_rng())
            }

            /// Generate a fresh identifier from the given RNG.
            pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
                let mut bytes = [0u8; ID_LEN];
                rng.fill_bytes(&mut bytes);
                Self(bytes)
            }

            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; ID_LEN] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                let arr: [u8; ID_LEN] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; ID_LEN]> for $name {
            fn from(bytes: [u8; ID_LEN]) -> Self {
                Self(bytes)
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = std::array::TryFromSliceError;

            fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; ID_LEN] = slice.try_into()?;
                Ok(Self(arr))
            }
        }
    };
}

define_id!(
    /// An organization. Every row in the system is scoped to exactly one.
    OrgId
);

define_id!(
    /// A policy: the unit of access control.
    PolicyId
);

define_id!(
    /// A user account.
    AccountId
);

define_id!(
    /// A named set of accounts within an organization.
    GroupId
);

define_id!(
    /// A secret's stable identifier across versions.
    SecretId
);

define_id!(
    /// A block stream holding one content generation of a secret.
    StreamId
);

/// Offset/limit pagination for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Number of rows to skip.
    pub offset: usize,
    /// Maximum number of rows to return.
    pub limit: usize,
}

impl Page {
    /// Default page size used by [`Page::first`].
    pub const DEFAULT_LIMIT: usize = 100;

    /// Create a page.
    pub const fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// The first page with the default limit.
    pub const fn first() -> Self {
        Self::new(0, Self::DEFAULT_LIMIT)
    }

    /// The page immediately following this one.
    pub const fn next(&self) -> Self {
        Self::new(self.offset + self.limit, self.limit)
    }

    /// Apply this page to an already-ordered iterator.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items.into_iter().skip(self.offset).take(self.limit).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_hex_roundtrip() {
        let id = PolicyId::from_bytes([0x42; ID_LEN]);
        let recovered = PolicyId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_id_rejects_wrong_length() {
        assert!(AccountId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_id_debug_names_type() {
        let id = GroupId::from_bytes([0xcd; ID_LEN]);
        assert!(format!("{:?}", id).starts_with("GroupId("));
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(SecretId::generate(), SecretId::generate());
    }

    #[test]
    fn test_page_apply_and_next() {
        let page = Page::new(2, 3);
        assert_eq!(page.apply(0..10), vec![2, 3, 4]);
        assert_eq!(page.next().apply(0..10), vec![5, 6, 7]);
        assert!(Page::new(20, 5).apply(0..10).is_empty());
    }
}
