//! Vault configuration.

use keyward_core::{Page, Strength};

use crate::error::{Result, VaultError};

/// Smallest accepted hop limit. Two hops is the longest chain seen in use.
pub const MIN_CHAIN_DEPTH: usize = 2;

/// Configuration for the Vault.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Proxy hops followed by recovery and authorization. Direct is 0.
    pub max_chain_depth: usize,
    /// Strength given to newly generated policies.
    pub default_strength: Strength,
    /// Plaintext bytes per block written by `write_secret`.
    pub block_size: usize,
    /// Page size used when the vault pages through a stream internally.
    pub list_limit: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: 3,
            default_strength: Strength::Standard,
            block_size: 64 * 1024,
            list_limit: Page::DEFAULT_LIMIT,
        }
    }
}

impl VaultConfig {
    /// Reject settings the vault cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_chain_depth < MIN_CHAIN_DEPTH {
            return Err(VaultError::InvalidConfig(format!(
                "max_chain_depth {} is below {}",
                self.max_chain_depth, MIN_CHAIN_DEPTH
            )));
        }
        if self.block_size == 0 {
            return Err(VaultError::InvalidConfig("block_size must be positive".into()));
        }
        if self.list_limit == 0 {
            return Err(VaultError::InvalidConfig("list_limit must be positive".into()));
        }
        Ok(())
    }

    /// Page used to walk a stream from the start.
    pub(crate) fn first_page(&self) -> Page {
        Page::new(0, self.list_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        VaultConfig::default().validate().unwrap();
    }

    #[test]
    fn test_shallow_depth_rejected() {
        let config = VaultConfig {
            max_chain_depth: 1,
            ..VaultConfig::default()
        };
        assert!(matches!(config.validate(), Err(VaultError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let config = VaultConfig {
            block_size: 0,
            ..VaultConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
