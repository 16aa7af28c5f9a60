//! An in-memory account directory.

use std::collections::HashMap;

use async_trait::async_trait;

use keyward::decorate::{AccountDirectory, AccountIdentity};
use keyward::{AccountId, Result};

/// Fixed account identities for decoration tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    accounts: HashMap<AccountId, AccountIdentity>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a display name (and optional email) for an account.
    pub fn with(mut self, account_id: AccountId, display_name: &str, email: Option<&str>) -> Self {
        self.accounts.insert(
            account_id,
            AccountIdentity {
                account_id,
                display_name: display_name.to_owned(),
                email: email.map(str::to_owned),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountDirectory for MemoryDirectory {
    async fn lookup_accounts(&self, ids: &[AccountId]) -> Result<HashMap<AccountId, AccountIdentity>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.accounts.get(id).map(|identity| (*id, identity.clone())))
            .collect())
    }
}
