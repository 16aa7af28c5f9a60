//! Groups: named, org-scoped sets of accounts.
//!
//! Groups only ever widen authorization. They never hold key material, so a
//! group member row cannot be used to recover a policy secret.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{AccountId, GroupId, OrgId};
use crate::versioned::Versioned;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub org_id: OrgId,
    pub id: GroupId,
    pub version: u64,
    pub name: String,
    pub accounts: BTreeSet<AccountId>,
    pub deleted: bool,
}

impl Group {
    /// A fresh group at version 1.
    pub fn new(org_id: OrgId, name: impl Into<String>) -> Self {
        Self {
            org_id,
            id: GroupId::generate(),
            version: 1,
            name: name.into(),
            accounts: BTreeSet::new(),
            deleted: false,
        }
    }

    /// Add an account (builder style).
    pub fn with_account(mut self, account: AccountId) -> Self {
        self.accounts.insert(account);
        self
    }

    /// Whether the account is in this group.
    pub fn contains(&self, account: &AccountId) -> bool {
        self.accounts.contains(account)
    }

    /// The row that replaces this one at the next version.
    pub fn next_version(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    /// The tombstone that follows this row.
    pub fn tombstone(&self) -> Self {
        let mut next = self.next_version();
        next.deleted = true;
        next
    }
}

impl Versioned for Group {
    type Key = (OrgId, GroupId);

    fn key(&self) -> Self::Key {
        (self.org_id, self.id)
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_membership() {
        let alice = AccountId::generate();
        let bob = AccountId::generate();
        let group = Group::new(OrgId::generate(), "ops").with_account(alice);

        assert!(group.contains(&alice));
        assert!(!group.contains(&bob));

        let next = group.next_version().with_account(bob);
        assert_eq!(next.version, 2);
        assert!(next.contains(&bob));
        assert_eq!(next.key(), group.key());
    }
}
