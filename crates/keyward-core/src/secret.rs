//! Secrets and the rules for saving them.
//!
//! A secret's name is its stable logical identity within an org. Saving a
//! row under a name that an older, different id holds is a rename/replace,
//! and it **physically destroys** every row and block stream of the old id.
//! There is no undo. Both storage backends compute what to destroy with
//! [`plan_secret_save`] so they agree on it.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::types::{AccountId, OrgId, PolicyId, SecretId, StreamId};
use crate::versioned::{check_successor, Versioned};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub org_id: OrgId,
    pub id: SecretId,
    pub policy_id: PolicyId,
    pub author_id: AccountId,
    pub name: String,
    pub version: u64,
    /// Block stream holding this version's content.
    pub stream_id: StreamId,
    /// Unix milliseconds.
    pub created_at: i64,
    pub deleted: bool,
}

impl Secret {
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

    /// The row that restores a tombstone.
    pub fn restored(&self) -> Self {
        let mut next = self.next_version();
        next.deleted = false;
        next
    }
}

impl Versioned for Secret {
    type Key = (OrgId, SecretId);

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

/// The latest row of an id that currently holds a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameHolder {
    pub id: SecretId,
    pub latest_version: u64,
    /// When the latest row was written, Unix milliseconds.
    pub created_at: i64,
    pub deleted: bool,
    /// Every stream the id has ever referenced.
    pub streams: Vec<StreamId>,
}

impl NameHolder {
    /// A holder described by its latest row alone. Its streams are left
    /// empty, which is enough to decide whether a save is accepted but not
    /// to plan what it purges.
    pub fn of(latest: &Secret) -> Self {
        Self {
            id: latest.id,
            latest_version: latest.version,
            created_at: latest.created_at,
            deleted: latest.deleted,
            streams: Vec::new(),
        }
    }

    /// Whether `row` may replace this holder. A deleted holder always can;
    /// a live one only when its latest row is not newer than `row`.
    pub fn yields_to(&self, row: &Secret) -> bool {
        self.deleted || self.created_at <= row.created_at
    }
}

/// What a store must do, atomically, to accept a secret row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavePlan {
    /// Ids whose rows must be physically removed.
    pub purge_secrets: Vec<SecretId>,
    /// Streams whose blocks must be physically removed.
    pub purge_streams: Vec<StreamId>,
}

impl SavePlan {
    /// Whether the save destroys anything.
    pub fn is_destructive(&self) -> bool {
        !self.purge_secrets.is_empty()
    }
}

/// Decide whether `row` may be saved and what it destroys.
///
/// `own_latest` is the latest version stored for `row.id`. `holders` are the
/// latest rows of every *other* id in the org with the same name. Versions
/// are per id, so a replacing row may start again at version 1.
pub fn plan_secret_save(
    row: &Secret,
    own_latest: Option<u64>,
    holders: &[NameHolder],
) -> Result<SavePlan> {
    check_successor(own_latest, row.version)?;

    let mut plan = SavePlan::default();
    for holder in holders.iter().filter(|h| h.id != row.id) {
        if !holder.yields_to(row) {
            return Err(CoreError::NameConflict {
                name: row.name.clone(),
                holder: holder.id,
            });
        }
        plan.purge_secrets.push(holder.id);
        plan.purge_streams.extend(holder.streams.iter().copied());
    }

    plan.purge_streams.retain(|s| *s != row.stream_id);
    plan.purge_streams.sort();
    plan.purge_streams.dedup();
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(id: u8, version: u64) -> Secret {
        Secret {
            org_id: OrgId::from_bytes([1; 16]),
            id: SecretId::from_bytes([id; 16]),
            policy_id: PolicyId::from_bytes([2; 16]),
            author_id: AccountId::from_bytes([3; 16]),
            name: "/db/password".into(),
            version,
            stream_id: StreamId::from_bytes([id; 16]),
            created_at: 100,
            deleted: false,
        }
    }

    fn holder(id: u8, created_at: i64, deleted: bool) -> NameHolder {
        NameHolder {
            id: SecretId::from_bytes([id; 16]),
            latest_version: 4,
            created_at,
            deleted,
            streams: vec![StreamId::from_bytes([id; 16])],
        }
    }

    #[test]
    fn test_first_save_plans_nothing() {
        let plan = plan_secret_save(&secret(1, 1), None, &[]).unwrap();
        assert!(!plan.is_destructive());
    }

    #[test]
    fn test_same_id_must_advance() {
        assert!(matches!(
            plan_secret_save(&secret(1, 3), Some(3), &[]),
            Err(CoreError::VersionConflict { attempted: 3, latest: 3 })
        ));
        assert!(plan_secret_save(&secret(1, 4), Some(3), &[]).is_ok());
    }

    #[test]
    fn test_new_id_replaces_older_holder() {
        // A fresh id starts at version 1 even though the holder is at 4.
        let plan = plan_secret_save(&secret(9, 1), None, &[holder(1, 50, false)]).unwrap();

        assert_eq!(plan.purge_secrets, vec![SecretId::from_bytes([1; 16])]);
        assert_eq!(plan.purge_streams, vec![StreamId::from_bytes([1; 16])]);
    }

    #[test]
    fn test_same_instant_counts_as_older() {
        let plan = plan_secret_save(&secret(9, 1), None, &[holder(1, 100, false)]).unwrap();
        assert!(plan.is_destructive());
    }

    #[test]
    fn test_newer_live_holder_conflicts() {
        let err = plan_secret_save(&secret(9, 1), None, &[holder(1, 101, false)]).unwrap_err();
        assert!(matches!(err, CoreError::NameConflict { holder, .. } if holder == SecretId::from_bytes([1; 16])));
    }

    #[test]
    fn test_deleted_holder_always_replaced() {
        let plan = plan_secret_save(&secret(9, 1), None, &[holder(1, 500, true)]).unwrap();
        assert!(plan.is_destructive());
    }

    #[test]
    fn test_holder_of_latest_row() {
        let mut latest = secret(1, 3);
        latest.deleted = true;
        let holder = NameHolder::of(&latest);

        assert_eq!((holder.latest_version, holder.created_at), (3, 100));
        assert!(holder.streams.is_empty());
        assert!(holder.yields_to(&secret(9, 1)));
    }
}
