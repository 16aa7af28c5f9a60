//! Append-versioned rows.
//!
//! Policies, members, groups and secrets are never updated in place. Each
//! change is a new row with a higher version, and "current" is whatever row
//! has the highest version for a logical key. [`VersionLog`] is the in-memory
//! arena for such rows.

use std::collections::BTreeMap;
use std::hash::Hash;

use crate::error::{CoreError, Result};

/// A row that participates in append-versioning.
pub trait Versioned: Clone {
    /// Logical identity shared by every version of the row.
    type Key: Clone + Eq + Hash + Ord;

    /// The logical key.
    fn key(&self) -> Self::Key;

    /// Monotonic version, starting at 1.
    fn version(&self) -> u64;

    /// Tombstone flag.
    fn is_deleted(&self) -> bool;
}

/// Check that `next` may be appended after `latest`.
pub fn check_successor(latest: Option<u64>, next: u64) -> Result<()> {
    let floor = latest.unwrap_or(0);
    if next <= floor {
        return Err(CoreError::VersionConflict {
            attempted: next,
            latest: floor,
        });
    }
    Ok(())
}

/// Arena of immutable snapshots indexed by `(key, version)`.
#[derive(Debug, Clone)]
pub struct VersionLog<T: Versioned> {
    rows: BTreeMap<T::Key, BTreeMap<u64, T>>,
}

impl<T: Versioned> Default for VersionLog<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Versioned> VersionLog<T> {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row. Its version must exceed every existing version of its key.
    pub fn append(&mut self, row: T) -> Result<()> {
        let key = row.key();
        check_successor(self.latest_version(&key), row.version())?;
        self.rows.entry(key).or_default().insert(row.version(), row);
        Ok(())
    }

    /// Highest version stored for a key.
    pub fn latest_version(&self, key: &T::Key) -> Option<u64> {
        self.rows
            .get(key)
            .and_then(|versions| versions.keys().next_back().copied())
    }

    /// The highest-version row, deleted or not.
    pub fn latest(&self, key: &T::Key) -> Option<&T> {
        self.rows
            .get(key)
            .and_then(|versions| versions.values().next_back())
    }

    /// The highest-version row if it is not a tombstone.
    pub fn current(&self, key: &T::Key) -> Option<&T> {
        self.latest(key).filter(|row| !row.is_deleted())
    }

    /// A specific version.
    pub fn get(&self, key: &T::Key, version: u64) -> Option<&T> {
        self.rows.get(key).and_then(|versions| versions.get(&version))
    }

    /// Every version of a key, oldest first.
    pub fn history(&self, key: &T::Key) -> Vec<&T> {
        self.rows
            .get(key)
            .map(|versions| versions.values().collect())
            .unwrap_or_default()
    }

    /// Latest row of every key, in key order.
    pub fn latest_rows(&self) -> impl Iterator<Item = &T> {
        self.rows
            .values()
            .filter_map(|versions| versions.values().next_back())
    }

    /// Current (non-deleted) row of every key, in key order.
    pub fn current_rows(&self) -> impl Iterator<Item = &T> {
        self.latest_rows().filter(|row| !row.is_deleted())
    }

    /// Physically remove every version of a key.
    pub fn purge(&mut self, key: &T::Key) -> usize {
        self.rows.remove(key).map(|v| v.len()).unwrap_or(0)
    }

    /// Number of logical keys.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
