//! # Keyward Store
//!
//! Storage abstraction for Keyward. Provides a trait-based interface for
//! versioned policy, membership, group, secret, and block rows with SQLite
//! and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`SecretSaved`] - Outcome of saving a secret row
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward_core::{OrgId, Page};
//! use keyward_store::{SqliteStore, Store};
//!
//! async fn example() -> keyward_store::Result<()> {
//!     let store = SqliteStore::open("keyward.db")?;
//!     let secrets = store.list_secrets(&OrgId::generate(), Page::first()).await?;
//!     println!("{} secrets", secrets.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Append-only versions**: every save writes a new row; a save whose
//!   version does not follow the latest stored one is rejected
//! - **Tombstones**: deletion is a row with `deleted` set; reads of the
//!   "current" row skip tombstones
//! - **Atomic joins**: policy locks and membership snapshots are read under
//!   one lock or transaction, so they never mix generations
//! - **Name takeover**: saving a secret under a name held by another id
//!   purges the older holder's rows and blocks in the same transaction

pub mod error;
mod join;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{SecretSaved, Store};
