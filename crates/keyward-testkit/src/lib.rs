//! # Keyward Testkit
//!
//! Testing utilities for Keyward.
//!
//! - **Fixtures**: accounts with X25519 keys, vaults over either backend,
//!   and proxy chains of a chosen depth
//! - **Directory**: an in-memory [`AccountDirectory`](keyward::decorate::AccountDirectory)
//! - **Generators**: proptest strategies for action sets, predicates, secret
//!   names, content, and shuffled block batches. `tests/properties.rs` runs
//!   them against both store backends.
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use keyward_testkit::fixtures::{TestAccount, TestFixture};
//!
//! # async fn demo() -> keyward::Result<()> {
//! let fixture = TestFixture::memory()?;
//! let owner = TestAccount::new();
//! let reader = TestAccount::new();
//!
//! // `reader` reaches the first policy through two proxy hops.
//! let chain = fixture.proxy_chain(&owner, &reader, 2).await?;
//! let key = fixture
//!     .vault
//!     .recover_content_key(&fixture.org, &chain[0].id, &reader.id, &reader.key)
//!     .await?;
//! # let _ = key;
//! # Ok(())
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use keyward_testkit::generators::{actions, shuffled_batch};
//!
//! proptest! {
//!     #[test]
//!     fn any_order_is_accepted(batch in shuffled_batch(16)) {
//!         prop_assert!(keyward::core::validate_batch(&batch, None).is_ok());
//!     }
//! }
//! ```

pub mod directory;
pub mod fixtures;
pub mod generators;

pub use directory::MemoryDirectory;
pub use fixtures::{multi_party_accounts, TestAccount, TestFixture};
pub use generators::{actions, predicate, shuffled_batch};
