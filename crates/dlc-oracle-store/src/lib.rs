//! # DLC Oracle Store
//!
//! Persistence for oracle events. Provides the [`EventStore`] trait with
//! SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`EventStore`] - The async trait the oracle engine depends on
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`CreateResult`] / [`UpdateResult`] - Outcomes of the two conditional writes
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dlc_oracle_store::{EventStore, SqliteStore};
//!
//! async fn example() -> dlc_oracle_store::Result<()> {
//!     let store = SqliteStore::open("oracle.db")?;
//!     let date = chrono::Utc::now();
//!     let existing = store.find_exact("btcusd", date).await?;
//!     println!("found: {}", existing.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **At-most-once creation**: `create_if_absent` reports `Conflict` instead of overwriting
//! - **Write-once attestation**: `update_if_unsigned` reports `AlreadySigned` on a signed event
//! - Both hold across processes for [`SqliteStore`]

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{CreateResult, EventStore, UpdateResult};
