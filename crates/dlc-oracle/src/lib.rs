//! # DLC Oracle
//!
//! A numeric-outcome oracle for Discreet Log Contracts. For each configured
//! asset and publish date it announces one-time nonces ahead of time and
//! later attests the observed price, one Schnorr signature per digit.
//!
//! ## Overview
//!
//! - **Announcement**: nonces plus a signature over the canonical event
//!   bytes, created at most once per (asset, publish date)
//! - **Attestation**: the price digits signed with the announced nonces,
//!   written at most once and never before the publish date
//! - **Capabilities**: signing, price feed, clock and store are injected
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use dlc_oracle::{LocalSigner, Oracle, SystemClock, TablePriceFeed};
//! use dlc_oracle::core::OracleKeypair;
//! use dlc_oracle::store::SqliteStore;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let store = SqliteStore::open("oracle.db")?;
//!     let signer = Arc::new(LocalSigner::new(OracleKeypair::generate()));
//!     let feed = Arc::new(TablePriceFeed::load("prices.json", Arc::new(SystemClock))?);
//!     let oracle = Oracle::new(store, signer, feed, BTreeMap::new())?;
//!
//!     let announcement = oracle
//!         .get_or_create_announcement("btcusd", chrono::Utc::now())
//!         .await?;
//!     println!("{}", serde_json::to_string(&announcement.to_wire()?)?);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod lock;
pub mod oracle;
pub mod signer;

pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, OracleConfig};
pub use error::{ErrorCode, OracleError, Result};
pub use feed::{FeedError, PriceFeed, TablePriceFeed};
pub use lock::{KeyGuard, KeyedLocks};
pub use oracle::{digits_for_price, parse_request_time, Announcement, EventKey, Oracle};
pub use signer::{LocalSigner, SigningBackend};

// Re-export the lower layers
pub use dlc_oracle_core as core;
pub use dlc_oracle_store as store;
