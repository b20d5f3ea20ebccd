//! # DLC Oracle Testkit
//!
//! Testing utilities for the DLC oracle.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Deterministic, instrumented stand-ins for the oracle's
//!   capabilities (signer, price feed, clock, store) and a ready-made oracle
//! - **Golden vectors**: Known byte layouts and signatures for cross-implementation checks
//! - **Generators**: Proptest strategies for property-based testing
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use dlc_oracle_testkit::fixtures::{at, TestOracle};
//!
//! async fn example() {
//!     let fixture = TestOracle::new();
//!     let announcement = fixture
//!         .oracle
//!         .get_or_create_announcement("btcusd", at(10, 20))
//!         .await
//!         .unwrap();
//!     assert_eq!(fixture.signer.sign_calls(), 1);
//!     assert_eq!(announcement.record.publish_date, at(11, 0));
//! }
//! ```
//!
//! ## Golden Vectors
//!
//! ```rust
//! use dlc_oracle_testkit::vectors::verify_all_vectors;
//!
//! verify_all_vectors().unwrap();
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    at, btcusd_config, CountingSigner, CountingStore, ManualClock, ScriptedPriceFeed, TestOracle,
};
pub use vectors::{serialization_vectors, signature_vectors, verify_all_vectors};
