//! # DLC Oracle Core
//!
//! Pure primitives for a DLC oracle: Schnorr signing, the canonical event
//! encoding, digit decomposition and publish-date scheduling.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the data an oracle commits to and later attests.
//!
//! ## Key Types
//!
//! - [`OracleKeypair`] - The oracle's long-term BIP340 key
//! - [`NonceKeypair`] - A one-time nonce committed to in an announcement
//! - [`EventRecord`] - Persisted state of one (asset, publish date)
//! - [`AssetConfig`] - Schedule and numeric encoding of an asset
//! - [`OracleAnnouncement`] / [`OracleAttestation`] - Published JSON shapes
//!
//! ## Canonicalization
//!
//! Announcement signatures cover the byte layout in [`canonical`]. It is
//! shared with third-party verifiers and must not change.

pub mod canonical;
pub mod crypto;
pub mod decompose;
pub mod error;
pub mod event;
pub mod iso8601;
pub mod schedule;
pub mod wire;

pub use canonical::{
    deserialize_event, serialize_event, verify_announcement, verify_attestation, EventFields,
};
pub use crypto::{NonceKeypair, OracleKeypair, SchnorrPublicKey, SchnorrSignature, SecretScalar};
pub use decompose::{compose, decompose, max_value};
pub use error::{CryptoError, DecodeError, DurationError, ScheduleError};
pub use event::{event_id, split_asset_id, AssetConfig, Attestation, EventRecord, EventState};
pub use iso8601::{encode_duration, parse_duration};
pub use schedule::compute_publish_date;
pub use wire::{
    AssetConfigResponse, AssetListResponse, ErrorResponse, OracleAnnouncement, OracleAttestation,
    OraclePublicKeyResponse,
};
