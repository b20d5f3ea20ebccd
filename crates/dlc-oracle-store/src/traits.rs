//! EventStore trait: the abstract interface for event persistence.
//!
//! The oracle is storage-agnostic. Implementations include SQLite (primary)
//! and in-memory (for tests).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dlc_oracle_core::{Attestation, EventRecord};

use crate::error::Result;

/// Result of creating an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateResult {
    /// The event was stored.
    Created,
    /// An event already exists for this (asset, publish date); nothing was written.
    Conflict,
}

/// Result of attaching an attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    /// The attestation was stored; carries the updated record.
    Updated(EventRecord),
    /// The event was already attested; nothing was written.
    AlreadySigned,
}

/// The EventStore trait: async interface for event persistence.
///
/// # Design Notes
///
/// - **Uniqueness**: at most one record per `(asset_id, publish_date)`.
///   `create_if_absent` never overwrites.
/// - **Write-once attestation**: `update_if_unsigned` only succeeds on a
///   record with no attestation, atomically setting signatures and values.
/// - These two guarantees hold across processes sharing the same database.
#[async_trait]
pub trait EventStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a freshly announced event unless one already exists.
    async fn create_if_absent(&self, record: &EventRecord) -> Result<CreateResult>;

    /// Attach an attestation to an announced event.
    ///
    /// Fails with `StoreError::NotFound` if the event does not exist.
    async fn update_if_unsigned(
        &self,
        asset_id: &str,
        publish_date: DateTime<Utc>,
        attestation: &Attestation,
    ) -> Result<UpdateResult>;

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// The event published exactly at `publish_date`.
    async fn find_exact(
        &self,
        asset_id: &str,
        publish_date: DateTime<Utc>,
    ) -> Result<Option<EventRecord>>;

    /// The earliest event with `from <= publish_date <= from + within`.
    async fn find_nearest_after(
        &self,
        asset_id: &str,
        from: DateTime<Utc>,
        within: Duration,
    ) -> Result<Option<EventRecord>>;

    /// The latest event with `publish_date < before`.
    async fn find_most_recent_before(
        &self,
        asset_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<EventRecord>>;
}
