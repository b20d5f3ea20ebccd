//! In-memory implementation of the EventStore trait.
//!
//! Same semantics as SQLite, nothing persisted. Used by tests and by
//! short-lived tooling.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use dlc_oracle_core::{Attestation, EventRecord};

use crate::error::{Result, StoreError};
use crate::traits::{CreateResult, EventStore, UpdateResult};

type Key = (String, DateTime<Utc>);

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    events: RwLock<BTreeMap<Key, EventRecord>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            events: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create_if_absent(&self, record: &EventRecord) -> Result<CreateResult> {
        let mut events = self.events.write();
        let key = (record.asset_id.clone(), record.publish_date);
        if events.contains_key(&key) {
            return Ok(CreateResult::Conflict);
        }
        events.insert(key, record.clone());
        Ok(CreateResult::Created)
    }

    async fn update_if_unsigned(
        &self,
        asset_id: &str,
        publish_date: DateTime<Utc>,
        attestation: &Attestation,
    ) -> Result<UpdateResult> {
        let mut events = self.events.write();
        let record = events
            .get_mut(&(asset_id.to_string(), publish_date))
            .ok_or_else(|| StoreError::NotFound(format!("{} at {}", asset_id, publish_date)))?;

        if record.attestation.is_some() {
            return Ok(UpdateResult::AlreadySigned);
        }
        record.attestation = Some(attestation.clone());
        Ok(UpdateResult::Updated(record.clone()))
    }

    async fn find_exact(
        &self,
        asset_id: &str,
        publish_date: DateTime<Utc>,
    ) -> Result<Option<EventRecord>> {
        let events = self.events.read();
        Ok(events.get(&(asset_id.to_string(), publish_date)).cloned())
    }

    async fn find_nearest_after(
        &self,
        asset_id: &str,
        from: DateTime<Utc>,
        within: Duration,
    ) -> Result<Option<EventRecord>> {
        let upper = from.checked_add_signed(within).unwrap_or(DateTime::<Utc>::MAX_UTC);
        if upper < from {
            return Ok(None);
        }
        let events = self.events.read();
        Ok(events
            .range((asset_id.to_string(), from)..=(asset_id.to_string(), upper))
            .next()
            .map(|(_, record)| record.clone()))
    }

    async fn find_most_recent_before(
        &self,
        asset_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<EventRecord>> {
        let events = self.events.read();
        Ok(events
            .range((asset_id.to_string(), DateTime::<Utc>::MIN_UTC)..(asset_id.to_string(), before))
            .next_back()
            .map(|(_, record)| record.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, sample_attestation, sample_record};

    #[tokio::test]
    async fn test_memory_store_create_and_find() {
        let store = MemoryStore::new();
        let record = sample_record("btcusd", at(11));

        let result = store.create_if_absent(&record).await.unwrap();
        assert_eq!(result, CreateResult::Created);

        let found = store.find_exact("btcusd", at(11)).await.unwrap().unwrap();
        assert_eq!(found, record);
        assert!(store.find_exact("btcusd", at(12)).await.unwrap().is_none());
        assert!(store.find_exact("ethusd", at(11)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_create_conflict_keeps_original() {
        let store = MemoryStore::new();
        let first = sample_record("btcusd", at(11));
        let second = sample_record("btcusd", at(11));

        assert_eq!(store.create_if_absent(&first).await.unwrap(), CreateResult::Created);
        assert_eq!(store.create_if_absent(&second).await.unwrap(), CreateResult::Conflict);

        let found = store.find_exact("btcusd", at(11)).await.unwrap().unwrap();
        assert_eq!(found.nonces, first.nonces);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_update_once() {
        let store = MemoryStore::new();
        let record = sample_record("btcusd", at(11));
        store.create_if_absent(&record).await.unwrap();

        let first = sample_attestation(&["1", "0", "0"]);
        let updated = match store.update_if_unsigned("btcusd", at(11), &first).await.unwrap() {
            UpdateResult::Updated(r) => r,
            other => panic!("expected update, got {:?}", other),
        };
        assert_eq!(updated.attestation.as_ref(), Some(&first));

        let second = sample_attestation(&["9", "9", "9"]);
        assert_eq!(
            store.update_if_unsigned("btcusd", at(11), &second).await.unwrap(),
            UpdateResult::AlreadySigned
        );
        let found = store.find_exact("btcusd", at(11)).await.unwrap().unwrap();
        assert_eq!(found.attestation, Some(first));
    }

    #[tokio::test]
    async fn test_memory_store_update_missing() {
        let store = MemoryStore::new();
        let err = store
            .update_if_unsigned("btcusd", at(11), &sample_attestation(&["1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_store_range_queries() {
        let store = MemoryStore::new();
        for hour in [9, 11, 14] {
            store.create_if_absent(&sample_record("btcusd", at(hour))).await.unwrap();
        }
        store.create_if_absent(&sample_record("ethusd", at(10))).await.unwrap();

        let near = store
            .find_nearest_after("btcusd", at(10), Duration::hours(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(near.publish_date, at(11));

        let inclusive = store
            .find_nearest_after("btcusd", at(11), Duration::zero())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inclusive.publish_date, at(11));

        assert!(store
            .find_nearest_after("btcusd", at(12), Duration::hours(1))
            .await
            .unwrap()
            .is_none());

        let before = store
            .find_most_recent_before("btcusd", at(14))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before.publish_date, at(11));

        assert!(store
            .find_most_recent_before("btcusd", at(9))
            .await
            .unwrap()
            .is_none());
    }
}
