//! Price feed capability and a table-backed implementation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::clock::Clock;

/// Errors reported by a price feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The value at `at` cannot be known yet.
    #[error("cannot price {at}: it is after the current time {now}")]
    FutureTime {
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("no price for {asset_id} at or before {at}")]
    NoData {
        asset_id: String,
        at: DateTime<Utc>,
    },

    #[error("feed does not know asset {0}")]
    UnknownAsset(String),

    #[error("feed returned a non-finite price: {0}")]
    InvalidPrice(f64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed price table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Source of observed asset prices.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// The price of `asset_id` at `at`. Errors if `at` is in the future.
    async fn find_past_price(&self, asset_id: &str, at: DateTime<Utc>) -> Result<f64, FeedError>;
}

#[derive(Debug, Deserialize)]
struct Observation {
    time: DateTime<Utc>,
    price: f64,
}

/// A feed answering from a fixed price history.
///
/// The price at `at` is the latest observation at or before `at`, provided
/// it is no older than the asset's maximum age. History is loaded from JSON
/// shaped as `{"btcusd": [{"time": "2020-01-01T11:00:00Z", "price": 7200.5}]}`.
pub struct TablePriceFeed {
    prices: BTreeMap<String, BTreeMap<DateTime<Utc>, f64>>,
    max_age: BTreeMap<String, Duration>,
    clock: Arc<dyn Clock>,
}

impl TablePriceFeed {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            prices: BTreeMap::new(),
            max_age: BTreeMap::new(),
            clock,
        }
    }

    pub fn from_json_str(json: &str, clock: Arc<dyn Clock>) -> Result<Self, FeedError> {
        let raw: BTreeMap<String, Vec<Observation>> = serde_json::from_str(json)?;
        let mut feed = Self::new(clock);
        for (asset_id, observations) in raw {
            for obs in observations {
                feed.insert(&asset_id, obs.time, obs.price);
            }
        }
        Ok(feed)
    }

    pub fn load(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self, FeedError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json, clock)
    }

    /// Record an observation, replacing any at the same instant.
    pub fn insert(&mut self, asset_id: &str, time: DateTime<Utc>, price: f64) {
        self.prices
            .entry(asset_id.to_string())
            .or_default()
            .insert(time, price);
    }

    pub fn with_price(mut self, asset_id: &str, time: DateTime<Utc>, price: f64) -> Self {
        self.insert(asset_id, time, price);
        self
    }

    /// Refuse observations of `asset_id` older than `max_age` at the
    /// requested time. Assets without a bound accept any age.
    pub fn set_max_age(&mut self, asset_id: &str, max_age: Duration) {
        self.max_age.insert(asset_id.to_string(), max_age);
    }

    pub fn with_max_age(mut self, asset_id: &str, max_age: Duration) -> Self {
        self.set_max_age(asset_id, max_age);
        self
    }
}

#[async_trait]
impl PriceFeed for TablePriceFeed {
    async fn find_past_price(&self, asset_id: &str, at: DateTime<Utc>) -> Result<f64, FeedError> {
        let now = self.clock.now();
        if at > now {
            return Err(FeedError::FutureTime { at, now });
        }
        let history = self
            .prices
            .get(asset_id)
            .ok_or_else(|| FeedError::UnknownAsset(asset_id.to_string()))?;
        let max_age = self.max_age.get(asset_id);
        history
            .range(..=at)
            .next_back()
            .filter(|(time, _)| max_age.map_or(true, |max| at - **time <= *max))
            .map(|(_, price)| *price)
            .ok_or_else(|| FeedError::NoData {
                asset_id: asset_id.to_string(),
                at,
            })
    }
}
