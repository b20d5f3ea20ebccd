//! The Oracle: announcement and attestation lifecycle.
//!
//! Every (asset, publish date) is announced at most once and attested at most
//! once. Within a process this is enforced by [`KeyedLocks`] with a re-check
//! of the store after the lock is taken; across processes the store's
//! conditional writes decide the winner and the loser reads the winner's
//! record back.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use dlc_oracle_core::canonical::serialize_event;
use dlc_oracle_core::event::event_fields;
use dlc_oracle_core::{
    compute_publish_date, decompose, event_id, max_value, AssetConfig, Attestation, EventRecord,
    OracleAnnouncement, OracleAttestation, SchnorrPublicKey,
};
use dlc_oracle_store::{CreateResult, EventStore, UpdateResult};

use crate::clock::{Clock, SystemClock};
use crate::error::{OracleError, Result};
use crate::feed::{FeedError, PriceFeed};
use crate::lock::KeyedLocks;
use crate::signer::SigningBackend;

/// Lock key for one event.
pub type EventKey = (String, DateTime<Utc>);

/// An announced event together with the key that signed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub record: EventRecord,
    pub oracle_public_key: SchnorrPublicKey,
}

impl Announcement {
    pub fn to_wire(&self) -> Result<OracleAnnouncement> {
        Ok(OracleAnnouncement::from_record(
            &self.record,
            self.oracle_public_key,
        )?)
    }
}

/// The oracle service.
///
/// Generic over the store so tests can wrap one; the other capabilities are
/// trait objects.
pub struct Oracle<S: EventStore> {
    store: Arc<S>,
    signer: Arc<dyn SigningBackend>,
    feed: Arc<dyn PriceFeed>,
    clock: Arc<dyn Clock>,
    assets: BTreeMap<String, AssetConfig>,
    locks: KeyedLocks<EventKey>,
}

impl<S: EventStore> Oracle<S> {
    /// Create an oracle. Fails if any asset configuration is unusable.
    pub fn new(
        store: S,
        signer: Arc<dyn SigningBackend>,
        feed: Arc<dyn PriceFeed>,
        assets: BTreeMap<String, AssetConfig>,
    ) -> Result<Self> {
        for (asset_id, config) in &assets {
            config
                .validate()
                .map_err(|e| OracleError::Config(format!("asset {}: {}", asset_id, e)))?;
        }
        Ok(Self {
            store: Arc::new(store),
            signer,
            feed,
            clock: Arc::new(SystemClock),
            assets,
            locks: KeyedLocks::new(),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a lock table with other oracle instances.
    pub fn with_locks(mut self, locks: KeyedLocks<EventKey>) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn locks(&self) -> &KeyedLocks<EventKey> {
        &self.locks
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metadata
    // ─────────────────────────────────────────────────────────────────────────

    pub fn public_key(&self) -> SchnorrPublicKey {
        self.signer.public_key()
    }

    /// Configured asset identifiers, sorted.
    pub fn asset_ids(&self) -> Vec<String> {
        self.assets.keys().cloned().collect()
    }

    pub fn asset_config(&self, asset_id: &str) -> Result<&AssetConfig> {
        self.assets
            .get(asset_id)
            .ok_or_else(|| OracleError::UnknownAsset(asset_id.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Announcements
    // ─────────────────────────────────────────────────────────────────────────

    /// Return the announcement for the publish date `requested` maps to,
    /// creating it if needed.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_or_create_announcement(
        &self,
        asset_id: &str,
        requested: DateTime<Utc>,
    ) -> Result<Announcement> {
        let config = self.asset_config(asset_id)?;
        let publish_date = publish_date_for(requested, config, self.clock.now())?;
        let record = self.announce_at(asset_id, config, publish_date).await?;
        Ok(Announcement {
            record,
            oracle_public_key: self.signer.public_key(),
        })
    }

    /// The earliest existing announcement in `[from, from + range]`.
    pub async fn find_announcement_near(
        &self,
        asset_id: &str,
        from: DateTime<Utc>,
    ) -> Result<Option<Announcement>> {
        let config = self.asset_config(asset_id)?;
        let record = self
            .store
            .find_nearest_after(asset_id, from, config.range)
            .await?;
        Ok(record.map(|record| Announcement {
            record,
            oracle_public_key: self.signer.public_key(),
        }))
    }

    async fn announce_at(
        &self,
        asset_id: &str,
        config: &AssetConfig,
        publish_date: DateTime<Utc>,
    ) -> Result<EventRecord> {
        if let Some(record) = self.store.find_exact(asset_id, publish_date).await? {
            return Ok(record);
        }

        let _guard = self
            .locks
            .lock((asset_id.to_string(), publish_date))
            .await;

        // Someone may have finished while we waited.
        if let Some(record) = self.store.find_exact(asset_id, publish_date).await? {
            return Ok(record);
        }

        let record = self.build_announcement(asset_id, config, publish_date)?;
        match self.store.create_if_absent(&record).await? {
            CreateResult::Created => {
                info!(
                    asset_id,
                    %publish_date,
                    event_id = %record.event_id(),
                    "created announcement"
                );
                Ok(record)
            }
            CreateResult::Conflict => {
                debug!(asset_id, %publish_date, "announcement created elsewhere, reloading");
                self.refetch(asset_id, publish_date).await
            }
        }
    }

    fn build_announcement(
        &self,
        asset_id: &str,
        config: &AssetConfig,
        publish_date: DateTime<Utc>,
    ) -> Result<EventRecord> {
        let mut nonces = Vec::with_capacity(usize::from(config.nb_digits));
        let mut signing_keys = Vec::with_capacity(usize::from(config.nb_digits));
        for _ in 0..config.nb_digits {
            let nonce = self.signer.generate_nonce()?;
            nonces.push(nonce.public);
            signing_keys.push(nonce.secret);
        }

        let fields = event_fields(
            asset_id,
            publish_date,
            nonces.clone(),
            config.base,
            config.nb_digits,
            config.is_signed,
            config.precision,
            &config.unit,
        )?;
        let announcement_signature = self.signer.sign(&serialize_event(&fields))?;

        Ok(EventRecord {
            asset_id: asset_id.to_string(),
            publish_date,
            nonces,
            signing_keys,
            base: config.base,
            nb_digits: config.nb_digits,
            is_signed: config.is_signed,
            precision: config.precision,
            unit: config.unit.clone(),
            announcement_signature,
            attestation: None,
            created_at: self.clock.now(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Attestations
    // ─────────────────────────────────────────────────────────────────────────

    /// Return the attested event for the publish date `requested` maps to,
    /// announcing and attesting it if needed.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_or_create_attestation(
        &self,
        asset_id: &str,
        requested: DateTime<Utc>,
    ) -> Result<EventRecord> {
        let config = self.asset_config(asset_id)?;
        let now = self.clock.now();
        let publish_date = publish_date_for(requested, config, now)?;
        if publish_date > now {
            return Err(OracleError::TooEarly { publish_date });
        }

        let record = self.announce_at(asset_id, config, publish_date).await?;
        if record.is_attested() {
            return Ok(record);
        }

        let _guard = self
            .locks
            .lock((asset_id.to_string(), publish_date))
            .await;

        let record = self.refetch(asset_id, publish_date).await?;
        if record.is_attested() {
            return Ok(record);
        }

        let price = self.feed.find_past_price(asset_id, publish_date).await?;
        let values = digits_for_price(price, record.base, record.nb_digits)?;
        if values.len() != record.signing_keys.len() {
            return Err(OracleError::Internal(format!(
                "event {} has {} nonces for {} digits",
                record.event_id(),
                record.signing_keys.len(),
                values.len()
            )));
        }

        let signatures = values
            .iter()
            .zip(&record.signing_keys)
            .map(|(value, key)| self.signer.sign_with_nonce(value.as_bytes(), key))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let attestation = Attestation {
            signatures,
            values,
            attested_at: self.clock.now(),
        };
        match self
            .store
            .update_if_unsigned(asset_id, publish_date, &attestation)
            .await?
        {
            UpdateResult::Updated(record) => {
                info!(
                    asset_id,
                    %publish_date,
                    event_id = %record.event_id(),
                    price,
                    "attested event"
                );
                Ok(record)
            }
            UpdateResult::AlreadySigned => {
                debug!(asset_id, %publish_date, "attestation written elsewhere, reloading");
                self.refetch(asset_id, publish_date).await
            }
        }
    }

    /// The latest attested event published strictly before `before`.
    pub async fn latest_attestation_before(
        &self,
        asset_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<OracleAttestation>> {
        self.asset_config(asset_id)?;
        let mut cursor = before;
        while let Some(record) = self.store.find_most_recent_before(asset_id, cursor).await? {
            if let Some(attestation) = OracleAttestation::from_record(&record) {
                return Ok(Some(attestation));
            }
            cursor = record.publish_date;
        }
        Ok(None)
    }

    async fn refetch(&self, asset_id: &str, publish_date: DateTime<Utc>) -> Result<EventRecord> {
        self.store
            .find_exact(asset_id, publish_date)
            .await?
            .ok_or_else(|| OracleError::NotFound(event_id(asset_id, publish_date)))
    }
}

/// The publish date `requested` maps to, limited to what an event's
/// 32-bit maturity epoch can carry.
fn publish_date_for(
    requested: DateTime<Utc>,
    config: &AssetConfig,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let publish_date = compute_publish_date(requested, config, now)?;
    if u32::try_from(publish_date.timestamp()).is_err() {
        return Err(OracleError::InvalidTime {
            input: requested.to_rfc3339(),
            reason: format!("publish date {} is outside the event epoch range", publish_date),
        });
    }
    Ok(publish_date)
}

/// Digits attested for an observed price.
///
/// The price is rounded half away from zero and clamped to what `nb_digits`
/// digits in `base` can represent.
pub fn digits_for_price(
    price: f64,
    base: u16,
    nb_digits: u16,
) -> std::result::Result<Vec<String>, FeedError> {
    if !price.is_finite() {
        return Err(FeedError::InvalidPrice(price));
    }
    let max = max_value(base, nb_digits);
    let rounded = price.round();
    let value = if rounded <= 0.0 {
        0
    } else if rounded >= max as f64 {
        max
    } else {
        (rounded as u64).min(max)
    };
    Ok(decompose(value, base, usize::from(nb_digits)))
}

/// Parse a client-supplied timestamp (RFC 3339) into UTC.
pub fn parse_request_time(input: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| OracleError::InvalidTime {
            input: input.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::TablePriceFeed;
    use crate::signer::LocalSigner;
    use chrono::{Duration, TimeZone};
    use dlc_oracle_core::OracleKeypair;
    use dlc_oracle_store::MemoryStore;
    use parking_lot::Mutex;

    struct TestClock(Mutex<DateTime<Utc>>);

    impl TestClock {
        fn set(&self, t: DateTime<Utc>) {
            *self.0.lock() = t;
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock()
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, hour, minute, 0).unwrap()
    }

    fn btcusd() -> AssetConfig {
        AssetConfig {
            start_date: at(0, 0),
            frequency: Duration::hours(1),
            range: Duration::hours(48),
            base: 10,
            nb_digits: 3,
            is_signed: false,
            precision: 0,
            unit: "usd/btc".to_string(),
        }
    }

    fn setup(prices: &[(DateTime<Utc>, f64)]) -> (Oracle<MemoryStore>, Arc<TestClock>) {
        let clock = Arc::new(TestClock(Mutex::new(at(10, 20))));
        let mut feed = TablePriceFeed::new(clock.clone());
        for (time, price) in prices {
            feed.insert("btcusd", *time, *price);
        }
        let assets = BTreeMap::from([("btcusd".to_string(), btcusd())]);
        let oracle = Oracle::new(
            MemoryStore::new(),
            Arc::new(LocalSigner::new(OracleKeypair::generate())),
            Arc::new(feed),
            assets,
        )
        .unwrap()
        .with_clock(clock.clone());
        (oracle, clock)
    }

    #[tokio::test]
    async fn test_announcement_is_created_once() {
        let (oracle, _) = setup(&[]);

        let first = oracle
            .get_or_create_announcement("btcusd", at(10, 20))
            .await
            .unwrap();
        assert_eq!(first.record.publish_date, at(11, 0));
        assert_eq!(first.record.nonces.len(), 3);
        assert_eq!(first.record.event_id(), "btcusd1577876400");
        first.to_wire().unwrap().verify().unwrap();

        let second = oracle
            .get_or_create_announcement("btcusd", at(10, 45))
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(oracle.store().len(), 1);
        assert!(oracle.locks().is_empty());
    }

    #[tokio::test]
    async fn test_publish_date_before_epoch_is_invalid_time() {
        let (oracle, _) = setup(&[]);
        let before_epoch = Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap();

        let err = oracle
            .get_or_create_announcement("btcusd", before_epoch)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidTime { .. }));
        assert!(err.is_client_error());

        let err = oracle
            .get_or_create_attestation("btcusd", before_epoch)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidTime { .. }));
        assert!(oracle.store().is_empty());
    }

    #[tokio::test]
    async fn test_stale_price_is_not_attested() {
        let clock = Arc::new(TestClock(Mutex::new(at(12, 0))));
        let feed = TablePriceFeed::new(clock.clone())
            .with_price("btcusd", at(0, 0), 720.0)
            .with_max_age("btcusd", Duration::hours(1));
        let assets = BTreeMap::from([("btcusd".to_string(), btcusd())]);
        let oracle = Oracle::new(
            MemoryStore::new(),
            Arc::new(LocalSigner::new(OracleKeypair::generate())),
            Arc::new(feed),
            assets,
        )
        .unwrap()
        .with_clock(clock.clone());

        let err = oracle
            .get_or_create_attestation("btcusd", at(11, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OracleError::PriceFeed(FeedError::NoData { .. })
        ));

        let record = oracle
            .store()
            .find_exact("btcusd", at(11, 0))
            .await
            .unwrap()
            .unwrap();
        assert!(!record.is_attested());
    }

    #[tokio::test]
    async fn test_unknown_asset_and_too_late() {
        let (oracle, _) = setup(&[]);
        assert!(matches!(
            oracle.get_or_create_announcement("ethusd", at(11, 0)).await,
            Err(OracleError::UnknownAsset(_))
        ));

        let far = at(10, 20) + Duration::hours(49);
        assert!(matches!(
            oracle.get_or_create_announcement("btcusd", far).await,
            Err(OracleError::TooLate { .. })
        ));
        assert!(oracle.store().is_empty());
    }

    #[tokio::test]
    async fn test_attestation_before_publish_date_is_too_early() {
        let (oracle, clock) = setup(&[(at(11, 0), 100.06)]);
        clock.set(at(10, 59));
        let err = oracle
            .get_or_create_attestation("btcusd", at(10, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::TooEarly { publish_date } if publish_date == at(11, 0)));
    }

    #[tokio::test]
    async fn test_attestation_signs_rounded_price() {
        let (oracle, clock) = setup(&[(at(11, 0), 100.06)]);
        let announcement = oracle
            .get_or_create_announcement("btcusd", at(10, 20))
            .await
            .unwrap()
            .to_wire()
            .unwrap();

        clock.set(at(11, 5));
        let record = oracle
            .get_or_create_attestation("btcusd", at(10, 20))
            .await
            .unwrap();
        let attestation = OracleAttestation::from_record(&record).unwrap();
        assert_eq!(attestation.values, vec!["1", "0", "0"]);
        attestation.verify(&announcement).unwrap();

        let again = oracle
            .get_or_create_attestation("btcusd", at(11, 0))
            .await
            .unwrap();
        assert_eq!(again, record);
        assert!(oracle.locks().is_empty());
    }

    #[tokio::test]
    async fn test_attestation_without_prior_announcement() {
        let (oracle, clock) = setup(&[(at(11, 0), 42.4)]);
        clock.set(at(12, 0));
        let record = oracle
            .get_or_create_attestation("btcusd", at(11, 0))
            .await
            .unwrap();
        assert_eq!(record.attestation.unwrap().values, vec!["0", "4", "2"]);
    }

    #[tokio::test]
    async fn test_feed_error_leaves_event_unsigned() {
        let (oracle, clock) = setup(&[(at(11, 30), 1.0)]);
        clock.set(at(12, 0));
        let err = oracle
            .get_or_create_attestation("btcusd", at(11, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::PriceFeed(FeedError::NoData { .. })));

        let stored = oracle.store().find_exact("btcusd", at(11, 0)).await.unwrap().unwrap();
        assert!(!stored.is_attested());
        assert!(oracle.locks().is_empty());
    }

    #[tokio::test]
    async fn test_non_finite_price_rejected() {
        let (oracle, clock) = setup(&[(at(11, 0), f64::NAN)]);
        clock.set(at(12, 0));
        let err = oracle
            .get_or_create_attestation("btcusd", at(11, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::PriceFeed(FeedError::InvalidPrice(_))));
    }

    #[tokio::test]
    async fn test_lookup_helpers() {
        let (oracle, clock) = setup(&[(at(11, 0), 7.0)]);
        assert!(oracle
            .find_announcement_near("btcusd", at(10, 0))
            .await
            .unwrap()
            .is_none());

        oracle
            .get_or_create_announcement("btcusd", at(10, 20))
            .await
            .unwrap();
        oracle
            .get_or_create_announcement("btcusd", at(12, 0))
            .await
            .unwrap();
        let near = oracle
            .find_announcement_near("btcusd", at(10, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(near.record.publish_date, at(11, 0));

        clock.set(at(13, 0));
        oracle
            .get_or_create_attestation("btcusd", at(11, 0))
            .await
            .unwrap();

        // 12:00 is announced but unsigned, so the 11:00 attestation is found.
        let latest = oracle
            .latest_attestation_before("btcusd", at(13, 0))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.event_id, "btcusd1577876400");
        assert!(oracle
            .latest_attestation_before("btcusd", at(11, 0))
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_invalid_asset_config_rejected() {
        let mut config = btcusd();
        config.frequency = Duration::zero();
        let result = Oracle::new(
            MemoryStore::new(),
            Arc::new(LocalSigner::new(OracleKeypair::generate())),
            Arc::new(TablePriceFeed::new(Arc::new(SystemClock))),
            BTreeMap::from([("btcusd".to_string(), config)]),
        );
        assert!(matches!(result, Err(OracleError::Config(_))));
    }

    #[test]
    fn test_digits_for_price() {
        assert_eq!(digits_for_price(100.06, 10, 3).unwrap(), vec!["1", "0", "0"]);
        assert_eq!(digits_for_price(99.5, 10, 3).unwrap(), vec!["1", "0", "0"]);
        assert_eq!(digits_for_price(5000.0, 10, 3).unwrap(), vec!["9", "9", "9"]);
        assert_eq!(digits_for_price(-3.0, 10, 3).unwrap(), vec!["0", "0", "0"]);
        assert_eq!(digits_for_price(5.0, 2, 4).unwrap(), vec!["0", "1", "0", "1"]);
        assert!(digits_for_price(f64::INFINITY, 10, 3).is_err());
    }

    #[test]
    fn test_parse_request_time() {
        assert_eq!(
            parse_request_time("2020-01-01T10:20:00Z").unwrap(),
            at(10, 20)
        );
        assert_eq!(
            parse_request_time("2020-01-01T11:20:00+01:00").unwrap(),
            at(10, 20)
        );
        assert!(matches!(
            parse_request_time("yesterday"),
            Err(OracleError::InvalidTime { .. })
        ));
    }
}
