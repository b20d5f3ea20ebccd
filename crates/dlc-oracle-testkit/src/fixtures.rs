//! Test fixtures and helpers.
//!
//! Deterministic, instrumented implementations of the oracle's capabilities
//! and a fixture wiring them together.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use dlc_oracle::{Clock, FeedError, Oracle, PriceFeed, SigningBackend};
use dlc_oracle_core::{
    AssetConfig, Attestation, CryptoError, EventRecord, NonceKeypair, OracleKeypair,
    SchnorrPublicKey, SchnorrSignature, SecretScalar,
};
use dlc_oracle_store::{CreateResult, EventStore, MemoryStore, UpdateResult};

/// `2020-01-01T<hour>:<minute>:00Z`.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, hour, minute, 0).unwrap()
}

/// Hourly BTC/USD prices, three decimal digits, announced up to two days ahead.
pub fn btcusd_config() -> AssetConfig {
    AssetConfig {
        start_date: at(0, 0),
        frequency: Duration::hours(1),
        range: Duration::hours(48),
        base: 10,
        nb_digits: 3,
        is_signed: false,
        precision: 0,
        unit: "usd".to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signer
// ─────────────────────────────────────────────────────────────────────────────

/// A signer with seeded nonces and call counters.
pub struct CountingSigner {
    keypair: OracleKeypair,
    rng: Mutex<StdRng>,
    nonces: AtomicUsize,
    signs: AtomicUsize,
    digit_signs: AtomicUsize,
    fail: AtomicBool,
}

impl CountingSigner {
    pub fn with_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let keypair = OracleKeypair::from_secret(random_scalar(&mut rng));
        Self {
            keypair,
            rng: Mutex::new(rng),
            nonces: AtomicUsize::new(0),
            signs: AtomicUsize::new(0),
            digit_signs: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every signing call fail until reset.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn nonce_calls(&self) -> usize {
        self.nonces.load(Ordering::SeqCst)
    }

    /// Announcement signatures made.
    pub fn sign_calls(&self) -> usize {
        self.signs.load(Ordering::SeqCst)
    }

    /// Digit signatures made.
    pub fn sign_with_nonce_calls(&self) -> usize {
        self.digit_signs.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> Result<(), CryptoError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CryptoError::InvalidSecretKey);
        }
        Ok(())
    }
}

fn random_scalar(rng: &mut StdRng) -> SecretScalar {
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        if let Ok(scalar) = SecretScalar::from_bytes(bytes) {
            return scalar;
        }
    }
}

impl SigningBackend for CountingSigner {
    fn public_key(&self) -> SchnorrPublicKey {
        self.keypair.public_key()
    }

    fn generate_nonce(&self) -> Result<NonceKeypair, CryptoError> {
        self.check_failing()?;
        self.nonces.fetch_add(1, Ordering::SeqCst);
        let secret = random_scalar(&mut self.rng.lock());
        Ok(NonceKeypair::from_secret(secret))
    }

    fn sign(&self, message: &[u8]) -> Result<SchnorrSignature, CryptoError> {
        self.check_failing()?;
        self.signs.fetch_add(1, Ordering::SeqCst);
        self.keypair.sign_with_aux(message, &[0u8; 32])
    }

    fn sign_with_nonce(
        &self,
        message: &[u8],
        nonce: &SecretScalar,
    ) -> Result<SchnorrSignature, CryptoError> {
        self.check_failing()?;
        self.digit_signs.fetch_add(1, Ordering::SeqCst);
        self.keypair.sign_with_nonce(message, nonce)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Price feed
// ─────────────────────────────────────────────────────────────────────────────

/// A feed answering from exact (asset, time) entries.
#[derive(Default)]
pub struct ScriptedPriceFeed {
    prices: Mutex<BTreeMap<(String, DateTime<Utc>), f64>>,
    calls: AtomicUsize,
    delay: Mutex<Option<std::time::Duration>>,
}

impl ScriptedPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, asset_id: &str, time: DateTime<Utc>, price: f64) {
        self.prices.lock().insert((asset_id.to_string(), time), price);
    }

    /// Sleep this long before answering, to widen race windows.
    pub fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceFeed for ScriptedPriceFeed {
    async fn find_past_price(&self, asset_id: &str, at: DateTime<Utc>) -> Result<f64, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.prices
            .lock()
            .get(&(asset_id.to_string(), at))
            .copied()
            .ok_or_else(|| FeedError::NoData {
                asset_id: asset_id.to_string(),
                at,
            })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// A clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// A store wrapper counting writes, with hooks that mimic another process
/// writing between the oracle's read and its write.
pub struct CountingStore<S> {
    inner: S,
    created: AtomicUsize,
    conflicts: AtomicUsize,
    updated: AtomicUsize,
    already_signed: AtomicUsize,
    blind_reads: AtomicUsize,
    stale_reads: AtomicUsize,
}

impl<S: EventStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            created: AtomicUsize::new(0),
            conflicts: AtomicUsize::new(0),
            updated: AtomicUsize::new(0),
            already_signed: AtomicUsize::new(0),
            blind_reads: AtomicUsize::new(0),
            stale_reads: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The next `n` exact lookups report no record.
    pub fn set_blind_reads(&self, n: usize) {
        self.blind_reads.store(n, Ordering::SeqCst);
    }

    /// The next `n` exact lookups report the record without its attestation.
    pub fn set_stale_reads(&self, n: usize) {
        self.stale_reads.store(n, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }

    pub fn updated(&self) -> usize {
        self.updated.load(Ordering::SeqCst)
    }

    pub fn already_signed(&self) -> usize {
        self.already_signed.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl<S: EventStore> EventStore for CountingStore<S> {
    async fn create_if_absent(
        &self,
        record: &EventRecord,
    ) -> dlc_oracle_store::Result<CreateResult> {
        let result = self.inner.create_if_absent(record).await?;
        match result {
            CreateResult::Created => self.created.fetch_add(1, Ordering::SeqCst),
            CreateResult::Conflict => self.conflicts.fetch_add(1, Ordering::SeqCst),
        };
        Ok(result)
    }

    async fn update_if_unsigned(
        &self,
        asset_id: &str,
        publish_date: DateTime<Utc>,
        attestation: &Attestation,
    ) -> dlc_oracle_store::Result<UpdateResult> {
        let result = self
            .inner
            .update_if_unsigned(asset_id, publish_date, attestation)
            .await?;
        match &result {
            UpdateResult::Updated(_) => self.updated.fetch_add(1, Ordering::SeqCst),
            UpdateResult::AlreadySigned => self.already_signed.fetch_add(1, Ordering::SeqCst),
        };
        Ok(result)
    }

    async fn find_exact(
        &self,
        asset_id: &str,
        publish_date: DateTime<Utc>,
    ) -> dlc_oracle_store::Result<Option<EventRecord>> {
        if take_one(&self.blind_reads) {
            return Ok(None);
        }
        let record = self.inner.find_exact(asset_id, publish_date).await?;
        if take_one(&self.stale_reads) {
            return Ok(record.map(|mut r| {
                r.attestation = None;
                r
            }));
        }
        Ok(record)
    }

    async fn find_nearest_after(
        &self,
        asset_id: &str,
        from: DateTime<Utc>,
        within: Duration,
    ) -> dlc_oracle_store::Result<Option<EventRecord>> {
        self.inner.find_nearest_after(asset_id, from, within).await
    }

    async fn find_most_recent_before(
        &self,
        asset_id: &str,
        before: DateTime<Utc>,
    ) -> dlc_oracle_store::Result<Option<EventRecord>> {
        self.inner.find_most_recent_before(asset_id, before).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Oracle fixture
// ─────────────────────────────────────────────────────────────────────────────

/// An oracle for `btcusd` with every capability replaced by a test double.
///
/// The clock starts at 2020-01-01T10:20Z.
pub struct TestOracle<S: EventStore = MemoryStore> {
    pub oracle: Oracle<CountingStore<S>>,
    pub signer: Arc<CountingSigner>,
    pub feed: Arc<ScriptedPriceFeed>,
    pub clock: Arc<ManualClock>,
}

impl TestOracle<MemoryStore> {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }
}

impl Default for TestOracle<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EventStore> TestOracle<S> {
    pub fn with_store(store: S) -> Self {
        Self::with_store_and_seed(store, 7)
    }

    /// Build over `store` with a signer seeded by `seed`.
    ///
    /// Two fixtures with the same seed share the oracle key.
    pub fn with_store_and_seed(store: S, seed: u64) -> Self {
        let signer = Arc::new(CountingSigner::with_seed(seed));
        let feed = Arc::new(ScriptedPriceFeed::new());
        let clock = Arc::new(ManualClock::new(at(10, 20)));
        let assets = BTreeMap::from([("btcusd".to_string(), btcusd_config())]);

        let oracle = match Oracle::new(
            CountingStore::new(store),
            signer.clone(),
            feed.clone(),
            assets,
        ) {
            Ok(oracle) => oracle.with_clock(clock.clone()),
            Err(e) => panic!("fixture asset config rejected: {}", e),
        };

        Self {
            oracle,
            signer,
            feed,
            clock,
        }
    }

    pub fn store(&self) -> &CountingStore<S> {
        self.oracle.store()
    }
}
