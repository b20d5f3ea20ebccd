//! SQLite implementation of the EventStore trait.
//!
//! Primary storage backend. Uses rusqlite with bundled SQLite, wrapped in
//! async via `tokio::task::spawn_blocking`. The `(asset_id, publish_date)`
//! primary key and the conditional attestation update make at-most-once
//! creation and signing hold across processes sharing one database file.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ciborium::value::Value;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use dlc_oracle_core::{Attestation, EventRecord, SchnorrPublicKey, SchnorrSignature, SecretScalar};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{CreateResult, EventStore, UpdateResult};

const NANOS_PER_SEC: i64 = 1_000_000_000;

const SELECT_EVENT: &str = "SELECT asset_id, publish_date, nonces, signing_keys, base, nb_digits,
        is_signed, precision, unit, announcement_signature, signatures, digit_values,
        attested_at, created_at
    FROM events";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Applied schema version.
    pub async fn schema_version(&self) -> Result<u32> {
        self.run(|conn| migration::schema_version(conn)).await
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("connection mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column encoding
// ─────────────────────────────────────────────────────────────────────────────

fn to_nanos(t: DateTime<Utc>) -> Result<i64> {
    t.timestamp_nanos_opt()
        .ok_or_else(|| StoreError::InvalidData(format!("timestamp {} out of range", t)))
}

fn from_nanos(nanos: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(
        nanos.div_euclid(NANOS_PER_SEC),
        nanos.rem_euclid(NANOS_PER_SEC) as u32,
    )
    .ok_or_else(|| StoreError::InvalidData(format!("timestamp {} out of range", nanos)))
}

fn encode_list(items: Vec<Value>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(&Value::Array(items), &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn encode_bytes_list<'a>(items: impl Iterator<Item = &'a [u8]>) -> Result<Vec<u8>> {
    encode_list(items.map(|b| Value::Bytes(b.to_vec())).collect())
}

fn decode_list(column: &str, bytes: &[u8]) -> Result<Vec<Value>> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(StoreError::InvalidData(format!("{}: expected CBOR array", column))),
    }
}

fn decode_bytes_list(column: &str, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    decode_list(column, bytes)?
        .into_iter()
        .map(|item| match item {
            Value::Bytes(b) => Ok(b),
            _ => Err(StoreError::InvalidData(format!("{}: expected byte string", column))),
        })
        .collect()
}

fn decode_text_list(column: &str, bytes: &[u8]) -> Result<Vec<String>> {
    decode_list(column, bytes)?
        .into_iter()
        .map(|item| match item {
            Value::Text(s) => Ok(s),
            _ => Err(StoreError::InvalidData(format!("{}: expected text", column))),
        })
        .collect()
}

fn invalid(column: &str) -> StoreError {
    StoreError::InvalidData(format!("{}: wrong length or value", column))
}

/// Column values of one `events` row, before validation.
struct EventRow {
    asset_id: String,
    publish_date: i64,
    nonces: Vec<u8>,
    signing_keys: Vec<u8>,
    base: u16,
    nb_digits: u16,
    is_signed: bool,
    precision: i32,
    unit: String,
    announcement_signature: Vec<u8>,
    signatures: Option<Vec<u8>>,
    digit_values: Option<Vec<u8>>,
    attested_at: Option<i64>,
    created_at: i64,
}

impl EventRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            asset_id: row.get("asset_id")?,
            publish_date: row.get("publish_date")?,
            nonces: row.get("nonces")?,
            signing_keys: row.get("signing_keys")?,
            base: row.get("base")?,
            nb_digits: row.get("nb_digits")?,
            is_signed: row.get("is_signed")?,
            precision: row.get("precision")?,
            unit: row.get("unit")?,
            announcement_signature: row.get("announcement_signature")?,
            signatures: row.get("signatures")?,
            digit_values: row.get("digit_values")?,
            attested_at: row.get("attested_at")?,
            created_at: row.get("created_at")?,
        })
    }

    fn into_record(self) -> Result<EventRecord> {
        let nonces = decode_bytes_list("nonces", &self.nonces)?
            .iter()
            .map(|b| SchnorrPublicKey::try_from(b.as_slice()).map_err(|_| invalid("nonces")))
            .collect::<Result<Vec<_>>>()?;

        let signing_keys = decode_bytes_list("signing_keys", &self.signing_keys)?
            .into_iter()
            .map(|b| {
                let arr: [u8; 32] = b.try_into().map_err(|_| invalid("signing_keys"))?;
                SecretScalar::from_bytes(arr).map_err(|_| invalid("signing_keys"))
            })
            .collect::<Result<Vec<_>>>()?;

        let announcement_signature =
            SchnorrSignature::try_from(self.announcement_signature.as_slice())
                .map_err(|_| invalid("announcement_signature"))?;

        let attestation = match (self.signatures, self.digit_values, self.attested_at) {
            (Some(sigs), Some(values), Some(attested_at)) => Some(Attestation {
                signatures: decode_bytes_list("signatures", &sigs)?
                    .iter()
                    .map(|b| {
                        SchnorrSignature::try_from(b.as_slice()).map_err(|_| invalid("signatures"))
                    })
                    .collect::<Result<Vec<_>>>()?,
                values: decode_text_list("digit_values", &values)?,
                attested_at: from_nanos(attested_at)?,
            }),
            (None, None, None) => None,
            _ => return Err(StoreError::InvalidData("partial attestation".to_string())),
        };

        Ok(EventRecord {
            asset_id: self.asset_id,
            publish_date: from_nanos(self.publish_date)?,
            nonces,
            signing_keys,
            base: self.base,
            nb_digits: self.nb_digits,
            is_signed: self.is_signed,
            precision: self.precision,
            unit: self.unit,
            announcement_signature,
            attestation,
            created_at: from_nanos(self.created_at)?,
        })
    }
}

/// Encoded attestation columns.
struct AttestationColumns {
    signatures: Vec<u8>,
    digit_values: Vec<u8>,
    attested_at: i64,
}

impl AttestationColumns {
    fn encode(attestation: &Attestation) -> Result<Self> {
        Ok(Self {
            signatures: encode_bytes_list(attestation.signatures.iter().map(|s| s.as_ref()))?,
            digit_values: encode_list(
                attestation
                    .values
                    .iter()
                    .map(|v| Value::Text(v.clone()))
                    .collect(),
            )?,
            attested_at: to_nanos(attestation.attested_at)?,
        })
    }
}

fn query_one(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<EventRecord>> {
    let row = conn
        .query_row(sql, params, EventRow::from_row)
        .optional()?;
    row.map(EventRow::into_record).transpose()
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn create_if_absent(&self, record: &EventRecord) -> Result<CreateResult> {
        let asset_id = record.asset_id.clone();
        let publish_date = to_nanos(record.publish_date)?;
        let created_at = to_nanos(record.created_at)?;
        let nonces = encode_bytes_list(record.nonces.iter().map(|n| n.as_ref()))?;
        let signing_keys =
            encode_bytes_list(record.signing_keys.iter().map(|k| k.as_bytes().as_slice()))?;
        let attestation = record
            .attestation
            .as_ref()
            .map(AttestationColumns::encode)
            .transpose()?;
        let (base, nb_digits, is_signed, precision) =
            (record.base, record.nb_digits, record.is_signed, record.precision);
        let unit = record.unit.clone();
        let announcement_signature = record.announcement_signature.as_bytes().to_vec();

        let inserted = self
            .run(move |conn| {
                let changed = conn.execute(
                    "INSERT INTO events (
                        asset_id, publish_date, nonces, signing_keys, base, nb_digits,
                        is_signed, precision, unit, announcement_signature, signatures,
                        digit_values, attested_at, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    ON CONFLICT(asset_id, publish_date) DO NOTHING",
                    params![
                        asset_id,
                        publish_date,
                        nonces,
                        signing_keys,
                        base,
                        nb_digits,
                        is_signed,
                        precision,
                        unit,
                        announcement_signature,
                        attestation.as_ref().map(|a| a.signatures.as_slice()),
                        attestation.as_ref().map(|a| a.digit_values.as_slice()),
                        attestation.as_ref().map(|a| a.attested_at),
                        created_at,
                    ],
                )?;
                Ok(changed == 1)
            })
            .await?;

        if inserted {
            Ok(CreateResult::Created)
        } else {
            debug!(
                asset_id = %record.asset_id,
                publish_date = %record.publish_date,
                "event already exists"
            );
            Ok(CreateResult::Conflict)
        }
    }

    async fn update_if_unsigned(
        &self,
        asset_id: &str,
        publish_date: DateTime<Utc>,
        attestation: &Attestation,
    ) -> Result<UpdateResult> {
        let asset_id = asset_id.to_string();
        let date = to_nanos(publish_date)?;
        let columns = AttestationColumns::encode(attestation)?;

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE events SET signatures = ?1, digit_values = ?2, attested_at = ?3
                 WHERE asset_id = ?4 AND publish_date = ?5 AND signatures IS NULL",
                params![
                    columns.signatures,
                    columns.digit_values,
                    columns.attested_at,
                    asset_id,
                    date
                ],
            )?;

            let current = query_one(
                &tx,
                &format!("{} WHERE asset_id = ?1 AND publish_date = ?2", SELECT_EVENT),
                params![asset_id, date],
            )?;
            tx.commit()?;

            match (changed, current) {
                (_, None) => Err(StoreError::NotFound(format!("{} at {}", asset_id, publish_date))),
                (0, Some(_)) => Ok(UpdateResult::AlreadySigned),
                (_, Some(record)) => Ok(UpdateResult::Updated(record)),
            }
        })
        .await
    }

    async fn find_exact(
        &self,
        asset_id: &str,
        publish_date: DateTime<Utc>,
    ) -> Result<Option<EventRecord>> {
        let asset_id = asset_id.to_string();
        let date = to_nanos(publish_date)?;
        self.run(move |conn| {
            query_one(
                conn,
                &format!("{} WHERE asset_id = ?1 AND publish_date = ?2", SELECT_EVENT),
                params![asset_id, date],
            )
        })
        .await
    }

    async fn find_nearest_after(
        &self,
        asset_id: &str,
        from: DateTime<Utc>,
        within: Duration,
    ) -> Result<Option<EventRecord>> {
        let asset_id = asset_id.to_string();
        let from = to_nanos(from)?;
        let upper = from.saturating_add(within.num_nanoseconds().unwrap_or(i64::MAX));
        self.run(move |conn| {
            query_one(
                conn,
                &format!(
                    "{} WHERE asset_id = ?1 AND publish_date >= ?2 AND publish_date <= ?3
                     ORDER BY publish_date ASC LIMIT 1",
                    SELECT_EVENT
                ),
                params![asset_id, from, upper],
            )
        })
        .await
    }

    async fn find_most_recent_before(
        &self,
        asset_id: &str,
        before: DateTime<Utc>,
    ) -> Result<Option<EventRecord>> {
        let asset_id = asset_id.to_string();
        let before = to_nanos(before)?;
        self.run(move |conn| {
            query_one(
                conn,
                &format!(
                    "{} WHERE asset_id = ?1 AND publish_date < ?2
                     ORDER BY publish_date DESC LIMIT 1",
                    SELECT_EVENT
                ),
                params![asset_id, before],
            )
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, sample_attestation, sample_record};

    #[tokio::test]
    async fn test_sqlite_store_roundtrips_record() {
        let store = SqliteStore::open_memory().unwrap();
        let record = sample_record("btcusd", at(11));

        assert_eq!(store.create_if_absent(&record).await.unwrap(), CreateResult::Created);
        let found = store.find_exact("btcusd", at(11)).await.unwrap().unwrap();
        assert_eq!(found, record);
        assert!(found.attestation.is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_conflict() {
        let store = SqliteStore::open_memory().unwrap();
        let first = sample_record("btcusd", at(11));
        let second = sample_record("btcusd", at(11));

        assert_eq!(store.create_if_absent(&first).await.unwrap(), CreateResult::Created);
        assert_eq!(store.create_if_absent(&second).await.unwrap(), CreateResult::Conflict);

        let found = store.find_exact("btcusd", at(11)).await.unwrap().unwrap();
        assert_eq!(found.nonces, first.nonces);
        assert_eq!(found.announcement_signature, first.announcement_signature);
    }

    #[tokio::test]
    async fn test_sqlite_store_update_once() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .create_if_absent(&sample_record("btcusd", at(11)))
            .await
            .unwrap();

        let first = sample_attestation(&["1", "0", "0"]);
        match store.update_if_unsigned("btcusd", at(11), &first).await.unwrap() {
            UpdateResult::Updated(record) => assert_eq!(record.attestation, Some(first.clone())),
            other => panic!("expected update, got {:?}", other),
        }

        let second = sample_attestation(&["2", "0", "0"]);
        assert_eq!(
            store.update_if_unsigned("btcusd", at(11), &second).await.unwrap(),
            UpdateResult::AlreadySigned
        );

        let found = store.find_exact("btcusd", at(11)).await.unwrap().unwrap();
        assert_eq!(found.attestation, Some(first));
    }

    #[tokio::test]
    async fn test_sqlite_store_update_missing() {
        let store = SqliteStore::open_memory().unwrap();
        let err = store
            .update_if_unsigned("btcusd", at(11), &sample_attestation(&["1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sqlite_store_range_queries() {
        let store = SqliteStore::open_memory().unwrap();
        for hour in [9, 11, 14] {
            store
                .create_if_absent(&sample_record("btcusd", at(hour)))
                .await
                .unwrap();
        }
        store
            .create_if_absent(&sample_record("ethusd", at(10)))
            .await
            .unwrap();

        let near = store
            .find_nearest_after("btcusd", at(10), Duration::hours(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(near.publish_date, at(11));

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

        let eth = store
            .find_most_recent_before("ethusd", at(23))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(eth.asset_id, "ethusd");
    }

    #[tokio::test]
    async fn test_sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oracle.db");
        let record = sample_record("btcusd", at(11));

        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_if_absent(&record).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.schema_version().await.unwrap(), migration::CURRENT_VERSION);
        let found = store.find_exact("btcusd", at(11)).await.unwrap().unwrap();
        assert_eq!(found, record);
    }

    #[tokio::test]
    async fn test_sqlite_two_handles_share_uniqueness() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oracle.db");
        let a = SqliteStore::open(&path).unwrap();
        let b = SqliteStore::open(&path).unwrap();

        let first = sample_record("btcusd", at(11));
        let second = sample_record("btcusd", at(11));
        assert_eq!(a.create_if_absent(&first).await.unwrap(), CreateResult::Created);
        assert_eq!(b.create_if_absent(&second).await.unwrap(), CreateResult::Conflict);

        let att = sample_attestation(&["1", "0", "0"]);
        assert!(matches!(
            b.update_if_unsigned("btcusd", at(11), &att).await.unwrap(),
            UpdateResult::Updated(_)
        ));
        assert_eq!(
            a.update_if_unsigned("btcusd", at(11), &att).await.unwrap(),
            UpdateResult::AlreadySigned
        );
    }
}
