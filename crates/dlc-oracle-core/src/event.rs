//! Oracle events: the per-(asset, publish date) record and asset parameters.

use chrono::{DateTime, Duration, Utc};

use crate::canonical::EventFields;
use crate::crypto::{SchnorrPublicKey, SchnorrSignature, SecretScalar};
use crate::error::ScheduleError;

/// Schedule and numeric encoding of one priced asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetConfig {
    /// Schedule epoch; publish dates are `start_date + k * frequency`.
    pub start_date: DateTime<Utc>,
    /// Interval between publish dates.
    pub frequency: Duration,
    /// How far past "now" announcements may be requested.
    pub range: Duration,
    pub base: u16,
    pub nb_digits: u16,
    pub is_signed: bool,
    pub precision: i32,
    pub unit: String,
}

impl AssetConfig {
    /// Reject configurations the scheduler and decomposer cannot work with.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.frequency <= Duration::zero() {
            return Err(ScheduleError::InvalidFrequency);
        }
        if self.range < Duration::zero() {
            return Err(ScheduleError::InvalidRange);
        }
        if self.base < 2 {
            return Err(ScheduleError::InvalidBase(self.base));
        }
        if self.nb_digits == 0 {
            return Err(ScheduleError::InvalidDigitCount);
        }
        Ok(())
    }
}

/// The observed outcome: one digit string and one signature per nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub signatures: Vec<SchnorrSignature>,
    pub values: Vec<String>,
    pub attested_at: DateTime<Utc>,
}

/// Lifecycle state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Announced,
    Attested,
}

/// Everything the oracle persists for one (asset, publish date).
///
/// Created once with its nonces and announcement signature; the attestation
/// is set at most once afterwards. `signing_keys[i]` is the secret for
/// `nonces[i]` and must never leave the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub asset_id: String,
    pub publish_date: DateTime<Utc>,
    pub nonces: Vec<SchnorrPublicKey>,
    pub signing_keys: Vec<SecretScalar>,
    pub base: u16,
    pub nb_digits: u16,
    pub is_signed: bool,
    pub precision: i32,
    pub unit: String,
    pub announcement_signature: SchnorrSignature,
    pub attestation: Option<Attestation>,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    /// `asset_id` followed by the publish date in Unix seconds.
    pub fn event_id(&self) -> String {
        event_id(&self.asset_id, self.publish_date)
    }

    pub fn state(&self) -> EventState {
        match self.attestation {
            Some(_) => EventState::Attested,
            None => EventState::Announced,
        }
    }

    pub fn is_attested(&self) -> bool {
        self.attestation.is_some()
    }

    /// The fields covered by the announcement signature.
    pub fn event_fields(&self) -> Result<EventFields, ScheduleError> {
        event_fields(
            &self.asset_id,
            self.publish_date,
            self.nonces.clone(),
            self.base,
            self.nb_digits,
            self.is_signed,
            self.precision,
            &self.unit,
        )
    }
}

/// Deterministic event identifier, e.g. `btcusd1577880000`.
pub fn event_id(asset_id: &str, publish_date: DateTime<Utc>) -> String {
    format!("{}{}", asset_id, publish_date.timestamp())
}

/// Build serializer input for an event that may not have a record yet.
#[allow(clippy::too_many_arguments)]
pub fn event_fields(
    asset_id: &str,
    publish_date: DateTime<Utc>,
    nonces: Vec<SchnorrPublicKey>,
    base: u16,
    nb_digits: u16,
    is_signed: bool,
    precision: i32,
    unit: &str,
) -> Result<EventFields, ScheduleError> {
    let event_maturity_epoch =
        u32::try_from(publish_date.timestamp()).map_err(|_| ScheduleError::OutOfRange)?;
    Ok(EventFields {
        nonces,
        event_maturity_epoch,
        base,
        is_signed,
        unit: unit.to_string(),
        precision,
        nb_digits,
        event_id: event_id(asset_id, publish_date),
    })
}

/// Split `btcusd` into (`btc`, `usd`).
///
/// The first three characters name the asset, the rest the quote currency.
/// Identifiers of three characters or fewer have an empty currency.
pub fn split_asset_id(asset_id: &str) -> (&str, &str) {
    match asset_id.char_indices().nth(3) {
        Some((idx, _)) => asset_id.split_at(idx),
        None => (asset_id, ""),
    }
}
