//! JSON shapes published to oracle consumers.
//!
//! Keys, nonces and signatures are lowercase hex; timestamps are RFC 3339;
//! durations are ISO 8601.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::{verify_announcement, verify_attestation, EventFields};
use crate::crypto::{SchnorrPublicKey, SchnorrSignature};
use crate::error::{CryptoError, ScheduleError};
use crate::event::{AssetConfig, EventRecord};
use crate::iso8601::encode_duration;

/// Announcement: nonces and event metadata, signed by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleAnnouncement {
    pub oracle_public_key: SchnorrPublicKey,
    pub announcement_signature: SchnorrSignature,
    pub oracle_event: OracleEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleEvent {
    pub oracle_nonces: Vec<SchnorrPublicKey>,
    pub event_maturity_epoch: u32,
    pub event_descriptor: EventDescriptor,
    pub event_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDescriptor {
    pub digit_decomposition_event: DigitDecompositionEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitDecompositionEvent {
    pub base: u16,
    pub is_signed: bool,
    pub unit: String,
    pub precision: i32,
    pub nb_digits: u16,
}

impl OracleAnnouncement {
    pub fn from_record(
        record: &EventRecord,
        oracle_public_key: SchnorrPublicKey,
    ) -> Result<Self, ScheduleError> {
        let fields = record.event_fields()?;
        Ok(Self {
            oracle_public_key,
            announcement_signature: record.announcement_signature,
            oracle_event: OracleEvent {
                oracle_nonces: fields.nonces,
                event_maturity_epoch: fields.event_maturity_epoch,
                event_descriptor: EventDescriptor {
                    digit_decomposition_event: DigitDecompositionEvent {
                        base: fields.base,
                        is_signed: fields.is_signed,
                        unit: fields.unit,
                        precision: fields.precision,
                        nb_digits: fields.nb_digits,
                    },
                },
                event_id: fields.event_id,
            },
        })
    }

    /// The serializer input these fields describe.
    pub fn event_fields(&self) -> EventFields {
        let event = &self.oracle_event;
        let descriptor = &event.event_descriptor.digit_decomposition_event;
        EventFields {
            nonces: event.oracle_nonces.clone(),
            event_maturity_epoch: event.event_maturity_epoch,
            base: descriptor.base,
            is_signed: descriptor.is_signed,
            unit: descriptor.unit.clone(),
            precision: descriptor.precision,
            nb_digits: descriptor.nb_digits,
            event_id: event.event_id.clone(),
        }
    }

    /// Rebuild the serialized event and check the announcement signature.
    pub fn verify(&self) -> Result<(), CryptoError> {
        verify_announcement(
            &self.oracle_public_key,
            &self.announcement_signature,
            &self.event_fields(),
        )
    }
}

/// Attestation: the observed digits and one signature per digit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleAttestation {
    pub event_id: String,
    pub signatures: Vec<SchnorrSignature>,
    pub values: Vec<String>,
}

impl OracleAttestation {
    /// `None` while the record is only announced.
    pub fn from_record(record: &EventRecord) -> Option<Self> {
        record.attestation.as_ref().map(|attestation| Self {
            event_id: record.event_id(),
            signatures: attestation.signatures.clone(),
            values: attestation.values.clone(),
        })
    }

    /// Check the attestation against the announcement it completes.
    pub fn verify(&self, announcement: &OracleAnnouncement) -> Result<(), CryptoError> {
        if self.event_id != announcement.oracle_event.event_id {
            return Err(CryptoError::VerificationFailed);
        }
        verify_attestation(
            &announcement.oracle_public_key,
            &announcement.oracle_event.oracle_nonces,
            &self.values,
            &self.signatures,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OraclePublicKeyResponse {
    pub public_key: SchnorrPublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetListResponse {
    pub assets: Vec<String>,
}

/// Public schedule of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetConfigResponse {
    pub start_date: DateTime<Utc>,
    pub frequency: String,
    pub range: String,
}

impl From<&AssetConfig> for AssetConfigResponse {
    fn from(config: &AssetConfig) -> Self {
        Self {
            start_date: config.start_date,
            frequency: encode_duration(config.frequency),
            range: encode_duration(config.range),
        }
    }
}

/// Error body returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_code: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}
