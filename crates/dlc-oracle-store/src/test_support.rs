//! Record builders shared by the backend tests.

use chrono::{DateTime, TimeZone, Utc};

use dlc_oracle_core::{Attestation, EventRecord, NonceKeypair, OracleKeypair, SchnorrSignature};

pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, hour, 0, 0).unwrap()
}

/// An announced record with fresh nonces.
pub fn sample_record(asset_id: &str, publish_date: DateTime<Utc>) -> EventRecord {
    let oracle = OracleKeypair::generate();
    let nonces: Vec<NonceKeypair> = (0..3).map(|_| NonceKeypair::generate()).collect();
    EventRecord {
        asset_id: asset_id.to_string(),
        publish_date,
        nonces: nonces.iter().map(|n| n.public).collect(),
        signing_keys: nonces.iter().map(|n| n.secret.clone()).collect(),
        base: 10,
        nb_digits: 3,
        is_signed: false,
        precision: 0,
        unit: "usd/btc".to_string(),
        announcement_signature: oracle.sign(b"announcement").unwrap(),
        attestation: None,
        created_at: publish_date - chrono::Duration::hours(1),
    }
}

pub fn sample_attestation(values: &[&str]) -> Attestation {
    Attestation {
        signatures: values
            .iter()
            .enumerate()
            .map(|(i, _)| SchnorrSignature([i as u8 + 1; 64]))
            .collect(),
        values: values.iter().map(|v| v.to_string()).collect(),
        attested_at: at(12),
    }
}
