//! Full lifecycle for an hourly asset with three decimal digits.

use chrono::Duration;

use dlc_oracle::OracleError;
use dlc_oracle_core::{compose, OracleAnnouncement, OracleAttestation};
use dlc_oracle_testkit::{at, TestOracle};

#[tokio::test]
async fn announce_then_attest() {
    let fixture = TestOracle::new();

    // 10:20 maps to the next hourly slot.
    let announcement = fixture
        .oracle
        .get_or_create_announcement("btcusd", at(10, 20))
        .await
        .unwrap();
    assert_eq!(announcement.record.publish_date, at(11, 0));
    let wire = announcement.to_wire().unwrap();
    assert_eq!(wire.oracle_event.event_id, "btcusd1577876400");
    assert_eq!(wire.oracle_event.event_maturity_epoch, 1577876400);
    assert_eq!(wire.oracle_public_key, fixture.oracle.public_key());
    wire.verify().unwrap();

    // Not attestable before the publish date.
    fixture.clock.set(at(10, 59));
    let err = fixture
        .oracle
        .get_or_create_attestation("btcusd", at(10, 20))
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::TooEarly { .. }));
    assert_eq!(err.to_response().error_code, 5);
    assert_eq!(fixture.feed.calls(), 0);

    fixture.feed.set_price("btcusd", at(11, 0), 100.06);
    fixture.clock.set(at(11, 0));
    let record = fixture
        .oracle
        .get_or_create_attestation("btcusd", at(10, 20))
        .await
        .unwrap();
    let attestation = OracleAttestation::from_record(&record).unwrap();
    assert_eq!(attestation.values, vec!["1", "0", "0"]);
    assert_eq!(compose(&attestation.values, 10), Some(100));
    attestation.verify(&wire).unwrap();
}

#[tokio::test]
async fn wire_json_survives_a_round_trip() {
    let fixture = TestOracle::new();
    fixture.feed.set_price("btcusd", at(11, 0), 999.9);
    fixture.clock.set(at(11, 0));

    let announcement = fixture
        .oracle
        .get_or_create_announcement("btcusd", at(11, 0))
        .await
        .unwrap()
        .to_wire()
        .unwrap();
    let record = fixture
        .oracle
        .get_or_create_attestation("btcusd", at(11, 0))
        .await
        .unwrap();
    let attestation = OracleAttestation::from_record(&record).unwrap();

    let json = serde_json::to_value(&announcement).unwrap();
    assert!(json["oracleEvent"]["eventDescriptor"]["digitDecompositionEvent"]["nbDigits"]
        .is_number());
    let parsed: OracleAnnouncement = serde_json::from_value(json).unwrap();
    parsed.verify().unwrap();

    let json = serde_json::to_string(&attestation).unwrap();
    let parsed: OracleAttestation = serde_json::from_str(&json).unwrap();
    // 999.9 rounds to 1000, which does not fit in three digits.
    assert_eq!(parsed.values, vec!["9", "9", "9"]);
    parsed.verify(&announcement).unwrap();
}

#[tokio::test]
async fn window_limits() {
    let fixture = TestOracle::new();

    let edge = at(10, 20) + Duration::hours(47) + Duration::minutes(40);
    let announcement = fixture
        .oracle
        .get_or_create_announcement("btcusd", edge)
        .await
        .unwrap();
    assert_eq!(announcement.record.publish_date, at(10, 0) + Duration::hours(48));

    let err = fixture
        .oracle
        .get_or_create_announcement("btcusd", at(10, 20) + Duration::hours(48) + Duration::minutes(1))
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::TooLate { .. }));
    assert_eq!(err.to_response().error_code, 6);

    // Past dates are announced and attested on request.
    fixture.feed.set_price("btcusd", at(2, 0), 3.0);
    let record = fixture
        .oracle
        .get_or_create_attestation("btcusd", at(1, 45))
        .await
        .unwrap();
    assert_eq!(record.publish_date, at(2, 0));
    assert!(record.is_attested());
}

#[tokio::test]
async fn unknown_asset_is_reported() {
    let fixture = TestOracle::new();
    let err = fixture
        .oracle
        .get_or_create_attestation("ethusd", at(9, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, OracleError::UnknownAsset(_)));
    assert_eq!(err.to_response().error_code, 3);
    assert_eq!(fixture.oracle.asset_ids(), vec!["btcusd".to_string()]);
}
