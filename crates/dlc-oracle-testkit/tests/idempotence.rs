//! Repeated requests return stored results without signing again.

use dlc_oracle_core::OracleAttestation;
use dlc_oracle_testkit::{at, TestOracle};

#[tokio::test]
async fn attestation_is_signed_once_across_calls() {
    let fixture = TestOracle::new();
    fixture.feed.set_price("btcusd", at(11, 0), 512.0);
    fixture.clock.set(at(12, 0));

    let first = fixture
        .oracle
        .get_or_create_attestation("btcusd", at(10, 20))
        .await
        .unwrap();
    let second = fixture
        .oracle
        .get_or_create_attestation("btcusd", at(10, 20))
        .await
        .unwrap();

    let first = OracleAttestation::from_record(&first).unwrap();
    let second = OracleAttestation::from_record(&second).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.values, vec!["5", "1", "2"]);

    assert_eq!(fixture.signer.sign_with_nonce_calls(), 3);
    assert_eq!(fixture.signer.sign_calls(), 1);
    assert_eq!(fixture.feed.calls(), 1);
}

#[tokio::test]
async fn attestation_reuses_existing_announcement() {
    let fixture = TestOracle::new();
    let announcement = fixture
        .oracle
        .get_or_create_announcement("btcusd", at(10, 20))
        .await
        .unwrap();

    fixture.feed.set_price("btcusd", at(11, 0), 7.0);
    fixture.clock.set(at(11, 0));
    let record = fixture
        .oracle
        .get_or_create_attestation("btcusd", at(11, 0))
        .await
        .unwrap();

    assert_eq!(record.nonces, announcement.record.nonces);
    assert_eq!(
        record.announcement_signature,
        announcement.record.announcement_signature
    );
    assert_eq!(fixture.signer.nonce_calls(), 3);
    assert_eq!(fixture.store().created(), 1);
}

#[tokio::test]
async fn signing_failure_is_not_recorded() {
    let fixture = TestOracle::new();
    fixture.feed.set_price("btcusd", at(11, 0), 7.0);
    fixture.clock.set(at(12, 0));
    fixture
        .oracle
        .get_or_create_announcement("btcusd", at(11, 0))
        .await
        .unwrap();

    fixture.signer.set_failing(true);
    let err = fixture
        .oracle
        .get_or_create_attestation("btcusd", at(11, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, dlc_oracle::OracleError::Signing(_)));
    assert_eq!(fixture.store().updated(), 0);
    assert!(fixture.oracle.locks().is_empty());

    fixture.signer.set_failing(false);
    let record = fixture
        .oracle
        .get_or_create_attestation("btcusd", at(11, 0))
        .await
        .unwrap();
    assert_eq!(record.attestation.unwrap().values, vec!["0", "0", "7"]);
}
