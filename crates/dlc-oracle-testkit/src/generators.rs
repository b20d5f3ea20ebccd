//! Proptest generators for property-based testing.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use dlc_oracle_core::{AssetConfig, EventFields, NonceKeypair, SchnorrPublicKey, SecretScalar};

/// Generate a valid secret scalar.
pub fn secret_scalar() -> impl Strategy<Value = SecretScalar> {
    any::<[u8; 32]>().prop_filter_map("scalar out of range", |b| SecretScalar::from_bytes(b).ok())
}

/// Generate the public half of a nonce.
pub fn nonce_public() -> impl Strategy<Value = SchnorrPublicKey> {
    secret_scalar().prop_map(|s| NonceKeypair::from_secret(s).public)
}

/// Generate a time between 2000 and 2100, second precision.
pub fn timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (946_684_800i64..4_102_444_800i64)
        .prop_map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
}

/// Generate a numeric base the decomposer supports well.
pub fn base() -> impl Strategy<Value = u16> {
    prop_oneof![Just(2u16), Just(10u16), Just(16u16), 2u16..=36]
}

/// Generate a schedule-valid asset configuration.
pub fn asset_config() -> impl Strategy<Value = AssetConfig> {
    (
        timestamp(),
        60i64..=7 * 86_400,
        0i64..=30 * 86_400,
        base(),
        1u16..=20,
        any::<bool>(),
        -4i32..=4,
        "[a-z/]{0,12}",
    )
        .prop_map(
            |(start_date, freq, range, base, nb_digits, is_signed, precision, unit)| AssetConfig {
                start_date,
                frequency: Duration::seconds(freq),
                range: Duration::seconds(range),
                base,
                nb_digits,
                is_signed,
                precision,
                unit,
            },
        )
}

/// Generate serializer input with up to `max_nonces` nonces.
pub fn event_fields(max_nonces: usize) -> impl Strategy<Value = EventFields> {
    (
        prop::collection::vec(nonce_public(), 0..=max_nonces),
        any::<u32>(),
        base(),
        any::<bool>(),
        "\\PC{0,300}",
        any::<i32>(),
        any::<u16>(),
        "[a-z]{3,8}[0-9]{1,10}",
    )
        .prop_map(
            |(nonces, event_maturity_epoch, base, is_signed, unit, precision, nb_digits, event_id)| {
                EventFields {
                    nonces,
                    event_maturity_epoch,
                    base,
                    is_signed,
                    unit,
                    precision,
                    nb_digits,
                    event_id,
                }
            },
        )
}

/// Generate an observed price, including out-of-range and negative ones.
pub fn price() -> impl Strategy<Value = f64> {
    prop_oneof![
        -1_000.0f64..0.0,
        0.0f64..1_000.0,
        0.0f64..1e12,
        Just(0.5),
        Just(99.5),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlc_oracle::digits_for_price;
    use dlc_oracle_core::{
        compose, compute_publish_date, deserialize_event, max_value, serialize_event,
    };

    proptest! {
        #[test]
        fn serialized_events_decode_to_the_same_fields(fields in event_fields(4)) {
            let bytes = serialize_event(&fields);
            prop_assert_eq!(deserialize_event(&bytes).unwrap(), fields);
        }

        #[test]
        fn publish_date_is_on_grid_and_not_before_request(
            config in asset_config(),
            requested in timestamp(),
        ) {
            let now = requested + config.frequency;
            let publish = compute_publish_date(requested, &config, now).unwrap();
            prop_assert!(publish >= requested);
            prop_assert!(publish - requested < config.frequency);
            let offset = (publish - config.start_date).num_seconds();
            prop_assert_eq!(offset.rem_euclid(config.frequency.num_seconds()), 0);
        }

        #[test]
        fn attested_digits_fit_the_event(
            price in price(),
            base in base(),
            nb_digits in 1u16..=12,
        ) {
            let digits = digits_for_price(price, base, nb_digits).unwrap();
            prop_assert_eq!(digits.len(), usize::from(nb_digits));
            let value = compose(&digits, base).unwrap();
            prop_assert!(value <= max_value(base, nb_digits));
            if price <= 0.0 {
                prop_assert_eq!(value, 0);
            }
        }
    }
}
