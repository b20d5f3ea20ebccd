//! Golden test vectors for deterministic verification.
//!
//! The serialization vectors pin the byte layout that announcement
//! signatures cover; third-party verifiers rebuild exactly these bytes. The
//! signature vectors are BIP340 reference cases over raw 32-byte messages.

use dlc_oracle_core::{
    deserialize_event, serialize_event, EventFields, SchnorrPublicKey, SchnorrSignature,
};

/// An event and its expected serialization.
#[derive(Debug, Clone)]
pub struct SerializationVector {
    pub name: &'static str,
    pub nonces: &'static [&'static str],
    pub event_maturity_epoch: u32,
    pub base: u16,
    pub is_signed: bool,
    pub unit: &'static str,
    pub precision: i32,
    pub nb_digits: u16,
    pub event_id: &'static str,
    /// Expected bytes (hex).
    pub expected: &'static str,
}

impl SerializationVector {
    pub fn fields(&self) -> Result<EventFields, String> {
        let nonces = self
            .nonces
            .iter()
            .map(|n| SchnorrPublicKey::from_hex(n).map_err(|e| format!("{}: {}", self.name, e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EventFields {
            nonces,
            event_maturity_epoch: self.event_maturity_epoch,
            base: self.base,
            is_signed: self.is_signed,
            unit: self.unit.to_string(),
            precision: self.precision,
            nb_digits: self.nb_digits,
            event_id: self.event_id.to_string(),
        })
    }
}

/// A BIP340 verification case.
#[derive(Debug, Clone)]
pub struct SignatureVector {
    pub name: &'static str,
    pub public_key: &'static str,
    pub message: &'static str,
    pub signature: &'static str,
    pub valid: bool,
}

pub fn serialization_vectors() -> Vec<SerializationVector> {
    vec![
        SerializationVector {
            name: "two nonces, base 2",
            nonces: &[
                "abf8f63630a0b1dec98ce8db50e9680f89f3390105454510420048d050aaa05d",
                "f4a731b0d25a291f7bbc33f391003e87dcfae98a7484e37646453725405f7f31",
            ],
            event_maturity_epoch: 1623133104,
            base: 2,
            is_signed: false,
            unit: "sats/sec",
            precision: 0,
            nb_digits: 10,
            event_id: "Test",
            expected: concat!(
                "0002",
                "abf8f63630a0b1dec98ce8db50e9680f89f3390105454510420048d050aaa05d",
                "f4a731b0d25a291f7bbc33f391003e87dcfae98a7484e37646453725405f7f31",
                "60bf0bb0",
                "fdd80a",
                "12",
                "0002",
                "00",
                "08736174732f736563",
                "00000000",
                "000a",
                "0454657374",
            ),
        },
        SerializationVector {
            name: "no nonces, signed, negative precision",
            nonces: &[],
            event_maturity_epoch: 1577876400,
            base: 10,
            is_signed: true,
            unit: "usd",
            precision: -2,
            nb_digits: 3,
            event_id: "btcusd1577876400",
            expected: concat!(
                "0000",
                "5e0c7bb0",
                "fdd80a",
                "0d",
                "000a",
                "01",
                "03757364",
                "fffffffe",
                "0003",
                "10",
                "62746375736431353737383736343030",
            ),
        },
    ]
}

pub fn signature_vectors() -> Vec<SignatureVector> {
    vec![
        SignatureVector {
            name: "bip340 #0",
            public_key: "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9",
            message: "0000000000000000000000000000000000000000000000000000000000000000",
            signature: concat!(
                "e907831f80848d1069a5371b402410364bdf1c5f8307b0084c55f1ce2dca8215",
                "25f66a4a85ea8b71e482a74f382d2ce5ebeee8fdb2172f477df4900d310536c0",
            ),
            valid: true,
        },
        SignatureVector {
            name: "bip340 #1",
            public_key: "dff1d77f2a671c5f36183726db2341be58feae1da2deced843240f7b502ba659",
            message: "243f6a8885a308d313198a2e03707344a4093822299f31d0082efa98ec4e6c89",
            signature: concat!(
                "6896bd60eeae296db48a229ff71dfe071bde413e6d43f917dc8dcf8c78de3341",
                "8906d11ac976abccb20b091292bff4ea897efcb639ea871cfa95f6de339e4b0a",
            ),
            valid: true,
        },
        SignatureVector {
            name: "bip340 #0 with altered s",
            public_key: "f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9",
            message: "0000000000000000000000000000000000000000000000000000000000000000",
            signature: concat!(
                "e907831f80848d1069a5371b402410364bdf1c5f8307b0084c55f1ce2dca8215",
                "25f66a4a85ea8b71e482a74f382d2ce5ebeee8fdb2172f477df4900d310536c1",
            ),
            valid: false,
        },
    ]
}

fn check_signature(v: &SignatureVector) -> Result<bool, String> {
    let pk = SchnorrPublicKey::from_hex(v.public_key).map_err(|e| e.to_string())?;
    let sig = SchnorrSignature::from_hex(v.signature).map_err(|e| e.to_string())?;
    let message: [u8; 32] = hex::decode(v.message)
        .map_err(|e| e.to_string())?
        .try_into()
        .map_err(|_| "message is not 32 bytes".to_string())?;
    Ok(pk.verify_digest(&message, &sig).is_ok())
}

/// Check every vector, reporting the first mismatch.
pub fn verify_all_vectors() -> Result<(), String> {
    for v in serialization_vectors() {
        let fields = v.fields()?;
        let bytes = serialize_event(&fields);
        if hex::encode(&bytes) != v.expected {
            return Err(format!(
                "{}: expected {}, got {}",
                v.name,
                v.expected,
                hex::encode(&bytes)
            ));
        }
        let decoded = deserialize_event(&bytes).map_err(|e| format!("{}: {}", v.name, e))?;
        if decoded != fields {
            return Err(format!("{}: decoded fields differ", v.name));
        }
    }
    for v in signature_vectors() {
        if check_signature(&v)? != v.valid {
            return Err(format!("{}: expected valid={}", v.name, v.valid));
        }
    }
    Ok(())
}
