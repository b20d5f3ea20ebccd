//! Canonical binary encoding of oracle events.
//!
//! The announcement signature is computed over these bytes, and third-party
//! verifiers rebuild them from the published JSON fields. The layout is
//! big-endian throughout:
//!
//! ```text
//! u16        nonce count
//! [32]u8 *   nonces, in announcement order
//! u32        event maturity epoch
//! bigsize    55306 (digit decomposition event)
//! bigsize    descriptor length
//!   u16      base
//!   u8       is_signed
//!   bigsize  unit length, unit bytes
//!   i32      precision
//!   u16      nb_digits
//! bigsize    event id length, event id bytes
//! ```
//!
//! **CRITICAL**: This encoding is FROZEN. Changes break every published
//! announcement.

use crate::crypto::{sha256, SchnorrPublicKey, SchnorrSignature};
use crate::error::{CryptoError, DecodeError};

/// Type tag of a digit decomposition event descriptor.
pub const DIGIT_DECOMPOSITION_EVENT_TYPE: u64 = 55306;

/// Everything the announcement signature commits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFields {
    pub nonces: Vec<SchnorrPublicKey>,
    pub event_maturity_epoch: u32,
    pub base: u16,
    pub is_signed: bool,
    pub unit: String,
    pub precision: i32,
    pub nb_digits: u16,
    pub event_id: String,
}

/// Append a bigsize-encoded integer.
pub fn write_bigsize(buf: &mut Vec<u8>, n: u64) {
    if n <= 0xfc {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_bigsize(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Serialize an oracle event into the bytes the announcement signature covers.
pub fn serialize_event(fields: &EventFields) -> Vec<u8> {
    let mut descriptor = Vec::with_capacity(11 + fields.unit.len());
    descriptor.extend_from_slice(&fields.base.to_be_bytes());
    descriptor.push(u8::from(fields.is_signed));
    write_var_bytes(&mut descriptor, fields.unit.as_bytes());
    descriptor.extend_from_slice(&fields.precision.to_be_bytes());
    descriptor.extend_from_slice(&fields.nb_digits.to_be_bytes());

    let mut buf = Vec::with_capacity(2 + 32 * fields.nonces.len() + 16 + descriptor.len());
    buf.extend_from_slice(&(fields.nonces.len() as u16).to_be_bytes());
    for nonce in &fields.nonces {
        buf.extend_from_slice(nonce.as_bytes());
    }
    buf.extend_from_slice(&fields.event_maturity_epoch.to_be_bytes());
    write_bigsize(&mut buf, DIGIT_DECOMPOSITION_EVENT_TYPE);
    write_var_bytes(&mut buf, &descriptor);
    write_var_bytes(&mut buf, fields.event_id.as_bytes());
    buf
}

/// Cursor over an encoded event.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::UnexpectedEof(self.pos))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.array().map(u16::from_be_bytes)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_be_bytes)
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        self.array().map(i32::from_be_bytes)
    }

    fn bigsize(&mut self) -> Result<u64, DecodeError> {
        let start = self.pos;
        let (value, min) = match self.u8()? {
            0xfd => (u64::from(self.u16()?), 0xfd),
            0xfe => (u64::from(self.u32()?), 0x1_0000),
            0xff => (u64::from_be_bytes(self.array()?), 0x1_0000_0000),
            n => return Ok(u64::from(n)),
        };
        if value < min {
            return Err(DecodeError::NonMinimalBigSize(start));
        }
        Ok(value)
    }

    fn var_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.bigsize()?;
        let len = usize::try_from(len).map_err(|_| DecodeError::UnexpectedEof(self.pos))?;
        self.take(len)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Read a single bigsize integer, returning it and the number of bytes consumed.
pub fn read_bigsize(bytes: &[u8]) -> Result<(u64, usize), DecodeError> {
    let mut reader = Reader::new(bytes);
    let value = reader.bigsize()?;
    Ok((value, reader.pos))
}

/// Decode bytes produced by [`serialize_event`].
pub fn deserialize_event(bytes: &[u8]) -> Result<EventFields, DecodeError> {
    let mut r = Reader::new(bytes);

    let count = r.u16()?;
    let mut nonces = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        nonces.push(SchnorrPublicKey(r.array()?));
    }
    let event_maturity_epoch = r.u32()?;

    let kind = r.bigsize()?;
    if kind != DIGIT_DECOMPOSITION_EVENT_TYPE {
        return Err(DecodeError::UnsupportedDescriptor(kind));
    }

    let descriptor = r.var_bytes()?;
    let mut d = Reader::new(descriptor);
    let base = d.u16()?;
    let is_signed = match d.u8()? {
        0 => false,
        1 => true,
        other => return Err(DecodeError::InvalidBool(other)),
    };
    let unit = std::str::from_utf8(d.var_bytes()?)
        .map_err(|_| DecodeError::InvalidUtf8("unit"))?
        .to_string();
    let precision = d.i32()?;
    let nb_digits = d.u16()?;
    if d.remaining() != 0 {
        return Err(DecodeError::DescriptorLength {
            declared: descriptor.len() as u64,
            actual: d.pos,
        });
    }

    let event_id = std::str::from_utf8(r.var_bytes()?)
        .map_err(|_| DecodeError::InvalidUtf8("event_id"))?
        .to_string();
    if r.remaining() != 0 {
        return Err(DecodeError::TrailingBytes(r.remaining()));
    }

    Ok(EventFields {
        nonces,
        event_maturity_epoch,
        base,
        is_signed,
        unit,
        precision,
        nb_digits,
        event_id,
    })
}

/// Check an announcement signature against the event it claims to cover.
pub fn verify_announcement(
    oracle_public_key: &SchnorrPublicKey,
    signature: &SchnorrSignature,
    fields: &EventFields,
) -> Result<(), CryptoError> {
    oracle_public_key.verify(&serialize_event(fields), signature)
}

/// Check that each digit signature verifies and was made with the nonce the
/// announcement committed to at the same position.
pub fn verify_attestation(
    oracle_public_key: &SchnorrPublicKey,
    nonces: &[SchnorrPublicKey],
    values: &[String],
    signatures: &[SchnorrSignature],
) -> Result<(), CryptoError> {
    if nonces.len() != values.len() || nonces.len() != signatures.len() {
        return Err(CryptoError::VerificationFailed);
    }
    for ((nonce, value), signature) in nonces.iter().zip(values).zip(signatures) {
        if signature.nonce() != *nonce {
            return Err(CryptoError::VerificationFailed);
        }
        oracle_public_key.verify(value.as_bytes(), signature)?;
    }
    Ok(())
}

/// SHA-256 of the serialized event; the 32-byte message actually signed.
pub fn event_digest(fields: &EventFields) -> [u8; 32] {
    sha256(&serialize_event(fields))
}
