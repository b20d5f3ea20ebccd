//! Error types for the DLC oracle core.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by key handling, signing and signature verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("nonce derivation produced an invalid scalar")]
    InvalidNonce,

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid key file: {0}")]
    KeyFile(String),
}

/// Errors raised while decoding a serialized oracle event.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    #[error("non-minimal bigsize encoding at offset {0}")]
    NonMinimalBigSize(usize),

    #[error("unsupported event descriptor type {0}")]
    UnsupportedDescriptor(u64),

    #[error("descriptor length {declared} does not match content length {actual}")]
    DescriptorLength { declared: u64, actual: usize },

    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("{0} trailing bytes after event")]
    TrailingBytes(usize),
}

/// Errors raised by the publish-date scheduler and asset validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("publish date {publish_date} is after the accepted window ending {limit}")]
    TooLate {
        publish_date: DateTime<Utc>,
        limit: DateTime<Utc>,
    },

    #[error("frequency must be positive")]
    InvalidFrequency,

    #[error("range must not be negative")]
    InvalidRange,

    #[error("base must be at least 2, got {0}")]
    InvalidBase(u16),

    #[error("nb_digits must be at least 1")]
    InvalidDigitCount,

    #[error("publish date is outside the representable time range")]
    OutOfRange,
}

/// Errors raised while parsing ISO 8601 durations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("duration {0:?} does not start with 'P'")]
    MissingPrefix(String),

    #[error("duration {0:?} has no components")]
    Empty(String),

    #[error("duration {input:?} has an invalid component at {position}")]
    InvalidComponent { input: String, position: usize },

    #[error("duration {0:?} is too large")]
    Overflow(String),
}
