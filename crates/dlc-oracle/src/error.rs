//! Error types for the oracle engine.

use chrono::{DateTime, Utc};
use thiserror::Error;

use dlc_oracle_core::{CryptoError, ErrorResponse, ScheduleError};
use dlc_oracle_store::StoreError;

use crate::feed::FeedError;

/// Errors that can occur during oracle operations.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The requested time resolves past the accepted window.
    #[error("publish date {publish_date} is after the accepted window ending {limit}")]
    TooLate {
        publish_date: DateTime<Utc>,
        limit: DateTime<Utc>,
    },

    /// Attestation requested before the publish date.
    #[error("oracle cannot sign a value not yet known, retry after {publish_date}")]
    TooEarly { publish_date: DateTime<Utc> },

    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    /// A record that should exist does not.
    #[error("event not found: {0}")]
    NotFound(String),

    #[error("invalid time {input:?}: {reason}")]
    InvalidTime { input: String, reason: String },

    /// Asset parameters the scheduler cannot work with.
    #[error("invalid schedule: {0}")]
    Schedule(ScheduleError),

    #[error("price feed error: {0}")]
    PriceFeed(#[from] FeedError),

    #[error("signing error: {0}")]
    Signing(#[from] CryptoError),

    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ScheduleError> for OracleError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::TooLate {
                publish_date,
                limit,
            } => OracleError::TooLate {
                publish_date,
                limit,
            },
            other => OracleError::Schedule(other),
        }
    }
}

/// Numeric error codes reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    UnknownInternal = 1,
    UnknownDb = 2,
    RecordNotFound = 3,
    InvalidTimeFormat = 4,
    InvalidTimeTooEarly = 5,
    InvalidTimeTooLate = 6,
    UnknownCrypto = 7,
}

impl OracleError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OracleError::TooLate { .. } => ErrorCode::InvalidTimeTooLate,
            OracleError::TooEarly { .. } => ErrorCode::InvalidTimeTooEarly,
            OracleError::InvalidTime { .. } => ErrorCode::InvalidTimeFormat,
            OracleError::UnknownAsset(_) | OracleError::NotFound(_) => ErrorCode::RecordNotFound,
            OracleError::Persistence(_) => ErrorCode::UnknownDb,
            OracleError::Signing(_) => ErrorCode::UnknownCrypto,
            OracleError::Schedule(_)
            | OracleError::PriceFeed(_)
            | OracleError::Config(_)
            | OracleError::Internal(_) => ErrorCode::UnknownInternal,
        }
    }

    /// Whether the caller can fix the request (as opposed to a server fault).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OracleError::TooLate { .. }
                | OracleError::TooEarly { .. }
                | OracleError::InvalidTime { .. }
                | OracleError::UnknownAsset(_)
        )
    }

    /// Body returned to clients. Internal causes are not disclosed.
    pub fn to_response(&self) -> ErrorResponse {
        let message = match self.code() {
            ErrorCode::UnknownInternal => "Internal error",
            ErrorCode::UnknownDb => "DB Error: unexpected database state",
            ErrorCode::RecordNotFound => "Could not find the specified record",
            ErrorCode::InvalidTimeFormat => "Invalid time format, use ISO 8601",
            ErrorCode::InvalidTimeTooEarly => "Requested time is too early",
            ErrorCode::InvalidTimeTooLate => "Requested time is too late",
            ErrorCode::UnknownCrypto => "Crypto service error",
        };
        let cause = match self.code() {
            ErrorCode::UnknownInternal => None,
            _ => Some(self.to_string()),
        };
        ErrorResponse {
            error_code: self.code() as u32,
            message: message.to_string(),
            cause,
        }
    }
}

/// Result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_too_late_maps_from_schedule() {
        let publish_date = Utc.with_ymd_and_hms(2020, 1, 3, 0, 0, 0).unwrap();
        let limit = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
        let err = OracleError::from(ScheduleError::TooLate {
            publish_date,
            limit,
        });
        assert!(matches!(err, OracleError::TooLate { .. }));
        assert_eq!(err.code(), ErrorCode::InvalidTimeTooLate);
        assert!(err.is_client_error());

        let err = OracleError::from(ScheduleError::InvalidFrequency);
        assert!(matches!(err, OracleError::Schedule(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_response_hides_internal_cause() {
        let err = OracleError::Internal("digit count mismatch".to_string());
        let body = err.to_response();
        assert_eq!(body.error_code, 1);
        assert!(body.cause.is_none());

        let err = OracleError::TooEarly {
            publish_date: Utc.with_ymd_and_hms(2020, 1, 1, 11, 0, 0).unwrap(),
        };
        let body = err.to_response();
        assert_eq!(body.error_code, 5);
        assert!(body.cause.unwrap().contains("retry after"));
    }
}
