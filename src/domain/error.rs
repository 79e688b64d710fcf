//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::AmountError;

/// Validation failures raised while building ledger records.
///
/// These are never retryable: redelivering the same input yields the same
/// error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// A required field was absent or empty
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Amount could not be represented as a non-negative integer
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// Timestamp outside the representable range
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// User GUID is not an unsigned integer
    #[error("Invalid user guid: {0}")]
    InvalidUserGuid(String),
}

impl DomainError {
    /// Name of the offending field, for logging
    pub fn field(&self) -> &'static str {
        match self {
            Self::MissingField(field) => field,
            Self::InvalidAmount(_) => "amount",
            Self::InvalidTimestamp(_) => "timestamp",
            Self::InvalidUserGuid(_) => "user_guid",
        }
    }
}
