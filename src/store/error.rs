//! Store Errors
//!
//! Error types for wide-column store operations.

/// Errors that can occur talking to the store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row could not be mapped back into a domain value
    #[error("Invalid row data: {0}")]
    Decode(String),

    /// The statement is outside what the backend understands
    #[error("Unsupported statement: {0}")]
    UnsupportedStatement(String),

    /// Table does not exist
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Placeholder count does not match bound values
    #[error("Statement expects {expected} values, got {found}")]
    ArityMismatch { expected: usize, found: usize },

    /// Paging state was not produced by this store
    #[error("Invalid paging state: {0}")]
    InvalidPagingState(String),
}

impl StoreError {
    /// Check if this error is retryable
    ///
    /// Only connectivity/driver failures may succeed on redelivery; every
    /// other variant is deterministic for the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_is_retryable() {
        let err = StoreError::Database(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());

        let err = StoreError::Decode("bad amount".to_string());
        assert!(!err.is_retryable());

        let err = StoreError::ArityMismatch { expected: 2, found: 1 };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("expects 2"));
    }
}
