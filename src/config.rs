//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::queue::DEFAULT_QUEUE;
use crate::transactions::repository::{DEFAULT_PAGE_SIZE, DEFAULT_TABLE};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Table holding the ledger
    pub ledger_table: String,

    /// Rows per page when a list request gives no page size
    pub ledger_page_size: u32,

    /// Queue name the ingestion runner reports in its logs
    pub queue_name: String,

    /// Contract tag for messages that carry none
    pub default_contract: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let ledger_table = env::var("LEDGER_TABLE").unwrap_or_else(|_| DEFAULT_TABLE.to_string());
        if !is_identifier(&ledger_table) {
            return Err(ConfigError::InvalidValue("LEDGER_TABLE"));
        }

        let ledger_page_size: u32 = parse_or("LEDGER_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if ledger_page_size == 0 {
            return Err(ConfigError::InvalidValue("LEDGER_PAGE_SIZE"));
        }

        Ok(Self {
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            ledger_table,
            ledger_page_size,
            queue_name: env::var("QUEUE_NAME").unwrap_or_else(|_| DEFAULT_QUEUE.to_string()),
            default_contract: env::var("DEFAULT_CONTRACT").unwrap_or_default(),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Table names are spliced into statement text, so only plain SQL
/// identifiers are accepted.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("blockchain_transactions"));
        assert!(is_identifier("_ledger2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2ledger"));
        assert!(!is_identifier("ledger; DROP TABLE x"));
        assert!(!is_identifier("public.ledger"));
    }

    #[test]
    fn test_parse_or_default_when_unset() {
        let value: u32 = parse_or("BLOCKCHAIN_LEDGER_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
