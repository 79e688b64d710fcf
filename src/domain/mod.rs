//! Domain module
//!
//! Ledger entities and value types.

pub mod amount;
pub mod error;
pub mod transaction;

pub use amount::{AmountError, TokenAmount};
pub use error::DomainError;
pub use transaction::{timestamp_from_unix, Transaction, TransactionBuilder, WalletAddress, OFFCHAIN};
