//! Blockchain transactions ledger
//!
//! Append-only ledger of blockchain and off-chain token transactions,
//! fed by an idempotent queue consumer and read back by user and wallet.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod queue;
pub mod store;
pub mod transactions;

pub use config::Config;
pub use domain::{DomainError, TokenAmount, Transaction, WalletAddress};
pub use error::{AppError, AppResult};
pub use store::{MemoryStore, PgStore, StoreClient, StoreError};
pub use transactions::{Manager, Repository};
