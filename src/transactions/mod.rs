//! Transactions module
//!
//! The ledger itself: the repository over the store and the manager that
//! records transactions from ingestion commands.

mod manager;
pub mod repository;

pub use manager::{Manager, ManagerError, RecordTransaction, RunOutcome};
pub use repository::{Repository, TransactionFilter, TransactionPage};
