//! Store module
//!
//! Wide-column store access. Callers hand the client parameterized
//! statements; backends decide how to execute them.

mod error;
mod memory;
mod postgres;
pub mod query;

use async_trait::async_trait;

pub use error::StoreError;
pub use memory::{MemoryStore, APPLIED_COLUMN};
pub use postgres::PgStore;
pub use query::{Prepared, Row, Rows, Value};

/// Client handle for the ledger's backing store.
///
/// One instance is created at startup and shared by every repository and
/// worker; implementations must be safe to call concurrently.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Execute a single statement and return its rows
    async fn request(&self, query: &Prepared) -> Result<Rows, StoreError>;

    /// Execute independent writes together. Either every statement is
    /// applied or an error is returned and none are.
    async fn batch_request(&self, queries: &[Prepared]) -> Result<(), StoreError>;
}
