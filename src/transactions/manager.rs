//! Transactions Manager
//!
//! Records a transaction for an inbound ingestion command. Safe to call
//! repeatedly with the same command: a `(user_guid, tx)` pair is written at
//! most once.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::{DomainError, TokenAmount, Transaction, WalletAddress};
use crate::store::StoreError;

use super::Repository;

// =========================================================================
// Command
// =========================================================================

/// Input for [`Manager::run`], usually decoded from a queue message.
///
/// `user_guid`, `timestamp`, `wallet_address` and `tx` are required.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordTransaction {
    pub user_guid: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub wallet_address: Option<String>,
    pub tx: Option<String>,
    pub contract: Option<String>,
    pub amount: Option<TokenAmount>,
    pub completed: Option<bool>,
    pub data: Option<Map<String, Value>>,
}

impl RecordTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_guid(mut self, user_guid: u64) -> Self {
        self.user_guid = Some(user_guid);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn wallet_address(mut self, wallet_address: impl Into<String>) -> Self {
        self.wallet_address = Some(wallet_address.into());
        self
    }

    pub fn tx(mut self, tx: impl Into<String>) -> Self {
        self.tx = Some(tx.into());
        self
    }

    pub fn contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    pub fn amount(mut self, amount: TokenAmount) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    pub fn data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }
}

// =========================================================================
// Outcome / errors
// =========================================================================

/// What a successful run did
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// A new ledger record was written
    Recorded(Transaction),
    /// A record for the same `(user_guid, tx)` already existed
    Duplicate(Transaction),
}

impl RunOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            RunOutcome::Recorded(transaction) | RunOutcome::Duplicate(transaction) => transaction,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, RunOutcome::Duplicate(_))
    }
}

/// Errors from [`Manager::run`]
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// The command is malformed; retrying cannot help
    #[error("Validation failed: {0}")]
    Validation(#[from] DomainError),

    /// The store failed; the caller decides whether to redeliver
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl ManagerError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ManagerError::Validation(_) => false,
            ManagerError::Store(e) => e.is_retryable(),
        }
    }
}

// =========================================================================
// Manager
// =========================================================================

/// Records ledger transactions from ingestion commands
#[derive(Debug, Clone)]
pub struct Manager {
    repository: Repository,
    default_contract: String,
}

impl Manager {
    pub fn new(repository: Repository) -> Self {
        Self {
            repository,
            default_contract: String::new(),
        }
    }

    /// Contract tag applied when a command carries none
    pub fn with_default_contract(mut self, contract: impl Into<String>) -> Self {
        self.default_contract = contract.into();
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Validate the command and write its transaction once.
    ///
    /// An existing record for the same `(user_guid, tx)` short-circuits to
    /// [`RunOutcome::Duplicate`]. Runs racing past that check are settled
    /// by the conditional insert: only the run whose insert applied reports
    /// [`RunOutcome::Recorded`].
    pub async fn run(&self, command: &RecordTransaction) -> Result<RunOutcome, ManagerError> {
        let transaction = self.build(command)?;

        if let Some(existing) = self
            .repository
            .get(transaction.user_guid(), transaction.tx())
            .await?
        {
            tracing::info!(
                user_guid = existing.user_guid(),
                tx = %existing.tx(),
                "Transaction already recorded, skipping"
            );
            return Ok(RunOutcome::Duplicate(existing));
        }

        if !self.repository.insert(&transaction).await? {
            let existing = self
                .repository
                .get(transaction.user_guid(), transaction.tx())
                .await?
                .unwrap_or(transaction);

            tracing::info!(
                user_guid = existing.user_guid(),
                tx = %existing.tx(),
                "Transaction recorded concurrently, skipping"
            );
            return Ok(RunOutcome::Duplicate(existing));
        }

        tracing::info!(
            user_guid = transaction.user_guid(),
            tx = %transaction.tx(),
            wallet_address = %transaction.wallet_address(),
            contract = %transaction.contract(),
            amount = %transaction.amount(),
            "Transaction recorded"
        );

        Ok(RunOutcome::Recorded(transaction))
    }

    fn build(&self, command: &RecordTransaction) -> Result<Transaction, DomainError> {
        let user_guid = command.user_guid.ok_or(DomainError::MissingField("user_guid"))?;
        let timestamp = command.timestamp.ok_or(DomainError::MissingField("timestamp"))?;
        let wallet_address: WalletAddress = command
            .wallet_address
            .as_deref()
            .ok_or(DomainError::MissingField("wallet_address"))?
            .parse()?;
        let tx = command
            .tx
            .as_deref()
            .filter(|tx| !tx.is_empty())
            .ok_or(DomainError::MissingField("tx"))?;

        Transaction::builder()
            .user_guid(user_guid)
            .timestamp(timestamp)
            .wallet_address(wallet_address)
            .tx(tx)
            .contract(
                command
                    .contract
                    .clone()
                    .unwrap_or_else(|| self.default_contract.clone()),
            )
            .amount(command.amount.clone().unwrap_or_default())
            .completed(command.completed.unwrap_or(false))
            .data(command.data.clone().unwrap_or_default())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timestamp_from_unix;
    use crate::store::{MemoryStore, Prepared, Rows, StoreClient};
    use crate::transactions::repository::DEFAULT_TABLE;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn manager() -> (Arc<MemoryStore>, Manager) {
        let store = Arc::new(MemoryStore::new().with_table(DEFAULT_TABLE, &["user_guid", "tx"]));
        let manager = Manager::new(Repository::new(store.clone()));
        (store, manager)
    }

    fn command() -> RecordTransaction {
        RecordTransaction::new()
            .user_guid(123)
            .timestamp(timestamp_from_unix(1_700_000_000).unwrap())
            .wallet_address("0xWALLETADDR")
            .tx("0xtid")
    }

    /// Store whose every call fails like a lost connection
    struct UnavailableStore;

    #[async_trait]
    impl StoreClient for UnavailableStore {
        async fn request(&self, _query: &Prepared) -> Result<Rows, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn batch_request(&self, _queries: &[Prepared]) -> Result<(), StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    #[tokio::test]
    async fn test_run_records_transaction() {
        let (store, manager) = manager();

        let outcome = manager.run(&command()).await.unwrap();

        assert!(!outcome.is_duplicate());
        assert_eq!(outcome.transaction().tx(), "0xtid");
        assert!(outcome.transaction().amount().is_zero());
        assert!(!outcome.transaction().is_completed());
        assert_eq!(store.row_count(DEFAULT_TABLE), 1);
    }

    #[tokio::test]
    async fn test_run_twice_records_once() {
        let (store, manager) = manager();

        let first = manager.run(&command()).await.unwrap();
        let second = manager.run(&command()).await.unwrap();

        assert!(matches!(first, RunOutcome::Recorded(_)));
        assert!(matches!(second, RunOutcome::Duplicate(_)));
        assert_eq!(first.transaction(), second.transaction());
        assert_eq!(store.row_count(DEFAULT_TABLE), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_record_once() {
        let (store, manager) = manager();

        let (cmd_a, cmd_b) = (command(), command());
        let (a, b) = tokio::join!(manager.run(&cmd_a), manager.run(&cmd_b));

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(store.row_count(DEFAULT_TABLE), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_report_one_recorded() {
        let (store, manager) = manager();

        let (cmd_a, cmd_b) = (command(), command());
        let (a, b) = tokio::join!(manager.run(&cmd_a), manager.run(&cmd_b));
        let outcomes = [a.unwrap(), b.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| !o.is_duplicate()).count(), 1);
        assert_eq!(store.row_count(DEFAULT_TABLE), 1);
    }

    /// Reports no rows for the first lookup, as a run that checked just
    /// before another run's insert landed would see.
    struct StaleLookupStore {
        inner: MemoryStore,
        stale_lookups: AtomicU32,
    }

    #[async_trait]
    impl StoreClient for StaleLookupStore {
        async fn request(&self, query: &Prepared) -> Result<Rows, StoreError> {
            if query.string().starts_with("SELECT")
                && self
                    .stale_lookups
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Ok(Rows::empty());
            }
            self.inner.request(query).await
        }

        async fn batch_request(&self, queries: &[Prepared]) -> Result<(), StoreError> {
            self.inner.batch_request(queries).await
        }
    }

    #[tokio::test]
    async fn test_losing_insert_reports_duplicate() {
        let store = Arc::new(StaleLookupStore {
            inner: MemoryStore::new().with_table(DEFAULT_TABLE, &["user_guid", "tx"]),
            stale_lookups: AtomicU32::new(0),
        });
        let manager = Manager::new(Repository::new(store.clone()));

        let first = manager.run(&command()).await.unwrap();
        store.stale_lookups.store(1, Ordering::SeqCst);
        let second = manager.run(&command().amount(TokenAmount::from_u64(999))).await.unwrap();

        assert!(!first.is_duplicate());
        assert!(second.is_duplicate());
        assert!(second.transaction().amount().is_zero());
        assert_eq!(store.inner.row_count(DEFAULT_TABLE), 1);
    }

    #[tokio::test]
    async fn test_missing_fields_are_validation_errors() {
        let (store, manager) = manager();

        for (command, field) in [
            (RecordTransaction { user_guid: None, ..command() }, "user_guid"),
            (RecordTransaction { timestamp: None, ..command() }, "timestamp"),
            (RecordTransaction { wallet_address: None, ..command() }, "wallet_address"),
            (RecordTransaction { tx: Some(String::new()), ..command() }, "tx"),
        ] {
            let err = manager.run(&command).await.unwrap_err();
            assert!(!err.is_retryable());
            match err {
                ManagerError::Validation(DomainError::MissingField(missing)) => {
                    assert_eq!(missing, field)
                }
                other => panic!("Expected MissingField({}), got: {:?}", field, other),
            }
        }

        assert_eq!(store.row_count(DEFAULT_TABLE), 0);
    }

    #[tokio::test]
    async fn test_default_contract_and_supplied_fields() {
        let store = Arc::new(MemoryStore::new().with_table(DEFAULT_TABLE, &["user_guid", "tx"]));
        let manager =
            Manager::new(Repository::new(store.clone())).with_default_contract("offchain:plus");

        let outcome = manager
            .run(
                &command()
                    .wallet_address("offchain")
                    .amount(TokenAmount::scaled(1000, 18).unwrap())
                    .completed(true),
            )
            .await
            .unwrap();

        let recorded = outcome.transaction();
        assert_eq!(recorded.contract(), "offchain:plus");
        assert!(recorded.wallet_address().is_offchain());
        assert_eq!(recorded.amount().to_string(), "1000000000000000000000");
        assert!(recorded.is_completed());
    }

    #[tokio::test]
    async fn test_store_failure_is_retryable() {
        let manager = Manager::new(Repository::new(Arc::new(UnavailableStore)));

        let err = manager.run(&command()).await.unwrap_err();

        assert!(matches!(err, ManagerError::Store(_)));
        assert!(err.is_retryable());
    }
}
