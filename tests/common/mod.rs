//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

use blockchain_ledger::domain::timestamp_from_unix;
use blockchain_ledger::store::{Prepared, Rows};
use blockchain_ledger::transactions::repository::DEFAULT_TABLE;
use blockchain_ledger::{MemoryStore, Repository, StoreClient, StoreError, TokenAmount, Transaction};

const MIGRATION: &str = include_str!("../../migrations/0001_create_blockchain_transactions.sql");

/// Memory store that remembers every statement it was asked to run
#[derive(Debug)]
pub struct RecordingStore {
    inner: MemoryStore,
    requests: Mutex<Vec<Prepared>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new().with_table(DEFAULT_TABLE, &["user_guid", "tx"]),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Prepared> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<Prepared> {
        self.requests.lock().last().cloned()
    }

    pub fn row_count(&self) -> usize {
        self.inner.row_count(DEFAULT_TABLE)
    }
}

#[async_trait]
impl StoreClient for RecordingStore {
    async fn request(&self, query: &Prepared) -> Result<Rows, StoreError> {
        self.requests.lock().push(query.clone());
        self.inner.request(query).await
    }

    async fn batch_request(&self, queries: &[Prepared]) -> Result<(), StoreError> {
        self.requests.lock().extend(queries.iter().cloned());
        self.inner.batch_request(queries).await
    }
}

/// Repository over a fresh recording memory store
pub fn memory_repository() -> (Arc<RecordingStore>, Repository) {
    let store = Arc::new(RecordingStore::new());
    let repository = Repository::new(store.clone());
    (store, repository)
}

/// User guid no earlier run has written, so database tests need no cleanup
pub fn unique_user_guid() -> u64 {
    uuid::Uuid::new_v4().as_u64_pair().0
}

pub fn data(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// The `0xtid` transaction used across the ledger tests
pub fn sample_transaction() -> Transaction {
    Transaction::builder()
        .user_guid(123)
        .wallet_address("0xWALLETADDR")
        .timestamp(timestamp_from_unix(1_700_000_000).unwrap())
        .tx("0xtid")
        .contract("tokens:reward")
        .amount(TokenAmount::from_u64(50))
        .completed(false)
        .data(data(serde_json::json!({ "foo": "bar" })))
        .build()
        .unwrap()
}

/// Connect to the database named by DATABASE_URL and apply the ledger
/// migration. `None` when no database is configured.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    for statement in MIGRATION.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to apply migration");
    }

    Some(pool)
}
