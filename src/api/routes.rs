//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{TokenAmount, Transaction};
use crate::error::AppError;
use crate::queue::BlockchainTransactionsRunner;
use crate::transactions::{Repository, RunOutcome, TransactionFilter};

// =========================================================================
// State
// =========================================================================

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub repository: Repository,
    pub runner: BlockchainTransactionsRunner,
}

impl AppState {
    /// Build state around a runner; reads go through the runner's repository
    pub fn new(runner: BlockchainTransactionsRunner) -> Self {
        Self {
            repository: runner.manager().repository().clone(),
            runner,
        }
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListTransactionsQuery {
    /// Comma separated wallet addresses
    #[serde(default)]
    pub wallet_addresses: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub paging_state: Option<String>,
}

impl ListTransactionsQuery {
    /// Wallet addresses in the order given, blanks dropped
    pub fn addresses(&self) -> Vec<String> {
        self.wallet_addresses
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub user_guid: u64,
    pub wallet_address: String,
    pub timestamp: DateTime<Utc>,
    pub tx: String,
    pub contract: String,
    pub amount: TokenAmount,
    pub completed: bool,
    pub data: Map<String, Value>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(transaction: &Transaction) -> Self {
        Self {
            user_guid: transaction.user_guid(),
            wallet_address: transaction.wallet_address().to_string(),
            timestamp: transaction.timestamp(),
            tx: transaction.tx().to_string(),
            contract: transaction.contract().to_string(),
            amount: transaction.amount().clone(),
            completed: transaction.is_completed(),
            data: transaction.data().clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub user_guid: u64,
    pub transactions: Vec<TransactionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging_state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// `recorded` or `duplicate`
    pub status: &'static str,
    pub user_guid: u64,
    pub tx: String,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/users/:user_guid/transactions", get(list_transactions))
        .route("/users/:user_guid/transactions/:tx", get(get_transaction))
        .route("/queue/blockchain-transactions", post(ingest_transaction))
}

fn parse_user_guid(raw: &str) -> Result<u64, AppError> {
    raw.parse()
        .map_err(|_| AppError::InvalidRequest(format!("user_guid must be an unsigned integer: {}", raw)))
}

// =========================================================================
// GET /users/:user_guid/transactions
// =========================================================================

/// List a user's transactions, optionally restricted to wallet addresses
async fn list_transactions(
    State(state): State<AppState>,
    Path(user_guid): Path<String>,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<TransactionListResponse>, AppError> {
    let user_guid = parse_user_guid(&user_guid)?;

    let mut filter = TransactionFilter::new(user_guid)
        .with_wallet_addresses(query.addresses())
        .with_paging_state(query.paging_state.clone());

    if let Some(page_size) = query.page_size {
        if page_size == 0 {
            return Err(AppError::InvalidRequest("page_size must be positive".to_string()));
        }
        filter = filter.with_page_size(page_size);
    }

    let page = state.repository.get_list(&filter).await?;

    Ok(Json(TransactionListResponse {
        user_guid,
        transactions: page.transactions.iter().map(TransactionResponse::from).collect(),
        paging_state: page.paging_state,
    }))
}

// =========================================================================
// GET /users/:user_guid/transactions/:tx
// =========================================================================

/// Get one transaction by its `(user_guid, tx)` key
async fn get_transaction(
    State(state): State<AppState>,
    Path((user_guid, tx)): Path<(String, String)>,
) -> Result<Json<TransactionResponse>, AppError> {
    let user_guid = parse_user_guid(&user_guid)?;

    let transaction = state
        .repository
        .get(user_guid, &tx)
        .await?
        .ok_or_else(|| AppError::TransactionNotFound(tx.clone()))?;

    Ok(Json(TransactionResponse::from(&transaction)))
}

// =========================================================================
// POST /queue/blockchain-transactions
// =========================================================================

/// Push one queue message through the runner
async fn ingest_transaction(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let outcome = state.runner.process(&body).await.map_err(|e| {
        tracing::warn!(queue = %state.runner.queue(), error = %e, "Pushed message not recorded");
        AppError::from(e)
    })?;

    let status = match outcome {
        RunOutcome::Recorded(_) => "recorded",
        RunOutcome::Duplicate(_) => "duplicate",
    };
    let transaction = outcome.transaction();

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            status,
            user_guid: transaction.user_guid(),
            tx: transaction.tx().to_string(),
        }),
    ))
}
