//! Transactions Repository
//!
//! Maps ledger transactions to and from store rows and builds the
//! statements used to write and read them.

use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

use crate::domain::{TokenAmount, Transaction, WalletAddress};
use crate::store::{Prepared, Row, StoreClient, StoreError, Value, APPLIED_COLUMN};

/// Default ledger table
pub const DEFAULT_TABLE: &str = "blockchain_transactions";

/// Default number of rows per page for list queries
pub const DEFAULT_PAGE_SIZE: u32 = 50;

const COLUMNS: [&str; 8] = [
    "user_guid",
    "wallet_address",
    "timestamp",
    "tx",
    "contract",
    "amount",
    "completed",
    "data",
];

/// Filter for [`Repository::get_list`]
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFilter {
    pub user_guid: u64,
    pub wallet_addresses: Vec<String>,
    pub page_size: Option<u32>,
    pub paging_state: Option<String>,
}

impl TransactionFilter {
    pub fn new(user_guid: u64) -> Self {
        Self {
            user_guid,
            wallet_addresses: Vec::new(),
            page_size: None,
            paging_state: None,
        }
    }

    pub fn with_wallet_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wallet_addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Rows per page, at least one
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    pub fn with_paging_state(mut self, paging_state: Option<String>) -> Self {
        self.paging_state = paging_state;
        self
    }
}

/// One page of [`Repository::get_list`] results
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    /// Opaque continuation token; `None` on the last page
    pub paging_state: Option<String>,
}

/// Repository for ledger transactions
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn StoreClient>,
    table: String,
    page_size: u32,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.table)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl Repository {
    /// Create a repository over the default table
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self {
            store,
            table: DEFAULT_TABLE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Write one transaction.
    ///
    /// A record that already exists for `(user_guid, tx)` is left untouched
    /// and the call still succeeds.
    pub async fn add(&self, transaction: &Transaction) -> Result<(), StoreError> {
        self.add_batch(std::slice::from_ref(transaction)).await
    }

    /// Write one transaction unless `(user_guid, tx)` already exists.
    ///
    /// Returns `false` when an existing record kept its place and nothing
    /// was written. Stores that do not report the outcome count as applied.
    pub async fn insert(&self, transaction: &Transaction) -> Result<bool, StoreError> {
        let rows = self.store.request(&self.insert_statement(transaction)?).await?;

        let applied = match rows.first() {
            Some(row) if row.get(APPLIED_COLUMN).is_some() => row.boolean(APPLIED_COLUMN)?,
            _ => true,
        };

        tracing::debug!(
            table = %self.table,
            tx = %transaction.tx(),
            applied,
            "Transaction insert"
        );

        Ok(applied)
    }

    /// Write several independent transactions in one all-or-nothing batch.
    pub async fn add_batch(&self, transactions: &[Transaction]) -> Result<(), StoreError> {
        if transactions.is_empty() {
            return Ok(());
        }

        let requests = transactions
            .iter()
            .map(|transaction| self.insert_statement(transaction))
            .collect::<Result<Vec<_>, _>>()?;

        self.store.batch_request(&requests).await?;

        tracing::debug!(
            table = %self.table,
            count = transactions.len(),
            "Transactions written"
        );

        Ok(())
    }

    /// Build the conditional insert for one transaction
    pub fn insert_statement(&self, transaction: &Transaction) -> Result<Prepared, StoreError> {
        let string = format!(
            "INSERT INTO {} ({}) VALUES ({}) IF NOT EXISTS",
            self.table,
            COLUMNS.join(", "),
            vec!["?"; COLUMNS.len()].join(", ")
        );

        let values = vec![
            Value::varint(transaction.user_guid()),
            Value::text(transaction.wallet_address().as_str()),
            Value::Timestamp(transaction.timestamp()),
            Value::text(transaction.tx()),
            Value::text(transaction.contract()),
            Value::Varint(transaction.amount().value().clone()),
            Value::Boolean(transaction.is_completed()),
            Value::Text(encode_data(transaction.data())?),
        ];

        Ok(Prepared::new(string, values))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Look up one transaction. Zero matching rows is `Ok(None)`.
    pub async fn get(&self, user_guid: u64, tx: &str) -> Result<Option<Transaction>, StoreError> {
        let rows = self.store.request(&self.lookup_statement(user_guid, tx)).await?;

        rows.first().map(transaction_from_row).transpose()
    }

    /// Point query on `tx` then `user_guid`
    pub fn lookup_statement(&self, user_guid: u64, tx: &str) -> Prepared {
        Prepared::new(
            format!("SELECT * FROM {} WHERE tx = ? AND user_guid = ?", self.table),
            vec![Value::text(tx), Value::varint(user_guid)],
        )
    }

    /// List a user's transactions, optionally restricted to wallet addresses.
    pub async fn get_list(&self, filter: &TransactionFilter) -> Result<TransactionPage, StoreError> {
        let rows = self.store.request(&self.list_statement(filter)).await?;
        let paging_state = rows.paging_state().map(str::to_string);

        let transactions = rows
            .iter()
            .map(transaction_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TransactionPage {
            transactions,
            paging_state,
        })
    }

    /// Build the list query.
    ///
    /// One address uses `wallet_address = ?`; several use
    /// `wallet_address IN (?, ...)` in the order given. `user_guid` is
    /// always the first bound value.
    pub fn list_statement(&self, filter: &TransactionFilter) -> Prepared {
        let mut string = format!("SELECT * FROM {} WHERE user_guid = ?", self.table);
        let mut values = vec![Value::varint(filter.user_guid)];

        match filter.wallet_addresses.len() {
            0 => {}
            1 => string.push_str(" AND wallet_address = ?"),
            n => {
                string.push_str(" AND wallet_address IN (");
                string.push_str(&vec!["?"; n].join(", "));
                string.push(')');
            }
        }
        values.extend(filter.wallet_addresses.iter().map(|a| Value::text(a.as_str())));

        Prepared::new(string, values)
            .with_page_size(filter.page_size.unwrap_or(self.page_size).max(1))
            .with_paging_state(filter.paging_state.clone())
    }
}

/// Serialize the data blob. No data is stored as JSON `null`.
fn encode_data(data: &Map<String, JsonValue>) -> Result<String, StoreError> {
    if data.is_empty() {
        return Ok("null".to_string());
    }
    Ok(serde_json::to_string(data)?)
}

fn decode_data(raw: Option<&str>) -> Result<Map<String, JsonValue>, StoreError> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };

    match serde_json::from_str::<JsonValue>(raw)? {
        JsonValue::Object(map) => Ok(map),
        JsonValue::Null => Ok(Map::new()),
        JsonValue::Array(items) if items.is_empty() => Ok(Map::new()),
        other => Err(StoreError::Decode(format!(
            "data column is not an object: {}",
            other
        ))),
    }
}

/// Map a store row back into a transaction
pub fn transaction_from_row(row: &Row) -> Result<Transaction, StoreError> {
    let user_guid = row.varint("user_guid")?;
    let user_guid: u64 = user_guid
        .with_scale(0)
        .to_string()
        .parse()
        .map_err(|_| StoreError::Decode(format!("user_guid out of range: {}", user_guid)))?;

    let amount = TokenAmount::new(row.varint("amount")?.clone())
        .map_err(|e| StoreError::Decode(e.to_string()))?;

    Transaction::builder()
        .user_guid(user_guid)
        .wallet_address(WalletAddress::from(row.text("wallet_address")?))
        .timestamp(row.timestamp("timestamp")?)
        .tx(row.text("tx")?)
        .contract(row.optional_text("contract")?.unwrap_or_default())
        .amount(amount)
        .completed(row.boolean("completed")?)
        .data(decode_data(row.optional_text("data")?)?)
        .build()
        .map_err(|e| StoreError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::timestamp_from_unix;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn memory_repository() -> (Arc<MemoryStore>, Repository) {
        let store = Arc::new(MemoryStore::new().with_table(DEFAULT_TABLE, &["user_guid", "tx"]));
        let repository = Repository::new(store.clone());
        (store, repository)
    }

    fn sample_transaction() -> Transaction {
        Transaction::builder()
            .user_guid(123)
            .wallet_address("0xWALLETADDR")
            .timestamp(timestamp_from_unix(1_700_000_000).unwrap())
            .tx("0xtid")
            .contract("tokens:reward")
            .amount(50u64)
            .data(json!({ "foo": "bar" }).as_object().cloned().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_insert_statement_values() {
        let (_, repository) = memory_repository();
        let transaction = sample_transaction();

        let statement = repository.insert_statement(&transaction).unwrap();

        assert_eq!(
            statement.string(),
            "INSERT INTO blockchain_transactions (user_guid, wallet_address, timestamp, tx, contract, amount, completed, data) VALUES (?, ?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS"
        );
        assert_eq!(
            statement.values(),
            &[
                Value::varint(123u64),
                Value::text("0xWALLETADDR"),
                Value::Timestamp(transaction.timestamp()),
                Value::text("0xtid"),
                Value::text("tokens:reward"),
                Value::varint(50u64),
                Value::Boolean(false),
                Value::text(r#"{"foo":"bar"}"#),
            ]
        );
    }

    #[test]
    fn test_empty_data_encoded_as_null() {
        let (_, repository) = memory_repository();
        let transaction = Transaction::builder()
            .user_guid(1)
            .wallet_address("offchain")
            .tx("cc:sub_1")
            .build()
            .unwrap();

        let statement = repository.insert_statement(&transaction).unwrap();
        assert_eq!(statement.values()[7], Value::text("null"));
    }

    #[test]
    fn test_lookup_statement_binds_tx_first() {
        let (_, repository) = memory_repository();
        let statement = repository.lookup_statement(123, "0xtid");

        assert_eq!(
            statement.string(),
            "SELECT * FROM blockchain_transactions WHERE tx = ? AND user_guid = ?"
        );
        assert_eq!(statement.values(), &[Value::text("0xtid"), Value::varint(123u64)]);
    }

    #[test]
    fn test_list_statement_multiple_addresses_uses_in() {
        let (_, repository) = memory_repository();
        let filter =
            TransactionFilter::new(123).with_wallet_addresses(["offchain", "0xWALLETADDR"]);

        let statement = repository.list_statement(&filter);

        assert_eq!(
            statement.string(),
            "SELECT * FROM blockchain_transactions WHERE user_guid = ? AND wallet_address IN (?, ?)"
        );
        assert_eq!(
            statement.values(),
            &[
                Value::varint(123u64),
                Value::text("offchain"),
                Value::text("0xWALLETADDR"),
            ]
        );
    }

    #[test]
    fn test_list_statement_single_address_uses_equality() {
        let (_, repository) = memory_repository();
        let filter = TransactionFilter::new(123).with_wallet_addresses(["0xADDR"]);

        let statement = repository.list_statement(&filter);

        assert_eq!(
            statement.string(),
            "SELECT * FROM blockchain_transactions WHERE user_guid = ? AND wallet_address = ?"
        );
        assert!(!statement.string().contains(" IN "));
        assert_eq!(statement.values(), &[Value::varint(123u64), Value::text("0xADDR")]);
    }

    #[test]
    fn test_list_statement_without_addresses() {
        let (_, repository) = memory_repository();
        let statement = repository.list_statement(&TransactionFilter::new(7));

        assert_eq!(
            statement.string(),
            "SELECT * FROM blockchain_transactions WHERE user_guid = ?"
        );
        assert_eq!(statement.page_size(), Some(DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn test_decode_data_variants() {
        assert!(decode_data(None).unwrap().is_empty());
        assert!(decode_data(Some("null")).unwrap().is_empty());
        assert!(decode_data(Some("[]")).unwrap().is_empty());
        assert!(decode_data(Some("{}")).unwrap().is_empty());
        assert_eq!(
            decode_data(Some(r#"{"foo":"bar"}"#)).unwrap().get("foo"),
            Some(&json!("bar"))
        );
        assert!(matches!(decode_data(Some("42")), Err(StoreError::Decode(_))));
        assert!(matches!(
            decode_data(Some("{not json")),
            Err(StoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_transaction_from_row_rejects_negative_amount() {
        let row = Row::new()
            .with("user_guid", Value::varint(1u64))
            .with("wallet_address", Value::text("offchain"))
            .with("timestamp", Value::Timestamp(timestamp_from_unix(0).unwrap()))
            .with("tx", Value::text("0xtid"))
            .with("contract", Value::text(""))
            .with("amount", Value::varint(bigdecimal::BigDecimal::from(-5i64)))
            .with("completed", Value::Boolean(false))
            .with("data", Value::Null);

        assert!(matches!(transaction_from_row(&row), Err(StoreError::Decode(_))));
    }

    #[tokio::test]
    async fn test_add_then_get_round_trip() {
        let (_, repository) = memory_repository();
        let transaction = sample_transaction();

        repository.add(&transaction).await.unwrap();
        let found = repository.get(123, "0xtid").await.unwrap().unwrap();

        assert_eq!(found, transaction);
        assert_eq!(found.amount().to_string(), "50");
        assert!(!found.is_completed());
        assert_eq!(found.data().get("foo"), Some(&json!("bar")));
    }

    #[tokio::test]
    async fn test_round_trip_amount_beyond_u64() {
        let (_, repository) = memory_repository();
        let transaction = Transaction::builder()
            .user_guid(u64::MAX)
            .wallet_address("offchain")
            .tx("cc:sub_42")
            .contract("offchain:plus")
            .amount(TokenAmount::scaled(50, 18).unwrap())
            .completed(true)
            .build()
            .unwrap();

        repository.add(&transaction).await.unwrap();
        let found = repository.get(u64::MAX, "cc:sub_42").await.unwrap().unwrap();

        assert_eq!(found, transaction);
        assert_eq!(found.amount().to_string(), "50000000000000000000");
        assert!(found.wallet_address().is_offchain());
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let (_, repository) = memory_repository();
        assert!(repository.get(999, "nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_existing_pair_is_noop() {
        let (store, repository) = memory_repository();
        let transaction = sample_transaction();
        let replay = Transaction::builder()
            .user_guid(123)
            .wallet_address("0xOTHER")
            .tx("0xtid")
            .amount(999u64)
            .build()
            .unwrap();

        repository.add(&transaction).await.unwrap();
        repository.add(&replay).await.unwrap();

        assert_eq!(store.row_count(DEFAULT_TABLE), 1);
        let found = repository.get(123, "0xtid").await.unwrap().unwrap();
        assert_eq!(found.amount().to_string(), "50");
    }

    #[tokio::test]
    async fn test_get_list_filters_and_pages() {
        let (_, repository) = memory_repository();
        let mut batch = Vec::new();
        for (i, wallet) in ["offchain", "0xA", "0xB", "offchain", "0xA"].iter().enumerate() {
            batch.push(
                Transaction::builder()
                    .user_guid(123)
                    .wallet_address(*wallet)
                    .tx(format!("0x{}", i))
                    .build()
                    .unwrap(),
            );
        }
        batch.push(
            Transaction::builder()
                .user_guid(456)
                .wallet_address("offchain")
                .tx("0xother")
                .build()
                .unwrap(),
        );
        repository.add_batch(&batch).await.unwrap();

        let all = repository.get_list(&TransactionFilter::new(123)).await.unwrap();
        assert_eq!(all.transactions.len(), 5);
        assert!(all.paging_state.is_none());

        let filter = TransactionFilter::new(123).with_wallet_addresses(["offchain", "0xB"]);
        let some = repository.get_list(&filter).await.unwrap();
        assert_eq!(some.transactions.len(), 3);

        let filter = TransactionFilter::new(123).with_page_size(2);
        let first = repository.get_list(&filter).await.unwrap();
        assert_eq!(first.transactions.len(), 2);
        let second = repository
            .get_list(&filter.clone().with_paging_state(first.paging_state))
            .await
            .unwrap();
        assert_eq!(second.transactions.len(), 2);
        assert_eq!(second.transactions[0].tx(), "0x2");
    }

    #[tokio::test]
    async fn test_insert_reports_whether_applied() {
        let (store, repository) = memory_repository();
        let transaction = sample_transaction();

        assert!(repository.insert(&transaction).await.unwrap());
        assert!(!repository.insert(&transaction).await.unwrap());
        assert_eq!(store.row_count(DEFAULT_TABLE), 1);
    }

    #[tokio::test]
    async fn test_zero_page_size_still_reaches_every_row() {
        let (_, repository) = memory_repository();
        let batch: Vec<Transaction> = (0..3)
            .map(|i| {
                Transaction::builder()
                    .user_guid(123)
                    .wallet_address("offchain")
                    .tx(format!("0x{}", i))
                    .build()
                    .unwrap()
            })
            .collect();
        repository.add_batch(&batch).await.unwrap();

        let filter = TransactionFilter::new(123).with_page_size(0);
        assert_eq!(filter.page_size, Some(1));

        let mut seen = Vec::new();
        let mut paging_state = None;
        for _ in 0..10 {
            let page = repository
                .get_list(&filter.clone().with_paging_state(paging_state))
                .await
                .unwrap();
            assert_eq!(page.transactions.len(), 1);
            seen.extend(page.transactions.iter().map(|t| t.tx().to_string()));
            paging_state = page.paging_state;
            if paging_state.is_none() {
                break;
            }
        }

        assert_eq!(seen, vec!["0x0", "0x1", "0x2"]);
        assert!(paging_state.is_none());
    }

    #[test]
    fn test_list_statement_never_asks_for_empty_pages() {
        let repository = Repository::new(Arc::new(MemoryStore::new()));
        let filter = TransactionFilter {
            page_size: Some(0),
            ..TransactionFilter::new(123)
        };

        assert_eq!(repository.list_statement(&filter).page_size(), Some(1));
    }

    #[tokio::test]
    async fn test_add_batch_empty_is_noop() {
        let (store, repository) = memory_repository();
        repository.add_batch(&[]).await.unwrap();
        assert_eq!(store.row_count(DEFAULT_TABLE), 0);
    }
}
