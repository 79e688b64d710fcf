//! PostgreSQL store
//!
//! Runs ledger statements against PostgreSQL through a shared `PgPool`.
//! Statements are written with `?` placeholders and conditional inserts
//! use `IF NOT EXISTS`; both are rewritten to their Postgres forms here.
//! Placeholders are recognised anywhere in the text, so statements must
//! not carry literal `?` characters; values are always bound.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, TypeInfo};

use super::memory::APPLIED_COLUMN;
use super::query::{decode_paging_state, encode_paging_state, Prepared, Row, Rows, Value};
use super::{StoreClient, StoreError};

const IF_NOT_EXISTS: &str = " IF NOT EXISTS";

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Rewrite a statement into Postgres SQL.
///
/// `?` becomes `$1..$n`, a trailing `IF NOT EXISTS` becomes
/// `ON CONFLICT DO NOTHING`, and paged selects get an order plus `LIMIT`/`OFFSET`
/// (one extra row is fetched to detect a following page).
pub(crate) fn to_postgres_sql(query: &Prepared) -> Result<String, StoreError> {
    let mut sql = String::with_capacity(query.string().len() + 16);
    let mut index = 0;
    for ch in query.string().trim().chars() {
        if ch == '?' {
            index += 1;
            sql.push('$');
            sql.push_str(&index.to_string());
        } else {
            sql.push(ch);
        }
    }

    if sql.to_ascii_uppercase().ends_with(IF_NOT_EXISTS) {
        sql.truncate(sql.len() - IF_NOT_EXISTS.len());
        sql.push_str(" ON CONFLICT DO NOTHING");
    }

    if let Some(page_size) = query.page_size() {
        let offset = query
            .paging_state()
            .map(decode_paging_state)
            .transpose()?
            .unwrap_or(0);
        // Rows are never updated, so physical order is stable across pages
        if !sql.to_ascii_uppercase().contains(" ORDER BY ") {
            sql.push_str(" ORDER BY ctid");
        }
        sql.push_str(&format!(" LIMIT {} OFFSET {}", page_size as u64 + 1, offset));
    }

    Ok(sql)
}

fn is_write(query: &Prepared) -> bool {
    query.string().trim_start().to_ascii_uppercase().starts_with("INSERT")
}

fn bind_values<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Boolean(value) => query.bind(*value),
            Value::Varint(value) => query.bind(value.clone()),
            Value::Text(value) => query.bind(value.clone()),
            Value::Timestamp(value) => query.bind(*value),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Row, StoreError> {
    let mut decoded = Row::new();

    for column in row.columns() {
        let idx = column.ordinal();
        let type_name = column.type_info().name();
        let value = match type_name {
            "NUMERIC" => row
                .try_get::<Option<BigDecimal>, _>(idx)?
                .map(Value::varint),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)?
                .map(|v| Value::varint(BigDecimal::from(v))),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)?
                .map(|v| Value::varint(BigDecimal::from(v))),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<Option<String>, _>(idx)?.map(Value::Text)
            }
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)?
                .map(Value::Timestamp),
            "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(Value::Boolean),
            other => {
                return Err(StoreError::Decode(format!(
                    "column {} has unsupported type {}",
                    column.name(),
                    other
                )))
            }
        };
        decoded.insert(column.name(), value.unwrap_or(Value::Null));
    }

    Ok(decoded)
}

#[async_trait]
impl StoreClient for PgStore {
    async fn request(&self, query: &Prepared) -> Result<Rows, StoreError> {
        query.check_arity()?;
        let sql = to_postgres_sql(query)?;

        if is_write(query) {
            let applied = bind_values(sqlx::query(&sql), query.values())
                .execute(&self.pool)
                .await?
                .rows_affected()
                > 0;
            let result = Row::new().with(APPLIED_COLUMN, Value::Boolean(applied));
            return Ok(Rows::new(vec![result], None));
        }

        let fetched = bind_values(sqlx::query(&sql), query.values())
            .fetch_all(&self.pool)
            .await?;
        let mut rows = fetched
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;

        let mut next = None;
        if let Some(page_size) = query.page_size() {
            let page_size = page_size as usize;
            if rows.len() > page_size {
                rows.truncate(page_size);
                let offset = query
                    .paging_state()
                    .map(decode_paging_state)
                    .transpose()?
                    .unwrap_or(0);
                next = Some(encode_paging_state(offset + page_size as u64));
            }
        }

        tracing::debug!(rows = rows.len(), has_more = next.is_some(), "Store request completed");

        Ok(Rows::new(rows, next))
    }

    async fn batch_request(&self, queries: &[Prepared]) -> Result<(), StoreError> {
        // Validate everything before opening a transaction
        let statements = queries
            .iter()
            .map(|query| {
                query.check_arity()?;
                to_postgres_sql(query).map(|sql| (sql, query))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let mut tx = self.pool.begin().await?;

        for (sql, query) in &statements {
            bind_values(sqlx::query(sql), query.values())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(statements = statements.len(), "Batch committed");

        Ok(())
    }
}
