//! Database module
//!
//! Connectivity and schema checks. The schema itself lives in raw SQL
//! files under migrations/.

use sqlx::PgPool;

/// Columns the repository reads and writes
const LEDGER_COLUMNS: [&str; 8] = [
    "user_guid",
    "wallet_address",
    "timestamp",
    "tx",
    "contract",
    "amount",
    "completed",
    "data",
];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check that the ledger table exists with every column the repository uses
pub async fn check_schema(pool: &PgPool, table: &str) -> Result<bool, sqlx::Error> {
    let exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = 'public' AND table_name = $1
        )
        "#,
    )
    .bind(table)
    .fetch_one(pool)
    .await?;

    if !exists {
        tracing::error!("Required table '{}' does not exist", table);
        return Ok(false);
    }

    let columns: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT column_name::TEXT FROM information_schema.columns
        WHERE table_schema = 'public' AND table_name = $1
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    let missing: Vec<&str> = LEDGER_COLUMNS
        .iter()
        .copied()
        .filter(|column| !columns.iter().any(|c| c == column))
        .collect();

    if !missing.is_empty() {
        tracing::error!(table = %table, missing = ?missing, "Ledger table is missing columns");
        return Ok(false);
    }

    tracing::info!("Ledger table '{}' verified", table);
    Ok(true)
}
