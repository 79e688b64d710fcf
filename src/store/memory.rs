//! In-memory store
//!
//! A small wide-column emulator for tests and local runs. It understands
//! the statement shapes the ledger issues:
//!
//! - `INSERT INTO t (c1, ...) VALUES (?, ...) [IF NOT EXISTS]`
//! - `SELECT * FROM t [WHERE c = ? [AND c IN (?, ...)]...]`
//!
//! Rows are keyed by the table's primary key columns; a plain insert on an
//! existing key overwrites it, `IF NOT EXISTS` leaves it untouched.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::query::{paginate, Prepared, Row, Rows, Value};
use super::{StoreClient, StoreError};

/// Column reported by conditional inserts
pub const APPLIED_COLUMN: &str = "[applied]";

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Eq(String),
    In(String, usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Insert {
        table: String,
        columns: Vec<String>,
        if_not_exists: bool,
    },
    Select {
        table: String,
        predicates: Vec<Predicate>,
    },
}

#[derive(Debug, Default)]
struct MemoryTable {
    key_columns: Vec<String>,
    rows: Vec<Row>,
}

impl MemoryTable {
    fn key_of(&self, row: &Row) -> Result<Vec<Value>, StoreError> {
        self.key_columns
            .iter()
            .map(|column| {
                row.get(column).cloned().ok_or_else(|| {
                    StoreError::UnsupportedStatement(format!("missing key column {}", column))
                })
            })
            .collect()
    }

    fn position(&self, key: &[Value]) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| self.key_of(row).map(|k| k == key).unwrap_or(false))
    }
}

/// Wide-column emulator backed by a mutex-guarded map of tables
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, MemoryTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemoryStore::create_table`]
    pub fn with_table(self, name: &str, key_columns: &[&str]) -> Self {
        self.create_table(name, key_columns);
        self
    }

    pub fn create_table(&self, name: &str, key_columns: &[&str]) {
        self.tables.lock().insert(
            name.to_string(),
            MemoryTable {
                key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
    }

    /// Number of rows in a table (0 for unknown tables)
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map(|t| t.rows.len()).unwrap_or(0)
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn request(&self, query: &Prepared) -> Result<Rows, StoreError> {
        query.check_arity()?;
        let statement = parse(query.string())?;
        let mut tables = self.tables.lock();

        match statement {
            Statement::Insert {
                table,
                columns,
                if_not_exists,
            } => {
                let target = tables
                    .get_mut(&table)
                    .ok_or_else(|| StoreError::UnknownTable(table.clone()))?;
                let (row, key) = build_row(target, &columns, query.values())?;
                let applied = apply_insert(target, row, key, if_not_exists);
                let result = Row::new().with(APPLIED_COLUMN, Value::Boolean(applied));
                Ok(Rows::new(vec![result], None))
            }
            Statement::Select { table, predicates } => {
                let source = tables
                    .get(&table)
                    .ok_or_else(|| StoreError::UnknownTable(table.clone()))?;
                let matched: Vec<Row> = source
                    .rows
                    .iter()
                    .filter(|row| row_matches(row, &predicates, query.values()))
                    .cloned()
                    .collect();
                let (page, next) = paginate(matched, query.page_size(), query.paging_state())?;
                Ok(Rows::new(page, next))
            }
        }
    }

    async fn batch_request(&self, queries: &[Prepared]) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();

        // Validate every statement before touching any table
        let mut pending = Vec::with_capacity(queries.len());
        for query in queries {
            query.check_arity()?;
            match parse(query.string())? {
                Statement::Insert {
                    table,
                    columns,
                    if_not_exists,
                } => {
                    let target = tables
                        .get(&table)
                        .ok_or_else(|| StoreError::UnknownTable(table.clone()))?;
                    let (row, key) = build_row(target, &columns, query.values())?;
                    pending.push((table, row, key, if_not_exists));
                }
                Statement::Select { .. } => {
                    return Err(StoreError::UnsupportedStatement(
                        "SELECT inside a batch".to_string(),
                    ));
                }
            }
        }

        for (table, row, key, if_not_exists) in pending {
            if let Some(target) = tables.get_mut(&table) {
                apply_insert(target, row, key, if_not_exists);
            }
        }

        Ok(())
    }
}

fn build_row(
    table: &MemoryTable,
    columns: &[String],
    values: &[Value],
) -> Result<(Row, Vec<Value>), StoreError> {
    let mut row = Row::new();
    for (column, value) in columns.iter().zip(values) {
        row.insert(column.clone(), value.clone());
    }
    let key = table.key_of(&row)?;
    Ok((row, key))
}

fn apply_insert(table: &mut MemoryTable, row: Row, key: Vec<Value>, if_not_exists: bool) -> bool {
    match table.position(&key) {
        Some(_) if if_not_exists => false,
        Some(idx) => {
            table.rows[idx] = row;
            true
        }
        None => {
            table.rows.push(row);
            true
        }
    }
}

fn row_matches(row: &Row, predicates: &[Predicate], values: &[Value]) -> bool {
    let mut values = values.iter();
    predicates.iter().all(|predicate| match predicate {
        Predicate::Eq(column) => {
            let expected = values.next();
            row.get(column).is_some() && row.get(column) == expected
        }
        Predicate::In(column, count) => {
            let candidates: Vec<&Value> = values.by_ref().take(*count).collect();
            row.get(column)
                .map(|actual| candidates.contains(&actual))
                .unwrap_or(false)
        }
    })
}

// =========================================================================
// Statement parsing
// =========================================================================

fn unsupported(query: &str) -> StoreError {
    StoreError::UnsupportedStatement(query.to_string())
}

fn parse(query: &str) -> Result<Statement, StoreError> {
    let normalized = query.split_whitespace().collect::<Vec<_>>().join(" ");
    let upper = normalized.to_ascii_uppercase();

    if upper.starts_with("INSERT INTO ") {
        parse_insert(&normalized["INSERT INTO ".len()..]).ok_or_else(|| unsupported(query))
    } else if upper.starts_with("SELECT * FROM ") {
        parse_select(&normalized["SELECT * FROM ".len()..]).ok_or_else(|| unsupported(query))
    } else {
        Err(unsupported(query))
    }
}

/// Count a parenthesised `(?, ?, ...)` list
fn placeholder_list(list: &str) -> Option<usize> {
    let inner = list.trim().strip_prefix('(')?.strip_suffix(')')?;
    let mut count = 0;
    for item in inner.split(',') {
        if item.trim() != "?" {
            return None;
        }
        count += 1;
    }
    Some(count)
}

fn parse_insert(rest: &str) -> Option<Statement> {
    let open = rest.find('(')?;
    let close = open + rest[open..].find(')')?;
    let table = rest[..open].trim().to_string();
    let columns: Vec<String> = rest[open + 1..close]
        .split(',')
        .map(|c| c.trim().to_string())
        .collect();
    if table.is_empty() || columns.iter().any(|c| c.is_empty()) {
        return None;
    }

    let after = rest[close + 1..].trim();
    if !after.to_ascii_uppercase().starts_with("VALUES") {
        return None;
    }
    let after = after["VALUES".len()..].trim();
    let values_end = after.find(')')?;
    let count = placeholder_list(&after[..=values_end])?;
    if count != columns.len() {
        return None;
    }

    let if_not_exists = match after[values_end + 1..].trim().to_ascii_uppercase().as_str() {
        "" => false,
        "IF NOT EXISTS" => true,
        _ => return None,
    };

    Some(Statement::Insert {
        table,
        columns,
        if_not_exists,
    })
}

fn parse_select(rest: &str) -> Option<Statement> {
    let upper = rest.to_ascii_uppercase();
    let (table, clause) = match upper.find(" WHERE ") {
        Some(pos) => (&rest[..pos], Some(&rest[pos + " WHERE ".len()..])),
        None => (rest, None),
    };
    let table = table.trim().to_string();
    if table.is_empty() || table.contains(' ') {
        return None;
    }

    let mut predicates = Vec::new();
    if let Some(clause) = clause {
        for part in split_and(clause) {
            predicates.push(parse_predicate(part)?);
        }
    }

    Some(Statement::Select { table, predicates })
}

fn split_and(clause: &str) -> Vec<&str> {
    let upper = clause.to_ascii_uppercase();
    let mut parts = Vec::new();
    let mut start = 0;
    while let Some(pos) = upper[start..].find(" AND ") {
        parts.push(&clause[start..start + pos]);
        start += pos + " AND ".len();
    }
    parts.push(&clause[start..]);
    parts
}

fn parse_predicate(part: &str) -> Option<Predicate> {
    let upper = part.to_ascii_uppercase();
    if let Some(pos) = upper.find(" IN ") {
        let column = part[..pos].trim();
        let count = placeholder_list(&part[pos + " IN ".len()..])?;
        if column.is_empty() || count == 0 {
            return None;
        }
        return Some(Predicate::In(column.to_string(), count));
    }

    let (column, rhs) = part.split_once('=')?;
    let column = column.trim();
    if column.is_empty() || rhs.trim() != "?" {
        return None;
    }
    Some(Predicate::Eq(column.to_string()))
}
