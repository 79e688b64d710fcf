//! Statements and result rows
//!
//! Backend-neutral representation of a parameterized statement and the
//! rows it returns. Placeholders are written as `?` and bound in order.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::StoreError;

/// A bound value or a column value read back from the store
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    /// Arbitrary-precision integer, always scale 0
    Varint(BigDecimal),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn varint(value: impl Into<BigDecimal>) -> Self {
        Value::Varint(value.into().with_scale(0))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Varint(_) => "varint",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

/// A parameterized statement with its bound values and paging options
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    string: String,
    values: Vec<Value>,
    page_size: Option<u32>,
    paging_state: Option<String>,
}

impl Prepared {
    pub fn new(string: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            string: string.into(),
            values,
            page_size: None,
            paging_state: None,
        }
    }

    /// Rows per page. Zero is raised to one so paging always advances.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    pub fn with_paging_state(mut self, paging_state: Option<String>) -> Self {
        self.paging_state = paging_state;
        self
    }

    pub fn string(&self) -> &str {
        &self.string
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn page_size(&self) -> Option<u32> {
        self.page_size
    }

    pub fn paging_state(&self) -> Option<&str> {
        self.paging_state.as_deref()
    }

    /// Number of `?` placeholders in the statement text
    pub fn placeholder_count(&self) -> usize {
        self.string.matches('?').count()
    }

    /// Fail fast when placeholders and bound values disagree
    pub fn check_arity(&self) -> Result<(), StoreError> {
        let expected = self.placeholder_count();
        if expected != self.values.len() {
            return Err(StoreError::ArityMismatch {
                expected,
                found: self.values.len(),
            });
        }
        Ok(())
    }
}

/// One result row, keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    fn required(&self, column: &str) -> Result<&Value, StoreError> {
        self.get(column)
            .ok_or_else(|| StoreError::Decode(format!("missing column {}", column)))
    }

    fn mismatch(column: &str, expected: &str, found: &Value) -> StoreError {
        StoreError::Decode(format!(
            "column {} expected {}, found {}",
            column,
            expected,
            found.kind()
        ))
    }

    pub fn text(&self, column: &str) -> Result<&str, StoreError> {
        match self.required(column)? {
            Value::Text(value) => Ok(value),
            other => Err(Self::mismatch(column, "text", other)),
        }
    }

    /// Text column that may be NULL or absent
    pub fn optional_text(&self, column: &str) -> Result<Option<&str>, StoreError> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(value)) => Ok(Some(value)),
            Some(other) => Err(Self::mismatch(column, "text", other)),
        }
    }

    pub fn varint(&self, column: &str) -> Result<&BigDecimal, StoreError> {
        match self.required(column)? {
            Value::Varint(value) => Ok(value),
            other => Err(Self::mismatch(column, "varint", other)),
        }
    }

    pub fn boolean(&self, column: &str) -> Result<bool, StoreError> {
        match self.required(column)? {
            Value::Boolean(value) => Ok(*value),
            other => Err(Self::mismatch(column, "boolean", other)),
        }
    }

    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>, StoreError> {
        match self.required(column)? {
            Value::Timestamp(value) => Ok(*value),
            other => Err(Self::mismatch(column, "timestamp", other)),
        }
    }
}

/// Rows returned by a request, plus the continuation token if more remain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    rows: Vec<Row>,
    paging_state: Option<String>,
}

impl Rows {
    pub fn new(rows: Vec<Row>, paging_state: Option<String>) -> Self {
        Self { rows, paging_state }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    pub fn paging_state(&self) -> Option<&str> {
        self.paging_state.as_deref()
    }
}

impl IntoIterator for Rows {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Encode a row offset as an opaque paging token
pub fn encode_paging_state(offset: u64) -> String {
    hex::encode(offset.to_be_bytes())
}

/// Decode a paging token produced by [`encode_paging_state`]
pub fn decode_paging_state(state: &str) -> Result<u64, StoreError> {
    let bytes = hex::decode(state).map_err(|_| StoreError::InvalidPagingState(state.to_string()))?;
    let bytes: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::InvalidPagingState(state.to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}

/// Slice out one page starting at the token's offset.
///
/// Returns the page and the token for the next page, if any rows remain.
pub fn paginate<T>(
    items: Vec<T>,
    page_size: Option<u32>,
    paging_state: Option<&str>,
) -> Result<(Vec<T>, Option<String>), StoreError> {
    let offset = paging_state.map(decode_paging_state).transpose()?.unwrap_or(0);

    let Some(page_size) = page_size else {
        let page = items.into_iter().skip(offset as usize).collect();
        return Ok((page, None));
    };

    let page_size = page_size.max(1) as usize;
    let mut page: Vec<T> = items.into_iter().skip(offset as usize).take(page_size + 1).collect();
    let next = if page.len() > page_size {
        page.truncate(page_size);
        Some(encode_paging_state(offset + page_size as u64))
    } else {
        None
    };

    Ok((page, next))
}
