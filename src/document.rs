//! Row, batch and document types flowing through the pipeline.
//!
//! ```text
//! SourceRow ──┐
//! SourceRow ──┼── Batch ──transform──▶ Vec<IndexDocument> + Watermark
//! SourceRow ──┘
//! ```

use crate::error::{ReplicationError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// One row from the source query, as a column-name → value object.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow(Map<String, Value>);

impl SourceRow {
    /// Wrap a column map.
    pub fn new(columns: Map<String, Value>) -> Self {
        Self(columns)
    }

    /// Build a row from a JSON value, which must be an object.
    pub fn from_json(value: Value) -> Result<Self> {
        match value {
            Value::Object(columns) => Ok(Self(columns)),
            other => Err(ReplicationError::Transform(format!(
                "source row must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Borrow all columns.
    pub fn columns(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the row, returning its columns.
    pub fn into_columns(self) -> Map<String, Value> {
        self.0
    }
}

/// A bounded, ordered, non-empty group of rows committed as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    rows: Vec<SourceRow>,
}

impl Batch {
    /// Create a batch. Returns `None` for an empty row set.
    pub fn new(rows: Vec<SourceRow>) -> Option<Self> {
        if rows.is_empty() {
            None
        } else {
            Some(Self { rows })
        }
    }

    /// Rows in source order.
    pub fn rows(&self) -> &[SourceRow] {
        &self.rows
    }

    /// The row with the highest modification timestamp.
    pub fn last(&self) -> &SourceRow {
        // Non-empty by construction.
        &self.rows[self.rows.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch has no rows. Never true for a batch built by
    /// [`Batch::new`].
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A row transformed for the destination index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDocument {
    /// Destination primary key (`_id`).
    pub id: String,
    /// Document body.
    pub body: Map<String, Value>,
}

/// Render a scalar identifier as a document key.
pub(crate) fn id_to_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
