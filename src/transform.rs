//! Row → document mapping.
//!
//! Pure and synchronous. For every row the timestamp column is dropped from
//! the body and the identifier becomes the document `_id` (it also stays in
//! the body). The batch watermark is the timestamp of its last row, which is
//! the batch maximum because rows arrive ordered by timestamp.
//!
//! Alongside the documents the transformer reports [`BatchBounds`]: the
//! earliest and last timestamps of the batch and the latest timestamp strictly
//! below the last one. Rows tied on the last timestamp may continue into the
//! next batch, so only `settled` is known to be complete when the batch lands.

use crate::document::{id_to_key, json_kind, Batch, IndexDocument, SourceRow};
use crate::error::{ReplicationError, Result};
use crate::watermark::Watermark;

/// Timestamp bounds of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBounds {
    /// Earliest timestamp in the batch.
    pub first: Watermark,
    /// Latest timestamp strictly below `last`, if any row carries one.
    pub settled: Option<Watermark>,
    /// Timestamp of the last row.
    pub last: Watermark,
}

/// Maps source rows to index documents.
#[derive(Debug, Clone)]
pub struct Transformer {
    id_field: String,
    watermark_field: String,
}

impl Transformer {
    pub fn new(id_field: impl Into<String>, watermark_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            watermark_field: watermark_field.into(),
        }
    }

    /// Transform a batch into documents plus the timestamp bounds that decide
    /// what may be committed once the documents are written.
    pub fn transform(&self, batch: &Batch) -> Result<(Vec<IndexDocument>, BatchBounds)> {
        let documents = batch
            .rows()
            .iter()
            .map(|row| self.document(row))
            .collect::<Result<Vec<_>>>()?;

        let bounds = self.bounds(batch)?;
        Ok((documents, bounds))
    }

    /// Timestamp bounds of a batch. Every row must carry a valid timestamp.
    pub fn bounds(&self, batch: &Batch) -> Result<BatchBounds> {
        let last = self.row_watermark(batch.last())?;
        let mut first = last;
        let mut settled: Option<Watermark> = None;

        for row in batch.rows() {
            let ts = self.row_watermark(row)?;
            first = first.min(ts);
            if ts < last {
                settled = Some(settled.map_or(ts, |s| s.max(ts)));
            }
        }

        Ok(BatchBounds { first, settled, last })
    }

    /// Transform a single row.
    pub fn document(&self, row: &SourceRow) -> Result<IndexDocument> {
        let id = row
            .get(&self.id_field)
            .and_then(id_to_key)
            .ok_or_else(|| {
                let found = row.get(&self.id_field).map(json_kind).unwrap_or("nothing");
                ReplicationError::Transform(format!(
                    "row field {:?} must be a non-empty string or number, found {found}",
                    self.id_field
                ))
            })?;

        let mut body = row.columns().clone();
        body.remove(&self.watermark_field);

        Ok(IndexDocument { id, body })
    }

    /// Read the modification timestamp of a row.
    pub fn row_watermark(&self, row: &SourceRow) -> Result<Watermark> {
        let value = row.get(&self.watermark_field).ok_or_else(|| {
            ReplicationError::Transform(format!("row is missing field {:?}", self.watermark_field))
        })?;

        value.as_str().and_then(Watermark::parse).ok_or_else(|| {
            ReplicationError::Transform(format!(
                "row field {:?} is not a timestamp: {value}",
                self.watermark_field
            ))
        })
    }
}
