//! In-memory source and destination.
//!
//! Used for dry runs and tests: [`MemorySource`] behaves like the PostgreSQL
//! cursor (strictly-newer filter, `(timestamp, id)` ordering, chunked
//! fetches) and [`MemoryIndex`] like an index with keyed overwrites. Both can
//! inject failures.

use crate::destination::IndexSink;
use crate::document::{id_to_key, json_kind, IndexDocument, SourceRow};
use crate::error::{ReplicationError, Result};
use crate::source::{BoxFuture, RowCursor, RowSource};
use crate::watermark::Watermark;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

const FAULT_DISARMED: usize = usize::MAX;

/// Consume one armed fault from a countdown.
fn take_fault(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// ═══════════════════════════════════════════════════════════════════════════════
// MemorySource
// ═══════════════════════════════════════════════════════════════════════════════

/// A table of rows keyed by identifier.
#[derive(Debug, Clone)]
pub struct MemorySource {
    inner: Arc<SourceInner>,
}

#[derive(Debug)]
struct SourceInner {
    id_field: String,
    watermark_field: String,
    rows: RwLock<BTreeMap<String, SourceRow>>,
    opened_with: RwLock<Vec<Watermark>>,
    open_failures: AtomicUsize,
    open_attempts: AtomicUsize,
    fetch_fault: AtomicUsize,
}

impl MemorySource {
    pub fn new(id_field: impl Into<String>, watermark_field: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                id_field: id_field.into(),
                watermark_field: watermark_field.into(),
                rows: RwLock::new(BTreeMap::new()),
                opened_with: RwLock::new(Vec::new()),
                open_failures: AtomicUsize::new(0),
                open_attempts: AtomicUsize::new(0),
                fetch_fault: AtomicUsize::new(FAULT_DISARMED),
            }),
        }
    }

    /// Insert a row, replacing any row with the same identifier.
    pub async fn upsert(&self, row: Value) -> Result<()> {
        let row = SourceRow::from_json(row)?;
        let id_value = row.get(&self.inner.id_field).cloned().unwrap_or(Value::Null);
        let key = id_to_key(&id_value).ok_or_else(|| {
            ReplicationError::Transform(format!(
                "row field {:?} must be a non-empty string or number, found {}",
                self.inner.id_field,
                json_kind(&id_value)
            ))
        })?;
        self.inner.rows.write().await.insert(key, row);
        Ok(())
    }

    /// Number of rows in the table.
    pub async fn len(&self) -> usize {
        self.inner.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.rows.read().await.is_empty()
    }

    /// Make the next `n` opens fail with a retryable error.
    pub fn fail_next_opens(&self, n: usize) {
        self.inner.open_failures.store(n, Ordering::SeqCst);
    }

    /// Make one fetch fail after `n` successful fetches.
    pub fn fail_fetch_after(&self, n: usize) {
        self.inner.fetch_fault.store(n, Ordering::SeqCst);
    }

    /// Number of times `open` was called.
    pub fn open_attempts(&self) -> usize {
        self.inner.open_attempts.load(Ordering::SeqCst)
    }

    /// Watermarks of every successful open, in order.
    pub async fn opened_with(&self) -> Vec<Watermark> {
        self.inner.opened_with.read().await.clone()
    }

    async fn snapshot(&self, since: Watermark) -> Vec<SourceRow> {
        let rows = self.inner.rows.read().await;
        let mut selected: Vec<(Option<Watermark>, &String, &SourceRow)> = rows
            .iter()
            .map(|(id, row)| (self.row_watermark(row), id, row))
            .filter(|(ts, _, _)| ts.map_or(true, |ts| ts > since))
            .collect();

        // Unparsable timestamps sort last so transform errors surface at the end.
        selected.sort_by(|a, b| match (a.0, b.0) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.1.cmp(b.1)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.1.cmp(b.1),
        });

        selected.into_iter().map(|(_, _, row)| row.clone()).collect()
    }

    fn row_watermark(&self, row: &SourceRow) -> Option<Watermark> {
        row.get(&self.inner.watermark_field)
            .and_then(Value::as_str)
            .and_then(Watermark::parse)
    }
}

impl RowSource for MemorySource {
    fn open(&self, since: Watermark, batch_size: usize) -> BoxFuture<'_, Box<dyn RowCursor>> {
        Box::pin(async move {
            self.inner.open_attempts.fetch_add(1, Ordering::SeqCst);
            if take_fault(&self.inner.open_failures) {
                return Err(ReplicationError::sql_msg("connect", "injected connection failure"));
            }

            self.inner.opened_with.write().await.push(since);
            let rows: VecDeque<SourceRow> = self.snapshot(since).await.into();

            Ok(Box::new(MemoryCursor {
                rows,
                batch_size: batch_size.max(1),
                source: Arc::clone(&self.inner),
            }) as Box<dyn RowCursor>)
        })
    }
}

struct MemoryCursor {
    rows: VecDeque<SourceRow>,
    batch_size: usize,
    source: Arc<SourceInner>,
}

impl RowCursor for MemoryCursor {
    fn fetch(&mut self) -> BoxFuture<'_, Vec<SourceRow>> {
        Box::pin(async move {
            let previous = self.source.fetch_fault.fetch_update(
                Ordering::SeqCst,
                Ordering::SeqCst,
                |n| match n {
                    FAULT_DISARMED => None,
                    0 => Some(FAULT_DISARMED),
                    n => Some(n - 1),
                },
            );
            if previous == Ok(0) {
                return Err(ReplicationError::sql_msg("fetch", "injected cursor failure"));
            }

            let take = self.batch_size.min(self.rows.len());
            Ok(self.rows.drain(..take).collect())
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MemoryIndex
// ═══════════════════════════════════════════════════════════════════════════════

/// Indices of documents keyed by `_id`.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    inner: Arc<IndexInner>,
}

#[derive(Debug, Default)]
struct IndexInner {
    indices: RwLock<HashMap<String, StoredIndex>>,
    ensure_failures: AtomicUsize,
    bulk_failures: AtomicUsize,
    ensure_calls: AtomicUsize,
    bulk_calls: AtomicUsize,
}

#[derive(Debug, Clone)]
struct StoredIndex {
    definition: Value,
    documents: BTreeMap<String, Map<String, Value>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` ensure calls fail with HTTP 503.
    pub fn fail_next_ensures(&self, n: usize) {
        self.inner.ensure_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` bulk calls fail with HTTP 503.
    pub fn fail_next_bulks(&self, n: usize) {
        self.inner.bulk_failures.store(n, Ordering::SeqCst);
    }

    pub fn ensure_calls(&self) -> usize {
        self.inner.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn bulk_calls(&self) -> usize {
        self.inner.bulk_calls.load(Ordering::SeqCst)
    }

    pub async fn index_exists(&self, index: &str) -> bool {
        self.inner.indices.read().await.contains_key(index)
    }

    /// Definition the index was created with.
    pub async fn definition(&self, index: &str) -> Option<Value> {
        let indices = self.inner.indices.read().await;
        indices.get(index).map(|i| i.definition.clone())
    }

    pub async fn document_count(&self, index: &str) -> usize {
        let indices = self.inner.indices.read().await;
        indices.get(index).map_or(0, |i| i.documents.len())
    }

    pub async fn document(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        let indices = self.inner.indices.read().await;
        indices.get(index)?.documents.get(id).cloned()
    }

    /// All documents of an index, ordered by `_id`.
    pub async fn documents(&self, index: &str) -> BTreeMap<String, Map<String, Value>> {
        let indices = self.inner.indices.read().await;
        indices
            .get(index)
            .map(|i| i.documents.clone())
            .unwrap_or_default()
    }
}

impl IndexSink for MemoryIndex {
    fn ensure_index<'a>(&'a self, index: &'a str, definition: &'a Value) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.inner.ensure_calls.fetch_add(1, Ordering::SeqCst);
            if take_fault(&self.inner.ensure_failures) {
                return Err(ReplicationError::http_status(
                    "ensure_index",
                    503,
                    "injected failure",
                ));
            }

            let mut indices = self.inner.indices.write().await;
            indices.entry(index.to_string()).or_insert_with(|| StoredIndex {
                definition: definition.clone(),
                documents: BTreeMap::new(),
            });
            Ok(())
        })
    }

    fn bulk_upsert<'a>(
        &'a self,
        index: &'a str,
        documents: &'a [IndexDocument],
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.inner.bulk_calls.fetch_add(1, Ordering::SeqCst);
            if take_fault(&self.inner.bulk_failures) {
                return Err(ReplicationError::http_status(
                    "bulk_upsert",
                    503,
                    "injected failure",
                ));
            }

            let mut indices = self.inner.indices.write().await;
            let stored = indices.get_mut(index).ok_or_else(|| {
                ReplicationError::http_status(
                    "bulk_upsert",
                    404,
                    format!("index_not_found_exception: no such index [{index}]"),
                )
            })?;
            for doc in documents {
                stored.documents.insert(doc.id.clone(), doc.body.clone());
            }
            Ok(())
        })
    }
}
