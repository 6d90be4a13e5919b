//! Destination integration trait.
//!
//! Both operations must be idempotent: the loader retries them from scratch
//! and a batch can be re-sent after a crash. Keyed overwrites (`_id`) give the
//! bulk write that property.

use crate::document::IndexDocument;
use crate::source::BoxFuture;
use serde_json::Value;

/// A search index that accepts keyed bulk upserts.
pub trait IndexSink: Send + Sync + 'static {
    /// Create `index` with `definition` unless it already exists.
    fn ensure_index<'a>(&'a self, index: &'a str, definition: &'a Value) -> BoxFuture<'a, ()>;

    /// Write every document in one request, overwriting by `_id`.
    ///
    /// Succeeds only if the destination accepted every document.
    fn bulk_upsert<'a>(&'a self, index: &'a str, documents: &'a [IndexDocument])
        -> BoxFuture<'a, ()>;
}
