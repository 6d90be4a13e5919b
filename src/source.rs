// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Source integration traits.
//!
//! A [`RowSource`] opens one extraction pass: every row whose modification
//! timestamp is strictly greater than the given watermark, ordered ascending
//! by `(timestamp, identifier)`. The pass is read through a [`RowCursor`] in
//! chunks of at most `batch_size` rows until a fetch comes back empty.
//!
//! # Example
//!
//! ```rust,no_run
//! use index_replicator::source::{BoxFuture, RowCursor, RowSource};
//! use index_replicator::{SourceRow, Watermark};
//!
//! struct NothingNew;
//! struct Exhausted;
//!
//! impl RowCursor for Exhausted {
//!     fn fetch(&mut self) -> BoxFuture<'_, Vec<SourceRow>> {
//!         Box::pin(async move { Ok(Vec::new()) })
//!     }
//! }
//!
//! impl RowSource for NothingNew {
//!     fn open(&self, _since: Watermark, _batch_size: usize) -> BoxFuture<'_, Box<dyn RowCursor>> {
//!         Box::pin(async move { Ok(Box::new(Exhausted) as Box<dyn RowCursor>) })
//!     }
//! }
//! ```

use crate::document::SourceRow;
use crate::error::Result;
use crate::watermark::Watermark;
use std::future::Future;
use std::pin::Pin;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Something rows can be extracted from.
///
/// Implementations own the query; callers only supply the lower bound.
pub trait RowSource: Send + Sync + 'static {
    /// Start an extraction pass over rows newer than `since`.
    ///
    /// Connection establishment happens here, so this is the step the
    /// extractor retries.
    fn open(&self, since: Watermark, batch_size: usize) -> BoxFuture<'_, Box<dyn RowCursor>>;
}

/// An open, forward-only extraction pass.
pub trait RowCursor: Send {
    /// Fetch up to `batch_size` more rows. An empty result means the pass is
    /// exhausted; further calls keep returning empty.
    fn fetch(&mut self) -> BoxFuture<'_, Vec<SourceRow>>;
}
