//! Extraction: turn the current watermark into a finite sequence of batches.
//!
//! ```text
//! StateStore ──watermark──▶ Backoff::retry(source.open) ──▶ RowCursor
//!                                                             │ fetch
//!                                                             ▼
//!                                        Batch, Batch, ..., (empty) → done
//! ```
//!
//! Only opening the pass is retried. Once rows are flowing, a failed fetch is
//! returned to the caller: a half-read cursor cannot be resumed safely, and
//! the next pass re-queries from the last committed watermark anyway.

use crate::document::Batch;
use crate::error::Result;
use crate::metrics;
use crate::resilience::Backoff;
use crate::source::{RowCursor, RowSource};
use crate::state::StateStore;
use crate::watermark::Watermark;
use futures::stream::{self, Stream};
use tracing::{debug, info};

/// Opens extraction passes against a [`RowSource`].
#[derive(Debug)]
pub struct Extractor<S> {
    source: S,
    backoff: Backoff,
    batch_size: usize,
    watermark_field: String,
    default_watermark: Watermark,
}

impl<S: RowSource> Extractor<S> {
    pub fn new(
        source: S,
        backoff: Backoff,
        batch_size: usize,
        watermark_field: impl Into<String>,
        default_watermark: Watermark,
    ) -> Self {
        Self {
            source,
            backoff,
            batch_size: batch_size.max(1),
            watermark_field: watermark_field.into(),
            default_watermark,
        }
    }

    /// The underlying source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Watermark the next pass would start from.
    pub fn current_watermark(&self, state: &StateStore) -> Watermark {
        state
            .watermark(&self.watermark_field)
            .unwrap_or(self.default_watermark)
    }

    /// Start a pass over everything newer than the stored watermark.
    ///
    /// Each call re-reads the watermark, so a new pass picks up exactly where
    /// the last committed batch left off.
    pub async fn extract(&self, state: &StateStore) -> Result<Batches> {
        let since = self.current_watermark(state);
        let batch_size = self.batch_size;

        info!(since = %since, batch_size, "Starting extraction pass");

        let cursor = self
            .backoff
            .retry("source_open", || self.source.open(since, batch_size))
            .await?;

        Ok(Batches {
            cursor,
            since,
            fetched: 0,
            exhausted: false,
        })
    }
}

/// A finite, pull-based sequence of batches from one extraction pass.
pub struct Batches {
    cursor: Box<dyn RowCursor>,
    since: Watermark,
    fetched: usize,
    exhausted: bool,
}

impl std::fmt::Debug for Batches {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batches")
            .field("since", &self.since)
            .field("fetched", &self.fetched)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl Batches {
    /// Fetch the next batch, or `None` once the source has no more rows.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.exhausted {
            return Ok(None);
        }

        let rows = self.cursor.fetch().await?;
        let Some(batch) = Batch::new(rows) else {
            self.exhausted = true;
            debug!(since = %self.since, rows = self.fetched, "Extraction pass exhausted");
            return Ok(None);
        };

        self.fetched += batch.len();
        metrics::record_rows_extracted(batch.len());
        debug!(rows = batch.len(), total = self.fetched, "Fetched batch");
        Ok(Some(batch))
    }

    /// Watermark this pass started from.
    pub fn since(&self) -> Watermark {
        self.since
    }

    /// Rows fetched so far.
    pub fn rows_fetched(&self) -> usize {
        self.fetched
    }

    /// Adapt into a [`Stream`] of batches.
    pub fn into_stream(self) -> impl Stream<Item = Result<Batch>> + Send {
        stream::try_unfold(self, |mut batches| async move {
            let next = batches.next_batch().await?;
            Ok(next.map(|batch| (batch, batches)))
        })
    }
}
