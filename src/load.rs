//! Loading: write a batch of documents, then commit its watermark.
//!
//! ```text
//! load(docs):   retry(ensure_index) → retry(bulk_upsert)
//! advance(wm):  only after load returned Ok; never moves backwards
//! ```
//!
//! A batch lands entirely or is retried entirely. If the process dies between
//! `load` and `advance`, the next pass re-sends the batch; keyed overwrites
//! make that harmless.
//!
//! # Tied timestamps
//!
//! ```text
//! batch 1: [r1@t1, r2@t2]   load → commit t1, hold t2
//! batch 2: [r3@t2, r4@t3]   starts at t2, t2 still held
//!                           load → commit t2, hold t3
//! end of pass               commit t3
//! ```
//!
//! [`CommitPlan`] never commits a batch's last timestamp while the next batch
//! may still hold rows with the same timestamp. If the pass fails in between,
//! the next one starts below the whole tie group and re-sends it.

use crate::destination::IndexSink;
use crate::document::IndexDocument;
use crate::error::Result;
use crate::metrics;
use crate::resilience::Backoff;
use crate::state::StateStore;
use crate::transform::BatchBounds;
use crate::watermark::Watermark;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Writes documents to an [`IndexSink`] and commits watermarks.
#[derive(Debug)]
pub struct Loader<D> {
    sink: D,
    backoff: Backoff,
    index: String,
    definition: Value,
    watermark_field: String,
}

impl<D: IndexSink> Loader<D> {
    pub fn new(
        sink: D,
        backoff: Backoff,
        index: impl Into<String>,
        definition: Value,
        watermark_field: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            backoff,
            index: index.into(),
            definition,
            watermark_field: watermark_field.into(),
        }
    }

    /// The underlying sink.
    pub fn sink(&self) -> &D {
        &self.sink
    }

    /// Target index name.
    pub fn index(&self) -> &str {
        &self.index
    }

    /// State key the watermark is committed under.
    pub fn watermark_field(&self) -> &str {
        &self.watermark_field
    }

    /// Ensure the index exists, then bulk upsert every document.
    pub async fn load(&self, documents: &[IndexDocument]) -> Result<()> {
        let start = Instant::now();

        self.backoff
            .retry("ensure_index", || {
                self.sink.ensure_index(&self.index, &self.definition)
            })
            .await?;

        if documents.is_empty() {
            return Ok(());
        }

        self.backoff
            .retry("bulk_upsert", || self.sink.bulk_upsert(&self.index, documents))
            .await?;

        let elapsed = start.elapsed();
        metrics::record_batch_loaded(documents.len(), elapsed);
        debug!(
            index = %self.index,
            documents = documents.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch loaded"
        );
        Ok(())
    }

    /// Persist `watermark` as the new high-water mark.
    ///
    /// Returns `false` (and writes nothing) if it is older than the stored
    /// value.
    pub fn advance(&self, state: &mut StateStore, watermark: &Watermark) -> Result<bool> {
        if let Some(current) = state.watermark(&self.watermark_field) {
            if *watermark < current {
                warn!(
                    current = %current,
                    proposed = %watermark,
                    "Refusing to move watermark backwards"
                );
                return Ok(false);
            }
        }

        state.set_watermark(&self.watermark_field, watermark)?;
        metrics::record_watermark(watermark.as_datetime().timestamp());
        info!(field = %self.watermark_field, watermark = %watermark, "Watermark advanced");
        Ok(true)
    }
}

/// Which watermark is safe to commit as the batches of one pass land.
#[derive(Debug, Clone, Default)]
pub struct CommitPlan {
    held: Option<Watermark>,
}

impl CommitPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp loaded but not yet known to be complete.
    pub fn held(&self) -> Option<Watermark> {
        self.held
    }

    /// Before loading a batch: release the held timestamp if the batch
    /// starts after it.
    pub fn before_load(&mut self, bounds: &BatchBounds) -> Option<Watermark> {
        match self.held {
            Some(held) if bounds.first > held => self.held.take(),
            _ => None,
        }
    }

    /// After a batch was loaded: hold its last timestamp and return the
    /// latest timestamp it completes.
    pub fn after_load(&mut self, bounds: &BatchBounds) -> Option<Watermark> {
        self.held = Some(self.held.map_or(bounds.last, |held| held.max(bounds.last)));
        bounds.settled
    }

    /// The pass is exhausted: release whatever is held.
    pub fn finish(&mut self) -> Option<Watermark> {
        self.held.take()
    }
}
