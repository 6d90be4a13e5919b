// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication engine coordinator.
//!
//! Ties together:
//! - Extraction via [`crate::extract::Extractor`]
//! - Document mapping via [`crate::transform::Transformer`]
//! - Bulk writes via [`crate::load::Loader`]
//! - Watermark persistence via [`crate::state::StateStore`]
//!
//! # Cycle
//!
//! ```text
//! loop {
//!     extract(watermark) → for each batch:
//!         transform → load (retried) → advance to what the batch completed
//!     advance to the last loaded timestamp
//!     sleep(poll_interval) or stop on shutdown
//! }
//! ```
//!
//! One logical task, no internal parallelism: a single pass and a single
//! bulk write are in flight at any time. Errors escaping the backoff budget
//! are not caught here; they end [`ReplicationEngine::run`].

mod types;

pub use types::{DrainSummary, EngineState};

use crate::config::ReplicationConfig;
use crate::destination::IndexSink;
use crate::elasticsearch::ElasticsearchSink;
use crate::error::Result;
use crate::extract::Extractor;
use crate::load::{CommitPlan, Loader};
use crate::memory::MemoryIndex;
use crate::metrics;
use crate::postgres::PgSource;
use crate::resilience::Backoff;
use crate::source::RowSource;
use crate::state::{JsonFileStorage, StateStore};
use crate::transform::Transformer;
use serde_json::Value;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, info_span, Instrument};

/// The replication engine.
pub struct ReplicationEngine<S, D> {
    extractor: Extractor<S>,
    transformer: Transformer,
    loader: Loader<D>,

    /// Watermark persistence (single writer)
    state: StateStore,

    /// Sleep between drained passes
    poll_interval: Duration,

    /// Engine state (broadcast to watchers)
    state_tx: watch::Sender<EngineState>,

    /// Engine state receiver (for internal use)
    state_rx: watch::Receiver<EngineState>,

    /// Completed drain cycles, for log correlation
    cycles: u64,
}

impl ReplicationEngine<PgSource, ElasticsearchSink> {
    /// Build the PostgreSQL → Elasticsearch engine described by `config`.
    ///
    /// Reads the query and index definition files and opens the state file.
    /// No network connection is made until the first pass.
    pub fn from_config(config: &ReplicationConfig) -> Result<Self> {
        config.validate()?;

        let source = PgSource::from_config(config)?;
        let sink = ElasticsearchSink::from_config(&config.destination)?;
        let definition = config.load_index_definition()?;
        let state = StateStore::open(config.state.storage());

        Ok(Self::new(config, source, sink, definition, state))
    }
}

impl<S: RowSource> ReplicationEngine<S, MemoryIndex> {
    /// Engine that loads into a [`MemoryIndex`] instead of the configured
    /// destination.
    ///
    /// Starts from the watermark in the configured state file but never
    /// writes to it.
    pub fn dry_run(config: &ReplicationConfig, source: S) -> Result<Self> {
        config.validate()?;

        let definition = config.load_index_definition()?;
        let field = &config.settings.watermark_field;

        let mut state = StateStore::open(JsonFileStorage::ephemeral());
        if let Some(stored) = StateStore::open(config.state.storage()).watermark(field) {
            state.set_watermark(field, &stored)?;
        }

        Ok(Self::new(config, source, MemoryIndex::new(), definition, state))
    }
}

impl<S: RowSource, D: IndexSink> ReplicationEngine<S, D> {
    /// Create an engine over any source and sink.
    pub fn new(
        config: &ReplicationConfig,
        source: S,
        sink: D,
        index_definition: Value,
        state: StateStore,
    ) -> Self {
        let settings = &config.settings;
        let backoff = Backoff::new(config.backoff_config());

        let extractor = Extractor::new(
            source,
            backoff.clone(),
            settings.batch_size,
            settings.watermark_field.clone(),
            settings.default_watermark_value(),
        );
        let transformer = Transformer::new(settings.id_field.clone(), settings.watermark_field.clone());
        let loader = Loader::new(
            sink,
            backoff,
            config.destination.index.clone(),
            index_definition,
            settings.watermark_field.clone(),
        );

        Self::from_parts(extractor, transformer, loader, state, settings.poll_interval_duration())
    }

    /// Assemble an engine from already-built components.
    pub fn from_parts(
        extractor: Extractor<S>,
        transformer: Transformer,
        loader: Loader<D>,
        state: StateStore,
        poll_interval: Duration,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(EngineState::Idle);
        Self {
            extractor,
            transformer,
            loader,
            state,
            poll_interval,
            state_tx,
            state_rx,
            cycles: 0,
        }
    }

    /// Get current engine state.
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    /// The watermark store.
    pub fn state_store(&self) -> &StateStore {
        &self.state
    }

    /// The source the engine extracts from.
    pub fn source(&self) -> &S {
        self.extractor.source()
    }

    /// The sink the engine loads into.
    pub fn sink(&self) -> &D {
        self.loader.sink()
    }

    fn set_state(&self, state: EngineState) {
        let _ = self.state_tx.send(state);
    }

    /// Drain the backlog once: extract every batch newer than the stored
    /// watermark, loading and committing each in order.
    pub async fn run_once(&mut self) -> Result<DrainSummary> {
        self.cycles += 1;
        let span = info_span!("drain", cycle = self.cycles);

        let result = self.drain().instrument(span).await;
        self.set_state(EngineState::Idle);
        result
    }

    async fn drain(&mut self) -> Result<DrainSummary> {
        let start = Instant::now();
        self.set_state(EngineState::Extracting);

        let mut summary = DrainSummary::default();
        let mut plan = CommitPlan::new();
        let mut batches = self.extractor.extract(&self.state).await?;

        while let Some(batch) = batches.next_batch().await? {
            self.set_state(EngineState::Processing);

            let (documents, bounds) = self.transformer.transform(&batch)?;
            if let Some(watermark) = plan.before_load(&bounds) {
                self.loader.advance(&mut self.state, &watermark)?;
            }

            self.loader.load(&documents).await?;
            if let Some(watermark) = plan.after_load(&bounds) {
                self.loader.advance(&mut self.state, &watermark)?;
            }

            summary.batches += 1;
            summary.documents += documents.len();
            info!(
                documents = documents.len(),
                last = %bounds.last,
                "Batch loaded"
            );

            self.set_state(EngineState::Extracting);
        }

        // Exhausted: nothing tied with the held timestamp is left.
        if let Some(watermark) = plan.finish() {
            self.loader.advance(&mut self.state, &watermark)?;
        }

        summary.watermark = self.state.watermark(self.loader.watermark_field());
        let elapsed = start.elapsed();
        metrics::record_drain_cycle(summary.batches, elapsed);

        if summary.is_empty() {
            debug!(since = %batches.since(), "No new rows");
        } else {
            info!(
                batches = summary.batches,
                documents = summary.documents,
                elapsed_ms = elapsed.as_millis() as u64,
                "Backlog drained"
            );
        }
        Ok(summary)
    }

    /// Run until `shutdown` turns true, sleeping the poll interval between
    /// drains.
    ///
    /// Shutdown is observed only between cycles; a batch in flight finishes
    /// (or fails) first. Any error from a cycle is returned immediately.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            index = %self.loader.index(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Replication engine running"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_once().await?;

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped, stopping");
                        break;
                    }
                }
            }
        }

        self.set_state(EngineState::Stopped);
        info!(cycles = self.cycles, "Replication engine stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySource;
    use serde_json::json;

    fn test_config() -> ReplicationConfig {
        let mut config = ReplicationConfig::for_testing("movies");
        config.settings.poll_interval = "10ms".to_string();
        config.backoff.initial_delay = "1ms".to_string();
        config.backoff.max_delay = "5ms".to_string();
        config.backoff.timeout = "20ms".to_string();
        config
    }

    fn engine(
        config: &ReplicationConfig,
        source: MemorySource,
        index: MemoryIndex,
    ) -> ReplicationEngine<MemorySource, MemoryIndex> {
        ReplicationEngine::new(
            config,
            source,
            index,
            json!({}),
            StateStore::open(JsonFileStorage::ephemeral()),
        )
    }

    #[tokio::test]
    async fn test_run_once_empty_source() {
        let config = test_config();
        let mut engine = engine(&config, MemorySource::new("id", "updated_at"), MemoryIndex::new());

        let summary = engine.run_once().await.unwrap();
        assert!(summary.is_empty());
        assert!(summary.watermark.is_none());
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn test_run_once_commits_each_batch() {
        let mut config = test_config();
        config.settings.batch_size = 2;

        let source = MemorySource::new("id", "updated_at");
        for (id, day) in [("a", 1), ("b", 2), ("c", 3)] {
            source
                .upsert(json!({"id": id, "title": id, "updated_at": format!("2021-01-0{day}T00:00:00Z")}))
                .await
                .unwrap();
        }
        let index = MemoryIndex::new();
        let mut engine = engine(&config, source, index.clone());

        let summary = engine.run_once().await.unwrap();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.documents, 3);
        assert_eq!(
            summary.watermark.map(|w| w.to_canonical_string()).as_deref(),
            Some("2021-01-03T00:00:00Z")
        );
        assert_eq!(index.document_count("movies").await, 3);
        assert_eq!(index.bulk_calls(), 2);

        // Nothing new on the next pass.
        assert!(engine.run_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_state_transitions_observed() {
        let config = test_config();
        let source = MemorySource::new("id", "updated_at");
        source
            .upsert(json!({"id": "a", "updated_at": "2021-01-01T00:00:00Z"}))
            .await
            .unwrap();
        let mut engine = engine(&config, source, MemoryIndex::new());
        let mut rx = engine.state_receiver();
        assert_eq!(*rx.borrow_and_update(), EngineState::Idle);

        engine.run_once().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), EngineState::Idle);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let config = test_config();
        let source = MemorySource::new("id", "updated_at");
        let mut engine = engine(&config, source.clone(), MemoryIndex::new());
        let state_rx = engine.state_receiver();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let result = engine.run(shutdown_rx).await;
            result.map(|_| engine)
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();

        let engine = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(*state_rx.borrow(), EngineState::Stopped);
        assert!(source.open_attempts() >= 2, "polled more than once");
    }

    #[tokio::test]
    async fn test_run_already_shut_down_does_nothing() {
        let config = test_config();
        let source = MemorySource::new("id", "updated_at");
        let mut engine = engine(&config, source.clone(), MemoryIndex::new());

        let (_tx, rx) = watch::channel(true);
        engine.run(rx).await.unwrap();
        assert_eq!(source.open_attempts(), 0);
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_dry_run_starts_at_stored_watermark_and_leaves_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        std::fs::write(&state_path, r#"{"updated_at": "2021-01-01T00:00:00Z"}"#).unwrap();

        let mut config = test_config();
        config.state.path = Some(state_path.clone());

        let source = MemorySource::new("id", "updated_at");
        for (id, day) in [("a", 1), ("b", 2)] {
            source
                .upsert(json!({"id": id, "updated_at": format!("2021-01-0{day}T00:00:00Z")}))
                .await
                .unwrap();
        }

        let mut engine = ReplicationEngine::dry_run(&config, source).unwrap();
        let summary = engine.run_once().await.unwrap();

        assert_eq!(summary.documents, 1);
        assert_eq!(engine.sink().document_count("movies").await, 1);
        assert!(engine.sink().document("movies", "b").await.is_some());
        assert_eq!(
            std::fs::read_to_string(&state_path).unwrap(),
            r#"{"updated_at": "2021-01-01T00:00:00Z"}"#
        );
    }

    #[tokio::test]
    async fn test_run_propagates_escalated_failure() {
        let config = test_config();
        let source = MemorySource::new("id", "updated_at");
        source.fail_next_opens(usize::MAX);
        let mut engine = engine(&config, source, MemoryIndex::new());

        let (_tx, rx) = watch::channel(false);
        assert!(engine.run(rx).await.is_err());
        assert_eq!(engine.state(), EngineState::Idle);
    }
}
