//! # Index Replicator
//!
//! Incremental, watermark-driven replication from a PostgreSQL query into an
//! Elasticsearch index.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                            index-replicator                               │
//! │                                                                           │
//! │  ┌────────────┐   ┌──────────────┐   ┌─────────────┐   ┌──────────────┐   │
//! │  │ StateStore │──►│  Extractor   │──►│ Transformer │──►│    Loader    │   │
//! │  │ (watermark)│   │ (PG cursor)  │   │ (row → doc) │   │ (_bulk, ES)  │   │
//! │  └────────────┘   └──────────────┘   └─────────────┘   └──────────────┘   │
//! │        ▲                 │ open retried                       │ retried   │
//! │        │                 ▼                                    ▼           │
//! │        │           ┌──────────────────────────────────────────────┐       │
//! │        │           │            Backoff (exponential)             │       │
//! │        │           └──────────────────────────────────────────────┘       │
//! │        └──────────────── advance after each loaded batch ◄────────┘       │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery Guarantees
//!
//! At-least-once. The watermark is persisted only after the rows it covers
//! were accepted by the index, and a timestamp shared by rows on both sides
//! of a batch boundary is held back until the rows after the boundary land.
//! Documents are keyed by row identifier, so rows re-sent after a crash
//! overwrite themselves.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use index_replicator::{ReplicationConfig, ReplicationEngine};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> index_replicator::Result<()> {
//!     let config = ReplicationConfig::from_file("config.json")?;
//!     let mut engine = ReplicationEngine::from_config(&config)?;
//!
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     engine.run(shutdown_rx).await
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod destination;
pub mod document;
pub mod elasticsearch;
pub mod error;
pub mod extract;
pub mod load;
pub mod memory;
pub mod metrics;
pub mod postgres;
pub mod resilience;
pub mod source;
pub mod state;
pub mod transform;
pub mod watermark;

// Re-exports for convenience
pub use config::{
    BackoffSettings, DestinationConfig, ReplicationConfig, ReplicationSettings, SourceConfig,
    StateConfig,
};
pub use coordinator::{DrainSummary, EngineState, ReplicationEngine};
pub use destination::IndexSink;
pub use document::{Batch, IndexDocument, SourceRow};
pub use elasticsearch::ElasticsearchSink;
pub use error::{ReplicationError, Result};
pub use extract::{Batches, Extractor};
pub use load::{CommitPlan, Loader};
pub use memory::{MemoryIndex, MemorySource};
pub use postgres::PgSource;
pub use resilience::{Backoff, BackoffConfig, RetryOn};
pub use source::{RowCursor, RowSource};
pub use state::{JsonFileStorage, StateStorage, StateStore};
pub use transform::{BatchBounds, Transformer};
pub use watermark::Watermark;
