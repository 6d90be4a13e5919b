//! Engine state types.
//!
//! # State Transitions
//!
//! ```text
//!          run_once()                next batch
//! Idle ──────────────→ Extracting ──────────────→ Processing
//!   ↑                     │    ↑                      │
//!   │  (cursor exhausted) │    └──── (batch committed)┘
//!   └─────────────────────┘
//!   │
//!   │ shutdown signal (observed between cycles)
//!   ↓
//! Stopped
//! ```
//!
//! - **Idle**: Between passes, sleeping the poll interval.
//! - **Extracting**: Opening the source or waiting on a fetch.
//! - **Processing**: Transforming, loading and committing one batch.
//! - **Stopped**: `run()` returned after a shutdown signal.

use crate::watermark::Watermark;

/// State of the replication engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting for the next pass.
    Idle,

    /// Reading from the source.
    Extracting,

    /// Writing one batch and committing its watermark.
    Processing,

    /// Shut down cleanly. Safe to drop.
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "Idle"),
            EngineState::Extracting => write!(f, "Extracting"),
            EngineState::Processing => write!(f, "Processing"),
            EngineState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// What one drain of the backlog did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainSummary {
    /// Batches loaded and committed.
    pub batches: usize,

    /// Documents written (re-sent duplicates included).
    pub documents: usize,

    /// Watermark after the drain; `None` if nothing has ever been committed.
    pub watermark: Option<Watermark>,
}

impl DrainSummary {
    /// True when the pass found nothing newer than the watermark.
    pub fn is_empty(&self) -> bool {
        self.batches == 0
    }
}
