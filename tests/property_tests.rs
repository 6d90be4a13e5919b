//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

use chrono::{TimeZone, Utc};
use index_replicator::{
    Backoff, BackoffConfig, Batch, CommitPlan, JsonFileStorage, Loader, MemoryIndex, RetryOn,
    SourceRow, StateStore, Transformer, Watermark,
};
use proptest::prelude::*;
use serde_json::json;
use std::time::Duration;

/// Seconds from the Unix epoch to 9999-12-31T23:59:59Z.
const MAX_TIMESTAMP: i64 = 253_402_300_799;

fn watermark_at(secs: i64, nanos: u32) -> Watermark {
    Watermark::new(
        Utc.timestamp_opt(secs, nanos)
            .single()
            .expect("timestamp in range"),
    )
}

// =============================================================================
// Backoff Properties
// =============================================================================

proptest! {
    /// No delay ever exceeds the configured cap.
    #[test]
    fn backoff_delay_bounded(
        initial_ms in 1u64..1_000,
        factor in 1.0f64..8.0,
        max_ms in 1u64..60_000,
        failures in 0u32..10_000,
    ) {
        let config = BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            factor,
            max_delay: Duration::from_millis(max_ms),
            timeout: Duration::from_secs(60),
            retry_on: RetryOn::Any,
        };
        prop_assert!(config.delay_for_failure(failures) <= config.max_delay);
    }

    /// Successive delays never shrink while factor >= 1.
    #[test]
    fn backoff_delay_non_decreasing(
        initial_ms in 1u64..1_000,
        factor in 1.0f64..8.0,
        max_ms in 1u64..60_000,
        failures in 0u32..200,
    ) {
        let config = BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            factor,
            max_delay: Duration::from_millis(max_ms),
            timeout: Duration::from_secs(60),
            retry_on: RetryOn::Any,
        };
        let current = config.delay_for_failure(failures);
        let next = config.delay_for_failure(failures + 1);
        prop_assert!(next >= current, "{:?} then {:?}", current, next);
    }
}

// =============================================================================
// Watermark Properties
// =============================================================================

proptest! {
    /// The persisted form parses back to the same instant, sub-second
    /// precision included.
    #[test]
    fn watermark_canonical_roundtrip(
        secs in 0i64..MAX_TIMESTAMP,
        nanos in 0u32..1_000_000_000,
    ) {
        let wm = watermark_at(secs, nanos);
        let text = wm.to_canonical_string();

        prop_assert!(text.ends_with('Z'));
        prop_assert_eq!(Watermark::parse(&text), Some(wm));
    }

    /// Ordering of watermarks matches ordering of the instants.
    #[test]
    fn watermark_order_matches_time(
        a in 0i64..MAX_TIMESTAMP,
        b in 0i64..MAX_TIMESTAMP,
    ) {
        prop_assert_eq!(watermark_at(a, 0).cmp(&watermark_at(b, 0)), a.cmp(&b));
    }

    /// Arbitrary text never panics the parser.
    #[test]
    fn watermark_parse_no_panic(input in ".{0,64}") {
        let _ = Watermark::parse(&input);
    }
}

// =============================================================================
// Commit Properties
// =============================================================================

proptest! {
    /// Whatever order batches complete in, the stored watermark is the
    /// running maximum.
    #[test]
    fn advance_keeps_running_max(points in prop::collection::vec(0i64..MAX_TIMESTAMP, 1..40)) {
        let loader = Loader::new(
            MemoryIndex::new(),
            Backoff::new(BackoffConfig::testing()),
            "movies",
            json!({}),
            "updated_at",
        );
        let mut state = StateStore::open(JsonFileStorage::ephemeral());

        let mut max: Option<Watermark> = None;
        for secs in points {
            let wm = watermark_at(secs, 0);
            let advanced = loader.advance(&mut state, &wm).unwrap();

            prop_assert_eq!(advanced, max.map_or(true, |m| wm >= m));
            max = Some(max.map_or(wm, |m| m.max(wm)));
            prop_assert_eq!(state.watermark("updated_at"), max);
        }
    }
}

// =============================================================================
// Transform Properties
// =============================================================================

proptest! {
    /// One document per row, keyed by the row id, without the timestamp column,
    /// and the batch watermark is the last row's timestamp.
    #[test]
    fn transform_maps_every_row(
        points in prop::collection::vec((any::<u32>(), 0i64..MAX_TIMESTAMP), 1..50),
    ) {
        let mut points = points;
        points.sort_by_key(|&(_, secs)| secs);

        let rows: Vec<SourceRow> = points
            .iter()
            .map(|&(id, secs)| {
                SourceRow::from_json(json!({
                    "id": id,
                    "title": format!("film {id}"),
                    "updated_at": watermark_at(secs, 0).to_canonical_string(),
                }))
                .unwrap()
            })
            .collect();
        let batch = Batch::new(rows).unwrap();

        let transformer = Transformer::new("id", "updated_at");
        let (documents, bounds) = transformer.transform(&batch).unwrap();

        prop_assert_eq!(documents.len(), points.len());
        for (doc, &(id, _)) in documents.iter().zip(&points) {
            prop_assert_eq!(&doc.id, &id.to_string());
            prop_assert!(!doc.body.contains_key("updated_at"));
            prop_assert_eq!(doc.body.get("id"), Some(&json!(id)));
        }

        let last = points.last().map(|&(_, secs)| watermark_at(secs, 0));
        prop_assert_eq!(Some(bounds.last), last);
    }
}

// =============================================================================
// Commit Safety
// =============================================================================

proptest! {
    /// Stop a pass after any number of batches: every row at or below the
    /// committed watermark has been loaded, so a restart at `ts > committed`
    /// misses nothing. Small timestamp ranges force ties across batches.
    #[test]
    fn committed_watermark_never_skips_unloaded_rows(
        stamps in prop::collection::vec(0i64..6, 1..40),
        batch_size in 1usize..5,
        loaded_batches in 0usize..12,
    ) {
        let mut stamps = stamps;
        stamps.sort_unstable();
        let rows: Vec<SourceRow> = stamps
            .iter()
            .enumerate()
            .map(|(i, &secs)| {
                SourceRow::from_json(json!({
                    "id": i,
                    "updated_at": watermark_at(secs, 0).to_canonical_string(),
                }))
                .unwrap()
            })
            .collect();
        let batches: Vec<Batch> = rows
            .chunks(batch_size)
            .map(|chunk| Batch::new(chunk.to_vec()).unwrap())
            .collect();

        let transformer = Transformer::new("id", "updated_at");
        let mut plan = CommitPlan::new();
        let mut committed: Option<Watermark> = None;
        let mut commit = |wm: Option<Watermark>| {
            if let Some(wm) = wm {
                committed = Some(committed.map_or(wm, |c| c.max(wm)));
            }
        };

        let stop = loaded_batches.min(batches.len());
        for batch in &batches[..stop] {
            let (_, bounds) = transformer.transform(batch).unwrap();
            commit(plan.before_load(&bounds));
            commit(plan.after_load(&bounds));
        }
        if stop == batches.len() {
            commit(plan.finish());
        }

        let loaded_rows = (stop * batch_size).min(rows.len());
        if let Some(committed) = committed {
            for &secs in &stamps[loaded_rows..] {
                prop_assert!(
                    watermark_at(secs, 0) > committed,
                    "unloaded row at {} but committed {}", secs, committed
                );
            }
        }
        if stop == batches.len() {
            prop_assert_eq!(committed, stamps.last().map(|&s| watermark_at(s, 0)));
        }
    }
}
