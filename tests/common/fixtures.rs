//! Row, config and engine fixtures.

use index_replicator::{
    JsonFileStorage, MemoryIndex, MemorySource, ReplicationConfig, ReplicationEngine, StateStore,
};
use serde_json::{json, Value};
use std::path::Path;

pub const INDEX: &str = "movies";

/// A film_work-shaped row.
pub fn film(id: &str, title: &str, updated_at: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "rating": 7.5,
        "genres": ["Sci-Fi"],
        "updated_at": updated_at,
    })
}

/// Config with a fast-failing backoff and a short poll interval.
pub fn fast_config() -> ReplicationConfig {
    let mut config = ReplicationConfig::for_testing(INDEX);
    config.settings.poll_interval = "10ms".to_string();
    config.backoff.initial_delay = "1ms".to_string();
    config.backoff.max_delay = "5ms".to_string();
    config.backoff.timeout = "20ms".to_string();
    config
}

pub fn memory_source() -> MemorySource {
    MemorySource::new("id", "updated_at")
}

/// Insert rows into a memory source.
pub async fn seed(source: &MemorySource, rows: impl IntoIterator<Item = Value>) {
    for row in rows {
        source.upsert(row).await.expect("fixture rows are objects with ids");
    }
}

/// Engine over the in-memory source and index with state in `state_path`.
pub fn memory_engine(
    config: &ReplicationConfig,
    source: &MemorySource,
    index: &MemoryIndex,
    state_path: &Path,
) -> ReplicationEngine<MemorySource, MemoryIndex> {
    ReplicationEngine::new(
        config,
        source.clone(),
        index.clone(),
        json!({"mappings": {"properties": {"title": {"type": "text"}}}}),
        StateStore::open(JsonFileStorage::new(state_path)),
    )
}

/// Read the state file as JSON.
pub fn read_state(path: &Path) -> Value {
    let raw = std::fs::read_to_string(path).expect("state file exists");
    serde_json::from_str(&raw).expect("state file is JSON")
}
