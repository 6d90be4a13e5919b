// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Watermark persistence across restarts.
//!
//! Stores a flat key → value JSON object in a single file. The key of
//! interest is the watermark field name; its value is the canonical
//! date-time string of the last row durably written to the destination.
//!
//! ```json
//! { "updated_at": "2021-01-03T00:00:00Z" }
//! ```
//!
//! # Read Semantics
//!
//! A missing, unreadable or corrupt file reads as empty state. The replicator
//! then starts from the default watermark and re-sends everything, which is
//! safe because destination writes are idempotent.
//!
//! # Write Semantics
//!
//! Every `set` rewrites the whole mapping synchronously:
//!
//! ```text
//! write <path>.tmp → fsync → rename over <path>
//! ```
//!
//! A crash mid-write leaves the previous file intact. Single writer, single
//! process: there is no locking.
//!
//! ## Cursor Semantics
//!
//! ```text
//! fetch batch → bulk upsert → set watermark = last row's timestamp
//!                             (crash here = re-send the batch, idempotent)
//! ```

use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::watermark::Watermark;
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Flat key → value state.
pub type StateMap = Map<String, Value>;

/// Persistent backend for [`StateStore`].
pub trait StateStorage: Send + Sync {
    /// Load the whole state. Never fails: problems read as empty state.
    fn retrieve_state(&self) -> StateMap;

    /// Replace the whole persisted state.
    fn save_state(&self, state: &StateMap) -> Result<()>;
}

/// JSON file storage.
///
/// With no path configured the storage is ephemeral: saves are dropped and
/// every start begins from empty state.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: Option<PathBuf>,
}

impl JsonFileStorage {
    /// Storage backed by the file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Storage that persists nothing.
    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    /// Path of the state file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "state".into());
        name.push(".tmp");
        path.with_file_name(name)
    }
}

impl StateStorage for JsonFileStorage {
    fn retrieve_state(&self) -> StateMap {
        let Some(path) = &self.path else {
            return StateMap::new();
        };

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file yet, starting from empty state");
                return StateMap::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "State file unreadable, treating as empty");
                return StateMap::new();
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!(
                    path = %path.display(),
                    kind = crate::document::json_kind(&other),
                    "State file is not a JSON object, treating as empty"
                );
                StateMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "State file corrupt, treating as empty");
                StateMap::new()
            }
        }
    }

    fn save_state(&self, state: &StateMap) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let display = path.display().to_string();

        let body = serde_json::to_vec_pretty(state).map_err(|e| {
            ReplicationError::state_store(&display, format!("serialize failed: {e}"), None)
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                ReplicationError::state_store(&display, "create parent directory failed", Some(e))
            })?;
        }

        let tmp = Self::temp_path(path);
        let write_tmp = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&body)?;
            file.sync_all()
        };
        write_tmp()
            .map_err(|e| ReplicationError::state_store(&display, "write temp file failed", Some(e)))?;

        fs::rename(&tmp, path)
            .map_err(|e| ReplicationError::state_store(&display, "replace state file failed", Some(e)))?;

        Ok(())
    }
}

/// Key → value state with whole-file persistence on every update.
pub struct StateStore {
    storage: Box<dyn StateStorage>,
    state: StateMap,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").field("state", &self.state).finish()
    }
}

impl StateStore {
    /// Load state from `storage`.
    pub fn open(storage: impl StateStorage + 'static) -> Self {
        let state = storage.retrieve_state();
        if !state.is_empty() {
            info!(keys = state.len(), "Restored state from previous run");
        }
        Self {
            storage: Box::new(storage),
            state,
        }
    }

    /// Open a JSON state file.
    pub fn open_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening state store");
        Self::open(JsonFileStorage::new(path))
    }

    /// Get the value for a key, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    /// Set a key and persist the whole mapping.
    ///
    /// The in-memory value is only updated once the write succeeded, so a
    /// failed `set` leaves `get` returning the previous value.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let mut next = self.state.clone();
        next.insert(key.to_string(), value.into());

        match self.storage.save_state(&next) {
            Ok(()) => {
                metrics::record_state_persist(true);
                self.state = next;
                debug!(key, "State persisted");
                Ok(())
            }
            Err(e) => {
                metrics::record_state_persist(false);
                Err(e)
            }
        }
    }

    /// Get the watermark stored under `key`.
    ///
    /// A value that is not a parseable timestamp reads as absent.
    pub fn watermark(&self, key: &str) -> Option<Watermark> {
        let value = self.get(key)?;
        let parsed = value.as_str().and_then(Watermark::parse);
        if parsed.is_none() {
            warn!(key, value = %value, "Stored watermark is not a timestamp, ignoring");
        }
        parsed
    }

    /// Store a watermark in canonical form.
    pub fn set_watermark(&mut self, key: &str, watermark: &Watermark) -> Result<()> {
        self.set(key, watermark.to_canonical_string())
    }

    /// Snapshot of all keys (for diagnostics).
    pub fn get_all(&self) -> &StateMap {
        &self.state
    }
}
