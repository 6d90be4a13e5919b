//! Configuration for the index replicator.
//!
//! Configuration is read once at startup from a JSON file and passed
//! explicitly to the components that need it. Every field except the source
//! credentials, the query and the index name has a default.
//!
//! # Quick Start
//!
//! ```rust
//! use index_replicator::config::ReplicationConfig;
//!
//! let mut config = ReplicationConfig::for_testing("movies");
//! config.settings.batch_size = 500;
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ReplicationConfig
//! ├── source: SourceConfig            # PostgreSQL connection + query
//! ├── settings: ReplicationSettings   # batch size, poll interval, field names
//! ├── destination: DestinationConfig  # Elasticsearch URL + index
//! ├── state: StateConfig              # watermark file
//! └── backoff: BackoffSettings        # retry schedule
//! ```
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "source": {
//!     "host": "127.0.0.1",
//!     "dbname": "movies_database",
//!     "user": "app",
//!     "password": "secret",
//!     "query_file": "film_work.sql"
//!   },
//!   "settings": { "batch_size": 100, "poll_interval": "5s" },
//!   "destination": {
//!     "url": "http://127.0.0.1:9200",
//!     "index": "movies",
//!     "index_definition_path": "film_work_index.json"
//!   },
//!   "state": { "path": "/var/lib/index-replicator/state.json" },
//!   "backoff": { "initial_delay": "100ms", "max_delay": "10s", "timeout": "1m" }
//! }
//! ```
//!
//! Relative `query_file` and `index_definition_path` values are resolved
//! against the directory containing the config file.

use crate::error::{ReplicationError, Result};
use crate::resilience::{self, BackoffConfig, RetryOn};
use crate::state::JsonFileStorage;
use crate::watermark::{Watermark, DEFAULT_WATERMARK};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Where rows come from.
    pub source: SourceConfig,

    /// Batch sizing, polling and field names.
    #[serde(default)]
    pub settings: ReplicationSettings,

    /// Where documents go.
    pub destination: DestinationConfig,

    /// Watermark persistence.
    #[serde(default)]
    pub state: StateConfig,

    /// Retry schedule for every network operation.
    #[serde(default)]
    pub backoff: BackoffSettings,
}

impl ReplicationConfig {
    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReplicationError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_json_str(&raw)
            .map_err(|e| ReplicationError::Config(format!("{}: {e}", path.display())))?;

        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from JSON text without validating it.
    pub fn from_json_str(raw: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Create a minimal config for testing.
    ///
    /// Uses an inline query and ephemeral state, so nothing touches disk.
    pub fn for_testing(index: &str) -> Self {
        Self {
            source: SourceConfig {
                host: "localhost".to_string(),
                port: default_port(),
                dbname: "test".to_string(),
                user: "test".to_string(),
                password: String::new(),
                query: Some("SELECT id, updated_at FROM film_work".to_string()),
                query_file: None,
                connect_timeout: default_connect_timeout(),
            },
            settings: ReplicationSettings::default(),
            destination: DestinationConfig {
                url: default_destination_url(),
                index: index.to_string(),
                index_definition_path: None,
                request_timeout: default_request_timeout(),
            },
            state: StateConfig::ephemeral(),
            backoff: BackoffSettings::default(),
        }
    }

    /// Check every field that can be checked without I/O.
    pub fn validate(&self) -> Result<()> {
        self.source.validate()?;
        self.settings.validate()?;
        self.destination.validate()?;
        resilience::validate(&self.backoff.to_backoff_config()?)?;
        Ok(())
    }

    /// Read the source query (inline or from `query_file`).
    pub fn load_query(&self) -> Result<String> {
        self.source.load_query()
    }

    /// Read the index definition, or an empty object when none is configured.
    pub fn load_index_definition(&self) -> Result<Value> {
        self.destination.load_index_definition()
    }

    /// Backoff schedule with duration strings parsed.
    pub fn backoff_config(&self) -> BackoffConfig {
        self.backoff.backoff_config()
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        if let Some(file) = self.source.query_file.as_mut() {
            resolve_path(file, base);
        }
        if let Some(file) = self.destination.index_definition_path.as_mut() {
            resolve_path(file, base);
        }
    }
}

fn resolve_path(path: &mut PathBuf, base: &Path) {
    if path.is_relative() && !base.as_os_str().is_empty() {
        *path = base.join(&*path);
    }
}

fn parse_duration_field(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| ReplicationError::Config(format!("{field}: invalid duration {value:?}: {e}")))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SourceConfig: PostgreSQL connection and the extraction query
// ═══════════════════════════════════════════════════════════════════════════════

/// PostgreSQL connection parameters and the extraction query.
///
/// The query must take the watermark as its single parameter `$1` and return
/// the identifier and timestamp columns alongside the payload.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub dbname: String,

    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Inline SQL text.
    #[serde(default)]
    pub query: Option<String>,

    /// Path to a file holding the SQL text.
    #[serde(default)]
    pub query_file: Option<PathBuf>,

    /// Connection establishment timeout (e.g., "10s").
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"[redacted]")
            .field("query", &self.query)
            .field("query_file", &self.query_file)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_connect_timeout() -> String {
    "10s".to_string()
}

impl SourceConfig {
    /// Parse the connect_timeout string to a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(10))
    }

    /// Read the query text.
    pub fn load_query(&self) -> Result<String> {
        let text = match (&self.query, &self.query_file) {
            (Some(query), _) => query.clone(),
            (None, Some(file)) => std::fs::read_to_string(file).map_err(|e| {
                ReplicationError::Config(format!(
                    "cannot read query file {}: {e}",
                    file.display()
                ))
            })?,
            (None, None) => {
                return Err(ReplicationError::Config(
                    "source.query or source.query_file is required".to_string(),
                ))
            }
        };

        // The query is wrapped as a subquery, so a trailing semicolon breaks it.
        let text = text.trim().trim_end_matches(';').trim_end().to_string();
        if text.is_empty() {
            return Err(ReplicationError::Config("source query is empty".to_string()));
        }
        Ok(text)
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ReplicationError::Config("source.host is empty".to_string()));
        }
        if self.dbname.trim().is_empty() {
            return Err(ReplicationError::Config("source.dbname is empty".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(ReplicationError::Config("source.user is empty".to_string()));
        }
        match (&self.query, &self.query_file) {
            (Some(_), Some(_)) => {
                return Err(ReplicationError::Config(
                    "source.query and source.query_file are mutually exclusive".to_string(),
                ))
            }
            (None, None) => {
                return Err(ReplicationError::Config(
                    "source.query or source.query_file is required".to_string(),
                ))
            }
            _ => {}
        }
        parse_duration_field("source.connect_timeout", &self.connect_timeout)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ReplicationSettings: batching, polling, field names
// ═══════════════════════════════════════════════════════════════════════════════

/// Tunables for the extract/transform/load loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSettings {
    /// Maximum rows per fetch (and per bulk request).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sleep between drained passes (e.g., "5s").
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Column promoted to the document `_id`.
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Modification timestamp column; also the state key.
    #[serde(default = "default_watermark_field")]
    pub watermark_field: String,

    /// Lower bound used when no watermark is stored.
    #[serde(default = "default_watermark")]
    pub default_watermark: String,
}

fn default_batch_size() -> usize {
    100
}

fn default_poll_interval() -> String {
    "5s".to_string()
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_watermark_field() -> String {
    "updated_at".to_string()
}

fn default_watermark() -> String {
    DEFAULT_WATERMARK.to_string()
}

impl Default for ReplicationSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: "5s".to_string(),
            id_field: "id".to_string(),
            watermark_field: "updated_at".to_string(),
            default_watermark: DEFAULT_WATERMARK.to_string(),
        }
    }
}

impl ReplicationSettings {
    /// Parse the poll_interval string to a Duration.
    pub fn poll_interval_duration(&self) -> Duration {
        humantime::parse_duration(&self.poll_interval).unwrap_or(Duration::from_secs(5))
    }

    /// Parse the default watermark, falling back to the built-in sentinel.
    pub fn default_watermark_value(&self) -> Watermark {
        Watermark::parse(&self.default_watermark).unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ReplicationError::Config(
                "settings.batch_size must be at least 1".to_string(),
            ));
        }
        if self.id_field.is_empty() {
            return Err(ReplicationError::Config("settings.id_field is empty".to_string()));
        }
        if self.watermark_field.is_empty() {
            return Err(ReplicationError::Config(
                "settings.watermark_field is empty".to_string(),
            ));
        }
        if self.id_field == self.watermark_field {
            return Err(ReplicationError::Config(
                "settings.id_field and settings.watermark_field must differ".to_string(),
            ));
        }
        if Watermark::parse(&self.default_watermark).is_none() {
            return Err(ReplicationError::Config(format!(
                "settings.default_watermark: not a timestamp: {:?}",
                self.default_watermark
            )));
        }
        parse_duration_field("settings.poll_interval", &self.poll_interval)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DestinationConfig: Elasticsearch
// ═══════════════════════════════════════════════════════════════════════════════

/// Search index destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Base URL of the cluster.
    #[serde(default = "default_destination_url")]
    pub url: String,

    /// Index name.
    pub index: String,

    /// JSON file with index settings and mappings.
    #[serde(default)]
    pub index_definition_path: Option<PathBuf>,

    /// Per-request timeout (e.g., "30s").
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

fn default_destination_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

impl DestinationConfig {
    /// Parse the request_timeout string to a Duration.
    pub fn request_timeout_duration(&self) -> Duration {
        humantime::parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(30))
    }

    /// Read the index definition document.
    pub fn load_index_definition(&self) -> Result<Value> {
        let Some(path) = &self.index_definition_path else {
            return Ok(Value::Object(Default::default()));
        };
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReplicationError::Config(format!(
                "cannot read index definition {}: {e}",
                path.display()
            ))
        })?;
        let definition: Value = serde_json::from_str(&raw).map_err(|e| {
            ReplicationError::Config(format!("index definition {}: {e}", path.display()))
        })?;
        if !definition.is_object() {
            return Err(ReplicationError::Config(format!(
                "index definition {} must be a JSON object",
                path.display()
            )));
        }
        Ok(definition)
    }

    fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.url).map_err(|e| {
            ReplicationError::Config(format!("destination.url {:?}: {e}", self.url))
        })?;
        let index = self.index.as_str();
        if index.is_empty()
            || index.starts_with(['_', '-', '+'])
            || index.chars().any(|c| c.is_ascii_uppercase() || "\\/*?\"<>| ,#:".contains(c))
        {
            return Err(ReplicationError::Config(format!(
                "destination.index is not a valid index name: {index:?}"
            )));
        }
        parse_duration_field("destination.request_timeout", &self.request_timeout)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// StateConfig: watermark persistence
// ═══════════════════════════════════════════════════════════════════════════════

/// Watermark persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// State file path. `null` keeps state in memory only.
    #[serde(default = "default_state_path")]
    pub path: Option<PathBuf>,
}

fn default_state_path() -> Option<PathBuf> {
    Some(PathBuf::from("state.json"))
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

impl StateConfig {
    /// No persistence (every start replays from the default watermark).
    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    /// Storage backend for these settings.
    pub fn storage(&self) -> JsonFileStorage {
        match &self.path {
            Some(path) => JsonFileStorage::new(path),
            None => JsonFileStorage::ephemeral(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BackoffSettings: retry schedule
// ═══════════════════════════════════════════════════════════════════════════════

/// Retry schedule as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffSettings {
    #[serde(default = "default_initial_delay")]
    pub initial_delay: String,

    #[serde(default = "default_factor")]
    pub factor: f64,

    #[serde(default = "default_max_delay")]
    pub max_delay: String,

    /// Total sleep budget before a failure escalates.
    #[serde(default = "default_backoff_timeout")]
    pub timeout: String,

    #[serde(default)]
    pub retry_on: RetryOn,
}

fn default_initial_delay() -> String {
    "100ms".to_string()
}

fn default_factor() -> f64 {
    2.0
}

fn default_max_delay() -> String {
    "10s".to_string()
}

fn default_backoff_timeout() -> String {
    "1m".to_string()
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_delay: "100ms".to_string(),
            factor: 2.0,
            max_delay: "10s".to_string(),
            timeout: "1m".to_string(),
            retry_on: RetryOn::Any,
        }
    }
}

impl BackoffSettings {
    /// Parse into a [`BackoffConfig`], falling back to defaults per field.
    pub fn backoff_config(&self) -> BackoffConfig {
        let defaults = BackoffConfig::default();
        BackoffConfig {
            initial_delay: humantime::parse_duration(&self.initial_delay)
                .unwrap_or(defaults.initial_delay),
            factor: self.factor,
            max_delay: humantime::parse_duration(&self.max_delay).unwrap_or(defaults.max_delay),
            timeout: humantime::parse_duration(&self.timeout).unwrap_or(defaults.timeout),
            retry_on: self.retry_on,
        }
    }

    fn to_backoff_config(&self) -> Result<BackoffConfig> {
        Ok(BackoffConfig {
            initial_delay: parse_duration_field("backoff.initial_delay", &self.initial_delay)?,
            factor: self.factor,
            max_delay: parse_duration_field("backoff.max_delay", &self.max_delay)?,
            timeout: parse_duration_field("backoff.timeout", &self.timeout)?,
            retry_on: self.retry_on,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"{
        "source": {"dbname": "movies_database", "user": "app", "query": "SELECT 1"},
        "destination": {"index": "movies"}
    }"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = ReplicationConfig::from_json_str(MINIMAL).unwrap();
        assert_eq!(config.source.host, "localhost");
        assert_eq!(config.source.port, 5432);
        assert_eq!(config.settings.batch_size, 100);
        assert_eq!(config.settings.id_field, "id");
        assert_eq!(config.settings.watermark_field, "updated_at");
        assert_eq!(config.settings.default_watermark, DEFAULT_WATERMARK);
        assert_eq!(config.destination.url, "http://localhost:9200");
        assert_eq!(config.state.path, Some(PathBuf::from("state.json")));
        assert_eq!(config.backoff_config(), BackoffConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_parsing() {
        let mut settings = ReplicationSettings::default();
        assert_eq!(settings.poll_interval_duration(), Duration::from_secs(5));

        settings.poll_interval = "250ms".to_string();
        assert_eq!(settings.poll_interval_duration(), Duration::from_millis(250));

        settings.poll_interval = "1m 30s".to_string();
        assert_eq!(settings.poll_interval_duration(), Duration::from_secs(90));
    }

    #[test]
    fn test_duration_invalid_fallback() {
        let mut config = ReplicationConfig::for_testing("movies");
        config.settings.poll_interval = "soon".to_string();
        config.destination.request_timeout = "".to_string();
        config.source.connect_timeout = "forever".to_string();

        assert_eq!(config.settings.poll_interval_duration(), Duration::from_secs(5));
        assert_eq!(config.destination.request_timeout_duration(), Duration::from_secs(30));
        assert_eq!(config.source.connect_timeout_duration(), Duration::from_secs(10));

        // validate() is strict where the accessors are lenient.
        assert!(matches!(config.validate(), Err(ReplicationError::Config(_))));
    }

    #[test]
    fn test_backoff_settings_parse() {
        let settings: BackoffSettings = serde_json::from_str(
            r#"{"initial_delay": "50ms", "factor": 3, "max_delay": "5s", "timeout": "30s", "retry_on": "transient"}"#,
        )
        .unwrap();
        let config = settings.backoff_config();
        assert_eq!(config.initial_delay, Duration::from_millis(50));
        assert_eq!(config.factor, 3.0);
        assert_eq!(config.max_delay, Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_on, RetryOn::Transient);
    }

    #[test]
    fn test_validate_rejects_bad_backoff() {
        let mut config = ReplicationConfig::for_testing("movies");
        config.backoff.factor = 0.5;
        assert!(config.validate().is_err());

        let mut config = ReplicationConfig::for_testing("movies");
        config.backoff.initial_delay = "1m".to_string();
        config.backoff.max_delay = "1s".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = ReplicationConfig::for_testing("movies");
        config.settings.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_same_id_and_watermark_field() {
        let mut config = ReplicationConfig::for_testing("movies");
        config.settings.id_field = "updated_at".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_default_watermark() {
        let mut config = ReplicationConfig::for_testing("movies");
        config.settings.default_watermark = "the beginning".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_query_sources() {
        let mut config = ReplicationConfig::for_testing("movies");
        config.source.query_file = Some(PathBuf::from("q.sql"));
        assert!(config.validate().is_err(), "both query and query_file");

        config.source.query = None;
        config.source.query_file = None;
        assert!(config.validate().is_err(), "neither query nor query_file");
    }

    #[test]
    fn test_validate_index_name() {
        for bad in ["", "Movies", "_movies", "mo vies", "a/b"] {
            let config = ReplicationConfig::for_testing(bad);
            assert!(config.validate().is_err(), "{bad:?} should be rejected");
        }
        assert!(ReplicationConfig::for_testing("movies-2021.v1").validate().is_ok());
    }

    #[test]
    fn test_validate_destination_url() {
        let mut config = ReplicationConfig::for_testing("movies");
        config.destination.url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_query_strips_trailing_semicolon() {
        let mut config = ReplicationConfig::for_testing("movies");
        config.source.query = Some("  SELECT id FROM film_work;\n".to_string());
        assert_eq!(config.load_query().unwrap(), "SELECT id FROM film_work");
    }

    #[test]
    fn test_load_query_from_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("q.sql"), "SELECT id, updated_at FROM film_work\n").unwrap();

        let mut config = ReplicationConfig::for_testing("movies");
        config.source.query = None;
        config.source.query_file = Some(dir.path().join("q.sql"));
        assert_eq!(config.load_query().unwrap(), "SELECT id, updated_at FROM film_work");

        config.source.query_file = Some(dir.path().join("missing.sql"));
        assert!(config.load_query().is_err());
    }

    #[test]
    fn test_load_index_definition() {
        let config = ReplicationConfig::for_testing("movies");
        assert_eq!(config.load_index_definition().unwrap(), serde_json::json!({}));

        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, r#"{"mappings": {"properties": {"title": {"type": "text"}}}}"#)
            .unwrap();

        let mut config = ReplicationConfig::for_testing("movies");
        config.destination.index_definition_path = Some(path.clone());
        let definition = config.load_index_definition().unwrap();
        assert_eq!(definition["mappings"]["properties"]["title"]["type"], "text");

        std::fs::write(&path, "[]").unwrap();
        assert!(config.load_index_definition().is_err());
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("film_work.sql"), "SELECT 1").unwrap();
        std::fs::write(dir.path().join("index.json"), "{}").unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{
                "source": {"dbname": "db", "user": "app", "query_file": "film_work.sql"},
                "destination": {"index": "movies", "index_definition_path": "index.json"},
                "state": {"path": null}
            }"#,
        )
        .unwrap();

        let config = ReplicationConfig::from_file(dir.path().join("config.json")).unwrap();
        assert_eq!(config.source.query_file, Some(dir.path().join("film_work.sql")));
        assert_eq!(config.load_query().unwrap(), "SELECT 1");
        assert!(config.load_index_definition().is_ok());
        assert!(config.state.path.is_none());
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            ReplicationConfig::from_file(dir.path().join("missing.json")),
            Err(ReplicationError::Config(_))
        ));

        std::fs::write(dir.path().join("bad.json"), r#"{"source": {}}"#).unwrap();
        assert!(matches!(
            ReplicationConfig::from_file(dir.path().join("bad.json")),
            Err(ReplicationError::Config(_))
        ));
    }

    #[test]
    fn test_password_redacted_in_debug() {
        let mut config = ReplicationConfig::for_testing("movies");
        config.source.password = "hunter2".to_string();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn test_default_watermark_value() {
        let mut settings = ReplicationSettings::default();
        assert_eq!(settings.default_watermark_value(), Watermark::earliest());

        settings.default_watermark = "2020-06-01T00:00:00Z".to_string();
        assert_eq!(
            settings.default_watermark_value().to_canonical_string(),
            "2020-06-01T00:00:00Z"
        );
    }

    #[test]
    fn test_for_testing_is_ephemeral_and_valid() {
        let config = ReplicationConfig::for_testing("movies");
        assert!(config.state.path.is_none());
        assert!(config.state.storage().path().is_none());
        assert!(config.validate().is_ok());
    }
}
