// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the index replicator.
//!
//! Errors are categorized by the boundary they cross (source database,
//! destination index, state file) and carry enough context to debug a
//! failed pass from the logs alone.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Source` | Mostly | Connection, pool and I/O failures; connection-class SQLSTATEs |
//! | `Destination` | Mostly | Connect/timeout failures, HTTP 429 and 5xx |
//! | `StateStore` | No | Local state file could not be written |
//! | `Config` | No | Configuration invalid |
//! | `Transform` | No | Row is missing its identifier or timestamp |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! [`Backoff`](crate::resilience::Backoff) retries *every* failure by default.
//! [`ReplicationError::is_retryable()`] is consulted only when the policy is
//! configured with [`RetryOn::Transient`](crate::resilience::RetryOn::Transient).

use thiserror::Error;

/// Result type alias for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;

/// Errors that can occur during replication.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Source database error.
    ///
    /// Occurs while connecting, declaring the cursor or fetching rows.
    #[error("Source error ({operation}): {message}")]
    Source {
        operation: String,
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Destination index error.
    ///
    /// `status` is the HTTP status when the destination answered at all.
    #[error("Destination error ({operation}, status {status:?}): {message}")]
    Destination {
        operation: String,
        status: Option<u16>,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The persisted state could not be written.
    ///
    /// Reads never fail (missing or corrupt state reads as empty), so this
    /// only surfaces from `set`.
    #[error("State store error ({path}): {message}")]
    StateStore {
        path: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A source row could not be turned into an index document.
    #[error("Transform error: {0}")]
    Transform(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReplicationError {
    /// Create a source error from a sqlx error.
    pub fn sql(operation: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Source {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a source error without an underlying sqlx error.
    pub fn sql_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a destination error from a transport-level reqwest error.
    pub fn http(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Destination {
            operation: operation.into(),
            status: source.status().map(|s| s.as_u16()),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a destination error from an HTTP status and response body.
    pub fn http_status(
        operation: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::Destination {
            operation: operation.into(),
            status: Some(status),
            message: message.into(),
            source: None,
        }
    }

    /// Create a state store error.
    pub fn state_store(
        path: impl Into<String>,
        message: impl Into<String>,
        source: Option<std::io::Error>,
    ) -> Self {
        Self::StateStore {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Check if this error is a transient condition worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Source { source: Some(e), .. } => is_transient_sqlx(e),
            Self::Source { source: None, .. } => true,
            Self::Destination { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            Self::StateStore { .. } => false, // Local disk issues need attention
            Self::Config(_) => false,
            Self::Transform(_) => false, // Bad data at the source
            Self::Internal(_) => false,
        }
    }
}

impl From<sqlx::Error> for ReplicationError {
    fn from(e: sqlx::Error) -> Self {
        Self::sql("unknown", e)
    }
}

/// Connection exceptions (class 08), operator intervention (57P: admin
/// shutdown, crash shutdown, cannot connect now) and serialization/deadlock
/// conflicts are the SQLSTATEs a later attempt can plausibly get past.
fn is_transient_sqlx(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => {
                code.starts_with("08") || code.starts_with("57P") || code == "40001" || code == "40P01"
            }
            None => false,
        },
        _ => false,
    }
}
