// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry with exponential backoff around fallible network operations.
//!
//! [`Backoff`] wraps any async operation returning [`Result`]. On failure it
//! sleeps `min(initial_delay * factor^n, max_delay)` after the n-th
//! consecutive failure (n from 0) and tries again, until the total time spent
//! sleeping exceeds `timeout`; the failure that arrives after that point is
//! returned to the caller unchanged.
//!
//! # Backoff Schedule
//!
//! With the defaults (`100ms`, factor 2, ceiling `10s`, timeout `1m`):
//!
//! ```text
//! Failure  Delay     Slept so far
//! -------  -----     ------------
//! 0        0.1s      0.1s
//! 1        0.2s      0.3s
//! 2        0.4s      0.7s
//! ...
//! 6        6.4s      12.7s
//! 7        10s       22.7s
//! 8+       10s       ... until > 60s, then escalate
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> index_replicator::Result<()> {
//! use index_replicator::resilience::{Backoff, BackoffConfig};
//!
//! let backoff = Backoff::new(BackoffConfig::default());
//! let answer = backoff.retry("ping", || async { Ok(42) }).await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```

use crate::error::{ReplicationError, Result};
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Which failures the policy retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOn {
    /// Retry every failure, whatever its cause.
    #[default]
    Any,
    /// Retry only failures whose [`ReplicationError::is_retryable`] is true.
    Transient,
}

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Multiplier applied per consecutive failure (e.g., 2.0 = double).
    pub factor: f64,

    /// Ceiling for a single delay.
    pub max_delay: Duration,

    /// Total sleep budget; once exceeded the next failure escalates.
    pub timeout: Duration,

    /// Retry classification.
    pub retry_on: RetryOn,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            factor: 2.0,
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            retry_on: RetryOn::Any,
        }
    }
}

impl BackoffConfig {
    /// Fast-fail policy for tests.
    pub fn testing() -> Self {
        Self {
            initial_delay: Duration::from_millis(1),
            factor: 2.0,
            max_delay: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
            retry_on: RetryOn::Any,
        }
    }

    /// Delay after the n-th consecutive failure (0-indexed).
    ///
    /// Never exceeds `max_delay`, including when `factor^n` overflows.
    pub fn delay_for_failure(&self, failures: u32) -> Duration {
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Type alias for the boxed future returned by a [`Sleeper`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Something that can wait for a duration.
///
/// The production implementation is [`TokioSleeper`]; tests inject a
/// recording sleeper to check the schedule without waiting.
pub trait Sleeper: Send + Sync + 'static {
    fn sleep(&self, delay: Duration) -> SleepFuture<'_>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, delay: Duration) -> SleepFuture<'_> {
        Box::pin(tokio::time::sleep(delay))
    }
}

/// Exponential backoff retry policy.
#[derive(Clone)]
pub struct Backoff {
    config: BackoffConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for Backoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff").field("config", &self.config).finish()
    }
}

impl Backoff {
    /// Create a policy sleeping on the tokio timer.
    pub fn new(config: BackoffConfig) -> Self {
        Self::with_sleeper(config, Arc::new(TokioSleeper))
    }

    /// Create a policy with a custom sleeper.
    pub fn with_sleeper(config: BackoffConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { config, sleeper }
    }

    /// Get the policy parameters.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Run `operation` until it succeeds or the sleep budget is spent.
    ///
    /// `operation` is called again from scratch on every attempt, so it must
    /// be safe to repeat (connection attempts, idempotent writes).
    pub async fn retry<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures: u32 = 0;
        let mut slept = Duration::ZERO;

        loop {
            match f().await {
                Ok(value) => {
                    if failures > 0 {
                        debug!(
                            operation,
                            attempts = failures + 1,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if self.config.retry_on == RetryOn::Transient && !e.is_retryable() {
                        error!(operation, error = %e, "Non-retryable failure, giving up");
                        return Err(e);
                    }

                    if slept > self.config.timeout {
                        error!(
                            operation,
                            attempts = failures + 1,
                            timeout = ?self.config.timeout,
                            error = %e,
                            "Failure not resolved within backoff timeout, escalating"
                        );
                        metrics::record_retry_exhausted(operation);
                        return Err(e);
                    }

                    let delay = self.config.delay_for_failure(failures);
                    warn!(
                        operation,
                        attempt = failures + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Operation failed, backing off"
                    );
                    metrics::record_retry(operation, delay);

                    self.sleeper.sleep(delay).await;
                    slept += delay;
                    failures = failures.saturating_add(1);
                }
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

/// Check that the parameters describe a non-shrinking, bounded schedule.
pub(crate) fn validate(config: &BackoffConfig) -> Result<()> {
    if config.factor < 1.0 || !config.factor.is_finite() {
        return Err(ReplicationError::Config(format!(
            "backoff factor must be a finite number >= 1.0, got {}",
            config.factor
        )));
    }
    if config.initial_delay > config.max_delay {
        return Err(ReplicationError::Config(format!(
            "backoff initial_delay ({:?}) exceeds max_delay ({:?})",
            config.initial_delay, config.max_delay
        )));
    }
    Ok(())
}
