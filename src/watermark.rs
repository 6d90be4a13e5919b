// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The replication watermark: the highest modification time fully reflected
//! in the destination.
//!
//! # Canonical Form
//!
//! Watermarks are persisted as RFC 3339 strings in UTC with a `Z` suffix and
//! only as many fractional digits as the value needs:
//!
//! ```text
//! 2021-01-03T00:00:00Z
//! 2021-01-03T10:15:30.250Z
//! 2021-01-03T10:15:30.123456Z
//! ```
//!
//! PostgreSQL timestamps carry microseconds, so dropping the fraction (as a
//! plain `%Y-%m-%dT%H:%M:%S%z` format would) re-reads rows on every pass.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Default lower bound used when no watermark has been persisted yet.
///
/// Year 1 is inside PostgreSQL's `timestamptz` range, unlike `DateTime::MIN_UTC`.
pub const DEFAULT_WATERMARK: &str = "0001-01-01T00:00:00Z";

/// Naive layouts accepted for timestamps without an offset (read as UTC).
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// A point in time up to which source changes have been replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    /// Wrap a UTC timestamp.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// The default sentinel, far before any real modification time.
    pub fn earliest() -> Self {
        Self(
            Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        )
    }

    /// Parse a watermark from any of the accepted timestamp forms.
    ///
    /// Accepts RFC 3339 with any offset (normalized to UTC), PostgreSQL's
    /// `+00` short offset form, and naive `YYYY-MM-DD[T ]HH:MM:SS[.f]`
    /// which is interpreted as UTC.
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        if s.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(Self(dt.with_timezone(&Utc)));
        }

        // "2021-01-03 10:00:00+00" (psql text output) has a two-digit offset.
        if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
            return Some(Self(dt.with_timezone(&Utc)));
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(|naive| Self(Utc.from_utc_datetime(&naive)))
    }

    /// The underlying UTC timestamp.
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Canonical string form used in the state file.
    pub fn to_canonical_string(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::earliest()
    }
}

impl From<DateTime<Utc>> for Watermark {
    fn from(at: DateTime<Utc>) -> Self {
        Self(at)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl Serialize for Watermark {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for Watermark {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Watermark::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid watermark timestamp: {s}")))
    }
}
