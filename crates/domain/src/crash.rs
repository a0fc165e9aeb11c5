//! Crash records: a rolling window of process-level failures.
//!
//! Entries survive process restarts so that a failure repeated on every boot
//! can be told apart from a single transient fault.

use std::fmt;
use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Category of a process-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrashKind {
    /// Device or location discovery failed after retries.
    Discovery,
    /// Startup wiring failed (storage, configuration, token load).
    Initialization,
    /// The credential was rejected during startup.
    Authentication,
    #[serde(other)]
    Unknown,
}

impl CrashKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Initialization => "initialization",
            Self::Authentication => "authentication",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CrashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrashKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "discovery" => Self::Discovery,
            "initialization" => Self::Initialization,
            "authentication" => Self::Authentication,
            _ => Self::Unknown,
        })
    }
}

/// One recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashEntry {
    pub timestamp: Timestamp,
    pub kind: CrashKind,
}

/// Ordered crash entries, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrashWindow(Vec<CrashEntry>);

impl CrashWindow {
    /// Build a window, sorting entries oldest first.
    #[must_use]
    pub fn new(mut entries: Vec<CrashEntry>) -> Self {
        entries.sort_by_key(|e| e.timestamp);
        Self(entries)
    }

    /// Append an entry, keeping chronological order.
    pub fn push(&mut self, entry: CrashEntry) {
        let at = self.0.partition_point(|e| e.timestamp <= entry.timestamp);
        self.0.insert(at, entry);
    }

    /// Drop entries older than `now - window`. A window reaching past the
    /// earliest representable time keeps everything.
    pub fn prune(&mut self, now: Timestamp, window: TimeDelta) {
        let Some(cutoff) = now.checked_sub_signed(window) else {
            return;
        };
        self.0.retain(|e| e.timestamp >= cutoff);
    }

    /// Number of entries, restricted to `kinds` unless it is empty.
    #[must_use]
    pub fn count(&self, kinds: &[CrashKind]) -> usize {
        self.0
            .iter()
            .filter(|e| kinds.is_empty() || kinds.contains(&e.kind))
            .count()
    }

    #[must_use]
    pub fn entries(&self) -> &[CrashEntry] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}
