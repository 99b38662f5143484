//! Query windows for calendar fetches.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window, swapping the bounds if given in reverse.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Creates a window starting at `now` and extending `lookahead`.
    pub fn from_now(now: DateTime<Utc>, lookahead: Duration) -> Self {
        Self::new(now, now + lookahead)
    }

    /// Returns true if `instant` falls inside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Returns the length of the window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Formats the start bound as RFC 3339 with a `Z` suffix.
    pub fn start_rfc3339(&self) -> String {
        self.start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    /// Formats the end bound as RFC 3339 with a `Z` suffix.
    pub fn end_rfc3339(&self) -> String {
        self.end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}
