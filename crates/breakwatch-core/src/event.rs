//! Event types shared by the calendar providers and the availability cache.
//!
//! - [`ProviderKind`]: which calendar backend an event or token belongs to
//! - [`EventStatus`]: the closed attendance vocabulary every provider maps onto
//! - [`NormalizedEvent`]: a busy interval ready for suppression decisions

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The calendar backends breakwatch can read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Calendar.
    Google,
    /// Microsoft 365 / Outlook via Microsoft Graph.
    Microsoft,
}

impl ProviderKind {
    /// Both providers, in display order.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Google, ProviderKind::Microsoft];

    /// Returns the lowercase identifier used in logs and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
        }
    }

    /// Returns a human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Google => "Google Calendar",
            Self::Microsoft => "Microsoft Outlook",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "microsoft" | "outlook" | "ms" => Ok(Self::Microsoft),
            other => Err(format!("unknown provider '{other}' (expected google or microsoft)")),
        }
    }
}

/// Attendance status of a normalized event.
///
/// Cancelled events never reach this type; providers drop them during
/// normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// The user is committed to this event.
    Confirmed,
    /// The user tentatively accepted or has not answered.
    Tentative,
    /// The slot is marked free; never a reason to suppress.
    Free,
}

impl EventStatus {
    /// Returns the lowercase identifier for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Tentative => "tentative",
            Self::Free => "free",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A calendar event reduced to what availability checks need.
///
/// Immutable once produced by a provider client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// When the event starts.
    pub start: DateTime<Utc>,
    /// When the event ends.
    pub end: DateTime<Utc>,
    /// Attendance status.
    pub status: EventStatus,
    /// The provider this event came from.
    pub provider: ProviderKind,
}

impl NormalizedEvent {
    /// Creates a new normalized event.
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        status: EventStatus,
        provider: ProviderKind,
    ) -> Self {
        Self {
            start,
            end,
            status,
            provider,
        }
    }

    /// Returns true if the event has started and not yet ended at `now`.
    pub fn is_in_progress(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && self.end > now
    }

    /// Returns true if the event starts after `now` but no later than
    /// `now + buffer`.
    pub fn starts_within(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.start > now && self.start <= now + buffer
    }

    /// Returns the event duration.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}
