//! Settings and provider overview.

use std::fmt::Write;

use breakwatch_core::{ProviderKind, Settings, SharedSettings};

use crate::error::ClientResult;

pub fn status(settings: SharedSettings) -> ClientResult<()> {
    print!("{}", render(&settings.get()));
    Ok(())
}

/// Renders the status report.
pub fn render(settings: &Settings) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Reminder every {} min, snooze {} min",
        settings.reminder_interval_minutes, settings.snooze_minutes
    );
    let _ = writeln!(
        out,
        "Held back {} min before meetings (tentative events {})",
        settings.meeting_buffer_minutes,
        if settings.suppress_tentative {
            "count"
        } else {
            "ignored"
        }
    );
    out.push('\n');

    for kind in ProviderKind::ALL {
        let provider = settings.provider(kind);
        let enabled = if provider.enabled { "enabled" } else { "disabled" };
        let connected = if provider.has_refresh_token() {
            "connected"
        } else {
            "not connected"
        };
        let _ = write!(out, "{:<18} {:<9} {}", kind.display_name(), enabled, connected);
        if provider.enabled && provider.client_id().is_none() {
            out.push_str(" (no client_id)");
        }
        out.push('\n');
    }
    out
}
