//! One-off availability check.

use std::fmt::Write;

use breakwatch_core::{SharedSettings, SystemClock};
use breakwatch_server::AvailabilityCache;
use chrono::{Duration, Local};

use crate::error::ClientResult;

/// Fetches calendars now and reports whether a reminder would be held back.
pub async fn check(settings: SharedSettings, buffer: Option<u32>) -> ClientResult<()> {
    let buffer = buffer.unwrap_or(settings.get().meeting_buffer_minutes);
    let aggregator = super::aggregator(settings, SystemClock::shared());

    let busy = aggregator.is_busy_or_meeting_soon(buffer).await;
    let cache = aggregator.snapshot().await;
    print!(
        "{}",
        render(&cache, aggregator.config().lookahead, buffer, busy)
    );
    Ok(())
}

fn render(cache: &AvailabilityCache, lookahead: Duration, buffer: u32, busy: bool) -> String {
    let mut out = String::new();
    if cache.events.is_empty() {
        let _ = writeln!(out, "No events in the {}.", describe_lookahead(lookahead));
    } else {
        for event in &cache.events {
            let _ = writeln!(
                out,
                "  {} - {}  {:<9}  {}",
                event.start.with_timezone(&Local).format("%H:%M"),
                event.end.with_timezone(&Local).format("%H:%M"),
                event.status.as_str(),
                event.provider
            );
        }
    }

    if busy {
        let _ = writeln!(out, "Busy: a break reminder would be held back ({buffer} min buffer).");
    } else {
        out.push_str("Free: a break reminder would be shown.\n");
    }
    out
}

/// "next hour", "next 2 hours", "next 90 minutes".
fn describe_lookahead(lookahead: Duration) -> String {
    let minutes = lookahead.num_minutes();
    match minutes {
        60 => "next hour".to_string(),
        m if m > 0 && m % 60 == 0 => format!("next {} hours", m / 60),
        1 => "next minute".to_string(),
        m => format!("next {m} minutes"),
    }
}
