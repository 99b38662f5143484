//! The long-running reminder service.

use std::sync::Arc;

use breakwatch_core::{SharedSettings, SystemClock};
use breakwatch_server::{BreakService, DesktopNotifier, NotifyConfig, ReminderScheduler, ShutdownHandle};
use tracing::{info, warn};

use crate::error::ClientResult;

/// Runs reminders until SIGINT/SIGTERM.
pub async fn run(settings: SharedSettings) -> ClientResult<()> {
    let current = settings.get();
    current.validate()?;

    let clock = SystemClock::shared();
    let availability = Arc::new(super::aggregator(settings.clone(), clock.clone()));
    for status in availability.provider_statuses() {
        if status.enabled && !status.connected {
            warn!(
                provider = %status.kind,
                "provider enabled but not connected, run `breakwatch auth {}`",
                status.kind
            );
        } else {
            info!(provider = %status.kind, enabled = status.enabled, connected = status.connected, "calendar provider");
        }
    }

    let scheduler = ReminderScheduler::new(settings.clone(), clock);
    let notifier = Arc::new(DesktopNotifier::new(NotifyConfig::default()));
    let service = BreakService::new(scheduler, availability, notifier, settings);

    let shutdown = ShutdownHandle::new();
    shutdown.listen_for_signals();

    info!(
        reminder_minutes = current.reminder_interval_minutes,
        buffer_minutes = current.meeting_buffer_minutes,
        snooze_minutes = current.snooze_minutes,
        "breakwatch running"
    );
    service.run(shutdown.wait()).await;
    Ok(())
}
