//! Wires the reminder scheduler to availability checks and the notifier.

use std::future::Future;
use std::sync::Arc;

use breakwatch_core::SharedSettings;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn};

use crate::availability::AvailabilityAggregator;
use crate::notify::BreakNotifier;
use crate::reminder::{ReminderScheduler, ReminderSignal};

/// What happened to a due reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueOutcome {
    Notified,
    /// A meeting is in progress or about to start.
    Suppressed,
    NotifyFailed,
}

/// The long-running break reminder service.
#[derive(Debug)]
pub struct BreakService {
    scheduler: ReminderScheduler,
    availability: Arc<AvailabilityAggregator>,
    notifier: Arc<dyn BreakNotifier>,
    settings: SharedSettings,
}

impl BreakService {
    pub fn new(
        scheduler: ReminderScheduler,
        availability: Arc<AvailabilityAggregator>,
        notifier: Arc<dyn BreakNotifier>,
        settings: SharedSettings,
    ) -> Self {
        Self {
            scheduler,
            availability,
            notifier,
            settings,
        }
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn availability(&self) -> &Arc<AvailabilityAggregator> {
        &self.availability
    }

    /// Handles one `ReminderDue`.
    ///
    /// The timer is reset before the availability check so that ticks
    /// arriving while a fetch is in flight do not fire again.
    pub async fn handle_due(&self) -> DueOutcome {
        self.scheduler.reset_timer();

        let buffer = self.settings.get().meeting_buffer_minutes;
        if self.availability.is_busy_or_meeting_soon(buffer).await {
            info!(buffer_minutes = buffer, "break reminder suppressed by calendar");
            return DueOutcome::Suppressed;
        }

        match self.notifier.notify_break() {
            Ok(()) => DueOutcome::Notified,
            Err(e) => {
                warn!(error = %e, "break reminder could not be shown");
                DueOutcome::NotifyFailed
            }
        }
    }

    /// Runs until `shutdown` completes, then stops every periodic task.
    ///
    /// Shutdown also interrupts a reminder whose availability check is
    /// still in flight.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut signals = self.scheduler.subscribe();
        self.scheduler.start();
        self.availability.start_polling();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                signal = signals.recv() => match signal {
                    Ok(ReminderSignal::Tick { remaining_ms }) => {
                        trace!(remaining_ms, "reminder tick");
                    }
                    Ok(ReminderSignal::ReminderDue) => {
                        tokio::select! {
                            outcome = self.handle_due() => debug!(?outcome, "reminder handled"),
                            () = &mut shutdown => {
                                info!("shutdown requested while handling reminder");
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "reminder signals lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.scheduler.stop();
        self.availability.stop_polling();
        info!("break service stopped");
    }
}
