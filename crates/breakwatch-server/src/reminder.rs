//! Break reminder scheduler.
//!
//! Tracks how long the user has been active since the last break and emits
//! [`ReminderSignal::ReminderDue`] once the configured interval has elapsed.
//! The scheduler never decides whether a reminder should be suppressed; the
//! consumer must call [`ReminderScheduler::reset_timer`] before doing any
//! async suppression check so the next check does not fire again.
//!
//! ```text
//!            pause()                snooze()
//!   Running ─────────▶ Paused      Running ─────────▶ Snoozed
//!      ▲                 │            ▲                  │
//!      └──── resume() ───┘            └── snooze ends ───┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use breakwatch_core::{SharedClock, SharedSettings};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::periodic::PeriodicTask;

/// How often the scheduler checks elapsed time.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30);

const SIGNAL_CAPACITY: usize = 32;

/// What the scheduler publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderSignal {
    /// Emitted on every check. `remaining_ms` is -1 while paused.
    Tick { remaining_ms: i64 },
    /// The reminder interval has elapsed.
    ReminderDue,
}

/// Display state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Running,
    Paused,
    Snoozed,
}

impl SchedulerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Snoozed => "snoozed",
        }
    }
}

#[derive(Debug, Clone)]
struct SchedulerState {
    last_reset: DateTime<Utc>,
    paused: bool,
    snoozed_until: Option<DateTime<Utc>>,
}

impl SchedulerState {
    fn is_snoozed(&self, now: DateTime<Utc>) -> bool {
        self.snoozed_until.is_some_and(|until| now < until)
    }

    fn remaining_ms(&self, now: DateTime<Utc>, interval: chrono::Duration) -> i64 {
        if self.paused {
            return -1;
        }
        if let Some(until) = self.snoozed_until
            && now < until
        {
            return (until - now).num_milliseconds().max(0);
        }
        (interval - (now - self.last_reset)).num_milliseconds().max(0)
    }

    fn is_due(&self, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
        !self.paused && !self.is_snoozed(now) && now - self.last_reset >= interval
    }
}

#[derive(Debug)]
struct Inner {
    settings: SharedSettings,
    clock: SharedClock,
    cadence: Duration,
    signals: broadcast::Sender<ReminderSignal>,
    state: Mutex<SchedulerState>,
    task: Mutex<Option<PeriodicTask>>,
}

/// Cheaply cloneable handle to the reminder state machine.
#[derive(Debug, Clone)]
pub struct ReminderScheduler {
    inner: Arc<Inner>,
}

impl ReminderScheduler {
    pub fn new(settings: SharedSettings, clock: SharedClock) -> Self {
        Self::with_cadence(settings, clock, CHECK_INTERVAL)
    }

    /// Creates a scheduler that checks every `cadence` once started.
    pub fn with_cadence(settings: SharedSettings, clock: SharedClock, cadence: Duration) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);
        let now = clock.now();
        Self {
            inner: Arc::new(Inner {
                settings,
                clock,
                cadence,
                signals,
                state: Mutex::new(SchedulerState {
                    last_reset: now,
                    paused: false,
                    snoozed_until: None,
                }),
                task: Mutex::new(None),
            }),
        }
    }

    /// Subscribes to ticks and reminders.
    pub fn subscribe(&self) -> broadcast::Receiver<ReminderSignal> {
        self.inner.signals.subscribe()
    }

    /// Resets the timer, unpauses and starts periodic checks.
    pub fn start(&self) {
        {
            let mut state = self.state();
            state.last_reset = self.inner.clock.now();
            state.paused = false;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let task = PeriodicTask::spawn("reminder", self.inner.cadence, false, move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    ReminderScheduler { inner }.check();
                }
            }
        });

        let previous = self
            .inner
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.stop();
        }
        info!(
            interval_minutes = self.inner.settings.get().reminder_interval_minutes,
            "break reminders started"
        );
    }

    /// Stops periodic checks. State is kept.
    pub fn stop(&self) {
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.stop();
            info!("break reminders stopped");
        }
    }

    pub fn pause(&self) {
        self.state().paused = true;
        info!("break reminders paused");
    }

    /// Unpauses and restarts the interval from now.
    pub fn resume(&self) {
        let mut state = self.state();
        state.paused = false;
        state.last_reset = self.inner.clock.now();
        info!("break reminders resumed");
    }

    /// Postpones reminders by the configured snooze duration.
    ///
    /// Ignored while paused.
    pub fn snooze(&self) {
        let snooze = self.inner.settings.get().snooze();
        let mut state = self.state();
        if state.paused {
            debug!("snooze ignored while paused");
            return;
        }
        let until = self.inner.clock.now() + snooze;
        state.snoozed_until = Some(until);
        info!(%until, "break reminder snoozed");
    }

    /// Restarts the interval from now and clears any snooze.
    pub fn reset_timer(&self) {
        let mut state = self.state();
        state.last_reset = self.inner.clock.now();
        state.snoozed_until = None;
        debug!("reminder timer reset");
    }

    /// Runs one check: always emits a tick, then a reminder if one is due.
    pub fn check(&self) {
        let now = self.inner.clock.now();
        let interval = self.inner.settings.get().reminder_interval();
        let (remaining_ms, due) = {
            let state = self.state();
            (state.remaining_ms(now, interval), state.is_due(now, interval))
        };

        let _ = self.inner.signals.send(ReminderSignal::Tick { remaining_ms });
        if due {
            info!("break reminder due");
            let _ = self.inner.signals.send(ReminderSignal::ReminderDue);
        }
    }

    /// Milliseconds until the next reminder, or -1 while paused.
    pub fn remaining_ms(&self) -> i64 {
        let now = self.inner.clock.now();
        let interval = self.inner.settings.get().reminder_interval();
        self.state().remaining_ms(now, interval)
    }

    pub fn phase(&self) -> SchedulerPhase {
        let now = self.inner.clock.now();
        let state = self.state();
        if state.paused {
            SchedulerPhase::Paused
        } else if state.is_snoozed(now) {
            SchedulerPhase::Snoozed
        } else {
            SchedulerPhase::Running
        }
    }

    /// True while periodic checks are scheduled.
    pub fn is_started(&self) -> bool {
        self.inner
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breakwatch_core::{ManualClock, MemorySettingsStore, Settings, SettingsStore};
    use chrono::TimeZone;
    use tokio::sync::broadcast::error::TryRecvError;

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    fn setup() -> (ReminderScheduler, Arc<ManualClock>, Arc<MemorySettingsStore>) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap());
        let settings = MemorySettingsStore::shared(Settings::default());
        let scheduler = ReminderScheduler::new(settings.clone(), clock.clone());
        (scheduler, clock, settings)
    }

    fn drain(rx: &mut broadcast::Receiver<ReminderSignal>) -> Vec<ReminderSignal> {
        let mut signals = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(signal) => signals.push(signal),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return signals,
                Err(TryRecvError::Lagged(_)) => {}
            }
        }
    }

    fn due_count(signals: &[ReminderSignal]) -> usize {
        signals
            .iter()
            .filter(|s| **s == ReminderSignal::ReminderDue)
            .count()
    }

    #[test]
    fn due_exactly_at_interval() {
        let (scheduler, clock, _) = setup();
        let mut rx = scheduler.subscribe();

        clock.advance(minutes(45) - chrono::Duration::seconds(1));
        scheduler.check();
        assert_eq!(drain(&mut rx), vec![ReminderSignal::Tick { remaining_ms: 1000 }]);

        clock.advance(chrono::Duration::seconds(1));
        scheduler.check();
        assert_eq!(
            drain(&mut rx),
            vec![
                ReminderSignal::Tick { remaining_ms: 0 },
                ReminderSignal::ReminderDue
            ]
        );
    }

    #[test]
    fn reset_makes_due_idempotent() {
        let (scheduler, clock, _) = setup();
        let mut rx = scheduler.subscribe();

        clock.advance(minutes(50));
        scheduler.check();
        assert_eq!(due_count(&drain(&mut rx)), 1);

        scheduler.reset_timer();
        scheduler.check();
        clock.advance(chrono::Duration::seconds(30));
        scheduler.check();
        assert_eq!(due_count(&drain(&mut rx)), 0);
    }

    #[test]
    fn remaining_is_non_increasing_while_running() {
        let (scheduler, clock, _) = setup();
        let mut previous = scheduler.remaining_ms();
        assert_eq!(previous, 45 * 60 * 1000);

        for _ in 0..100 {
            clock.advance(chrono::Duration::seconds(30));
            let remaining = scheduler.remaining_ms();
            assert!(remaining <= previous);
            assert!(remaining >= 0);
            previous = remaining;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn paused_reports_minus_one_and_never_fires() {
        let (scheduler, clock, _) = setup();
        let mut rx = scheduler.subscribe();

        scheduler.pause();
        assert_eq!(scheduler.phase(), SchedulerPhase::Paused);
        assert_eq!(scheduler.remaining_ms(), -1);

        clock.advance(minutes(120));
        scheduler.check();
        assert_eq!(drain(&mut rx), vec![ReminderSignal::Tick { remaining_ms: -1 }]);
    }

    #[test]
    fn resume_restarts_interval() {
        let (scheduler, clock, _) = setup();
        clock.advance(minutes(40));
        scheduler.pause();
        clock.advance(minutes(30));
        scheduler.resume();

        assert_eq!(scheduler.phase(), SchedulerPhase::Running);
        assert_eq!(scheduler.remaining_ms(), 45 * 60 * 1000);
    }

    #[test]
    fn snooze_suppresses_until_it_ends() {
        let (scheduler, clock, _) = setup();
        let mut rx = scheduler.subscribe();

        clock.advance(minutes(44));
        scheduler.snooze();
        assert_eq!(scheduler.phase(), SchedulerPhase::Snoozed);
        assert_eq!(scheduler.remaining_ms(), 10 * 60 * 1000);

        clock.advance(minutes(3));
        assert_eq!(scheduler.remaining_ms(), 7 * 60 * 1000);
        scheduler.check();
        assert_eq!(due_count(&drain(&mut rx)), 0);

        clock.advance(minutes(7));
        assert_eq!(scheduler.phase(), SchedulerPhase::Running);
        scheduler.check();
        assert_eq!(due_count(&drain(&mut rx)), 1);
    }

    #[test]
    fn snooze_ignored_while_paused() {
        let (scheduler, _, _) = setup();
        scheduler.pause();
        scheduler.snooze();
        scheduler.resume();
        assert_eq!(scheduler.phase(), SchedulerPhase::Running);
    }

    #[test]
    fn reset_clears_snooze() {
        let (scheduler, _, _) = setup();
        scheduler.snooze();
        scheduler.reset_timer();
        assert_eq!(scheduler.phase(), SchedulerPhase::Running);
        assert_eq!(scheduler.remaining_ms(), 45 * 60 * 1000);
    }

    #[test]
    fn interval_is_read_on_every_check() {
        let (scheduler, clock, settings) = setup();
        let mut rx = scheduler.subscribe();

        clock.advance(minutes(20));
        scheduler.check();
        assert_eq!(due_count(&drain(&mut rx)), 0);

        settings
            .update(&mut |s| s.reminder_interval_minutes = 15)
            .unwrap();
        scheduler.check();
        assert_eq!(due_count(&drain(&mut rx)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_checks_on_cadence_until_stopped() {
        let (scheduler, clock, _) = setup();
        let mut rx = scheduler.subscribe();

        scheduler.start();
        assert!(scheduler.is_started());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(
            drain(&mut rx),
            vec![ReminderSignal::Tick { remaining_ms: 45 * 60 * 1000 }]
        );

        clock.advance(minutes(45));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(due_count(&drain(&mut rx)), 1);

        scheduler.stop();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(drain(&mut rx).is_empty());
        assert!(!scheduler.is_started());
    }
}
