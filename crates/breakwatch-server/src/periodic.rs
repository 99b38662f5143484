//! Cancellable fixed-cadence task.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Runs a closure on a fixed cadence until stopped or dropped.
///
/// Each firing is spawned as its own task, so stopping only prevents future
/// firings; work started by earlier firings runs to completion.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Starts firing `f` every `period`, optionally once right away.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, fire_immediately: bool, mut f: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let first = if fire_immediately {
                Instant::now()
            } else {
                Instant::now() + period
            };
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                tokio::spawn(f());
            }
        });

        debug!(task = name, period_secs = period.as_secs(), "periodic task started");
        Self { name, handle }
    }

    /// Stops future firings.
    pub fn stop(&self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            debug!(task = self.name, "periodic task stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
