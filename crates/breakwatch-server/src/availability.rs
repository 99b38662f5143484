//! Calendar availability aggregation.
//!
//! The aggregator polls every enabled and connected [`AvailabilitySource`]
//! on a fixed cadence and keeps one merged, time-stamped cache of busy
//! intervals. Reminder suppression asks it whether the user is in a meeting
//! or about to be.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use breakwatch_core::{
    EventStatus, NormalizedEvent, ProviderKind, SharedClock, SharedSettings, TimeWindow,
};
use breakwatch_providers::{AvailabilitySource, ProviderResult};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::periodic::PeriodicTask;

/// What to publish for a provider whose fetch failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutagePolicy {
    /// The failing provider contributes no events.
    #[default]
    DropEvents,
    /// The failing provider re-publishes its last successful fetch.
    KeepLastKnown,
}

/// Aggregator tuning.
#[derive(Debug, Clone)]
pub struct AvailabilityConfig {
    /// How often sources are polled.
    pub poll_interval: Duration,
    /// How far ahead of now each fetch looks.
    pub lookahead: chrono::Duration,
    /// Cache age past which a query fetches first.
    pub freshness: chrono::Duration,
    pub outage_policy: OutagePolicy,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5 * 60),
            lookahead: chrono::Duration::hours(2),
            freshness: chrono::Duration::minutes(5),
            outage_policy: OutagePolicy::DropEvents,
        }
    }
}

impl AvailabilityConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_lookahead(mut self, lookahead: chrono::Duration) -> Self {
        self.lookahead = lookahead;
        self
    }

    pub fn with_freshness(mut self, freshness: chrono::Duration) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_outage_policy(mut self, policy: OutagePolicy) -> Self {
        self.outage_policy = policy;
        self
    }
}

/// Merged events from every provider and when they were fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityCache {
    /// Events sorted by start.
    pub events: Vec<NormalizedEvent>,
    /// `None` until the first fetch cycle completes.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl AvailabilityCache {
    /// True if never filled or older than `freshness`.
    pub fn is_stale(&self, now: DateTime<Utc>, freshness: chrono::Duration) -> bool {
        self.fetched_at.is_none_or(|at| now - at > freshness)
    }

    /// True if any counted event is in progress or starts within `buffer`.
    ///
    /// Free events never count; tentative ones count only when
    /// `count_tentative` is set.
    pub fn is_busy_or_soon(
        &self,
        now: DateTime<Utc>,
        buffer: chrono::Duration,
        count_tentative: bool,
    ) -> bool {
        self.events.iter().any(|event| {
            let counted = match event.status {
                EventStatus::Free => false,
                EventStatus::Tentative => count_tentative,
                EventStatus::Confirmed => true,
            };
            counted && (event.is_in_progress(now) || event.starts_within(now, buffer))
        })
    }
}

/// Per-provider state for the settings display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderStatus {
    pub kind: ProviderKind,
    pub enabled: bool,
    pub connected: bool,
}

/// Polls calendar sources and answers "busy or meeting soon" queries.
pub struct AvailabilityAggregator {
    sources: Vec<Arc<dyn AvailabilitySource>>,
    settings: SharedSettings,
    clock: SharedClock,
    config: AvailabilityConfig,
    cache: RwLock<AvailabilityCache>,
    last_known: Mutex<HashMap<ProviderKind, Vec<NormalizedEvent>>>,
    poller: Mutex<Option<PeriodicTask>>,
}

impl fmt::Debug for AvailabilityAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<ProviderKind> = self.sources.iter().map(|s| s.kind()).collect();
        f.debug_struct("AvailabilityAggregator")
            .field("sources", &kinds)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AvailabilityAggregator {
    pub fn new(
        sources: Vec<Arc<dyn AvailabilitySource>>,
        settings: SharedSettings,
        clock: SharedClock,
    ) -> Self {
        Self::with_config(sources, settings, clock, AvailabilityConfig::default())
    }

    pub fn with_config(
        sources: Vec<Arc<dyn AvailabilitySource>>,
        settings: SharedSettings,
        clock: SharedClock,
        config: AvailabilityConfig,
    ) -> Self {
        Self {
            sources,
            settings,
            clock,
            config,
            cache: RwLock::new(AvailabilityCache::default()),
            last_known: Mutex::new(HashMap::new()),
            poller: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AvailabilityConfig {
        &self.config
    }

    /// Starts polling with one immediate fetch. Replaces any running poller.
    pub fn start_polling(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let task = PeriodicTask::spawn("availability", self.config.poll_interval, true, move || {
            let weak = weak.clone();
            async move {
                if let Some(aggregator) = weak.upgrade() {
                    aggregator.refresh().await;
                }
            }
        });

        let previous = self
            .poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.stop();
        }
        info!(
            poll_secs = self.config.poll_interval.as_secs(),
            "calendar polling started"
        );
    }

    pub fn stop_polling(&self) {
        let task = self.poller.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.stop();
            info!("calendar polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    /// Runs one fetch cycle and replaces the cache.
    ///
    /// Sources are fetched concurrently; a failing source is logged and
    /// handled according to the [`OutagePolicy`].
    pub async fn refresh(&self) {
        let settings = self.settings.get();
        let window = TimeWindow::from_now(self.clock.now(), self.config.lookahead);

        let active: Vec<&Arc<dyn AvailabilitySource>> = self
            .sources
            .iter()
            .filter(|source| settings.provider(source.kind()).enabled && source.is_connected())
            .collect();
        debug!(sources = active.len(), "refreshing calendar availability");

        let results = join_all(active.into_iter().map(|source| async move {
            (source.kind(), source.fetch_events(window).await)
        }))
        .await;

        let events = self.merge(results);
        let fetched_at = self.clock.now();
        debug!(events = events.len(), %fetched_at, "availability cache replaced");

        *self.cache.write().await = AvailabilityCache {
            events,
            fetched_at: Some(fetched_at),
        };
    }

    fn merge(
        &self,
        results: Vec<(ProviderKind, ProviderResult<Vec<NormalizedEvent>>)>,
    ) -> Vec<NormalizedEvent> {
        let mut last_known = self.last_known.lock().unwrap_or_else(|e| e.into_inner());
        let mut merged = Vec::new();

        for (kind, result) in results {
            match result {
                Ok(events) => {
                    debug!(provider = %kind, count = events.len(), "fetched events");
                    last_known.insert(kind, events.clone());
                    merged.extend(events);
                }
                Err(e) => {
                    warn!(provider = %kind, error = %e, "calendar fetch failed");
                    if self.config.outage_policy == OutagePolicy::KeepLastKnown
                        && let Some(previous) = last_known.get(&kind)
                    {
                        merged.extend(previous.iter().cloned());
                    }
                }
            }
        }

        merged.sort_by_key(|event| event.start);
        merged
    }

    /// True if the user is in a meeting or one starts within `buffer_minutes`.
    ///
    /// Fetches first when the cache is empty or stale.
    pub async fn is_busy_or_meeting_soon(&self, buffer_minutes: u32) -> bool {
        let stale = self
            .cache
            .read()
            .await
            .is_stale(self.clock.now(), self.config.freshness);
        if stale {
            debug!("availability cache stale, refreshing");
            self.refresh().await;
        }

        let count_tentative = self.settings.get().suppress_tentative;
        let buffer = chrono::Duration::minutes(i64::from(buffer_minutes));
        let now = self.clock.now();
        self.cache
            .read()
            .await
            .is_busy_or_soon(now, buffer, count_tentative)
    }

    pub fn provider_statuses(&self) -> Vec<ProviderStatus> {
        let settings = self.settings.get();
        ProviderKind::ALL
            .iter()
            .map(|&kind| ProviderStatus {
                kind,
                enabled: settings.provider(kind).enabled,
                connected: self
                    .sources
                    .iter()
                    .any(|source| source.kind() == kind && source.is_connected()),
            })
            .collect()
    }

    pub async fn snapshot(&self) -> AvailabilityCache {
        self.cache.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use breakwatch_core::{Clock, ManualClock, MemorySettingsStore, Settings, SettingsStore};
    use breakwatch_providers::{BoxFuture, ProviderError};
    use chrono::TimeZone;

    struct FakeSource {
        kind: ProviderKind,
        connected: AtomicBool,
        failing: AtomicBool,
        events: Mutex<Vec<NormalizedEvent>>,
        calls: AtomicU32,
    }

    impl FakeSource {
        fn new(kind: ProviderKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                connected: AtomicBool::new(true),
                failing: AtomicBool::new(false),
                events: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
            })
        }

        fn set_events(&self, events: Vec<NormalizedEvent>) {
            *self.events.lock().unwrap() = events;
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AvailabilitySource for FakeSource {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn fetch_events(
            &self,
            _window: TimeWindow,
        ) -> BoxFuture<'_, ProviderResult<Vec<NormalizedEvent>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if self.failing.load(Ordering::SeqCst) {
                Err(ProviderError::network("connection refused").with_provider(self.kind))
            } else {
                Ok(self.events.lock().unwrap().clone())
            };
            Box::pin(async move { result })
        }
    }

    struct Fixture {
        aggregator: Arc<AvailabilityAggregator>,
        google: Arc<FakeSource>,
        microsoft: Arc<FakeSource>,
        clock: Arc<ManualClock>,
        settings: Arc<MemorySettingsStore>,
    }

    fn fixture(policy: OutagePolicy) -> Fixture {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap());
        let mut initial = Settings::default();
        initial.google.enabled = true;
        initial.microsoft.enabled = true;
        let settings = MemorySettingsStore::shared(initial);

        let google = FakeSource::new(ProviderKind::Google);
        let microsoft = FakeSource::new(ProviderKind::Microsoft);
        let sources = vec![
            google.clone() as Arc<dyn AvailabilitySource>,
            microsoft.clone() as Arc<dyn AvailabilitySource>,
        ];

        let aggregator = Arc::new(AvailabilityAggregator::with_config(
            sources,
            settings.clone(),
            clock.clone(),
            AvailabilityConfig::default().with_outage_policy(policy),
        ));
        Fixture {
            aggregator,
            google,
            microsoft,
            clock,
            settings,
        }
    }

    fn event(
        fx: &Fixture,
        start_min: i64,
        end_min: i64,
        status: EventStatus,
        kind: ProviderKind,
    ) -> NormalizedEvent {
        let now = fx.clock.now();
        NormalizedEvent::new(
            now + chrono::Duration::minutes(start_min),
            now + chrono::Duration::minutes(end_min),
            status,
            kind,
        )
    }

    #[tokio::test]
    async fn upcoming_meeting_respects_buffer() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.google
            .set_events(vec![event(&fx, 5, 35, EventStatus::Confirmed, ProviderKind::Google)]);

        assert!(fx.aggregator.is_busy_or_meeting_soon(15).await);
        assert!(!fx.aggregator.is_busy_or_meeting_soon(2).await);
    }

    #[tokio::test]
    async fn in_progress_meeting_is_busy() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.microsoft.set_events(vec![event(
            &fx,
            -10,
            20,
            EventStatus::Confirmed,
            ProviderKind::Microsoft,
        )]);
        assert!(fx.aggregator.is_busy_or_meeting_soon(0).await);
    }

    #[tokio::test]
    async fn meeting_that_just_ended_is_not_busy() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.google
            .set_events(vec![event(&fx, -30, 0, EventStatus::Confirmed, ProviderKind::Google)]);
        assert!(!fx.aggregator.is_busy_or_meeting_soon(10).await);
    }

    #[tokio::test]
    async fn tentative_counts_only_when_enabled() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.google
            .set_events(vec![event(&fx, 0, 30, EventStatus::Tentative, ProviderKind::Google)]);
        assert!(!fx.aggregator.is_busy_or_meeting_soon(10).await);

        fx.settings
            .update(&mut |s| s.suppress_tentative = true)
            .unwrap();
        assert!(fx.aggregator.is_busy_or_meeting_soon(10).await);
    }

    #[tokio::test]
    async fn free_never_suppresses() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.settings
            .update(&mut |s| s.suppress_tentative = true)
            .unwrap();
        fx.google
            .set_events(vec![event(&fx, -5, 60, EventStatus::Free, ProviderKind::Google)]);
        assert!(!fx.aggregator.is_busy_or_meeting_soon(120).await);
    }

    #[tokio::test]
    async fn stale_cache_fetches_once_and_uses_fresh_events() {
        let fx = fixture(OutagePolicy::DropEvents);

        assert!(!fx.aggregator.is_busy_or_meeting_soon(10).await);
        assert!(!fx.aggregator.is_busy_or_meeting_soon(10).await);
        assert_eq!(fx.google.calls(), 1);
        assert_eq!(fx.microsoft.calls(), 1);

        fx.clock.advance(chrono::Duration::minutes(6));
        fx.google
            .set_events(vec![event(&fx, 3, 30, EventStatus::Confirmed, ProviderKind::Google)]);

        assert!(fx.aggregator.is_busy_or_meeting_soon(10).await);
        assert_eq!(fx.google.calls(), 2);
        assert_eq!(fx.microsoft.calls(), 2);
    }

    #[tokio::test]
    async fn cache_within_freshness_is_reused() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.aggregator.refresh().await;

        fx.clock.advance(chrono::Duration::minutes(5));
        fx.aggregator.is_busy_or_meeting_soon(10).await;
        assert_eq!(fx.google.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_and_disconnected_sources_are_skipped() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.settings
            .update(&mut |s| s.google.enabled = false)
            .unwrap();
        fx.microsoft.connected.store(false, Ordering::SeqCst);

        fx.aggregator.refresh().await;

        assert_eq!(fx.google.calls(), 0);
        assert_eq!(fx.microsoft.calls(), 0);
        let snapshot = fx.aggregator.snapshot().await;
        assert!(snapshot.events.is_empty());
        assert_eq!(snapshot.fetched_at, Some(fx.clock.now()));
    }

    #[tokio::test]
    async fn merged_events_are_sorted() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.google.set_events(vec![
            event(&fx, 10, 20, EventStatus::Confirmed, ProviderKind::Google),
            event(&fx, 60, 90, EventStatus::Confirmed, ProviderKind::Google),
        ]);
        fx.microsoft.set_events(vec![event(
            &fx,
            30,
            45,
            EventStatus::Tentative,
            ProviderKind::Microsoft,
        )]);

        fx.aggregator.refresh().await;

        let providers: Vec<_> = fx
            .aggregator
            .snapshot()
            .await
            .events
            .iter()
            .map(|e| e.provider)
            .collect();
        assert_eq!(
            providers,
            vec![ProviderKind::Google, ProviderKind::Microsoft, ProviderKind::Google]
        );
    }

    #[tokio::test]
    async fn failing_source_is_isolated() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.google
            .set_events(vec![event(&fx, 0, 30, EventStatus::Confirmed, ProviderKind::Google)]);
        fx.microsoft.set_events(vec![event(
            &fx,
            40,
            50,
            EventStatus::Confirmed,
            ProviderKind::Microsoft,
        )]);
        fx.google.failing.store(true, Ordering::SeqCst);

        fx.aggregator.refresh().await;

        let events = fx.aggregator.snapshot().await.events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].provider, ProviderKind::Microsoft);
    }

    #[tokio::test]
    async fn drop_events_forgets_failed_provider() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.google
            .set_events(vec![event(&fx, 0, 30, EventStatus::Confirmed, ProviderKind::Google)]);
        fx.aggregator.refresh().await;
        assert_eq!(fx.aggregator.snapshot().await.events.len(), 1);

        fx.google.failing.store(true, Ordering::SeqCst);
        fx.aggregator.refresh().await;
        assert!(fx.aggregator.snapshot().await.events.is_empty());
    }

    #[tokio::test]
    async fn keep_last_known_republishes_on_failure() {
        let fx = fixture(OutagePolicy::KeepLastKnown);
        fx.google
            .set_events(vec![event(&fx, 0, 30, EventStatus::Confirmed, ProviderKind::Google)]);
        fx.aggregator.refresh().await;

        fx.google.failing.store(true, Ordering::SeqCst);
        fx.clock.advance(chrono::Duration::minutes(6));
        assert!(fx.aggregator.is_busy_or_meeting_soon(10).await);
        assert_eq!(fx.aggregator.snapshot().await.events.len(), 1);
    }

    #[tokio::test]
    async fn provider_statuses_reflect_settings_and_tokens() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.settings
            .update(&mut |s| s.microsoft.enabled = false)
            .unwrap();
        fx.google.connected.store(false, Ordering::SeqCst);

        let statuses = fx.aggregator.provider_statuses();
        assert_eq!(
            statuses,
            vec![
                ProviderStatus {
                    kind: ProviderKind::Google,
                    enabled: true,
                    connected: false,
                },
                ProviderStatus {
                    kind: ProviderKind::Microsoft,
                    enabled: false,
                    connected: true,
                },
            ]
        );
    }

    #[test]
    fn stale_boundaries() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        let freshness = chrono::Duration::minutes(5);
        assert!(AvailabilityCache::default().is_stale(now, freshness));

        let cache = AvailabilityCache {
            events: Vec::new(),
            fetched_at: Some(now),
        };
        assert!(!cache.is_stale(now + freshness, freshness));
        assert!(cache.is_stale(now + freshness + chrono::Duration::seconds(1), freshness));
    }

    #[tokio::test(start_paused = true)]
    async fn polling_fetches_immediately_then_on_cadence() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.aggregator.start_polling();
        assert!(fx.aggregator.is_polling());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fx.google.calls(), 1);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(fx.google.calls(), 2);

        fx.aggregator.stop_polling();
        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        assert_eq!(fx.google.calls(), 2);
        assert!(!fx.aggregator.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_polling_replaces_previous_poller() {
        let fx = fixture(OutagePolicy::DropEvents);
        fx.aggregator.start_polling();
        tokio::time::sleep(Duration::from_secs(1)).await;
        fx.aggregator.start_polling();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fx.google.calls(), 2);

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(fx.google.calls(), 3);
    }
}
