//! Core types: events, time windows, clock, settings, logging

pub mod clock;
pub mod event;
pub mod logging;
pub mod settings;
pub mod time;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use event::{EventStatus, NormalizedEvent, ProviderKind};
pub use logging::{LogConfig, LogFormat, LoggingError, init_logging};
pub use settings::{
    FileSettingsStore, MemorySettingsStore, ProviderSettings, Settings, SettingsError,
    SettingsResult, SettingsStore, SharedSettings, TokenSet,
};
pub use time::TimeWindow;
