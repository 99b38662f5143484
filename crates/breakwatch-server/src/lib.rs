//! Break reminder runtime.
//!
//! - [`ReminderScheduler`]: tracks active time and signals when a break is due
//! - [`AvailabilityAggregator`]: merges calendar events and answers "busy or meeting soon"
//! - [`BreakNotifier`]: shows the reminder
//! - [`BreakService`]: ties the three together until shutdown

pub mod availability;
pub mod error;
pub mod notify;
pub mod periodic;
pub mod reminder;
pub mod service;
pub mod shutdown;

pub use availability::{
    AvailabilityAggregator, AvailabilityCache, AvailabilityConfig, OutagePolicy, ProviderStatus,
};
pub use error::{ServerError, ServerResult};
pub use notify::{BreakNotifier, DesktopNotifier, NotifyConfig};
pub use periodic::PeriodicTask;
pub use reminder::{CHECK_INTERVAL, ReminderScheduler, ReminderSignal, SchedulerPhase};
pub use service::{BreakService, DueOutcome};
pub use shutdown::ShutdownHandle;
