//! Subcommand implementations.

pub mod auth;
pub mod check;
pub mod config;
pub mod run;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use breakwatch_core::{FileSettingsStore, ProviderKind, SharedClock, SharedSettings};
use breakwatch_providers::{AvailabilitySource, CalendarAccount};
use breakwatch_server::AvailabilityAggregator;

use crate::error::ClientResult;

/// Opens the settings file at `path`, or the default location.
pub fn open_store(path: Option<&Path>) -> ClientResult<Arc<FileSettingsStore>> {
    let store = match path {
        Some(path) => FileSettingsStore::open(path)?,
        None => FileSettingsStore::open_default()?,
    };
    Ok(Arc::new(store))
}

/// Builds an aggregator over one account per provider.
pub(crate) fn aggregator(settings: SharedSettings, clock: SharedClock) -> AvailabilityAggregator {
    let sources: Vec<Arc<dyn AvailabilitySource>> = ProviderKind::ALL
        .iter()
        .map(|&kind| CalendarAccount::new(kind, settings.clone(), clock.clone()).source())
        .collect();
    AvailabilityAggregator::new(sources, settings, clock)
}
