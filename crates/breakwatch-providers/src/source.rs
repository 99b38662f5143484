//! The seam between calendar accounts and the availability aggregator.

use std::future::Future;
use std::pin::Pin;

use breakwatch_core::{NormalizedEvent, ProviderKind, TimeWindow};

use crate::error::ProviderResult;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Something that can report busy intervals for one provider.
///
/// ```ignore
/// impl AvailabilitySource for MySource {
///     fn kind(&self) -> ProviderKind { ProviderKind::Google }
///     fn is_connected(&self) -> bool { true }
///     fn fetch_events(&self, window: TimeWindow) -> BoxFuture<'_, ProviderResult<Vec<NormalizedEvent>>> {
///         Box::pin(async move { Ok(vec![]) })
///     }
/// }
/// ```
pub trait AvailabilitySource: Send + Sync {
    /// Which provider this source reads.
    fn kind(&self) -> ProviderKind;

    /// True if the source holds a refresh credential.
    fn is_connected(&self) -> bool;

    /// Fetches normalized events overlapping `window`.
    ///
    /// Cancelled events are never returned.
    fn fetch_events(
        &self,
        window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<NormalizedEvent>>>;
}
