//! Calendar access for breakwatch.
//!
//! - [`ProviderDescriptor`] - endpoints, scopes and response parsing per provider
//! - [`PkceAuthenticator`] - interactive browser authorization
//! - [`TokenManager`] - token persistence and silent refresh
//! - [`CalendarClient`] - paginated event fetching, normalized to [`NormalizedEvent`]
//! - [`AvailabilitySource`] - what the availability aggregator polls
//!
//! ```text
//!   PkceAuthenticator ──exchange──▶ TokenManager ◀──valid_access_token── CalendarClient
//!          │                            │                                     │
//!     redirect listener            SettingsStore                    Google / Graph API
//! ```
//!
//! [`NormalizedEvent`]: breakwatch_core::NormalizedEvent

use std::time::Duration;

use tracing::warn;

pub mod account;
pub mod auth;
pub mod client;
pub mod descriptor;
pub mod error;
pub mod google;
pub mod microsoft;
pub mod pkce;
pub mod redirect;
pub mod source;
pub mod tokens;

pub use account::CalendarAccount;
pub use auth::{AUTH_TIMEOUT, BrowserLauncher, PkceAuthenticator};
pub use client::CalendarClient;
pub use descriptor::{EventPage, NextPage, ProviderDescriptor};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use pkce::PkceChallenge;
pub use source::{AvailabilitySource, BoxFuture};
pub use tokens::TokenManager;

/// Per-request timeout for token and event calls.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the HTTP client shared by an account's components.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("breakwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}
