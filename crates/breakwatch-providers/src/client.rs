//! Calendar event fetching over HTTP.

use std::sync::Arc;

use breakwatch_core::{NormalizedEvent, ProviderKind, TimeWindow};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::descriptor::{EventPage, NextPage, ProviderDescriptor};
use crate::error::{ProviderError, ProviderResult};
use crate::source::{AvailabilitySource, BoxFuture};
use crate::tokens::TokenManager;

/// Upper bound on pages followed in one fetch.
pub const MAX_PAGES: usize = 20;

/// Reads events for one provider using tokens from a [`TokenManager`].
#[derive(Debug)]
pub struct CalendarClient {
    descriptor: Arc<ProviderDescriptor>,
    tokens: Arc<TokenManager>,
    http: reqwest::Client,
}

impl CalendarClient {
    pub fn new(
        descriptor: Arc<ProviderDescriptor>,
        tokens: Arc<TokenManager>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            descriptor,
            tokens,
            http,
        }
    }

    /// Lists events overlapping `window`, following pagination.
    pub async fn list_events(&self, window: TimeWindow) -> ProviderResult<Vec<NormalizedEvent>> {
        let kind = self.descriptor.kind;
        let access_token = self.tokens.valid_access_token().await?;

        let mut events = Vec::new();
        let mut next: Option<NextPage> = None;

        for page_number in 0..MAX_PAGES {
            let page = self.fetch_page(&access_token, &window, next.as_ref()).await?;
            events.extend(page.events);

            match page.next {
                Some(n) => next = Some(n),
                None => {
                    next = None;
                    break;
                }
            }
            debug!(provider = %kind, page = page_number + 1, "following next page");
        }

        if next.is_some() {
            warn!(provider = %kind, max_pages = MAX_PAGES, "stopped paginating, result truncated");
        }

        events.sort_by_key(|e| e.start);
        debug!(provider = %kind, count = events.len(), "fetched events");
        Ok(events)
    }

    async fn fetch_page(
        &self,
        access_token: &str,
        window: &TimeWindow,
        next: Option<&NextPage>,
    ) -> ProviderResult<EventPage> {
        let kind = self.descriptor.kind;

        let mut request = match next {
            Some(NextPage::Link(link)) => self.http.get(link),
            Some(NextPage::Token { param, value }) => self
                .http
                .get(&self.descriptor.events_url)
                .query(&(self.descriptor.events_query)(window))
                .query(&[(*param, value)]),
            None => self
                .http
                .get(&self.descriptor.events_url)
                .query(&(self.descriptor.events_query)(window)),
        };
        request = request.bearer_auth(access_token);
        for (name, value) in &self.descriptor.event_headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                "request timeout".to_string()
            } else if e.is_connect() {
                format!("connection failed: {e}")
            } else {
                format!("request failed: {e}")
            };
            ProviderError::network(message).with_provider(kind)
        })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(ProviderError::rate_limited(format!(
                "rate limit exceeded{}",
                retry_after
                    .map(|s| format!(", retry after {s} seconds"))
                    .unwrap_or_default()
            ))
            .with_provider(kind));
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(
                ProviderError::authentication("access token expired or invalid")
                    .with_provider(kind),
            );
        }

        if status == StatusCode::FORBIDDEN {
            return Err(ProviderError::denied("access denied to calendar").with_provider(kind));
        }

        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {e}")).with_provider(kind)
        })?;

        if !status.is_success() {
            return Err(
                ProviderError::server(format!("API error ({status}): {body}")).with_provider(kind)
            );
        }

        (self.descriptor.parse_events)(&body)
    }
}

impl AvailabilitySource for CalendarClient {
    fn kind(&self) -> ProviderKind {
        self.descriptor.kind
    }

    fn is_connected(&self) -> bool {
        self.tokens.is_connected()
    }

    fn fetch_events(
        &self,
        window: TimeWindow,
    ) -> BoxFuture<'_, ProviderResult<Vec<NormalizedEvent>>> {
        Box::pin(self.list_events(window))
    }
}
