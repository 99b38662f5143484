//! Per-provider endpoint and protocol description.
//!
//! Google and Microsoft run the same OAuth2/PKCE dance and expose the same
//! "events in a window" query, differing only in URLs, scopes, a handful of
//! extra parameters and the response shape. A [`ProviderDescriptor`]
//! captures those differences so the authenticator, token manager and
//! calendar client are written once.

use breakwatch_core::{NormalizedEvent, ProviderKind, TimeWindow};
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::pkce::PkceChallenge;
use crate::{google, microsoft};

/// Builds the query parameters for an events request over a window.
pub type QueryBuilder = fn(&TimeWindow) -> Vec<(&'static str, String)>;

/// Parses one page of an events response body.
pub type EventParser = fn(&str) -> ProviderResult<EventPage>;

/// Where the next page of results lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// Re-issue the original request with `param=value` added.
    Token { param: &'static str, value: String },
    /// Fetch this absolute URL as-is.
    Link(String),
}

/// One page of normalized events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPage {
    pub events: Vec<NormalizedEvent>,
    pub next: Option<NextPage>,
}

/// Everything that differs between two OAuth calendar providers.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub authorize_url: String,
    pub token_url: String,
    pub events_url: String,
    pub scopes: Vec<String>,
    /// Host used in the redirect URI (`127.0.0.1` or `localhost`).
    pub redirect_host: &'static str,
    pub redirect_port: u16,
    pub redirect_path: &'static str,
    /// Additional authorization request parameters.
    pub extra_auth_params: Vec<(&'static str, &'static str)>,
    /// Whether the token exchange must repeat the `scope` parameter.
    pub scope_on_exchange: bool,
    /// Headers sent with every events request.
    pub event_headers: Vec<(&'static str, &'static str)>,
    pub events_query: QueryBuilder,
    pub parse_events: EventParser,
}

impl ProviderDescriptor {
    /// Google Calendar, primary calendar, read-only.
    pub fn google() -> Self {
        Self {
            kind: ProviderKind::Google,
            authorize_url: google::AUTHORIZE_URL.to_string(),
            token_url: google::TOKEN_URL.to_string(),
            events_url: google::EVENTS_URL.to_string(),
            scopes: google::SCOPES.iter().map(|s| s.to_string()).collect(),
            redirect_host: "127.0.0.1",
            redirect_port: 8765,
            redirect_path: "/oauth2callback",
            extra_auth_params: vec![("access_type", "offline"), ("prompt", "consent")],
            scope_on_exchange: false,
            event_headers: Vec::new(),
            events_query: google::events_query,
            parse_events: google::parse_events,
        }
    }

    /// Microsoft Graph calendar view for the signed-in user.
    pub fn microsoft() -> Self {
        Self {
            kind: ProviderKind::Microsoft,
            authorize_url: microsoft::AUTHORIZE_URL.to_string(),
            token_url: microsoft::TOKEN_URL.to_string(),
            events_url: microsoft::EVENTS_URL.to_string(),
            scopes: microsoft::SCOPES.iter().map(|s| s.to_string()).collect(),
            redirect_host: "localhost",
            redirect_port: 8766,
            redirect_path: "/callback",
            extra_auth_params: vec![("prompt", "select_account"), ("response_mode", "query")],
            scope_on_exchange: true,
            event_headers: vec![("Prefer", "outlook.timezone=\"UTC\"")],
            events_query: microsoft::events_query,
            parse_events: microsoft::parse_events,
        }
    }

    /// Returns the descriptor for `kind`.
    pub fn for_kind(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Google => Self::google(),
            ProviderKind::Microsoft => Self::microsoft(),
        }
    }

    #[must_use]
    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    #[must_use]
    pub fn with_events_url(mut self, url: impl Into<String>) -> Self {
        self.events_url = url.into();
        self
    }

    /// Overrides the redirect port. Port 0 lets the OS pick one.
    #[must_use]
    pub fn with_redirect_port(mut self, port: u16) -> Self {
        self.redirect_port = port;
        self
    }

    /// Space-separated scope string.
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    /// Returns the redirect URI for a listener bound on `port`.
    pub fn redirect_uri(&self, port: u16) -> String {
        format!("http://{}:{}{}", self.redirect_host, port, self.redirect_path)
    }

    /// Builds the browser authorization URL for one PKCE attempt.
    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        pkce: &PkceChallenge,
    ) -> ProviderResult<String> {
        let mut url = Url::parse(&self.authorize_url).map_err(|e| {
            ProviderError::configuration(format!("invalid authorize URL: {e}"))
                .with_provider(self.kind)
        })?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("scope", &self.scope())
                .append_pair("code_challenge", &pkce.challenge)
                .append_pair("code_challenge_method", pkce.method())
                .append_pair("state", &pkce.state);
            for (key, value) in &self.extra_auth_params {
                pairs.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }
}
