//! Token lifecycle: seeding from settings, silent refresh, persistence.
//!
//! A [`TokenManager`] holds the in-memory copy of one provider's tokens and
//! writes every new set back to the settings store as soon as it is issued.
//! Refreshes are not serialized: two callers that both observe an expired
//! token will both refresh, and the last response wins. A disconnect bumps
//! the state's generation, so any response issued for an earlier generation
//! is discarded instead of reconnecting the account.

use std::sync::{Arc, Mutex};

use breakwatch_core::{ProviderKind, SharedClock, SharedSettings, TokenSet};
use chrono::Duration;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::descriptor::ProviderDescriptor;
use crate::error::{ProviderError, ProviderErrorCode, ProviderResult};

/// Access tokens are refreshed this many seconds before they expire.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when a token response omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;

#[derive(Debug, Default, Clone)]
struct TokenState {
    tokens: Option<TokenSet>,
    /// Incremented by every disconnect.
    generation: u64,
}

/// Body of a successful token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Owns one provider's OAuth tokens.
#[derive(Debug)]
pub struct TokenManager {
    descriptor: Arc<ProviderDescriptor>,
    settings: SharedSettings,
    clock: SharedClock,
    http: reqwest::Client,
    state: Mutex<TokenState>,
}

impl TokenManager {
    /// Creates a manager seeded from the persisted token set, if any.
    pub fn new(
        descriptor: Arc<ProviderDescriptor>,
        settings: SharedSettings,
        clock: SharedClock,
        http: reqwest::Client,
    ) -> Self {
        let state = TokenState {
            tokens: settings.get().provider(descriptor.kind).tokens.clone(),
            generation: 0,
        };

        Self {
            descriptor,
            settings,
            clock,
            http,
            state: Mutex::new(state),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.descriptor.kind
    }

    /// True if a refresh token is persisted for this provider.
    pub fn is_connected(&self) -> bool {
        self.settings.get().provider(self.kind()).has_refresh_token()
    }

    /// Returns an access token, refreshing it first if it is about to expire.
    ///
    /// A failed refresh is logged and whatever access token is held
    /// afterwards is returned as-is. Only a missing access token is an error.
    pub async fn valid_access_token(&self) -> ProviderResult<String> {
        let snapshot = self.snapshot();
        let margin = Duration::seconds(EXPIRY_MARGIN_SECS);
        let stale = snapshot
            .tokens
            .as_ref()
            .is_none_or(|set| !set.is_usable_at(self.clock.now(), margin));
        let refresh_token = snapshot
            .tokens
            .as_ref()
            .and_then(|set| set.refresh_token.as_deref());

        if stale && let Some(refresh_token) = refresh_token {
            match self.refresh(refresh_token, snapshot.generation).await {
                Ok(access_token) => return Ok(access_token),
                Err(e) => {
                    warn!(provider = %self.kind(), error = %e, "token refresh failed, keeping previous token");
                }
            }
        }

        self.snapshot()
            .tokens
            .map(|set| set.access_token)
            .ok_or_else(|| {
                ProviderError::authentication("not signed in").with_provider(self.kind())
            })
    }

    /// Exchanges an authorization code for tokens and persists them.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> ProviderResult<()> {
        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
            ("code_verifier", verifier.to_string()),
        ];
        if self.descriptor.scope_on_exchange {
            params.push(("scope", self.descriptor.scope()));
        }

        let generation = self.snapshot().generation;
        let response = self.request_tokens("token exchange", params).await?;
        self.store(response, None, generation)?;
        info!(provider = %self.kind(), "obtained tokens");
        Ok(())
    }

    /// Forgets all tokens, in memory and in settings.
    ///
    /// Refreshes or exchanges still in flight are discarded when they return.
    pub fn disconnect(&self) -> ProviderResult<()> {
        let kind = self.kind();
        let mut state = self.lock();
        state.tokens = None;
        state.generation += 1;
        self.settings
            .update(&mut |s| s.provider_mut(kind).tokens = None)
            .map_err(|e| {
                ProviderError::internal("failed to clear stored tokens")
                    .with_provider(kind)
                    .with_source(e)
            })?;
        info!(provider = %kind, "disconnected");
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str, generation: u64) -> ProviderResult<String> {
        debug!(provider = %self.kind(), "refreshing access token");
        let mut params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        if self.descriptor.scope_on_exchange {
            params.push(("scope", self.descriptor.scope()));
        }

        let response = self.request_tokens("token refresh", params).await?;
        let access_token = response.access_token.clone();
        match self.store(response, Some(refresh_token.to_string()), generation) {
            Err(e) if e.code() == ProviderErrorCode::AuthenticationFailed => return Err(e),
            Err(e) => warn!(provider = %self.kind(), error = %e, "refreshed token not persisted"),
            Ok(()) => {}
        }
        Ok(access_token)
    }

    /// POSTs a form to the token endpoint, adding the client credentials.
    async fn request_tokens(
        &self,
        what: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> ProviderResult<TokenResponse> {
        let kind = self.kind();
        let provider = self.settings.get().provider(kind).clone();
        let client_id = provider.client_id().ok_or_else(|| {
            ProviderError::configuration(format!("no client_id configured for {kind}"))
                .with_provider(kind)
        })?;
        params.push(("client_id", client_id.to_string()));
        if let Some(secret) = provider.client_secret() {
            params.push(("client_secret", secret.to_string()));
        }

        let response = self
            .http
            .post(&self.descriptor.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                ProviderError::network(format!("{what} request failed: {e}"))
                    .with_provider(kind)
                    .with_source(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read {what} response: {e}"))
                .with_provider(kind)
        })?;

        if !status.is_success() {
            return Err(ProviderError::authentication(format!(
                "{what} failed ({status}): {body}"
            ))
            .with_provider(kind));
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid {what} response: {e}"))
                .with_provider(kind)
        })
    }

    /// Updates memory and settings with a new token response, unless the
    /// account was disconnected since `generation` was observed.
    fn store(
        &self,
        response: TokenResponse,
        previous_refresh: Option<String>,
        generation: u64,
    ) -> ProviderResult<()> {
        let kind = self.kind();
        let mut state = self.lock();
        if state.generation != generation {
            debug!(provider = %kind, "discarding tokens issued before disconnect");
            return Err(
                ProviderError::authentication("disconnected during token request")
                    .with_provider(kind),
            );
        }

        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        let set = TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at: self.clock.now() + Duration::seconds(expires_in),
        };

        state.tokens = Some(set.clone());
        self.settings
            .update(&mut |s| s.provider_mut(kind).tokens = Some(set.clone()))
            .map_err(|e| {
                ProviderError::internal("failed to persist tokens")
                    .with_provider(kind)
                    .with_source(e)
            })
    }

    fn snapshot(&self) -> TokenState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
