//! Interactive OAuth2 authorization code flow with PKCE.
//!
//! # Flow
//!
//! 1. Generate a verifier, its S256 challenge and a state value
//! 2. Bind the loopback redirect listener on the provider's port (on both
//!    `127.0.0.1` and `[::1]` when the redirect host is `localhost`)
//! 3. Open the authorization URL in the user's browser
//! 4. Wait for the redirect carrying `code` (or `error`)
//! 5. Exchange the code and verifier for tokens and persist them
//!
//! The whole round-trip is bounded by a timeout. Exactly one outcome settles
//! each call and the listener is torn down afterwards whatever that outcome
//! was, so the call can simply be retried.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use breakwatch_core::{ProviderKind, SharedSettings};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::descriptor::ProviderDescriptor;
use crate::error::{ProviderError, ProviderResult};
use crate::pkce::PkceChallenge;
use crate::redirect::{self, Redirect};
use crate::tokens::TokenManager;

/// How long the user has to complete consent in the browser.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(120);

/// Opens a URL for the user. Defaults to the system browser.
pub type BrowserLauncher = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Drives the interactive authorization for one provider.
pub struct PkceAuthenticator {
    descriptor: Arc<ProviderDescriptor>,
    tokens: Arc<TokenManager>,
    settings: SharedSettings,
    launcher: BrowserLauncher,
    timeout: Duration,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for PkceAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceAuthenticator")
            .field("provider", &self.descriptor.kind)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PkceAuthenticator {
    pub fn new(
        descriptor: Arc<ProviderDescriptor>,
        tokens: Arc<TokenManager>,
        settings: SharedSettings,
    ) -> Self {
        Self {
            descriptor,
            tokens,
            settings,
            launcher: Arc::new(|url: &str| open::that(url)),
            timeout: AUTH_TIMEOUT,
            listener: Mutex::new(None),
        }
    }

    /// Replaces the browser launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: BrowserLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.descriptor.kind
    }

    /// Runs one authorization round-trip and persists the resulting tokens.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError` if no client id is configured
    /// - `ListenerBind` if the redirect port is taken
    /// - `AuthorizationDenied` if the provider redirects with an error or
    ///   the state does not match
    /// - `Timeout` if no redirect arrives in time
    /// - any token exchange failure
    pub async fn authenticate(&self) -> ProviderResult<()> {
        let kind = self.kind();
        let client_id = self
            .settings
            .get()
            .provider(kind)
            .client_id()
            .map(str::to_owned)
            .ok_or_else(|| {
                ProviderError::configuration(format!(
                    "set a client_id for {kind} before connecting"
                ))
                .with_provider(kind)
            })?;

        let pkce = PkceChallenge::generate();

        let mut slot = self.listener.lock().await;
        if let Some(stale) = slot.take() {
            debug!(provider = %kind, "closing stale redirect listener");
            stale.abort();
            let _ = stale.await;
        }

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, self.descriptor.redirect_port))
            .await
            .map_err(|e| {
                ProviderError::listener_bind(format!(
                    "cannot listen on port {}: {e}",
                    self.descriptor.redirect_port
                ))
                .with_provider(kind)
                .with_source(e)
            })?;
        let port = listener
            .local_addr()
            .map_err(|e| ProviderError::listener_bind(e.to_string()).with_provider(kind))?
            .port();

        let secondary = if self.descriptor.redirect_host == "localhost" {
            match TcpListener::bind((Ipv6Addr::LOCALHOST, port)).await {
                Ok(listener) => Some(listener),
                Err(e) => {
                    debug!(provider = %kind, port, error = %e, "no IPv6 loopback redirect listener");
                    None
                }
            }
        } else {
            None
        };

        let redirect_uri = self.descriptor.redirect_uri(port);
        let auth_url = self
            .descriptor
            .authorization_url(&client_id, &redirect_uri, &pkce)?;

        let (tx, rx) = oneshot::channel();
        *slot = Some(tokio::spawn(redirect::serve(
            listener,
            secondary,
            self.descriptor.redirect_path.to_string(),
            tx,
        )));

        info!(provider = %kind, port, "waiting for authorization in the browser");
        if let Err(e) = (self.launcher)(&auth_url) {
            warn!(provider = %kind, error = %e, "failed to open browser");
            eprintln!(
                "\nOpen this URL in your browser to connect {}:\n\n{}\n",
                kind.display_name(),
                auth_url
            );
        }

        let outcome =
            tokio::time::timeout(self.timeout, self.complete(rx, &pkce, &redirect_uri)).await;

        if let Some(handle) = slot.take() {
            handle.abort();
            let _ = handle.await;
        }

        match outcome {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout(format!(
                "no authorization received within {}s",
                self.timeout.as_secs()
            ))
            .with_provider(kind)),
        }
    }

    async fn complete(
        &self,
        rx: oneshot::Receiver<Redirect>,
        pkce: &PkceChallenge,
        redirect_uri: &str,
    ) -> ProviderResult<()> {
        let kind = self.kind();
        let redirect = rx.await.map_err(|_| {
            ProviderError::internal("redirect listener stopped unexpectedly").with_provider(kind)
        })?;

        match redirect {
            Redirect::Denied { error, description } => {
                let message = match description {
                    Some(description) => format!("{error}: {description}"),
                    None => error,
                };
                Err(ProviderError::denied(message).with_provider(kind))
            }
            Redirect::Code { code, state } => {
                if state.as_deref() != Some(pkce.state.as_str()) {
                    return Err(
                        ProviderError::denied("state mismatch on redirect").with_provider(kind)
                    );
                }
                self.tokens
                    .exchange_code(&code, &pkce.verifier, redirect_uri)
                    .await?;
                info!(provider = %kind, "authorization complete");
                Ok(())
            }
        }
    }
}
