//! One provider's authenticator, token manager and calendar client, wired
//! together over a shared descriptor and HTTP client.

use std::sync::Arc;

use breakwatch_core::{ProviderKind, SharedClock, SharedSettings};

use crate::auth::PkceAuthenticator;
use crate::client::CalendarClient;
use crate::descriptor::ProviderDescriptor;
use crate::error::ProviderResult;
use crate::source::AvailabilitySource;
use crate::tokens::TokenManager;

#[derive(Debug)]
pub struct CalendarAccount {
    kind: ProviderKind,
    tokens: Arc<TokenManager>,
    authenticator: PkceAuthenticator,
    client: Arc<CalendarClient>,
}

impl CalendarAccount {
    /// Builds an account for `kind` against the real provider endpoints.
    pub fn new(kind: ProviderKind, settings: SharedSettings, clock: SharedClock) -> Self {
        Self::with_descriptor(ProviderDescriptor::for_kind(kind), settings, clock)
    }

    /// Builds an account from a custom descriptor.
    pub fn with_descriptor(
        descriptor: ProviderDescriptor,
        settings: SharedSettings,
        clock: SharedClock,
    ) -> Self {
        let kind = descriptor.kind;
        let descriptor = Arc::new(descriptor);
        let http = crate::http_client();

        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&descriptor),
            Arc::clone(&settings),
            clock,
            http.clone(),
        ));
        let authenticator =
            PkceAuthenticator::new(Arc::clone(&descriptor), Arc::clone(&tokens), settings);
        let client = Arc::new(CalendarClient::new(descriptor, Arc::clone(&tokens), http));

        Self {
            kind,
            tokens,
            authenticator,
            client,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn authenticator(&self) -> &PkceAuthenticator {
        &self.authenticator
    }

    pub fn client(&self) -> &Arc<CalendarClient> {
        &self.client
    }

    /// The calendar client as an aggregator source.
    pub fn source(&self) -> Arc<dyn AvailabilitySource> {
        Arc::clone(&self.client) as Arc<dyn AvailabilitySource>
    }

    pub fn is_connected(&self) -> bool {
        self.tokens.is_connected()
    }

    /// Runs the interactive browser authorization.
    pub async fn connect(&self) -> ProviderResult<()> {
        self.authenticator.authenticate().await
    }

    /// Forgets this account's tokens.
    pub fn disconnect(&self) -> ProviderResult<()> {
        self.tokens.disconnect()
    }
}
