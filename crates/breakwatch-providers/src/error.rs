//! Error types for calendar provider operations.
//!
//! Every failure in this crate is a [`ProviderError`] carrying a
//! [`ProviderErrorCode`], so callers can decide whether to log and carry on
//! (event fetches, token refresh) or surface it to the user (interactive
//! authentication).

use std::fmt;

use breakwatch_core::ProviderKind;
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials are missing, invalid or expired.
    AuthenticationFailed,
    /// The user or the identity provider refused access.
    AuthorizationDenied,
    /// Connection failed, DNS resolution, TLS, etc.
    NetworkError,
    /// Too many requests.
    RateLimited,
    /// Server returned an unexpected status.
    ServerError,
    /// Response body could not be parsed.
    InvalidResponse,
    /// Missing client id or other setup problem.
    ConfigurationError,
    /// The interactive flow did not complete in time.
    Timeout,
    /// The local redirect listener could not bind its port.
    ListenerBind,
    /// Unexpected internal state.
    InternalError,
}

impl ProviderErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError | Self::Timeout
        )
    }

    /// Returns a stable snake_case name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationDenied => "authorization_denied",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::ConfigurationError => "configuration_error",
            Self::Timeout => "timeout",
            Self::ListenerBind => "listener_bind",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised while talking to a calendar provider.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    provider: Option<ProviderKind>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationDenied, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Timeout, message)
    }

    pub fn listener_bind(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ListenerBind, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Tags the error with the provider it came from.
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Attaches the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<ProviderKind> {
        self.provider
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(provider) = self.provider {
            write!(f, "[{provider}] ")?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes() {
        assert!(ProviderErrorCode::NetworkError.is_retryable());
        assert!(ProviderErrorCode::RateLimited.is_retryable());
        assert!(ProviderErrorCode::Timeout.is_retryable());
        assert!(!ProviderErrorCode::AuthorizationDenied.is_retryable());
        assert!(!ProviderErrorCode::ConfigurationError.is_retryable());
    }

    #[test]
    fn display_includes_provider_and_code() {
        let err = ProviderError::denied("access_denied: user cancelled")
            .with_provider(ProviderKind::Microsoft);
        let display = err.to_string();
        assert_eq!(
            display,
            "[microsoft] authorization_denied: access_denied: user cancelled"
        );
        assert_eq!(err.provider(), Some(ProviderKind::Microsoft));
    }

    #[test]
    fn display_without_provider() {
        let err = ProviderError::listener_bind("port 8765 in use");
        assert_eq!(err.to_string(), "listener_bind: port 8765 in use");
        assert_eq!(err.code(), ProviderErrorCode::ListenerBind);
        assert_eq!(err.message(), "port 8765 in use");
    }

    #[test]
    fn source_is_exposed() {
        use std::error::Error;
        let io_err = std::io::Error::other("address in use");
        let err = ProviderError::listener_bind("bind failed").with_source(io_err);
        assert!(err.source().is_some());
    }
}
