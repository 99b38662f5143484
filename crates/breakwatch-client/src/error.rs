//! Client error types.

use breakwatch_core::SettingsError;
use breakwatch_providers::ProviderError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_settings_and_provider_errors() {
        let err: ClientError = SettingsError::Invalid("snooze must be at least 1 minute".into()).into();
        assert_eq!(
            err.to_string(),
            "settings error: invalid settings: snooze must be at least 1 minute"
        );

        let err: ClientError = ProviderError::configuration("no client_id").into();
        assert!(matches!(err, ClientError::Provider(_)));
    }
}
