//! Server error types.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The desktop notification could not be shown.
    #[error("Notification error: {message}")]
    Notification { message: String },
}

impl ServerError {
    /// Creates a notification error.
    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_display() {
        let err = ServerError::notification("no dbus session");
        assert_eq!(err.to_string(), "Notification error: no dbus session");
    }
}
