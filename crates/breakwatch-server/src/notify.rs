//! Desktop notification for break reminders.

use std::fmt;
use std::time::Duration;

use notify_rust::Notification;
#[cfg(target_os = "linux")]
use notify_rust::Urgency;
use tracing::{debug, error, info};

use crate::error::{ServerError, ServerResult};

/// Something that can tell the user to take a break.
pub trait BreakNotifier: Send + Sync + fmt::Debug {
    /// Shows the break reminder.
    fn notify_break(&self) -> ServerResult<()>;
}

/// Configuration for the desktop notifier.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Application name shown by the notification daemon.
    pub app_name: String,
    pub summary: String,
    pub body: String,
    /// Expiry in seconds.
    pub timeout_secs: u32,
    /// Urgency override ("low", "normal", "critical").
    pub urgency: Option<String>,
    /// Custom notification icon path.
    pub icon_path: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            app_name: "breakwatch".to_string(),
            summary: "Time for a break".to_string(),
            body: "Stand up, stretch and rest your eyes for a few minutes.".to_string(),
            timeout_secs: 15,
            urgency: None,
            icon_path: None,
        }
    }
}

impl NotifyConfig {
    /// Builder: set app name.
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Builder: set summary and body.
    pub fn with_message(mut self, summary: impl Into<String>, body: impl Into<String>) -> Self {
        self.summary = summary.into();
        self.body = body.into();
        self
    }

    /// Builder: set timeout.
    pub fn with_timeout(mut self, secs: u32) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Builder: set urgency override.
    pub fn with_urgency(mut self, urgency: impl Into<String>) -> Self {
        self.urgency = Some(urgency.into());
        self
    }

    /// Builder: set icon path.
    pub fn with_icon_path(mut self, path: impl Into<String>) -> Self {
        self.icon_path = Some(path.into());
        self
    }
}

/// Shows break reminders through the platform notification service.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier {
    config: NotifyConfig,
}

impl DesktopNotifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }
}

impl BreakNotifier for DesktopNotifier {
    fn notify_break(&self) -> ServerResult<()> {
        debug!(summary = %self.config.summary, "sending break notification");

        let mut notification = Notification::new();
        notification
            .appname(&self.config.app_name)
            .summary(&self.config.summary)
            .body(&self.config.body)
            .timeout(Duration::from_secs(u64::from(self.config.timeout_secs)));

        if let Some(ref icon) = self.config.icon_path {
            notification.icon(icon);
        }

        #[cfg(target_os = "linux")]
        notification.urgency(
            self.config
                .urgency
                .as_deref()
                .map_or(Urgency::Normal, parse_urgency),
        );

        match notification.show() {
            Ok(_) => {
                info!("break notification sent");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to send break notification");
                Err(ServerError::notification(e.to_string()))
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn parse_urgency(s: &str) -> Urgency {
    match s.to_lowercase().as_str() {
        "low" => Urgency::Low,
        "critical" => Urgency::Critical,
        _ => Urgency::Normal,
    }
}
