//! Logging setup shared by the breakwatch binaries.
//!
//! ```ignore
//! use breakwatch_core::logging::{init_logging, LogConfig};
//!
//! init_logging(LogConfig::daemon())?;
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crates whose level `LogConfig::level` controls.
const TARGETS: &[&str] = &[
    "breakwatch",
    "breakwatch_core",
    "breakwatch_providers",
    "breakwatch_server",
    "breakwatch_client",
];

/// Errors that can occur while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber was already installed.
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// The filter directive could not be parsed.
    #[error("failed to parse log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line human-readable output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used for breakwatch crates when `RUST_LOG` is unset.
    pub level: Level,
    /// Output format.
    pub format: LogFormat,
    /// Explicit filter directive; wins over both `level` and `RUST_LOG`.
    pub filter: Option<String>,
    /// Include source file and line.
    pub with_location: bool,
    /// Apply `level` to breakwatch crates even when `RUST_LOG` is set.
    pub force_level: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            filter: None,
            with_location: false,
            force_level: false,
        }
    }
}

impl LogConfig {
    /// Settings for the long-running reminder daemon.
    #[must_use]
    pub fn daemon() -> Self {
        Self {
            level: Level::INFO,
            ..Self::default()
        }
    }

    /// Forces debug output with source locations, on top of `RUST_LOG`.
    #[must_use]
    pub fn debug(mut self) -> Self {
        self.level = Level::DEBUG;
        self.with_location = true;
        self.force_level = true;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets an explicit filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Builds the env filter this configuration resolves to.
    pub fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
        self.env_filter_from(env.as_deref())
    }

    /// Resolves the filter against a given `RUST_LOG` value. An unset,
    /// blank or unparsable value falls back to `level`.
    fn env_filter_from(&self, env: Option<&str>) -> Result<EnvFilter, LoggingError> {
        if let Some(ref directive) = self.filter {
            return Ok(EnvFilter::try_new(directive)?);
        }

        let from_env = env
            .filter(|directive| !directive.trim().is_empty())
            .and_then(|directive| EnvFilter::try_new(directive).ok());
        match from_env {
            Some(mut filter) if self.force_level => {
                for directive in self.directives() {
                    filter = filter.add_directive(directive.parse()?);
                }
                Ok(filter)
            }
            Some(filter) => Ok(filter),
            None => Ok(EnvFilter::try_new(self.default_directive())?),
        }
    }

    fn directives(&self) -> Vec<String> {
        let level = self.level.as_str().to_ascii_lowercase();
        TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect()
    }

    fn default_directive(&self) -> String {
        self.directives().join(",")
    }
}

/// Installs the global tracing subscriber. Call once at startup.
pub fn init_logging(config: LogConfig) -> Result<(), LoggingError> {
    let filter = config.env_filter()?;

    match config.format {
        LogFormat::Compact => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_file(config.with_location)
                    .with_line_number(config.with_location),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .json()
                    .with_file(config.with_location)
                    .with_line_number(config.with_location),
            );
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}
