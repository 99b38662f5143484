//! Command-line interface definition.

use std::path::PathBuf;

use breakwatch_core::{LogFormat, ProviderKind};
use clap::{Parser, Subcommand, ValueEnum};

/// breakwatch - break reminders that stay quiet during meetings
#[derive(Debug, Parser)]
#[command(name = "breakwatch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the settings file
    #[arg(long, short, global = true, env = "BREAKWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogStyle::Compact)]
    pub log_format: LogStyle,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogStyle {
    Compact,
    Json,
}

impl From<LogStyle> for LogFormat {
    fn from(style: LogStyle) -> Self {
        match style {
            LogStyle::Compact => LogFormat::Compact,
            LogStyle::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the break reminder service until interrupted
    Run,

    /// Connect a calendar provider through the browser
    Auth {
        /// google or microsoft
        provider: ProviderKind,

        /// OAuth client ID (saved to the settings file)
        #[arg(long)]
        client_id: Option<String>,

        /// OAuth client secret (saved to the settings file)
        #[arg(long)]
        client_secret: Option<String>,

        /// Re-authenticate even if already connected
        #[arg(long)]
        force: bool,
    },

    /// Forget a provider's tokens and disable it
    Disconnect {
        /// google or microsoft
        provider: ProviderKind,
    },

    /// Show reminder settings and provider connection state
    Status,

    /// Check calendars now and report whether a reminder would be suppressed
    Check {
        /// Minutes before a meeting during which reminders are held back
        #[arg(long)]
        buffer: Option<u32>,
    },

    /// Settings file management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the settings file path
    Path,
    /// Print the current settings with secrets redacted
    Dump,
    /// Validate the current settings
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_auth_with_credentials() {
        let cli = Cli::try_parse_from([
            "breakwatch",
            "auth",
            "outlook",
            "--client-id",
            "abc",
            "--force",
        ])
        .unwrap();
        match cli.command {
            Command::Auth {
                provider,
                client_id,
                client_secret,
                force,
            } => {
                assert_eq!(provider, ProviderKind::Microsoft);
                assert_eq!(client_id.as_deref(), Some("abc"));
                assert!(client_secret.is_none());
                assert!(force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(Cli::try_parse_from(["breakwatch", "auth", "caldav"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "breakwatch",
            "check",
            "--buffer",
            "20",
            "--debug",
            "--config",
            "/tmp/bw.toml",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/bw.toml")));
        assert!(matches!(cli.command, Command::Check { buffer: Some(20) }));
    }

    #[test]
    fn log_format_json() {
        let cli = Cli::try_parse_from(["breakwatch", "--log-format", "json", "status"]).unwrap();
        assert_eq!(LogFormat::from(cli.log_format), LogFormat::Json);
    }
}
