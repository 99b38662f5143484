//! breakwatch CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use breakwatch_client::cli::{Cli, Command, ConfigAction};
use breakwatch_client::commands;
use breakwatch_client::error::ClientResult;
use breakwatch_core::{LogConfig, SharedSettings, init_logging};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = match cli.command {
        Command::Run => LogConfig::daemon(),
        _ => LogConfig::default(),
    }
    .with_format(cli.log_format.into());
    if cli.debug {
        log_config = log_config.debug();
    }
    if let Err(e) = init_logging(log_config) {
        eprintln!("warning: {e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let store = commands::open_store(cli.config.as_deref())?;
    let path = store.path().to_path_buf();
    let settings: SharedSettings = store;

    match cli.command {
        Command::Run => commands::run::run(settings).await,
        Command::Auth {
            provider,
            client_id,
            client_secret,
            force,
        } => commands::auth::auth(settings, provider, client_id, client_secret, force).await,
        Command::Disconnect { provider } => commands::auth::disconnect(settings, provider),
        Command::Status => commands::status::status(settings),
        Command::Check { buffer } => commands::check::check(settings, buffer).await,
        Command::Config { action } => match action {
            ConfigAction::Path => commands::config::path(&path),
            ConfigAction::Dump => commands::config::dump(&settings.get(), &path),
            ConfigAction::Validate => commands::config::validate(&settings.get()),
        },
    }
}
