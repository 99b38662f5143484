//! Settings file commands.

use std::path::Path;

use breakwatch_core::{Settings, SettingsError};

use crate::error::ClientResult;

const REDACTED: &str = "<redacted>";

/// Prints the settings file path.
pub fn path(path: &Path) -> ClientResult<()> {
    println!("settings: {}", path.display());
    Ok(())
}

/// Prints the settings as TOML with secrets redacted.
pub fn dump(settings: &Settings, path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(&redacted(settings)).map_err(SettingsError::from)?;
    println!("# {}", path.display());
    println!("{toml_str}");
    Ok(())
}

pub fn validate(settings: &Settings) -> ClientResult<()> {
    settings.validate()?;
    println!("Settings are valid.");
    Ok(())
}

fn redacted(settings: &Settings) -> Settings {
    let mut copy = settings.clone();
    for provider in [&mut copy.google, &mut copy.microsoft] {
        if provider.client_secret.is_some() {
            provider.client_secret = Some(REDACTED.to_string());
        }
        if let Some(tokens) = provider.tokens.as_mut() {
            tokens.access_token = REDACTED.to_string();
            if tokens.refresh_token.is_some() {
                tokens.refresh_token = Some(REDACTED.to_string());
            }
        }
    }
    copy
}
