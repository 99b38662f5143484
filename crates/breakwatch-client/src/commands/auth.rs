//! Provider connection commands.

use breakwatch_core::{ProviderKind, SharedSettings, SystemClock};
use breakwatch_providers::CalendarAccount;
use tracing::info;

use crate::error::ClientResult;

/// Saves any given credentials, enables the provider and runs the browser
/// authorization flow.
pub async fn auth(
    settings: SharedSettings,
    kind: ProviderKind,
    client_id: Option<String>,
    client_secret: Option<String>,
    force: bool,
) -> ClientResult<()> {
    settings.update(&mut |s| {
        let provider = s.provider_mut(kind);
        if let Some(ref id) = client_id {
            provider.client_id = Some(id.trim().to_string());
        }
        if let Some(ref secret) = client_secret {
            provider.client_secret = Some(secret.trim().to_string());
        }
        provider.enabled = true;
    })?;

    let account = CalendarAccount::new(kind, settings, SystemClock::shared());
    if account.is_connected() && !force {
        println!("Already connected to {}.", kind.display_name());
        println!("Use --force to re-authenticate.");
        return Ok(());
    }

    println!("Connecting to {}...", kind.display_name());
    println!("A browser window will open for you to authorize read access to your calendar.");
    println!();

    account.connect().await?;
    info!(provider = %kind, "provider connected");
    println!("Connected to {}.", kind.display_name());
    Ok(())
}

/// Erases the provider's tokens and disables it.
pub fn disconnect(settings: SharedSettings, kind: ProviderKind) -> ClientResult<()> {
    let account = CalendarAccount::new(kind, settings.clone(), SystemClock::shared());
    account.disconnect()?;
    settings.update(&mut |s| s.provider_mut(kind).enabled = false)?;
    info!(provider = %kind, "provider disconnected");
    println!("Disconnected from {}.", kind.display_name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use breakwatch_core::{MemorySettingsStore, Settings, SettingsStore, TokenSet};
    use breakwatch_providers::ProviderErrorCode;
    use crate::error::ClientError;
    use chrono::Utc;

    #[test]
    fn disconnect_clears_tokens_and_disables() {
        let mut initial = Settings::default();
        initial.google.enabled = true;
        initial.google.client_id = Some("client".into());
        initial.google.tokens = Some(TokenSet {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_at: Utc::now(),
        });
        let store = MemorySettingsStore::shared(initial);

        disconnect(store.clone(), ProviderKind::Google).unwrap();

        let settings = store.get();
        assert!(!settings.google.enabled);
        assert!(settings.google.tokens.is_none());
        assert_eq!(settings.google.client_id.as_deref(), Some("client"));
    }

    #[tokio::test]
    async fn auth_without_client_id_fails_before_browser() {
        let store = MemorySettingsStore::shared(Settings::default());

        let err = auth(store.clone(), ProviderKind::Microsoft, None, None, false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ClientError::Provider(ref e) if e.code() == ProviderErrorCode::ConfigurationError
        ));
        assert!(store.get().microsoft.enabled);
    }

    #[tokio::test]
    async fn connected_provider_is_not_reauthenticated() {
        let mut initial = Settings::default();
        initial.google.tokens = Some(TokenSet {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_at: Utc::now(),
        });
        let store = MemorySettingsStore::shared(initial);

        auth(store.clone(), ProviderKind::Google, Some(" id ".into()), None, false)
            .await
            .unwrap();

        let settings = store.get();
        assert!(settings.google.enabled);
        assert_eq!(settings.google.client_id.as_deref(), Some("id"));
    }
}
