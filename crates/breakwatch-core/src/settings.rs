//! User settings and the store they live in.
//!
//! Settings are owned by the store, not by the components that read them.
//! Every scheduler and availability decision calls [`SettingsStore::get`]
//! so edits made through the settings UI (or the CLI) take effect on the
//! next check without a restart. The file-backed store notices when the
//! file changes underneath it and reloads.
//!
//! The file-backed store keeps everything in a single TOML file at
//! `~/.config/breakwatch/settings.toml` by default:
//!
//! ```toml
//! reminder_interval_minutes = 45
//! meeting_buffer_minutes = 10
//! snooze_minutes = 10
//! suppress_tentative = false
//!
//! [google]
//! enabled = true
//! client_id = "1234.apps.googleusercontent.com"
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::event::ProviderKind;

/// Errors raised by settings stores.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("settings I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for [`Settings`].
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    /// The settings could not be serialized.
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

impl SettingsError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Result type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// OAuth tokens for one provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Bearer token for API calls.
    pub access_token: String,
    /// Long-lived token used to mint new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry of `access_token`.
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    /// Returns true while `now` is more than `margin` before expiry.
    pub fn is_usable_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now < self.expires_at - margin
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Per-provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Whether this provider's calendar is consulted.
    pub enabled: bool,
    /// OAuth client ID registered with the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// OAuth client secret, for desktop clients that are issued one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Persisted tokens from the last successful exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenSet>,
}

impl ProviderSettings {
    /// Returns the client ID if one is configured and non-blank.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    /// Returns the client secret if one is configured and non-blank.
    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns true if a refresh token has been persisted.
    pub fn has_refresh_token(&self) -> bool {
        self.tokens
            .as_ref()
            .is_some_and(|t| t.refresh_token.is_some())
    }
}

/// All user-facing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Minutes of activity between break reminders.
    pub reminder_interval_minutes: u32,
    /// Minutes before a meeting during which reminders are held back.
    pub meeting_buffer_minutes: u32,
    /// Minutes a snooze postpones the next reminder.
    pub snooze_minutes: u32,
    /// Whether tentative meetings also hold reminders back.
    pub suppress_tentative: bool,
    /// Google Calendar settings.
    pub google: ProviderSettings,
    /// Microsoft Outlook settings.
    pub microsoft: ProviderSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reminder_interval_minutes: Self::DEFAULT_REMINDER_MINUTES,
            meeting_buffer_minutes: 10,
            snooze_minutes: 10,
            suppress_tentative: false,
            google: ProviderSettings::default(),
            microsoft: ProviderSettings::default(),
        }
    }
}

impl Settings {
    /// Default reminder interval.
    pub const DEFAULT_REMINDER_MINUTES: u32 = 45;
    /// Smallest accepted reminder interval.
    pub const MIN_REMINDER_MINUTES: u32 = 5;
    /// Largest accepted meeting buffer (the availability look-ahead).
    pub const MAX_BUFFER_MINUTES: u32 = 120;

    /// Returns the settings for one provider.
    pub fn provider(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Google => &self.google,
            ProviderKind::Microsoft => &self.microsoft,
        }
    }

    /// Returns mutable settings for one provider.
    pub fn provider_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::Google => &mut self.google,
            ProviderKind::Microsoft => &mut self.microsoft,
        }
    }

    /// Reminder interval as a duration.
    pub fn reminder_interval(&self) -> Duration {
        Duration::minutes(i64::from(self.reminder_interval_minutes))
    }

    /// Snooze duration.
    pub fn snooze(&self) -> Duration {
        Duration::minutes(i64::from(self.snooze_minutes))
    }

    /// Checks that every interval is in range.
    pub fn validate(&self) -> SettingsResult<()> {
        if self.reminder_interval_minutes < Self::MIN_REMINDER_MINUTES {
            return Err(SettingsError::Invalid(format!(
                "reminder_interval_minutes must be at least {}",
                Self::MIN_REMINDER_MINUTES
            )));
        }
        if self.snooze_minutes == 0 {
            return Err(SettingsError::Invalid(
                "snooze_minutes must be at least 1".to_string(),
            ));
        }
        if self.meeting_buffer_minutes > Self::MAX_BUFFER_MINUTES {
            return Err(SettingsError::Invalid(format!(
                "meeting_buffer_minutes must be at most {}",
                Self::MAX_BUFFER_MINUTES
            )));
        }
        Ok(())
    }
}

/// Read/write access to the live settings.
///
/// Implementations must return the latest persisted values from `get` and
/// apply `update` atomically with respect to other callers.
pub trait SettingsStore: Send + Sync + fmt::Debug {
    /// Returns a snapshot of the current settings.
    fn get(&self) -> Settings;

    /// Applies `mutate` to the settings and persists the result.
    fn update(&self, mutate: &mut dyn FnMut(&mut Settings)) -> SettingsResult<()>;
}

/// Shared settings handle injected into components.
pub type SharedSettings = Arc<dyn SettingsStore>;

/// Settings held only in memory.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: RwLock<Settings>,
}

impl MemorySettingsStore {
    /// Creates a store seeded with `settings`.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Creates a shared store seeded with `settings`.
    pub fn shared(settings: Settings) -> Arc<Self> {
        Arc::new(Self::new(settings))
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut Settings)) -> SettingsResult<()> {
        let mut settings = self.settings.write().unwrap_or_else(|e| e.into_inner());
        mutate(&mut settings);
        Ok(())
    }
}

/// Settings persisted to a TOML file.
///
/// The file is the source of truth: [`get`](SettingsStore::get) reloads it
/// whenever its size, mtime or inode changed since the last read, and
/// [`update`](SettingsStore::update) re-reads it before applying the change,
/// so edits made by another process (the CLI while the daemon runs, or a
/// text editor) are neither missed nor overwritten.
///
/// Writes go to a temporary file that is then renamed over the original,
/// and the file is made owner-only on Unix since it holds OAuth tokens.
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    loaded: RwLock<Loaded>,
}

#[derive(Debug)]
struct Loaded {
    settings: Settings,
    stamp: Option<FileStamp>,
}

/// Identifies one version of the settings file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
    #[cfg(unix)]
    ino: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        Some(Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
            #[cfg(unix)]
            ino: std::os::unix::fs::MetadataExt::ino(&metadata),
        })
    }
}

impl FileSettingsStore {
    /// Opens the store at `path`, starting from defaults if the file does
    /// not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let loaded = Self::load(&path)?;
        if loaded.stamp.is_some() {
            info!(path = %path.display(), "loaded settings");
        } else {
            debug!(path = %path.display(), "no settings file, using defaults");
        }

        Ok(Self {
            path,
            loaded: RwLock::new(loaded),
        })
    }

    /// Opens the store at the default location.
    pub fn open_default() -> SettingsResult<Self> {
        Self::open(Self::default_path())
    }

    /// Returns the default settings file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("breakwatch")
            .join("settings.toml")
    }

    /// Returns the settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the file as it is now; a missing file yields defaults.
    fn load(path: &Path) -> SettingsResult<Loaded> {
        let stamp = FileStamp::of(path);
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Loaded {
                    settings: Settings::default(),
                    stamp: None,
                });
            }
            Err(e) => return Err(SettingsError::io(path, e)),
        };
        Ok(Loaded {
            settings: toml::from_str(&content)?,
            stamp,
        })
    }

    fn persist(&self, settings: &Settings) -> SettingsResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SettingsError::io(parent, e))?;
        }

        let content = toml::to_string_pretty(settings)?;
        let temp_path = self.path.with_extension(format!("toml.{}.tmp", std::process::id()));
        fs::write(&temp_path, content).map_err(|e| SettingsError::io(&temp_path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &self.path).map_err(|e| SettingsError::io(&self.path, e))?;
        debug!(path = %self.path.display(), "saved settings");
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    /// Returns the file's current settings, or the last good copy if the
    /// file has since become unreadable.
    fn get(&self) -> Settings {
        let current = FileStamp::of(&self.path);
        {
            let loaded = self.loaded.read().unwrap_or_else(|e| e.into_inner());
            if loaded.stamp == current {
                return loaded.settings.clone();
            }
        }

        let mut loaded = self.loaded.write().unwrap_or_else(|e| e.into_inner());
        match Self::load(&self.path) {
            Ok(fresh) => {
                debug!(path = %self.path.display(), "settings file changed, reloaded");
                *loaded = fresh;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "settings file unreadable, keeping previous settings");
                loaded.stamp = current;
            }
        }
        loaded.settings.clone()
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut Settings)) -> SettingsResult<()> {
        let mut loaded = self.loaded.write().unwrap_or_else(|e| e.into_inner());
        let mut next = Self::load(&self.path)?.settings;
        mutate(&mut next);
        self.persist(&next)?;
        *loaded = Loaded {
            settings: next,
            stamp: FileStamp::of(&self.path),
        };
        Ok(())
    }
}
