use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::ConfigError;

pub const DEFAULT_REPLY_TEXT: &str = "このツイートはおれったーから投稿されています。";

/// The composer's persisted settings: the auto-reply text and whether it is
/// sent at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub reply_text: String,
    pub auto_reply_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            reply_text: DEFAULT_REPLY_TEXT.to_string(),
            auto_reply_enabled: true,
        }
    }
}

impl Preferences {
    /// The reply to attach to a submission, if auto-reply is on.
    pub fn reply_for_submission(&self) -> Option<String> {
        self.auto_reply_enabled.then(|| self.reply_text.clone())
    }
}

pub trait PreferenceStore {
    fn load(&self) -> Result<Preferences, ConfigError>;

    fn save(&self, preferences: &Preferences) -> Result<(), ConfigError>;
}

/// On-disk shape: two named string entries, either of which may be absent.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auto_reply_enabled: Option<String>,
}

impl From<StoredPreferences> for Preferences {
    fn from(stored: StoredPreferences) -> Self {
        let defaults = Preferences::default();
        Self {
            reply_text: stored
                .reply_text
                .filter(|t| !t.is_empty())
                .unwrap_or(defaults.reply_text),
            auto_reply_enabled: stored
                .auto_reply_enabled
                .map(|v| v == "true")
                .unwrap_or(defaults.auto_reply_enabled),
        }
    }
}

impl From<&Preferences> for StoredPreferences {
    fn from(preferences: &Preferences) -> Self {
        Self {
            reply_text: Some(preferences.reply_text.clone()),
            auto_reply_enabled: Some(preferences.auto_reply_enabled.to_string()),
        }
    }
}

pub struct TomlPreferenceStore {
    path: PathBuf,
}

impl TomlPreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$HOME/.config/oretter/preferences.toml`
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/root".into());
        PathBuf::from(home)
            .join(".config")
            .join("oretter")
            .join("preferences.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: impl ToString) -> ConfigError {
        ConfigError::Preferences {
            path: self.path.display().to_string(),
            message: message.to_string(),
        }
    }
}

impl PreferenceStore for TomlPreferenceStore {
    fn load(&self) -> Result<Preferences, ConfigError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "no saved preferences, using defaults");
            return Ok(Preferences::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| self.error(e))?;
        let stored: StoredPreferences = toml::from_str(&content).map_err(|e| self.error(e))?;
        Ok(stored.into())
    }

    fn save(&self, preferences: &Preferences) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| self.error(e))?;
        }
        let content =
            toml::to_string(&StoredPreferences::from(preferences)).map_err(|e| self.error(e))?;
        std::fs::write(&self.path, content).map_err(|e| self.error(e))?;
        tracing::debug!(path = %self.path.display(), "preferences saved");
        Ok(())
    }
}

/// Keeps preferences in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    saved: Mutex<Option<Preferences>>,
}

impl MemoryPreferenceStore {
    pub fn with(preferences: Preferences) -> Self {
        Self {
            saved: Mutex::new(Some(preferences)),
        }
    }

    pub fn saved(&self) -> Option<Preferences> {
        self.saved.lock().ok().and_then(|p| p.clone())
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Preferences, ConfigError> {
        Ok(self.saved().unwrap_or_default())
    }

    fn save(&self, preferences: &Preferences) -> Result<(), ConfigError> {
        if let Ok(mut saved) = self.saved.lock() {
            *saved = Some(preferences.clone());
        }
        Ok(())
    }
}
