use crate::error::{PetError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8001";

pub const MIN_OPACITY: f64 = 0.1;
pub const MAX_OPACITY: f64 = 1.0;

/// User-tunable overlay settings, as exchanged with the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub opacity: f64,
    /// seconds between proactive greetings
    pub greeting_interval: u64,
    pub enable_proactive_interaction: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            opacity: 0.9,
            greeting_interval: 300,
            enable_proactive_interaction: true,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_OPACITY..=MAX_OPACITY).contains(&self.opacity) {
            return Err(PetError::InvalidArgument(format!(
                "opacity {} outside [{MIN_OPACITY}, {MAX_OPACITY}]",
                self.opacity
            )));
        }
        if self.greeting_interval == 0 {
            return Err(PetError::InvalidArgument(
                "greetingInterval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reply to `update-settings` / `reset-settings`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SettingsAck {
    pub success: bool,
}

/// Settings kept in memory and mirrored to a JSON file when a path is set.
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: Settings,
}

impl SettingsStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            current: Settings::default(),
        }
    }

    /// Load from `path`; a missing or unreadable file yields defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match read_settings(&path) {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings file unusable, using defaults");
                Settings::default()
            }
        };
        Self {
            path: Some(path),
            current,
        }
    }

    pub fn get(&self) -> &Settings {
        &self.current
    }

    pub fn update(&mut self, settings: Settings) -> Result<SettingsAck> {
        settings.validate()?;
        self.persist(&settings)?;
        self.current = settings;
        Ok(SettingsAck { success: true })
    }

    pub fn reset(&mut self) -> Result<SettingsAck> {
        self.update(Settings::default())
    }

    /// Written before `current` changes, so a failed save leaves the store as it was.
    fn persist(&self, settings: &Settings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(settings)?)?;
        info!(path = %path.display(), "settings saved");
        Ok(())
    }
}

fn read_settings(path: &Path) -> Result<Option<Settings>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read(path)?;
    let settings: Settings = serde_json::from_slice(&raw)?;
    settings.validate()?;
    Ok(Some(settings))
}

/// How to launch the backend child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Process-level configuration, read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend_url: String,
    /// `None` when autostart is disabled
    pub backend_command: Option<BackendCommand>,
    pub settings_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend_url = non_empty("DESK_PET_BACKEND_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

        let autostart = non_empty("DESK_PET_BACKEND_AUTOSTART").map_or(true, |v| {
            !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off")
        });

        let backend_command = autostart.then(|| BackendCommand {
            program: non_empty("DESK_PET_BACKEND_PROGRAM").unwrap_or_else(|| "python3".to_string()),
            args: vec![non_empty("DESK_PET_BACKEND_SCRIPT")
                .unwrap_or_else(|| "backend/main.py".to_string())],
        });

        let settings_path = non_empty("DESK_PET_SETTINGS_PATH")
            .map_or_else(default_settings_path, PathBuf::from);

        Self {
            backend_url,
            backend_command,
            settings_path,
        }
    }
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("desk-pet")
        .join("settings.json")
}
