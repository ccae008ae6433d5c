//! Configuration file support for the dose tracker.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/doses/config.toml`.

use crate::time_window::{GraceWindow, DEFAULT_GRACE_MINUTES};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub reminders: ReminderConfig,

    #[serde(default)]
    pub adherence: AdherenceConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Reminder display configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Minutes a pending dose may go unanswered before it is flagged overdue
    #[serde(default = "default_grace_window_minutes")]
    pub grace_window_minutes: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            grace_window_minutes: default_grace_window_minutes(),
        }
    }
}

impl ReminderConfig {
    pub fn grace_window(&self) -> GraceWindow {
        GraceWindow::minutes(self.grace_window_minutes)
    }
}

/// Adherence reporting configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdherenceConfig {
    /// Length of the report window, ending yesterday, when none is given
    #[serde(default = "default_window_days")]
    pub default_window_days: i64,
}

impl Default for AdherenceConfig {
    fn default() -> Self {
        Self {
            default_window_days: default_window_days(),
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("doses")
}

fn default_grace_window_minutes() -> i64 {
    DEFAULT_GRACE_MINUTES
}

fn default_window_days() -> i64 {
    7
}

/// Longest adherence window the config may ask for (100 years)
pub const MAX_WINDOW_DAYS: i64 = 36_525;

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.reminders.grace_window_minutes < 0 {
            return Err(Error::Config(format!(
                "grace_window_minutes must not be negative (got {})",
                self.reminders.grace_window_minutes
            )));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.adherence.default_window_days) {
            return Err(Error::Config(format!(
                "default_window_days must be between 1 and {} (got {})",
                MAX_WINDOW_DAYS, self.adherence.default_window_days
            )));
        }
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("doses").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
