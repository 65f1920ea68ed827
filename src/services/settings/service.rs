use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;

use crate::models::settings::MonitorSettings;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const ENV_API_URL: &str = "BOOKING_API_URL";
pub const ENV_API_TOKEN: &str = "BOOKING_API_TOKEN";
pub const ENV_TIMEZONE: &str = "BOOKING_TIMEZONE";

/// Loads and saves the monitor configuration file.
pub struct SettingsService {
    path: PathBuf,
}

impl SettingsService {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Service bound to `config.toml` in the platform config directory.
    pub fn with_default_path() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "FutsalBooking", "BookingMonitor")
            .context("Failed to determine config directory")?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings file (defaults if it does not exist), apply
    /// environment overrides, and validate the result.
    pub fn load(&self) -> Result<MonitorSettings> {
        let mut settings = if self.path.exists() {
            let data = fs::read_to_string(&self.path)
                .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
            toml::from_str(&data)
                .with_context(|| format!("Failed to parse settings from {}", self.path.display()))?
        } else {
            log::debug!(
                "No settings file at {}, using defaults",
                self.path.display()
            );
            MonitorSettings::default()
        };

        apply_env_overrides(&mut settings);

        settings
            .validate()
            .map_err(|e| anyhow!("Invalid settings: {}", e))?;

        Ok(settings)
    }

    pub fn save(&self, settings: &MonitorSettings) -> Result<()> {
        settings
            .validate()
            .map_err(|e| anyhow!("Invalid settings: {}", e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }

        let data = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
        fs::write(&self.path, data)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))?;

        Ok(())
    }
}

/// Environment variables win over the file.
pub fn apply_env_overrides(settings: &mut MonitorSettings) {
    if let Some(url) = non_empty_env(ENV_API_URL) {
        settings.api_base_url = url;
    }

    if let Some(token) = non_empty_env(ENV_API_TOKEN) {
        settings.api_token = Some(token);
    }

    if let Some(timezone) = non_empty_env(ENV_TIMEZONE) {
        settings.timezone = timezone;
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
