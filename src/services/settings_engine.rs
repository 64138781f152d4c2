// dlbridge Settings Engine
// Loads, saves and edits `DownloadSettings`, stored as a JSON file at the
// platform config path or an explicit override.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::platform;
use crate::types::errors::SettingsError;
use crate::types::settings::DownloadSettings;

/// Environment variable that overrides the settings file location.
pub const CONFIG_ENV: &str = "DLBRIDGE_CONFIG";

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<DownloadSettings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> &DownloadSettings;
    fn set_value(&mut self, key: &str, value: Value) -> Result<(), SettingsError>;
    fn reset(&mut self) -> Result<(), SettingsError>;
    fn get_config_path(&self) -> &str;
}

/// Settings engine persisting settings as JSON on disk.
pub struct SettingsEngine {
    config_path: String,
    settings: DownloadSettings,
}

impl SettingsEngine {
    /// Uses `path_override` if given, then `$DLBRIDGE_CONFIG`, then
    /// `settings.json` in the platform config directory.
    pub fn new(path_override: Option<String>) -> Self {
        let config_path = path_override
            .or_else(|| std::env::var(CONFIG_ENV).ok().filter(|p| !p.is_empty()))
            .unwrap_or_else(|| {
                platform::get_config_dir()
                    .join("settings.json")
                    .to_string_lossy()
                    .to_string()
            });

        Self {
            config_path,
            settings: DownloadSettings::default(),
        }
    }

    fn to_value(&self) -> Result<Value, SettingsError> {
        serde_json::to_value(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Missing file yields defaults; a malformed file is an error.
    fn load(&mut self) -> Result<DownloadSettings, SettingsError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            tracing::debug!(path = %self.config_path, "no settings file, using defaults");
            self.settings = DownloadSettings::default();
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SettingsError::IoError(format!("Failed to read config file: {}", e)))?;

        self.settings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to parse config file: {}", e))
        })?;
        Ok(self.settings.clone())
    }

    fn save(&self) -> Result<(), SettingsError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                SettingsError::IoError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| SettingsError::IoError(format!("Failed to write config file: {}", e)))
    }

    fn get_settings(&self) -> &DownloadSettings {
        &self.settings
    }

    /// Updates one setting addressed as `section.field`, e.g.
    /// `"scheduler.poll_interval_ms"` or `"storage.download_dir"`.
    ///
    /// The edited tree is deserialized back into [`DownloadSettings`] before
    /// it replaces the current value, so type mismatches are rejected. Saves
    /// on success.
    fn set_value(&mut self, key: &str, value: Value) -> Result<(), SettingsError> {
        let Some((section, field)) = key.split_once('.') else {
            return Err(SettingsError::InvalidKey(format!(
                "Key '{}' must have the form section.field",
                key
            )));
        };

        let mut tree = self.to_value()?;
        let slot = tree
            .get_mut(section)
            .and_then(Value::as_object_mut)
            .filter(|map| map.contains_key(field))
            .ok_or_else(|| SettingsError::InvalidKey(format!("Key '{}' not found in settings", key)))?;
        slot.insert(field.to_string(), value);

        let updated: DownloadSettings = serde_json::from_value(tree).map_err(|e| {
            SettingsError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;

        self.settings = updated;
        self.save()
    }

    fn reset(&mut self) -> Result<(), SettingsError> {
        self.settings = DownloadSettings::default();
        self.save()
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
