//! Persisted updater settings.
//!
//! Stored as camelCase JSON in the data directory. Every field has a
//! default, so a partial or missing file is never an error.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bootloader::BootloaderTiming;
use crate::config::{
    AVRDUDE_PROGRAM, BOOTLOADER_ARM_WAIT, BOOTLOADER_TOUCH_HOLD, MODULES_DIR, MODULE_BAUD_RATE,
};
use crate::error::{ModuleError, ModuleResult};

/// Tool location, device directory and timing used by the updater.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdaterSettings {
    /// Directory whose entries are the attached module nodes.
    pub modules_dir: PathBuf,

    /// Flashing tool binary.
    pub avrdude_path: String,

    /// Flashing tool configuration file. `None` means the command line must
    /// supply one.
    pub avrdude_config: Option<PathBuf>,

    pub touch_hold_ms: u64,
    pub arm_wait_ms: u64,
    pub module_baud: u32,
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from(MODULES_DIR),
            avrdude_path: AVRDUDE_PROGRAM.to_string(),
            avrdude_config: None,
            touch_hold_ms: BOOTLOADER_TOUCH_HOLD.as_millis() as u64,
            arm_wait_ms: BOOTLOADER_ARM_WAIT.as_millis() as u64,
            module_baud: MODULE_BAUD_RATE,
        }
    }
}

impl UpdaterSettings {
    pub fn timing(&self) -> BootloaderTiming {
        BootloaderTiming {
            touch_hold: Duration::from_millis(self.touch_hold_ms),
            arm_wait: Duration::from_millis(self.arm_wait_ms),
        }
    }

    /// Set one field from its JSON key and a string value.
    pub fn set(&mut self, key: &str, value: &str) -> ModuleResult<()> {
        let invalid = |e: std::num::ParseIntError| {
            ModuleError::Settings(format!("Invalid value for {}: {}", key, e))
        };

        match key {
            "modulesDir" => self.modules_dir = PathBuf::from(value),
            "avrdudePath" => self.avrdude_path = value.to_string(),
            "avrdudeConfig" => {
                self.avrdude_config = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            "touchHoldMs" => self.touch_hold_ms = value.parse().map_err(invalid)?,
            "armWaitMs" => self.arm_wait_ms = value.parse().map_err(invalid)?,
            "moduleBaud" => self.module_baud = value.parse().map_err(invalid)?,
            _ => return Err(ModuleError::Settings(format!("Unknown setting: {}", key))),
        }
        Ok(())
    }

    /// Check if these settings differ from defaults.
    pub fn has_non_default_settings(&self) -> bool {
        *self != Self::default()
    }
}

/// Settings file name stored in the data directory.
const SETTINGS_FILENAME: &str = "updater_settings.json";

/// Manages persistence of updater settings to a JSON file.
pub struct SettingsManager {
    settings_file_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager for the given data directory.
    pub fn new(data_dir: &Path) -> Self {
        let settings_file_path = data_dir.join(SETTINGS_FILENAME);
        Self { settings_file_path }
    }

    /// Load settings from disk, returning defaults if file doesn't exist.
    pub fn load(&self) -> ModuleResult<UpdaterSettings> {
        if !self.settings_file_path.exists() {
            return Ok(UpdaterSettings::default());
        }

        let contents = fs::read_to_string(&self.settings_file_path)
            .map_err(|e| ModuleError::Settings(format!("Failed to read settings file: {}", e)))?;

        // Handle empty file gracefully
        if contents.trim().is_empty() {
            return Ok(UpdaterSettings::default());
        }

        serde_json::from_str(&contents)
            .map_err(|e| ModuleError::Settings(format!("Failed to parse settings JSON: {}", e)))
    }

    /// Save settings to disk.
    pub fn save(&self, settings: &UpdaterSettings) -> ModuleResult<()> {
        if let Some(parent) = self.settings_file_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ModuleError::Settings(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let contents = serde_json::to_string_pretty(settings)
            .map_err(|e| ModuleError::Settings(format!("Failed to serialize settings: {}", e)))?;

        fs::write(&self.settings_file_path, contents)
            .map_err(|e| ModuleError::Settings(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// Get the path where settings are stored.
    pub fn settings_path(&self) -> &Path {
        &self.settings_file_path
    }
}
