//! Commands for updater settings management.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::print_json;
use crate::settings::{SettingsManager, UpdaterSettings};

/// Load and print the current settings.
///
/// Returns default settings if no settings file exists yet.
pub fn settings_show(data_dir: &Path) -> Result<UpdaterSettings> {
    let manager = SettingsManager::new(data_dir);
    let settings = manager.load().context("Failed to load settings")?;
    print_json(&settings)?;
    Ok(settings)
}

/// Change one setting and persist it.
pub fn settings_set(data_dir: &Path, key: &str, value: &str) -> Result<UpdaterSettings> {
    let manager = SettingsManager::new(data_dir);
    let mut settings = manager.load().context("Failed to load settings")?;
    settings.set(key, value)?;
    manager.save(&settings)?;

    info!("Saved {} to {}", key, manager.settings_path().display());
    if settings.has_non_default_settings() {
        info!("Running with non-default settings: {:?}", settings);
    }
    print_json(&settings)?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_show_defaults_without_file() {
        let dir = tempdir().unwrap();
        assert_eq!(settings_show(dir.path()).unwrap(), UpdaterSettings::default());
    }

    #[test]
    fn test_set_persists() {
        let dir = tempdir().unwrap();
        settings_set(dir.path(), "armWaitMs", "1500").unwrap();

        let loaded = settings_show(dir.path()).unwrap();
        assert_eq!(loaded.arm_wait_ms, 1500);
    }

    #[test]
    fn test_set_unknown_key_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        assert!(settings_set(dir.path(), "colour", "blue").is_err());
        assert!(!SettingsManager::new(dir.path()).settings_path().exists());
    }
}
