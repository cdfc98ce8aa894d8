//! Command implementations for the CLI.
//!
//! Handlers print their result as pretty JSON on stdout and return it so
//! the binary can pick an exit code. Logs go to stderr.

pub mod firmware;
pub mod module;
pub mod settings;

pub use firmware::{flash, fleet_update};
pub use module::{calibrate, disengage, engage, ports, status};
pub use settings::{settings_set, settings_show};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::discovery::PortDiscovery;
use crate::settings::UpdaterSettings;

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

pub(crate) fn discovery(settings: &UpdaterSettings) -> PortDiscovery {
    PortDiscovery::from_env(&settings.modules_dir)
}
