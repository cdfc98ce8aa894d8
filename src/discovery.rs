//! Module port discovery.
//!
//! Attached modules show up as entries of a fixed device directory. After a
//! reset the OS may give a module a different node name, so callers take a
//! snapshot before and after and diff them with [`detect_substitution`].

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::{module_port_path, MODULES_DIR, TARGET_HARDWARE_ENV};

/// Snapshot of the node names present in the device directory.
pub type PortSet = BTreeSet<String>;

/// Enumerates module nodes under a device directory.
#[derive(Debug, Clone)]
pub struct PortDiscovery {
    modules_dir: PathBuf,
    enabled: bool,
}

impl PortDiscovery {
    pub fn new(modules_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            modules_dir: modules_dir.into(),
            enabled,
        }
    }

    /// Discovery over `modules_dir`, enabled only when the target hardware
    /// flag is set in the environment.
    pub fn from_env(modules_dir: impl Into<PathBuf>) -> Self {
        let enabled = std::env::var_os(TARGET_HARDWARE_ENV)
            .map(|value| !value.is_empty())
            .unwrap_or(false);
        Self::new(modules_dir, enabled)
    }

    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    /// Absolute port path for a bare node name.
    pub fn qualify(&self, node: &str) -> String {
        module_port_path(&self.modules_dir.to_string_lossy(), node)
    }

    /// List the nodes currently present.
    ///
    /// Returns an empty set off target hardware or when the directory is
    /// missing. Reads the directory fresh on every call.
    pub fn list_ports(&self) -> PortSet {
        if !self.enabled || !self.modules_dir.is_dir() {
            return PortSet::new();
        }

        match fs::read_dir(&self.modules_dir) {
            Ok(entries) => entries
                .flatten()
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(e) => {
                debug!("Failed to list {}: {}", self.modules_dir.display(), e);
                PortSet::new()
            }
        }
    }
}

impl Default for PortDiscovery {
    fn default() -> Self {
        Self::from_env(MODULES_DIR)
    }
}

/// Find the node that replaced another between two snapshots.
///
/// Only a pure substitution counts: the sets differ, have the same size, and
/// exactly one node is new. Anything else returns `None`.
pub fn detect_substitution(before: &PortSet, after: &PortSet) -> Option<String> {
    if before == after || before.len() != after.len() {
        return None;
    }

    let mut added = after.difference(before);
    match (added.next(), added.next()) {
        (Some(node), None) => Some(node.clone()),
        _ => None,
    }
}

/// Resolve which port addresses the module after a possible re-enumeration.
///
/// Adopts the substituted node (qualified with the device directory) when
/// one is detected and keeps `current` otherwise.
pub fn resolve_port(
    discovery: &PortDiscovery,
    before: &PortSet,
    after: &PortSet,
    current: Option<&str>,
) -> Option<String> {
    match detect_substitution(before, after) {
        Some(node) => {
            let port = discovery.qualify(&node);
            info!("Switching to new port: {}", port);
            Some(port)
        }
        None => {
            if before != after {
                warn!(
                    "Port set changed ambiguously ({:?} -> {:?}), keeping {:?}",
                    before, after, current
                );
            } else {
                debug!("No new port detected, keeping {:?}", current);
            }
            current.map(str::to_string)
        }
    }
}
