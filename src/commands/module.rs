//! Single-module commands: port listing, status and motion.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use super::{discovery, print_json};
use crate::discovery::PortDiscovery;
use crate::driver::DriverFactory;
use crate::error::ModuleResult;
use crate::module::{ModuleController, ModuleDescription};
use crate::settings::UpdaterSettings;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortsReport {
    pub modules_dir: String,
    pub ports: Vec<String>,
}

/// List the module ports currently present.
pub fn ports(settings: &UpdaterSettings) -> Result<PortsReport> {
    let discovery = discovery(settings);
    let report = PortsReport {
        modules_dir: discovery.modules_dir().display().to_string(),
        ports: discovery
            .list_ports()
            .iter()
            .map(|node| discovery.qualify(node))
            .collect(),
    };
    print_json(&report)?;
    Ok(report)
}

/// Explicit port, or the first discovered one.
pub(crate) fn select_port(discovery: &PortDiscovery, port: Option<String>) -> Option<String> {
    port.or_else(|| {
        let first = discovery
            .list_ports()
            .into_iter()
            .next()
            .map(|node| discovery.qualify(&node));
        if let Some(port) = &first {
            info!("No port given, using {}", port);
        }
        first
    })
}

pub(crate) fn open_module(
    settings: &UpdaterSettings,
    factory: DriverFactory,
    port: Option<String>,
) -> ModuleController {
    let port = select_port(&discovery(settings), port);
    ModuleController::new(port, factory).with_baud_rate(settings.module_baud)
}

/// Connect, run `action`, describe, disconnect.
fn run_on_module<F>(
    settings: &UpdaterSettings,
    factory: DriverFactory,
    port: Option<String>,
    action: F,
) -> Result<ModuleDescription>
where
    F: FnOnce(&mut ModuleController) -> ModuleResult<()>,
{
    let mut module = open_module(settings, factory, port);
    module.connect().context("Failed to connect to module")?;

    let outcome = action(&mut module);
    let description = module.describe();
    if let Err(e) = module.disconnect() {
        warn!("Failed to disconnect: {}", e);
    }
    outcome.with_context(|| format!("Module command failed on {:?}", description.port))?;

    print_json(&description)?;
    Ok(description)
}

pub fn status(
    settings: &UpdaterSettings,
    factory: DriverFactory,
    port: Option<String>,
) -> Result<ModuleDescription> {
    run_on_module(settings, factory, port, |_| Ok(()))
}

pub fn engage(
    settings: &UpdaterSettings,
    factory: DriverFactory,
    port: Option<String>,
) -> Result<ModuleDescription> {
    run_on_module(settings, factory, port, ModuleController::engage)
}

pub fn disengage(
    settings: &UpdaterSettings,
    factory: DriverFactory,
    port: Option<String>,
) -> Result<ModuleDescription> {
    run_on_module(settings, factory, port, ModuleController::disengage)
}

pub fn calibrate(
    settings: &UpdaterSettings,
    factory: DriverFactory,
    port: Option<String>,
) -> Result<ModuleDescription> {
    run_on_module(settings, factory, port, ModuleController::calibrate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DeviceInfo, MockModuleDriver};
    use crate::error::ModuleError;
    use crate::module::ModuleStatus;
    use crate::test_helpers::fixtures::{
        connected_driver, queued_factory, unused_factory, DeviceInfoBuilder,
    };
    use crate::test_helpers::temp::TestContext;

    const PORT: &str = "/dev/modules/ttyMagDeck0";

    #[test]
    fn test_select_port_prefers_explicit() {
        let ctx = TestContext::new();
        let dir = ctx.create_modules_dir(&["mod1"]);
        let discovery = PortDiscovery::new(&dir, true);

        assert_eq!(
            select_port(&discovery, Some(PORT.to_string())).as_deref(),
            Some(PORT)
        );
        assert_eq!(select_port(&discovery, None), Some(discovery.qualify("mod1")));
    }

    #[test]
    fn test_select_port_without_nodes() {
        let discovery = PortDiscovery::new("/nonexistent/modules", false);
        assert_eq!(select_port(&discovery, None), None);
    }

    #[test]
    fn test_engage_reports_engaged_and_disconnects() {
        let mut driver = connected_driver(DeviceInfoBuilder::new().serial("MDV01").build());
        driver.expect_plate_height().return_const(10.0);
        driver.expect_move_to().times(1).returning(|_| Ok(()));
        driver.expect_disconnect().times(1).returning(|| Ok(()));

        let description = engage(
            &UpdaterSettings::default(),
            queued_factory(vec![driver]),
            Some(PORT.to_string()),
        )
        .unwrap();

        assert_eq!(description.status, ModuleStatus::Engaged);
        assert_eq!(description.serial.as_deref(), Some("MDV01"));
    }

    #[test]
    fn test_status_without_port_fails() {
        let settings = UpdaterSettings {
            modules_dir: "/nonexistent/modules".into(),
            ..UpdaterSettings::default()
        };
        let err = status(&settings, unused_factory(), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModuleError>(),
            Some(ModuleError::MissingPort { .. })
        ));
    }

    #[test]
    fn test_failed_command_still_disconnects() {
        let mut driver = connected_driver(DeviceInfo::default());
        driver
            .expect_probe_plate()
            .returning(|| Err(ModuleError::CommandTimeout { command: "G38.2".into() }));
        driver.expect_disconnect().times(1).returning(|| Ok(()));

        let result = calibrate(
            &UpdaterSettings::default(),
            queued_factory(vec![driver]),
            Some(PORT.to_string()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_connect_failure_is_reported() {
        let mut driver = MockModuleDriver::new();
        driver
            .expect_connect()
            .returning(|port, _| Err(ModuleError::PortNotFound { port: port.to_string() }));
        driver.expect_disconnect().returning(|| Ok(()));

        let err = disengage(
            &UpdaterSettings::default(),
            queued_factory(vec![driver]),
            Some(PORT.to_string()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to connect"));
    }
}
