//! Firmware update commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::module::open_module;
use super::{discovery, print_json};
use crate::bootloader::BootloaderTransition;
use crate::driver::DriverFactory;
use crate::error::{ModuleError, ModuleResult};
use crate::flash::{FirmwareFlashOrchestrator, FlashRequest, FlashResult};
use crate::fleet::{FleetUpdateOutcome, ModuleFleet};
use crate::settings::UpdaterSettings;
use crate::traits::CommandExecutor;

/// Build a request, preferring the command-line tool config over settings.
pub(crate) fn flash_request(
    settings: &UpdaterSettings,
    firmware: PathBuf,
    config: Option<PathBuf>,
) -> ModuleResult<FlashRequest> {
    let config_path = config
        .or_else(|| settings.avrdude_config.clone())
        .ok_or_else(|| {
            ModuleError::Settings(
                "No avrdude config given; pass --config or set avrdudeConfig".to_string(),
            )
        })?;
    Ok(FlashRequest::new(firmware, config_path))
}

pub(crate) fn orchestrator(
    settings: &UpdaterSettings,
    executor: Box<dyn CommandExecutor>,
) -> FirmwareFlashOrchestrator {
    let transition = BootloaderTransition::new(discovery(settings), settings.timing());
    FirmwareFlashOrchestrator::new(executor, transition).with_program(&settings.avrdude_path)
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Flash one module.
///
/// With `run_async` the tool runs as a child process on a single-threaded
/// runtime and the module is not disengaged first.
pub fn flash(
    settings: &UpdaterSettings,
    factory: DriverFactory,
    executor: Box<dyn CommandExecutor>,
    port: Option<String>,
    firmware: PathBuf,
    config: Option<PathBuf>,
    run_async: bool,
) -> Result<FlashResult> {
    let request = flash_request(settings, firmware, config)?;
    let orchestrator = orchestrator(settings, executor);
    let mut module = open_module(settings, factory, port);

    // A module already sitting in its bootloader will not answer; the
    // touch still works on the port alone.
    if let Err(e) = module.connect() {
        if e.is_configuration() {
            return Err(e).context("Cannot flash module");
        }
        warn!("Flashing without a working connection: {}", e);
    }

    let result = if run_async {
        let runtime = current_thread_runtime()?;
        runtime.block_on(orchestrator.flash(&mut module, &request))
    } else {
        orchestrator.flash_blocking(&mut module, &request)
    };
    let result = result.context("Firmware update aborted")?;

    info!("Module now on {:?}", module.port());
    print_json(&result)?;
    Ok(result)
}

/// Discover all modules and flash the one reporting `serial`.
pub fn fleet_update(
    settings: &UpdaterSettings,
    factory: DriverFactory,
    executor: Box<dyn CommandExecutor>,
    serial: &str,
    firmware: PathBuf,
    config: Option<PathBuf>,
) -> Result<FleetUpdateOutcome> {
    let request = flash_request(settings, firmware, config)?;
    let orchestrator = orchestrator(settings, executor);

    let mut fleet = ModuleFleet::new(discovery(settings), factory).with_baud_rate(settings.module_baud);
    fleet.discover_and_connect();
    debug!("Fleet: {:?}", fleet.describe_all());

    let runtime = current_thread_runtime()?;
    let outcome = runtime
        .block_on(fleet.update_by_serial(serial, &orchestrator, &request))
        .context("Firmware update aborted");
    fleet.disconnect_all();
    let outcome = outcome?;

    match &outcome {
        FleetUpdateOutcome::NotFound { .. } => {
            warn!("{}", outcome);
            print_json(&serde_json::json!({ "message": outcome.to_string() }))?;
        }
        FleetUpdateOutcome::Flashed(result) => print_json(result)?,
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DeviceInfo, MockModuleDriver};
    use crate::test_helpers::fixtures::{
        bootloader_touch_driver, connected_driver, queued_factory, unused_factory,
        verification_error_output, verified_output,
    };
    use crate::test_helpers::temp::TestContext;
    use crate::traits::MockCommandExecutor;

    const PORT: &str = "/dev/modules/ttyMagDeck0";

    fn fast_settings() -> UpdaterSettings {
        UpdaterSettings {
            modules_dir: "/nonexistent/modules".into(),
            avrdude_config: Some("/etc/avrdude.conf".into()),
            touch_hold_ms: 0,
            arm_wait_ms: 0,
            ..UpdaterSettings::default()
        }
    }

    #[test]
    fn test_flash_request_prefers_command_line_config() {
        let request = flash_request(
            &fast_settings(),
            "fw.hex".into(),
            Some("/opt/avrdude.conf".into()),
        )
        .unwrap();
        assert_eq!(request.config_path, PathBuf::from("/opt/avrdude.conf"));

        let request = flash_request(&fast_settings(), "fw.hex".into(), None).unwrap();
        assert_eq!(request.config_path, PathBuf::from("/etc/avrdude.conf"));
    }

    #[test]
    fn test_flash_request_requires_config() {
        let err = flash_request(&UpdaterSettings::default(), "fw.hex".into(), None).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_flash_uses_configured_tool() {
        let ctx = TestContext::new();
        let firmware = ctx.create_firmware("magdeck.hex");
        let settings = UpdaterSettings {
            avrdude_path: "/usr/local/bin/avrdude".to_string(),
            ..fast_settings()
        };

        let mut working = connected_driver(DeviceInfo::default());
        working.expect_home().times(1).returning(|| Ok(()));
        working.expect_disconnect().returning(|| Ok(()));

        let mut executor = MockCommandExecutor::new();
        executor
            .expect_execute()
            .withf(|program, _| program == "/usr/local/bin/avrdude")
            .times(1)
            .returning(|_, _| Ok(verified_output()));

        let result = flash(
            &settings,
            queued_factory(vec![working, bootloader_touch_driver(PORT)]),
            Box::new(executor),
            Some(PORT.to_string()),
            firmware,
            None,
            false,
        )
        .unwrap();
        assert!(result.succeeded);
    }

    #[test]
    fn test_flash_proceeds_when_module_does_not_answer() {
        let ctx = TestContext::new();
        let firmware = ctx.create_firmware("magdeck.hex");

        let mut silent = MockModuleDriver::new();
        silent
            .expect_connect()
            .returning(|_, _| Err(ModuleError::CommandTimeout { command: "M115".into() }));
        silent.expect_disconnect().returning(|| Ok(()));

        let mut executor = MockCommandExecutor::new();
        executor
            .expect_execute_async()
            .times(1)
            .returning(|_, _| Ok(verification_error_output()));

        let result = flash(
            &fast_settings(),
            queued_factory(vec![silent, bootloader_touch_driver(PORT)]),
            Box::new(executor),
            Some(PORT.to_string()),
            firmware,
            None,
            true,
        )
        .unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.raw_output, "avrdude: verification error");
    }

    #[test]
    fn test_flash_without_port_is_rejected() {
        let ctx = TestContext::new();
        let firmware = ctx.create_firmware("magdeck.hex");

        let mut executor = MockCommandExecutor::new();
        executor.expect_execute().never();

        let err = flash(
            &fast_settings(),
            unused_factory(),
            Box::new(executor),
            None,
            firmware,
            None,
            false,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModuleError>(),
            Some(ModuleError::MissingPort { .. })
        ));
    }

    #[test]
    fn test_fleet_update_without_modules_reports_not_found() {
        let ctx = TestContext::new();
        let firmware = ctx.create_firmware("magdeck.hex");

        let mut executor = MockCommandExecutor::new();
        executor.expect_execute_async().never();

        let outcome = fleet_update(
            &fast_settings(),
            unused_factory(),
            Box::new(executor),
            "C3",
            firmware,
            None,
        )
        .unwrap();
        assert_eq!(outcome.to_string(), "No module C3 found");
    }
}
