//! The set of modules attached to this host.
//!
//! A [`ModuleFleet`] is owned by whoever runs the session (the CLI here) and
//! passed to the operations that need it. It is not shared between threads.

use std::fmt;

use tracing::{info, warn};

use crate::config::MODULE_BAUD_RATE;
use crate::discovery::PortDiscovery;
use crate::driver::DriverFactory;
use crate::error::ModuleResult;
use crate::flash::{FirmwareFlashOrchestrator, FlashRequest, FlashResult};
use crate::module::{ModuleController, ModuleDescription};

/// Result of a fleet update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetUpdateOutcome {
    /// No connected module reported the requested serial.
    NotFound { serial: String },
    Flashed(FlashResult),
}

impl fmt::Display for FleetUpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetUpdateOutcome::NotFound { serial } => write!(f, "No module {} found", serial),
            FleetUpdateOutcome::Flashed(result) if result.succeeded => {
                write!(f, "Firmware update succeeded")
            }
            FleetUpdateOutcome::Flashed(_) => write!(f, "Firmware update failed"),
        }
    }
}

pub struct ModuleFleet {
    discovery: PortDiscovery,
    driver_factory: DriverFactory,
    baud_rate: u32,
    modules: Vec<ModuleController>,
}

impl ModuleFleet {
    pub fn new(discovery: PortDiscovery, driver_factory: DriverFactory) -> Self {
        Self {
            discovery,
            driver_factory,
            baud_rate: MODULE_BAUD_RATE,
            modules: Vec::new(),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Connect a controller for every discovered node.
    ///
    /// Nodes that fail to connect are logged and left out. Returns the
    /// number of modules connected by this call.
    pub fn discover_and_connect(&mut self) -> usize {
        let mut connected = 0;
        for node in self.discovery.list_ports() {
            let port = self.discovery.qualify(&node);
            let mut module = ModuleController::new(Some(port.clone()), self.driver_factory.clone())
                .with_baud_rate(self.baud_rate);

            match module.connect() {
                Ok(()) => {
                    self.modules.push(module);
                    connected += 1;
                }
                Err(e) => warn!("Skipping {}: {} ({})", port, e, e.error_code()),
            }
        }
        info!("Connected {} module(s)", connected);
        connected
    }

    /// Take ownership of an already-built controller.
    pub fn add_module(&mut self, module: ModuleController) {
        self.modules.push(module);
    }

    pub fn modules(&self) -> &[ModuleController] {
        &self.modules
    }

    /// First module whose cached identity carries `serial`.
    #[allow(dead_code)]
    pub fn find_by_serial(&self, serial: &str) -> Option<&ModuleController> {
        self.modules.iter().find(|m| m.serial() == Some(serial))
    }

    pub fn find_by_serial_mut(&mut self, serial: &str) -> Option<&mut ModuleController> {
        self.modules.iter_mut().find(|m| m.serial() == Some(serial))
    }

    pub fn describe_all(&self) -> Vec<ModuleDescription> {
        self.modules.iter().map(ModuleController::describe).collect()
    }

    /// Release every module. Errors are logged, not returned.
    pub fn disconnect_all(&mut self) {
        for module in &mut self.modules {
            if let Err(e) = module.disconnect() {
                warn!("Failed to disconnect {:?}: {}", module.port(), e);
            }
        }
    }

    /// Flash the module reporting `serial` without blocking the runtime.
    pub async fn update_by_serial(
        &mut self,
        serial: &str,
        orchestrator: &FirmwareFlashOrchestrator,
        request: &FlashRequest,
    ) -> ModuleResult<FleetUpdateOutcome> {
        let Some(module) = self.find_by_serial_mut(serial) else {
            warn!("Update requested for unknown module {}", serial);
            return Ok(FleetUpdateOutcome::NotFound {
                serial: serial.to_string(),
            });
        };

        info!("Updating module {} on {:?}", serial, module.port());
        let result = orchestrator.flash(module, request).await?;
        Ok(FleetUpdateOutcome::Flashed(result))
    }
}
