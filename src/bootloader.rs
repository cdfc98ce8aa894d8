//! Bootloader entry and port rediscovery.
//!
//! Sequence:
//! 1. Snapshot the module nodes
//! 2. Release the module's working link
//! 3. Snapshot again and resolve the port (a pure substitution means the
//!    module re-enumerated under a new node)
//! 4. Open a fresh handle at 1200 baud, hold it, close it
//! 5. Wait for the bootloader to arm
//!
//! Open/close failures propagate. Callers abort the update on any error
//! rather than retrying a half-reset device.

use std::time::Duration;

use tracing::{debug, info};

use crate::config::{
    BOOTLOADER_ARM_WAIT, BOOTLOADER_BAUD_RATE, BOOTLOADER_TOUCH_HOLD, MAGDECK_NAME,
};
use crate::discovery::{resolve_port, PortDiscovery};
use crate::driver::ModuleDriver;
use crate::error::{ModuleError, ModuleResult};
use crate::module::ModuleController;

/// Settle intervals around the bootloader touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderTiming {
    /// How long the bootloader-baud handle stays open.
    pub touch_hold: Duration,
    /// Wait after closing the handle.
    pub arm_wait: Duration,
}

impl BootloaderTiming {
    /// No waiting at all. Only useful against simulated devices.
    pub fn immediate() -> Self {
        Self {
            touch_hold: Duration::ZERO,
            arm_wait: Duration::ZERO,
        }
    }
}

impl Default for BootloaderTiming {
    fn default() -> Self {
        Self {
            touch_hold: BOOTLOADER_TOUCH_HOLD,
            arm_wait: BOOTLOADER_ARM_WAIT,
        }
    }
}

/// Forces a module into its bootloader and finds the port that addresses it.
#[derive(Debug, Clone)]
pub struct BootloaderTransition {
    discovery: PortDiscovery,
    timing: BootloaderTiming,
}

impl BootloaderTransition {
    pub fn new(discovery: PortDiscovery, timing: BootloaderTiming) -> Self {
        Self { discovery, timing }
    }

    pub fn discovery(&self) -> &PortDiscovery {
        &self.discovery
    }

    /// Enter the bootloader, sleeping the calling thread through the settle
    /// intervals. Returns the resolved port.
    pub fn enter_blocking(&self, module: &mut ModuleController) -> ModuleResult<String> {
        let port = self.detach(module)?;
        let mut handle = open_touch_handle(module, &port)?;
        std::thread::sleep(self.timing.touch_hold);
        close_touch_handle(handle.as_mut(), &port)?;
        std::thread::sleep(self.timing.arm_wait);
        Ok(port)
    }

    /// Enter the bootloader, suspending only the calling task through the
    /// settle intervals. Returns the resolved port.
    pub async fn enter(&self, module: &mut ModuleController) -> ModuleResult<String> {
        let port = self.detach(module)?;
        let mut handle = open_touch_handle(module, &port)?;
        tokio::time::sleep(self.timing.touch_hold).await;
        close_touch_handle(handle.as_mut(), &port)?;
        tokio::time::sleep(self.timing.arm_wait).await;
        Ok(port)
    }

    /// Release the working link and resolve the module's port from the
    /// before/after snapshots. The module adopts the resolved port.
    fn detach(&self, module: &mut ModuleController) -> ModuleResult<String> {
        let before = self.discovery.list_ports();
        debug!("Ports before disconnect: {:?} (module on {:?})", before, module.port());

        module.disconnect()?;

        let after = self.discovery.list_ports();
        debug!("Ports after disconnect: {:?}", after);

        let port = resolve_port(&self.discovery, &before, &after, module.port()).ok_or_else(
            || ModuleError::MissingPort {
                name: MAGDECK_NAME.to_string(),
            },
        )?;
        module.set_port(port.clone());
        Ok(port)
    }
}

fn open_touch_handle(module: &ModuleController, port: &str) -> ModuleResult<Box<dyn ModuleDriver>> {
    info!("Connecting to {} at {} baud", port, BOOTLOADER_BAUD_RATE);
    let mut handle = module.new_driver();
    handle.connect(port, BOOTLOADER_BAUD_RATE)?;
    Ok(handle)
}

fn close_touch_handle(handle: &mut dyn ModuleDriver, port: &str) -> ModuleResult<()> {
    info!("Disconnecting {} baud handle on {}", BOOTLOADER_BAUD_RATE, port);
    handle.disconnect()
}
