//! Magnetic module controller.
//!
//! Tracks the engagement state and cached identity of one module and
//! exposes its lifecycle: connect, calibrate, engage, disengage, disconnect.
//! Commands issued while disconnected are silently ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ENGAGE_OFFSET_MM, MAGDECK_DISPLAY_NAME, MAGDECK_NAME, MODULE_BAUD_RATE};
use crate::driver::{DeviceInfo, DriverFactory, ModuleDriver};
use crate::error::{ModuleError, ModuleResult};

/// Engagement state of the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Engaged,
    Disengaged,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Engaged => "engaged",
            ModuleStatus::Disengaged => "disengaged",
        }
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation record for a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescription {
    pub name: String,
    pub port: Option<String>,
    pub serial: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub display_name: String,
    pub status: ModuleStatus,
}

/// Controller for one magnetic module.
pub struct ModuleController {
    port: Option<String>,
    baud_rate: u32,
    engaged: bool,
    device_info: Option<DeviceInfo>,
    driver: Option<Box<dyn ModuleDriver>>,
    driver_factory: DriverFactory,
}

impl ModuleController {
    /// Create a controller for `port`. No I/O happens until [`connect`](Self::connect).
    pub fn new(port: Option<String>, driver_factory: DriverFactory) -> Self {
        Self {
            port,
            baud_rate: MODULE_BAUD_RATE,
            engaged: false,
            device_info: None,
            driver: None,
            driver_factory,
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Serial port currently believed to address this module.
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    /// Point the controller at a re-enumerated node.
    pub fn set_port(&mut self, port: impl Into<String>) {
        let port = port.into();
        if self.port.as_deref() != Some(port.as_str()) {
            info!("Module port changed: {:?} -> {}", self.port, port);
        }
        self.port = Some(port);
    }

    /// Last known identity. Retained across disconnects.
    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    pub fn serial(&self) -> Option<&str> {
        self.device_info.as_ref().and_then(|info| info.serial.as_deref())
    }

    pub fn is_connected(&self) -> bool {
        self.driver
            .as_ref()
            .map(|driver| driver.is_connected())
            .unwrap_or(false)
    }

    pub fn status(&self) -> ModuleStatus {
        if self.engaged {
            ModuleStatus::Engaged
        } else {
            ModuleStatus::Disengaged
        }
    }

    /// Bind a driver to the configured port and read the module identity.
    ///
    /// A controller without a port cannot be connected; that is a
    /// configuration error, not a transient one.
    pub fn connect(&mut self) -> ModuleResult<()> {
        let port = match self.port.as_deref() {
            Some(port) if !port.is_empty() => port.to_string(),
            _ => {
                return Err(ModuleError::MissingPort {
                    name: MAGDECK_NAME.to_string(),
                })
            }
        };

        let mut driver = (self.driver_factory)();
        let identity = driver
            .connect(&port, self.baud_rate)
            .and_then(|_| driver.get_device_info());

        match identity {
            Ok(info) => {
                info!("Connected {} on {} (serial {:?})", MAGDECK_NAME, port, info.serial);
                self.device_info = Some(info);
                self.driver = Some(driver);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to connect {} on {}: {}", MAGDECK_NAME, port, e);
                driver.disconnect().ok();
                self.device_info = None;
                self.driver = None;
                Err(e)
            }
        }
    }

    /// Release the driver. Does nothing when already disconnected.
    ///
    /// The cached identity survives a clean disconnect but not a failed one.
    pub fn disconnect(&mut self) -> ModuleResult<()> {
        if let Some(mut driver) = self.driver.take() {
            if let Err(e) = driver.disconnect() {
                self.device_info = None;
                return Err(e);
            }
            debug!("Disconnected {} from {:?}", MAGDECK_NAME, self.port);
        }
        Ok(())
    }

    /// Probe for the plate top. Leaves the actuator retracted.
    pub fn calibrate(&mut self) -> ModuleResult<()> {
        if let Some(driver) = self.connected_driver() {
            driver.probe_plate()?;
            self.engaged = false;
        }
        Ok(())
    }

    /// Move the magnets to just below the last probed plate height.
    pub fn engage(&mut self) -> ModuleResult<()> {
        if let Some(driver) = self.connected_driver() {
            let target = driver.plate_height() - ENGAGE_OFFSET_MM;
            driver.move_to(target)?;
            self.engaged = true;
        }
        Ok(())
    }

    /// Home the magnets.
    pub fn disengage(&mut self) -> ModuleResult<()> {
        if let Some(driver) = self.connected_driver() {
            driver.home()?;
            self.engaged = false;
        }
        Ok(())
    }

    pub fn describe(&self) -> ModuleDescription {
        let info = self.device_info.as_ref();
        ModuleDescription {
            name: MAGDECK_NAME.to_string(),
            port: self.port.clone(),
            serial: info.and_then(|i| i.serial.clone()),
            model: info.and_then(|i| i.model.clone()),
            firmware_version: info.and_then(|i| i.version.clone()),
            display_name: MAGDECK_DISPLAY_NAME.to_string(),
            status: self.status(),
        }
    }

    /// A fresh, unbound driver from this controller's factory.
    pub(crate) fn new_driver(&self) -> Box<dyn ModuleDriver> {
        (self.driver_factory)()
    }

    fn connected_driver(&mut self) -> Option<&mut Box<dyn ModuleDriver>> {
        self.driver.as_mut().filter(|driver| driver.is_connected())
    }
}
