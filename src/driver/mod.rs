//! Device driver handle for serial-attached modules.
//!
//! [`ModuleDriver`] is the only surface the controller and the firmware
//! orchestration see. Transport details stay inside the implementations.

mod serial;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::error::ModuleResult;

pub use serial::SerialDriver;

/// Identity reported by a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub serial: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
}

impl DeviceInfo {
    /// Parse a `serial:abc123 model:mag_deck_v1 version:1.2.0` style reply.
    ///
    /// Unknown keys are ignored and missing keys stay `None`.
    pub fn parse(reply: &str) -> Self {
        let mut info = DeviceInfo::default();
        for token in reply.split_whitespace() {
            if let Some((key, value)) = token.split_once(':') {
                let value = Some(value.to_string());
                match key.to_ascii_lowercase().as_str() {
                    "serial" => info.serial = value,
                    "model" => info.model = value,
                    "version" => info.version = value,
                    _ => {}
                }
            }
        }
        info
    }
}

/// Connect/command primitives for one physical module on one serial port.
#[cfg_attr(test, automock)]
pub trait ModuleDriver: Send {
    /// Open the port at the given baud rate.
    fn connect(&mut self, port: &str, baud_rate: u32) -> ModuleResult<()>;

    /// Close the port. Closing an already-closed driver is a no-op.
    fn disconnect(&mut self) -> ModuleResult<()>;

    fn is_connected(&self) -> bool;

    fn get_device_info(&mut self) -> ModuleResult<DeviceInfo>;

    /// Probe for the top of the plate and record its height.
    fn probe_plate(&mut self) -> ModuleResult<()>;

    /// Move the actuator to an absolute height (mm).
    fn move_to(&mut self, position: f64) -> ModuleResult<()>;

    /// Retract the actuator to its home position.
    fn home(&mut self) -> ModuleResult<()>;

    /// Plate height from the last probe (mm).
    fn plate_height(&self) -> f64;
}

/// Creates a fresh driver each time a module connects or needs a
/// short-lived handle (bootloader touch).
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn ModuleDriver> + Send + Sync>;

/// Factory producing [`SerialDriver`]s.
pub fn serial_driver_factory() -> DriverFactory {
    Arc::new(|| Box::new(SerialDriver::new()) as Box<dyn ModuleDriver>)
}
