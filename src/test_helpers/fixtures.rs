use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use mockall::predicate::eq;

use crate::config::BOOTLOADER_BAUD_RATE;
use crate::driver::{DeviceInfo, DriverFactory, MockModuleDriver, ModuleDriver};
use crate::traits::CommandOutput;

/// Builder for creating test DeviceInfo instances
pub struct DeviceInfoBuilder {
    serial: Option<String>,
    model: Option<String>,
    version: Option<String>,
}

impl DeviceInfoBuilder {
    pub fn new() -> Self {
        Self {
            serial: Some("MDV0118052801".to_string()),
            model: Some("mag_deck_v1".to_string()),
            version: Some("v1.0.2".to_string()),
        }
    }

    pub fn serial(mut self, serial: &str) -> Self {
        self.serial = Some(serial.to_string());
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn build(self) -> DeviceInfo {
        DeviceInfo {
            serial: self.serial,
            model: self.model,
            version: self.version,
        }
    }
}

impl Default for DeviceInfoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Factory handing out the given drivers in order. Panics when exhausted.
pub fn queued_factory(drivers: Vec<MockModuleDriver>) -> DriverFactory {
    let queue = Arc::new(Mutex::new(VecDeque::from(drivers)));
    Arc::new(move || {
        let driver = queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("test driver factory exhausted");
        Box::new(driver) as Box<dyn ModuleDriver>
    })
}

/// Factory for tests that must never touch a driver.
pub fn unused_factory() -> DriverFactory {
    Arc::new(|| -> Box<dyn ModuleDriver> { panic!("driver factory should not be called") })
}

/// Driver that accepts a normal connect and reports `info`.
pub fn connected_driver(info: DeviceInfo) -> MockModuleDriver {
    let mut driver = MockModuleDriver::new();
    driver.expect_connect().returning(|_, _| Ok(()));
    driver
        .expect_get_device_info()
        .returning(move || Ok(info.clone()));
    driver.expect_is_connected().return_const(true);
    driver
}

/// Driver expecting exactly one bootloader-baud open and close on `port`.
pub fn bootloader_touch_driver(port: &str) -> MockModuleDriver {
    let mut driver = MockModuleDriver::new();
    driver
        .expect_connect()
        .with(eq(port.to_string()), eq(BOOTLOADER_BAUD_RATE))
        .times(1)
        .returning(|_, _| Ok(()));
    driver.expect_disconnect().times(1).returning(|| Ok(()));
    driver
}

/// Tool output as avrdude prints it after a verified write.
pub fn verified_output() -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        stdout: String::new(),
        stderr: "avrdude: verifying ...\navrdude: 28672 bytes of flash verified\n\navrdude done.  Thank you.\n"
            .to_string(),
    }
}

/// Tool output for a failed verification.
pub fn verification_error_output() -> CommandOutput {
    CommandOutput {
        exit_code: Some(1),
        stdout: "avrdude: verification error".to_string(),
        stderr: String::new(),
    }
}
