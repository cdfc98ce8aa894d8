//! Configuration constants for module control and firmware flashing.

#![allow(dead_code)]

use std::time::Duration;

// ============================================================================
// Device Enumeration
// ============================================================================

/// Directory whose entries are the serial nodes of attached modules.
pub const MODULES_DIR: &str = "/dev/modules";

/// Environment variable that marks the process as running on target hardware.
/// Port enumeration is empty unless it is set.
pub const TARGET_HARDWARE_ENV: &str = "RUNNING_ON_PI";

// ============================================================================
// Serial Communication
// ============================================================================

/// Baud rate of the module's normal command link.
pub const MODULE_BAUD_RATE: u32 = 115_200;

/// Opening the port at this rate resets the microcontroller into its bootloader.
pub const BOOTLOADER_BAUD_RATE: u32 = 1200;

/// Serial read timeout for individual read operations.
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// How long to wait for a command acknowledgement.
pub const COMMAND_ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Reply line that terminates a command exchange.
pub const COMMAND_ACK: &str = "ok";

// ============================================================================
// Bootloader Timing
// ============================================================================

/// Time the bootloader-baud handle is held open before closing it.
pub const BOOTLOADER_TOUCH_HOLD: Duration = Duration::from_secs(5);

/// Time allowed after the touch for the bootloader to arm and its node to register.
pub const BOOTLOADER_ARM_WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Flashing Tool
// ============================================================================

/// External flashing program.
pub const AVRDUDE_PROGRAM: &str = "avrdude";

/// Target microcontroller part number.
pub const AVRDUDE_PART_NO: &str = "atmega32u4";

/// Programmer protocol spoken by the module's bootloader.
pub const AVRDUDE_PROGRAMMER_ID: &str = "avr109";

/// Baud rate used by the flashing tool.
pub const AVRDUDE_BAUD_RATE: &str = "57600";

/// Substring of the tool output that confirms a verified write.
pub const FLASH_VERIFIED_MARKER: &str = "flash verified";

/// Firmware images must be Intel HEX.
pub const FIRMWARE_EXTENSION: &str = "hex";

// ============================================================================
// Magnetic Module
// ============================================================================

/// Name reported for the magnetic module.
pub const MAGDECK_NAME: &str = "magdeck";

/// Human-readable module name.
pub const MAGDECK_DISPLAY_NAME: &str = "Magnetic Deck";

/// Engaged magnets sit this far below the probed plate top (mm).
pub const ENGAGE_OFFSET_MM: f64 = 1.0;

/// Qualify a bare node name with the modules directory.
pub fn module_port_path(modules_dir: &str, node: &str) -> String {
    format!("{}/{}", modules_dir.trim_end_matches('/'), node)
}
