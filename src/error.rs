//! Error types for module control and firmware updates.

#![allow(dead_code)]

use thiserror::Error;

/// Result type alias for module operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Errors that can occur while driving a module or updating its firmware.
///
/// A failed flash verification is not an error: it is reported through
/// [`crate::flash::FlashResult`] so the caller keeps the tool output.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Serial port error from the serialport crate.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings JSON could not be read or written.
    #[error("Settings error: {0}")]
    Settings(String),

    /// `connect` was called on a module with no configured port.
    #[error("{name} couldn't connect: no port configured")]
    MissingPort { name: String },

    /// Firmware image is missing or not a flashable file.
    #[error("Invalid firmware image {path}: {reason}")]
    InvalidFirmware { path: String, reason: String },

    /// A command was issued to a driver with no open port.
    #[error("Device not connected")]
    NotConnected,

    /// Serial port is busy (in use by another process).
    #[error("Port '{port}' is busy or in use by another application")]
    PortBusy { port: String },

    /// Permission denied accessing serial port.
    #[error("Permission denied for port '{port}'")]
    PortPermissionDenied { port: String },

    /// The port path does not exist.
    #[error("Port '{port}' not found")]
    PortNotFound { port: String },

    /// No acknowledgement arrived for a command.
    #[error("Timeout waiting for reply to '{command}'")]
    CommandTimeout { command: String },

    /// The device answered with something other than an acknowledgement.
    #[error("Unexpected response to '{command}': {response}")]
    UnexpectedResponse { command: String, response: String },

    /// The flashing tool could not be started.
    #[error("Failed to execute {program}: {reason}")]
    Spawn { program: String, reason: String },
}

impl ModuleError {
    /// Programmer or configuration errors. These are surfaced immediately
    /// and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ModuleError::MissingPort { .. }
                | ModuleError::InvalidFirmware { .. }
                | ModuleError::Settings(_)
        )
    }

    /// Get a user-friendly error code for support purposes.
    pub fn error_code(&self) -> &'static str {
        match self {
            ModuleError::Serial(_) => "MOD-001",
            ModuleError::Io(_) => "MOD-002",
            ModuleError::Settings(_) => "MOD-003",
            ModuleError::MissingPort { .. } => "MOD-010",
            ModuleError::InvalidFirmware { .. } => "MOD-011",
            ModuleError::NotConnected => "MOD-020",
            ModuleError::PortBusy { .. } => "MOD-021",
            ModuleError::PortPermissionDenied { .. } => "MOD-022",
            ModuleError::PortNotFound { .. } => "MOD-023",
            ModuleError::CommandTimeout { .. } => "MOD-030",
            ModuleError::UnexpectedResponse { .. } => "MOD-031",
            ModuleError::Spawn { .. } => "MOD-040",
        }
    }
}
