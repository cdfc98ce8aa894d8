//! Serial implementation of [`ModuleDriver`].
//!
//! Commands are single lines; the module answers with zero or more reply
//! lines followed by `ok`. Only the handful of commands the controller needs
//! are issued here.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serialport::SerialPort;
use tracing::{debug, info};

use super::{DeviceInfo, ModuleDriver};
use crate::config::{BOOTLOADER_BAUD_RATE, COMMAND_ACK, COMMAND_ACK_TIMEOUT, SERIAL_READ_TIMEOUT};
use crate::error::{ModuleError, ModuleResult};

const GET_DEVICE_INFO: &str = "M115";
const PROBE_PLATE: &str = "G38.2";
const GET_PLATE_HEIGHT: &str = "M836";
const HOME: &str = "G28.2";

/// Serial-port backed module driver.
pub struct SerialDriver {
    port: Option<Box<dyn SerialPort>>,
    port_name: Option<String>,
    plate_height: f64,
}

impl SerialDriver {
    pub fn new() -> Self {
        Self {
            port: None,
            port_name: None,
            plate_height: 0.0,
        }
    }

    /// Open a serial port with a specific baud rate.
    ///
    /// Retries transient failures: right after re-enumeration a node can be
    /// listed before its driver is ready.
    fn open(port_name: &str, baud_rate: u32) -> ModuleResult<Box<dyn SerialPort>> {
        let normalized_name = normalize_port_name(port_name);

        const MAX_OPEN_RETRIES: u32 = 10;
        const RETRY_DELAY_MS: u64 = 200;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match serialport::new(&normalized_name, baud_rate)
                .timeout(SERIAL_READ_TIMEOUT)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .open()
            {
                Ok(port) => return Ok(port),
                Err(e) => {
                    let err_str = e.to_string().to_lowercase();
                    let is_transient = err_str.contains("temporarily unavailable")
                        || err_str.contains("interrupted")
                        || err_str.contains("not functioning");

                    if is_transient && attempt < MAX_OPEN_RETRIES {
                        debug!("Transient open failure on {} ({}), retrying", port_name, e);
                        std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
                        continue;
                    }

                    return Err(match e.kind() {
                        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                            ModuleError::PortPermissionDenied {
                                port: port_name.to_string(),
                            }
                        }
                        serialport::ErrorKind::Io(std::io::ErrorKind::NotFound)
                        | serialport::ErrorKind::NoDevice => ModuleError::PortNotFound {
                            port: port_name.to_string(),
                        },
                        _ if err_str.contains("busy") || err_str.contains("in use") => {
                            ModuleError::PortBusy {
                                port: port_name.to_string(),
                            }
                        }
                        _ => ModuleError::Serial(e),
                    });
                }
            }
        }
    }

    /// Send one command line and collect the reply lines before `ok`.
    fn send_command(&mut self, command: &str) -> ModuleResult<String> {
        let port = self.port.as_mut().ok_or(ModuleError::NotConnected)?;

        debug!("-> {}", command);
        port.write_all(format!("{}\r\n", command).as_bytes())?;
        port.flush()?;

        let deadline = Instant::now() + COMMAND_ACK_TIMEOUT;
        let mut pending = String::new();
        let mut reply = Vec::new();
        let mut buffer = [0u8; 256];

        while Instant::now() < deadline {
            let n = match port.read(&mut buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
                Err(e) => return Err(ModuleError::Io(e)),
            };
            if n == 0 {
                continue;
            }

            pending.push_str(&String::from_utf8_lossy(&buffer[..n]));
            while let Some(pos) = pending.find('\n') {
                let line = pending[..pos].trim().to_string();
                pending.drain(..=pos);
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case(COMMAND_ACK) {
                    let reply = reply.join("\n");
                    debug!("<- {}", reply);
                    return Ok(reply);
                }
                if line.to_ascii_lowercase().starts_with("error") {
                    return Err(ModuleError::UnexpectedResponse {
                        command: command.to_string(),
                        response: line,
                    });
                }
                reply.push(line);
            }
        }

        Err(ModuleError::CommandTimeout {
            command: command.to_string(),
        })
    }

    /// Read the plate height the module stored at its last probe.
    fn refresh_plate_height(&mut self) -> ModuleResult<()> {
        let reply = self.send_command(GET_PLATE_HEIGHT)?;
        self.plate_height =
            parse_plate_height(&reply).ok_or_else(|| ModuleError::UnexpectedResponse {
                command: GET_PLATE_HEIGHT.to_string(),
                response: reply.clone(),
            })?;
        Ok(())
    }
}

impl Default for SerialDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDriver for SerialDriver {
    fn connect(&mut self, port: &str, baud_rate: u32) -> ModuleResult<()> {
        // One open handle per port.
        self.disconnect()?;

        let handle = Self::open(port, baud_rate)?;
        handle.clear(serialport::ClearBuffer::Input).ok();

        info!("Connected to {} at {} baud", port, baud_rate);
        self.port = Some(handle);
        self.port_name = Some(port.to_string());

        // A bootloader-baud handle only exists to reset the device.
        if baud_rate != BOOTLOADER_BAUD_RATE {
            if let Err(e) = self.refresh_plate_height() {
                debug!("No stored plate height on {}: {}", port, e);
            }
        }
        Ok(())
    }

    fn disconnect(&mut self) -> ModuleResult<()> {
        if let Some(port) = self.port.take() {
            drop(port);
            if let Some(name) = self.port_name.take() {
                info!("Disconnected from {}", name);
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn get_device_info(&mut self) -> ModuleResult<DeviceInfo> {
        let reply = self.send_command(GET_DEVICE_INFO)?;
        Ok(DeviceInfo::parse(&reply))
    }

    fn probe_plate(&mut self) -> ModuleResult<()> {
        self.send_command(PROBE_PLATE)?;
        self.refresh_plate_height()?;
        debug!("Probed plate height: {}", self.plate_height);
        Ok(())
    }

    fn move_to(&mut self, position: f64) -> ModuleResult<()> {
        self.send_command(&format!("G0 Z{:.3}", position))?;
        Ok(())
    }

    fn home(&mut self) -> ModuleResult<()> {
        self.send_command(HOME)?;
        Ok(())
    }

    fn plate_height(&self) -> f64 {
        self.plate_height
    }
}

/// Parse a `height:12.5` reply.
fn parse_plate_height(reply: &str) -> Option<f64> {
    reply
        .split_whitespace()
        .find_map(|token| token.strip_prefix("height:"))
        .and_then(|value| value.parse().ok())
}

/// Normalize a port name for cross-platform compatibility.
fn normalize_port_name(name: &str) -> String {
    #[cfg(target_os = "macos")]
    {
        // Prefer cu. over tty. for better compatibility
        if name.starts_with("/dev/tty.") {
            return name.replace("/dev/tty.", "/dev/cu.");
        }
    }

    #[cfg(target_os = "windows")]
    {
        // COM ports > 9 need \\.\\ prefix
        if name.starts_with("COM") {
            if let Ok(n) = name[3..].parse::<u32>() {
                if n > 9 {
                    return format!("\\\\.\\{}", name);
                }
            }
        }
    }

    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_port_name_passthrough() {
        assert_eq!(normalize_port_name("/dev/modules/ttyMagDeck0"), "/dev/modules/ttyMagDeck0");
        assert_eq!(normalize_port_name("COM1"), "COM1");
    }

    #[test]
    fn test_parse_plate_height() {
        assert_eq!(parse_plate_height("height:12.5"), Some(12.5));
        assert_eq!(parse_plate_height("mode:idle height:3"), Some(3.0));
        assert_eq!(parse_plate_height("height:abc"), None);
        assert_eq!(parse_plate_height(""), None);
    }

    #[test]
    fn test_new_driver_is_disconnected() {
        let mut driver = SerialDriver::new();
        assert!(!driver.is_connected());
        assert!(driver.disconnect().is_ok());
        assert!(matches!(driver.home(), Err(ModuleError::NotConnected)));
    }
}
