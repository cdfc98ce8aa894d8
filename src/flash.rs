//! Firmware flash orchestration.
//!
//! One algorithm, two ways of waiting on the flashing tool:
//!
//! - [`FirmwareFlashOrchestrator::flash_blocking`] disengages the module,
//!   enters the bootloader and runs the tool on the calling thread. A flash
//!   can take about a minute; keep it off request-handling threads.
//! - [`FirmwareFlashOrchestrator::flash`] leaves disengaging to the caller
//!   and suspends only the calling task while the tool runs. Afterwards the
//!   module adopts a re-enumerated node if one is detected.
//!
//! A completed run whose output lacks the verification marker is a failed
//! [`FlashResult`], not an error. Only spawn and port failures are errors.
//! An in-flight flash is never cancelled.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::bootloader::BootloaderTransition;
use crate::config::{
    AVRDUDE_BAUD_RATE, AVRDUDE_PART_NO, AVRDUDE_PROGRAM, AVRDUDE_PROGRAMMER_ID,
    FLASH_VERIFIED_MARKER,
};
use crate::discovery::detect_substitution;
use crate::error::ModuleResult;
use crate::firmware::FirmwareImage;
use crate::module::ModuleController;
use crate::traits::{CommandExecutor, CommandOutput};

/// What to flash and how to configure the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashRequest {
    pub firmware_path: PathBuf,
    pub config_path: PathBuf,
}

impl FlashRequest {
    pub fn new(firmware_path: impl Into<PathBuf>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            firmware_path: firmware_path.into(),
            config_path: config_path.into(),
        }
    }
}

/// Outcome of one flash attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashResult {
    pub succeeded: bool,
    pub raw_output: String,
    pub resolved_port: Option<String>,
    pub image_sha256: Option<String>,
}

impl FlashResult {
    /// Classify tool output. Success iff it contains the verification marker.
    pub fn from_output(raw_output: impl Into<String>, resolved_port: Option<String>) -> Self {
        let raw_output = raw_output.into();
        Self {
            succeeded: raw_output.contains(FLASH_VERIFIED_MARKER),
            raw_output,
            resolved_port,
            image_sha256: None,
        }
    }

    fn with_image(mut self, image: &FirmwareImage) -> Self {
        self.image_sha256 = Some(image.sha256().to_string());
        self
    }
}

/// Build the flashing tool's argument list.
pub fn avrdude_args(config_path: &Path, port: &str, firmware_path: &Path) -> Vec<String> {
    vec![
        format!("-C{}", config_path.display()),
        "-v".to_string(),
        format!("-p{}", AVRDUDE_PART_NO),
        format!("-c{}", AVRDUDE_PROGRAMMER_ID),
        format!("-P{}", port),
        format!("-b{}", AVRDUDE_BAUD_RATE),
        "-D".to_string(),
        format!("-Uflash:w:{}:i", firmware_path.display()),
    ]
}

/// Drives bootloader entry, the flashing tool, and result interpretation.
pub struct FirmwareFlashOrchestrator {
    executor: Box<dyn CommandExecutor>,
    transition: BootloaderTransition,
    program: String,
}

impl FirmwareFlashOrchestrator {
    pub fn new(executor: Box<dyn CommandExecutor>, transition: BootloaderTransition) -> Self {
        Self {
            executor,
            transition,
            program: AVRDUDE_PROGRAM.to_string(),
        }
    }

    /// Use a different flashing tool binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Flash on the calling thread, blocking until the tool exits.
    pub fn flash_blocking(
        &self,
        module: &mut ModuleController,
        request: &FlashRequest,
    ) -> ModuleResult<FlashResult> {
        let image = FirmwareImage::open(&request.firmware_path)?;

        // Never flash mid-motion.
        module.disengage()?;

        let port = self.transition.enter_blocking(module)?;
        let args = self.invocation(request, &port, &image);
        let output = self.executor.execute(&self.program, args)?;

        Ok(self.interpret(&output, port, &image))
    }

    /// Flash as a child process, suspending only the calling task.
    ///
    /// The caller is responsible for disengaging the module first and for
    /// serializing updates to the same module.
    pub async fn flash(
        &self,
        module: &mut ModuleController,
        request: &FlashRequest,
    ) -> ModuleResult<FlashResult> {
        let image = FirmwareImage::open(&request.firmware_path)?;

        let port = self.transition.enter(module).await?;
        let discovery = self.transition.discovery();
        let before = discovery.list_ports();

        let args = self.invocation(request, &port, &image);
        let output = self.executor.execute_async(&self.program, args).await?;

        let after = discovery.list_ports();
        if let Some(node) = detect_substitution(&before, &after) {
            module.set_port(discovery.qualify(&node));
        } else {
            info!("Module port after flash: {:?}", module.port());
        }

        Ok(self.interpret(&output, port, &image))
    }

    fn invocation(&self, request: &FlashRequest, port: &str, image: &FirmwareImage) -> Vec<String> {
        let args = avrdude_args(&request.config_path, port, image.path());
        info!("Running {} {}", self.program, args.join(" "));
        args
    }

    fn interpret(&self, output: &CommandOutput, port: String, image: &FirmwareImage) -> FlashResult {
        let result = FlashResult::from_output(output.combined(), Some(port)).with_image(image);
        if result.succeeded {
            info!("Firmware uploaded successfully");
        } else {
            error!(
                "Firmware upload failed (exit {:?})\n{}",
                output.exit_code, result.raw_output
            );
        }
        result
    }
}
