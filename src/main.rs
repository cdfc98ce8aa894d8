//! magdeck-updater - control magnetic modules and update their firmware.

mod bootloader;
mod commands;
mod config;
mod discovery;
mod driver;
mod error;
mod firmware;
mod fleet;
mod flash;
mod module;
mod settings;
mod traits;

#[cfg(test)]
mod test_helpers;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::driver::serial_driver_factory;
use crate::fleet::FleetUpdateOutcome;
use crate::settings::SettingsManager;
use crate::traits::RealCommandExecutor;

#[derive(Parser)]
#[command(name = "magdeck-updater")]
#[command(author, version, about = "Magnetic module controller and firmware updater")]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding the settings file
    #[arg(long, env = "MAGDECK_DATA_DIR", default_value = "/data/magdeck")]
    data_dir: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached module ports
    Ports,

    /// Show module identity and state
    Status {
        /// Serial port (defaults to the first discovered module)
        #[arg(short, long)]
        port: Option<String>,
    },

    /// Raise the magnets to just below the plate
    Engage {
        #[arg(short, long)]
        port: Option<String>,
    },

    /// Home the magnets
    Disengage {
        #[arg(short, long)]
        port: Option<String>,
    },

    /// Probe the plate height
    Calibrate {
        #[arg(short, long)]
        port: Option<String>,
    },

    /// Flash firmware to one module
    Flash {
        #[arg(short, long)]
        port: Option<String>,

        /// Intel HEX firmware image
        #[arg(short, long)]
        firmware: PathBuf,

        /// avrdude configuration file (overrides avrdudeConfig)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run the flashing tool as a child process without disengaging
        #[arg(long = "async")]
        run_async: bool,
    },

    /// Flash the attached module with the given serial number
    FleetUpdate {
        #[arg(short, long)]
        serial: String,

        #[arg(short, long)]
        firmware: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,

    /// Set a value by its JSON key (e.g. avrdudeConfig)
    Set { key: String, value: String },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let settings = SettingsManager::new(&cli.data_dir)
        .load()
        .context("Failed to load settings")?;
    let factory = serial_driver_factory();

    match cli.command {
        Commands::Ports => {
            commands::ports(&settings)?;
        }

        Commands::Status { port } => {
            commands::status(&settings, factory, port)?;
        }

        Commands::Engage { port } => {
            commands::engage(&settings, factory, port)?;
        }

        Commands::Disengage { port } => {
            commands::disengage(&settings, factory, port)?;
        }

        Commands::Calibrate { port } => {
            commands::calibrate(&settings, factory, port)?;
        }

        Commands::Flash {
            port,
            firmware,
            config,
            run_async,
        } => {
            let result = commands::flash(
                &settings,
                factory,
                Box::new(RealCommandExecutor),
                port,
                firmware,
                config,
                run_async,
            )?;
            if !result.succeeded {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::FleetUpdate {
            serial,
            firmware,
            config,
        } => {
            let outcome = commands::fleet_update(
                &settings,
                factory,
                Box::new(RealCommandExecutor),
                &serial,
                firmware,
                config,
            )?;
            match outcome {
                FleetUpdateOutcome::Flashed(result) if result.succeeded => {}
                _ => return Ok(ExitCode::FAILURE),
            }
        }

        Commands::Settings { action } => match action {
            SettingsAction::Show => {
                commands::settings_show(&cli.data_dir)?;
            }
            SettingsAction::Set { key, value } => {
                commands::settings_set(&cli.data_dir, &key, &value)?;
            }
        },
    }

    Ok(ExitCode::SUCCESS)
}
