//! CLI Entry Point for QTMlab
//!
//! # Usage
//!
//! Run an experiment script:
//! ```bash
//! qtmlab run scripts/template.rhai
//! ```
//!
//! Inspect and drive instruments by hand:
//! ```bash
//! qtmlab instruments
//! qtmlab read smu meas_i
//! qtmlab move smu dcv 1.0 0.1
//! ```
//!
//! Every command accepts `--config FILE` (default `config/qtmlab.toml`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use qtmlab::config::{LabConfig, DEFAULT_CONFIG_PATH};
use qtmlab::instrument::InstrumentRegistry;
use qtmlab::logging;
use qtmlab::measurement::{MeasurementSession, RunControl};
use qtmlab::scripting::ScriptHost;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "qtmlab")]
#[command(about = "Transport measurement toolbox", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment script
    Run {
        /// Path to .rhai script file
        script: PathBuf,

        /// Only check the script syntax
        #[arg(long)]
        check: bool,
    },

    /// List configured instruments and their variables
    Instruments,

    /// Read one variable
    Read {
        /// Instrument id
        device: String,
        /// Variable name
        variable: String,
    },

    /// Ramp one variable to a setpoint
    Move {
        /// Instrument id
        device: String,
        /// Variable name
        variable: String,
        /// Target value
        #[arg(allow_negative_numbers = true)]
        setpoint: f64,
        /// Ramp rate in units per second
        rate: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = LabConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run { script, check } => run_script(&config, &script, check).await,
        Commands::Instruments => list_instruments(&config).await,
        Commands::Read { device, variable } => read_variable(&config, &device, &variable).await,
        Commands::Move {
            device,
            variable,
            setpoint,
            rate,
        } => move_variable(&config, &device, &variable, setpoint, rate).await,
    }
}

/// Stop flag that trips on Ctrl+C.
fn stop_on_ctrl_c() -> RunControl {
    let control = RunControl::new();
    let handler = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, stopping after the current step");
            handler.stop("Ctrl+C");
        }
    });
    control
}

async fn run_script(config: &LabConfig, script: &Path, check: bool) -> Result<()> {
    if check {
        let source = std::fs::read_to_string(script)
            .with_context(|| format!("Failed to read {}", script.display()))?;
        let host = ScriptHost::from_config(config, Arc::new(InstrumentRegistry::new()));
        host.validate_script(&source)
            .map_err(|e| anyhow::anyhow!("{}: {}", script.display(), e))?;
        println!("{}: syntax OK", script.display());
        return Ok(());
    }

    let registry = Arc::new(InstrumentRegistry::from_config(config).await?);
    let session = MeasurementSession::from_config(config).with_control(stop_on_ctrl_c());
    let host = ScriptHost::new(registry, session, &config.scripting);

    host.run_file(script)?;
    info!(script = %script.display(), "Script completed");
    Ok(())
}

async fn list_instruments(config: &LabConfig) -> Result<()> {
    let registry = InstrumentRegistry::from_config(config).await?;
    if registry.is_empty() {
        println!("No instruments enabled in the configuration");
        return Ok(());
    }
    for id in registry.ids() {
        let instrument = registry.get(&id)?;
        println!("{} ({})", id, instrument.model());
        for variable in instrument.variables() {
            let unit = variable.unit.as_deref().unwrap_or("");
            println!("    {:<12} {:<3} {}", variable.name, variable.access, unit);
        }
    }
    Ok(())
}

async fn read_variable(config: &LabConfig, device: &str, variable: &str) -> Result<()> {
    let registry = InstrumentRegistry::from_config(config).await?;
    let instrument = registry.get(device)?;
    instrument.ensure_readable(variable)?;
    let value = instrument.read(variable).await?;
    println!("{}", value);
    Ok(())
}

async fn move_variable(
    config: &LabConfig,
    device: &str,
    variable: &str,
    setpoint: f64,
    rate: f64,
) -> Result<()> {
    let registry = InstrumentRegistry::from_config(config).await?;
    let instrument = registry.get(device)?;
    let session = MeasurementSession::from_config(config).with_control(stop_on_ctrl_c());
    session
        .move_to(instrument.as_ref(), variable, setpoint, rate)
        .await?;
    info!(device, variable, setpoint, "Move finished");
    Ok(())
}
