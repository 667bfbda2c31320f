//! Configuration loading with Figment.
//!
//! Configuration is merged from:
//! 1. a TOML file (`config/qtmlab.toml` by default)
//! 2. environment variables prefixed with `QTMLAB_`, nested keys separated by `__`
//!    (e.g. `QTMLAB_APPLICATION__LOG_LEVEL=debug`)
//!
//! Every section has defaults, so an empty or missing file yields a usable config.
//!
//! # Example
//! ```no_run
//! use qtmlab::config::LabConfig;
//!
//! let config = LabConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), qtmlab::error::LabError>(())
//! ```

use crate::adapters::TransportConfig;
use crate::error::{AppResult, LabError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/qtmlab.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Timing of the move/sweep/measure primitives
    pub measurement: MeasurementConfig,
    /// Data file settings
    pub storage: StorageConfig,
    /// Experiment script settings
    pub scripting: ScriptingConfig,
    /// Plot tool settings
    pub plot: PlotConfig,
    /// Instrument definitions
    pub instruments: Vec<InstrumentDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
    /// Include source file and line in log lines
    pub log_source_location: bool,
    /// Include thread names in log lines
    pub log_thread_names: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "QTMlab".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            log_source_location: false,
            log_thread_names: false,
        }
    }
}

/// Measurement primitive timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Interval between move steps and between settle polls
    #[serde(with = "humantime_serde")]
    pub move_step: Duration,
    /// Wait between reaching a sweep point and measuring
    #[serde(with = "humantime_serde")]
    pub settle_wait: Duration,
    /// Maximum time a single move step may take to settle
    #[serde(with = "humantime_serde")]
    pub settle_timeout: Duration,
    /// Decimals used for rounding move/sweep curves and settle comparison
    pub decimals: u32,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            move_step: Duration::from_millis(20),
            settle_wait: Duration::from_secs(1),
            settle_timeout: Duration::from_secs(30),
            decimals: 3,
        }
    }
}

/// Data file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory relative data file names are resolved against
    pub data_dir: PathBuf,
    /// Write a `# `-prefixed JSON metadata block above the header
    pub write_metadata: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            write_metadata: true,
        }
    }
}

/// Experiment script configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// Rhai operation limit (0 = unlimited)
    pub max_operations: u64,
}

/// Plot tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// How often the live plot polls the data file
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_millis(500),
        }
    }
}

/// Instrument definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentDefinition {
    /// Unique instrument identifier used by scripts
    pub id: String,
    /// Driver type (keithley2400, keithley2000, sr830, itc503, generic, simulated)
    pub r#type: String,
    /// Whether this instrument is opened at startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Communication transport; simulated instruments have none
    #[serde(default)]
    pub transport: Option<TransportConfig>,
    /// Driver-specific options
    #[serde(default = "empty_table")]
    pub options: toml::Value,
}

fn default_enabled() -> bool {
    true
}

fn empty_table() -> toml::Value {
    toml::Value::Table(toml::map::Map::new())
}

impl LabConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and environment variables.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file is not an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: LabConfig = Figment::from(Serialized::defaults(LabConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("QTMLAB_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment overrides).
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config: LabConfig = Figment::from(Serialized::defaults(LabConfig::default()))
            .merge(Toml::string(content))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(LabError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(LabError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.measurement.move_step.is_zero() {
            return Err(LabError::Configuration(
                "measurement.move_step must be greater than zero".to_string(),
            ));
        }

        if self.measurement.decimals > 12 {
            return Err(LabError::Configuration(format!(
                "Invalid decimals {}. Must be 0-12",
                self.measurement.decimals
            )));
        }

        let mut ids = HashSet::new();
        for instrument in &self.instruments {
            if !ids.insert(&instrument.id) {
                return Err(LabError::Configuration(format!(
                    "Duplicate instrument ID: {}",
                    instrument.id
                )));
            }
        }

        Ok(())
    }

    /// Get all enabled instruments
    pub fn enabled_instruments(&self) -> Vec<&InstrumentDefinition> {
        self.instruments
            .iter()
            .filter(|inst| inst.enabled)
            .collect()
    }
}
