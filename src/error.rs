//! Custom error types for the toolbox.
//!
//! `LabError` is the primary error type for measurement, storage and scripting code.
//! Driver and transport code works with `anyhow::Result` and context strings; when a
//! driver bails with a `LabError` (unknown variable, unparseable reply, ...) the variant
//! survives the trip through `anyhow` and is recovered by [`LabError::from_instrument`].
//!
//! ## Error Hierarchy
//!
//! - **`Config`** / **`Configuration`**: file parsing failures and semantic validation
//!   failures of `config/qtmlab.toml`.
//! - **`Io`**: file and network I/O.
//! - **`Instrument`**, **`UnknownVariable`**, **`NotReadable`**, **`NotWritable`**,
//!   **`InvalidResponse`**: problems talking to a device.
//! - **`InvalidRate`**, **`TooManySteps`**, **`InvalidPointCount`**, **`InvalidLabel`**,
//!   **`SettleTimeout`**, **`Aborted`**: measurement primitive failures.
//! - **`DataFile`**: malformed data files.
//! - **`Script`**: errors raised by experiment scripts.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the toolbox error type.
pub type AppResult<T> = std::result::Result<T, LabError>;

#[derive(Error, Debug)]
pub enum LabError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instrument '{device}' error: {message}")]
    Instrument { device: String, message: String },

    #[error("Unknown instrument '{0}'")]
    UnknownInstrument(String),

    #[error("Instrument '{device}' has no variable '{variable}'")]
    UnknownVariable { device: String, variable: String },

    #[error("Variable '{variable}' of '{device}' cannot be read")]
    NotReadable { device: String, variable: String },

    #[error("Variable '{variable}' of '{device}' cannot be written")]
    NotWritable { device: String, variable: String },

    #[error("Instrument '{device}' sent an invalid response: '{response}'")]
    InvalidResponse { device: String, response: String },

    #[error("Invalid rate {0}: must be a positive, finite number")]
    InvalidRate(f64),

    #[error("Invalid setpoint {0}: must be finite")]
    InvalidSetpoint(f64),

    #[error("A move at this rate needs {steps:e} steps, more than the limit of {max}")]
    TooManySteps { steps: f64, max: u64 },

    #[error("Duration {0:?} is too long")]
    InvalidDuration(Duration),

    #[error("A sweep or record needs at least one point")]
    InvalidPointCount,

    #[error(
        "'{device}.{variable}' did not settle at {target} within {timeout:?} (last reading {last})"
    )]
    SettleTimeout {
        device: String,
        variable: String,
        target: f64,
        last: f64,
        timeout: Duration,
    },

    #[error("Invalid column label {label:?}: {reason}")]
    InvalidLabel { label: String, reason: &'static str },

    #[error("Measurement label '{0}' is already in use")]
    DuplicateLabel(String),

    #[error("Measurement aborted")]
    Aborted,

    #[error("Data file error: {0}")]
    DataFile(String),

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    #[error("Script error: {0}")]
    Script(String),
}

impl LabError {
    /// Convert a driver error into a `LabError`, keeping the original variant when the
    /// driver already raised one.
    pub fn from_instrument(device: &str, err: anyhow::Error) -> Self {
        match err.downcast::<LabError>() {
            Ok(lab) => lab,
            Err(other) => LabError::Instrument {
                device: device.to_string(),
                message: format!("{other:#}"),
            },
        }
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LabError::Instrument { .. }
                | LabError::InvalidResponse { .. }
                | LabError::SettleTimeout { .. }
                | LabError::Io(_)
        )
    }
}
