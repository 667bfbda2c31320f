//! Instrument drivers.
//!
//! Every driver exposes the same small surface: a set of named variables that can be
//! read and/or written as `f64`. Measurement primitives and scripts only ever talk
//! to [`Instrument`], so a Keithley source, a lock-in amplifier and a simulated
//! device are interchangeable in an experiment.
//!
//! # Design
//!
//! - async (uses `#[async_trait]`), `Send + Sync`, methods take `&self`
//! - drivers own their transport behind a mutex (interior mutability)
//! - errors are `anyhow::Result`; access and parsing failures are raised as
//!   [`LabError`] so callers can match on them after `downcast`
//!
//! Most drivers are a [`CommandTable`] of SCPI-ish commands wrapped by
//! [`TableInstrument`]; the table can also be defined in the config file
//! (`type = "generic"`).

use crate::error::LabError;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

pub mod generic;
pub mod itc503;
pub mod keithley2000;
pub mod keithley2400;
pub mod registry;
pub mod simulated;
pub mod sr830;
pub mod table;

pub use registry::InstrumentRegistry;
pub use simulated::SimulatedInstrument;
pub use table::{CommandTable, ResponseParse, TableInstrument, VariableSpec};

/// Whether a variable can be read, written or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Measurement-only quantity
    ReadOnly,
    /// Setting without a query command
    WriteOnly,
    /// Setting that can be queried back (movable)
    ReadWrite,
}

impl Access {
    /// Whether `read` is allowed
    pub fn is_readable(self) -> bool {
        matches!(self, Access::ReadOnly | Access::ReadWrite)
    }

    /// Whether `write` is allowed
    pub fn is_writable(self) -> bool {
        matches!(self, Access::WriteOnly | Access::ReadWrite)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::ReadOnly => write!(f, "r"),
            Access::WriteOnly => write!(f, "w"),
            Access::ReadWrite => write!(f, "rw"),
        }
    }
}

/// Description of one instrument variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    /// Name used by scripts (`dcv`, `x`, `temp1`, ...)
    pub name: String,
    /// Allowed operations
    pub access: Access,
    /// Physical unit, if known
    pub unit: Option<String>,
}

/// Uniform read/write surface of a device.
///
/// # Contract
/// - `read` of a variable without read access fails with [`LabError::NotReadable`]
/// - `write` of a variable without write access fails with [`LabError::NotWritable`]
/// - unknown names fail with [`LabError::UnknownVariable`]
/// - a variable can be moved (ramped) only if it is [`Access::ReadWrite`]
#[async_trait]
pub trait Instrument: Send + Sync {
    /// Identifier from the configuration (e.g. "keithley")
    fn id(&self) -> &str;

    /// Driver model name (e.g. "Keithley 2400")
    fn model(&self) -> &str;

    /// All variables this instrument exposes
    fn variables(&self) -> Vec<Variable>;

    /// Read a variable
    async fn read(&self, variable: &str) -> Result<f64>;

    /// Write a variable
    async fn write(&self, variable: &str, value: f64) -> Result<()>;

    /// Identification string reported by the device.
    ///
    /// # Default Implementation
    /// Returns an error indicating identification is not supported.
    async fn identify(&self) -> Result<String> {
        anyhow::bail!("Identification not supported by {}", self.model())
    }

    /// Look up a variable by name
    fn variable(&self, name: &str) -> Option<Variable> {
        self.variables().into_iter().find(|v| v.name == name)
    }

    /// Whether `name` is both readable and writable
    fn can_move(&self, name: &str) -> bool {
        self.variable(name)
            .map(|v| v.access == Access::ReadWrite)
            .unwrap_or(false)
    }

    /// Check that `name` exists and allows reading
    fn ensure_readable(&self, name: &str) -> Result<Variable, LabError> {
        let variable = self.ensure_known(name)?;
        if variable.access.is_readable() {
            Ok(variable)
        } else {
            Err(LabError::NotReadable {
                device: self.id().to_string(),
                variable: name.to_string(),
            })
        }
    }

    /// Check that `name` exists and allows writing
    fn ensure_writable(&self, name: &str) -> Result<Variable, LabError> {
        let variable = self.ensure_known(name)?;
        if variable.access.is_writable() {
            Ok(variable)
        } else {
            Err(LabError::NotWritable {
                device: self.id().to_string(),
                variable: name.to_string(),
            })
        }
    }

    /// Check that `name` exists
    fn ensure_known(&self, name: &str) -> Result<Variable, LabError> {
        self.variable(name).ok_or_else(|| LabError::UnknownVariable {
            device: self.id().to_string(),
            variable: name.to_string(),
        })
    }
}

/// Format a setpoint for a command string.
///
/// Uses the shortest representation that round-trips, so `0.1` is sent as `0.1`
/// rather than `0.10000000000000001`.
pub fn format_setpoint(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
