//! Simulated instrument for dry runs and tests.
//!
//! Simulates a voltage source driving a resistor:
//! - settable outputs (default `dcv` and `gate`) that report a new setpoint only
//!   after `lag_reads` further reads, like a source that is still ramping
//! - `current` = `dcv / resistance`, plus uniform noise of amplitude `noise`
//! - `temperature`, a constant bath temperature plus noise

use crate::error::LabError;
use crate::instrument::{Access, Instrument, Variable};
use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::trace;

/// Options of a `type = "simulated"` instrument
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatedOptions {
    /// Names of the settable outputs
    pub outputs: Vec<String>,
    /// Load resistance in Ohm
    pub resistance: f64,
    /// Noise amplitude added to derived readings
    pub noise: f64,
    /// Reads before a written output reports its new value
    pub lag_reads: u32,
    /// Bath temperature in K
    pub temperature: f64,
}

impl Default for SimulatedOptions {
    fn default() -> Self {
        Self {
            outputs: vec!["dcv".to_string(), "gate".to_string()],
            resistance: 1000.0,
            noise: 0.0,
            lag_reads: 0,
            temperature: 4.2,
        }
    }
}

impl SimulatedOptions {
    /// Deserialize from the `options` value of an instrument definition
    pub fn from_value(id: &str, options: &toml::Value) -> Result<Self, LabError> {
        options.clone().try_into().map_err(|e: toml::de::Error| {
            LabError::Configuration(format!("Instrument '{}': invalid options: {}", id, e))
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Output {
    reported: f64,
    target: f64,
    pending_reads: u32,
}

/// Simulated source/measure device
pub struct SimulatedInstrument {
    id: String,
    options: SimulatedOptions,
    outputs: RwLock<BTreeMap<String, Output>>,
}

impl SimulatedInstrument {
    /// Create with default options (outputs at 0)
    pub fn new(id: &str) -> Self {
        Self::with_options(id, SimulatedOptions::default())
    }

    /// Create with custom options
    pub fn with_options(id: &str, options: SimulatedOptions) -> Self {
        let outputs = options
            .outputs
            .iter()
            .map(|name| (name.clone(), Output::default()))
            .collect();
        Self {
            id: id.to_string(),
            options,
            outputs: RwLock::new(outputs),
        }
    }

    /// Set an output immediately, without lag (test setup)
    pub async fn preset(&self, variable: &str, value: f64) -> Result<()> {
        let mut outputs = self.outputs.write().await;
        let output = outputs
            .get_mut(variable)
            .ok_or_else(|| self.unknown(variable))?;
        *output = Output {
            reported: value,
            target: value,
            pending_reads: 0,
        };
        Ok(())
    }

    /// Current setpoint of an output, ignoring lag
    pub async fn target(&self, variable: &str) -> Option<f64> {
        self.outputs.read().await.get(variable).map(|o| o.target)
    }

    fn noise(&self) -> f64 {
        if self.options.noise > 0.0 {
            rand::thread_rng().gen_range(-self.options.noise..self.options.noise)
        } else {
            0.0
        }
    }

    fn unknown(&self, variable: &str) -> LabError {
        LabError::UnknownVariable {
            device: self.id.clone(),
            variable: variable.to_string(),
        }
    }
}

#[async_trait]
impl Instrument for SimulatedInstrument {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        "Simulated source"
    }

    fn variables(&self) -> Vec<Variable> {
        let mut variables: Vec<Variable> = self
            .options
            .outputs
            .iter()
            .map(|name| Variable {
                name: name.clone(),
                access: Access::ReadWrite,
                unit: Some("V".to_string()),
            })
            .collect();
        variables.push(Variable {
            name: "current".to_string(),
            access: Access::ReadOnly,
            unit: Some("A".to_string()),
        });
        variables.push(Variable {
            name: "temperature".to_string(),
            access: Access::ReadOnly,
            unit: Some("K".to_string()),
        });
        variables
    }

    async fn read(&self, variable: &str) -> Result<f64> {
        match variable {
            "current" => {
                let voltage = self
                    .outputs
                    .read()
                    .await
                    .get("dcv")
                    .map(|o| o.reported)
                    .unwrap_or(0.0);
                Ok(voltage / self.options.resistance + self.noise())
            }
            "temperature" => Ok(self.options.temperature + self.noise()),
            _ => {
                let mut outputs = self.outputs.write().await;
                let output = outputs
                    .get_mut(variable)
                    .ok_or_else(|| self.unknown(variable))?;
                if output.pending_reads > 0 {
                    output.pending_reads -= 1;
                    if output.pending_reads == 0 {
                        output.reported = output.target;
                    }
                } else {
                    output.reported = output.target;
                }
                trace!(device = %self.id, variable, value = output.reported, "simulated read");
                Ok(output.reported)
            }
        }
    }

    async fn write(&self, variable: &str, value: f64) -> Result<()> {
        if matches!(variable, "current" | "temperature") {
            return Err(LabError::NotWritable {
                device: self.id.clone(),
                variable: variable.to_string(),
            }
            .into());
        }
        let mut outputs = self.outputs.write().await;
        let output = outputs
            .get_mut(variable)
            .ok_or_else(|| self.unknown(variable))?;
        output.target = value;
        output.pending_reads = self.options.lag_reads;
        if output.pending_reads == 0 {
            output.reported = value;
        }
        Ok(())
    }

    async fn identify(&self) -> Result<String> {
        Ok(format!("QTMlab,Simulated source,{},1.0", self.id))
    }
}
