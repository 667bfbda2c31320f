//! Instrument registry
//!
//! Maps configuration ids to opened drivers. Scripts and the CLI look
//! instruments up by id; every entry is shared as `Arc<dyn Instrument>` so a
//! measurement list and a sweep can hold the same device.

use crate::adapters::open_transport;
use crate::config::{InstrumentDefinition, LabConfig};
use crate::error::{AppResult, LabError};
use crate::instrument::simulated::SimulatedOptions;
use crate::instrument::{generic, itc503, keithley2000, keithley2400, sr830};
use crate::instrument::{Instrument, SimulatedInstrument};
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Driver type names accepted in `[[instruments]] type = ...`
pub const DRIVER_TYPES: &[&str] = &[
    "keithley2400",
    "keithley2000",
    "sr830",
    "itc503",
    "generic",
    "simulated",
];

/// Central registry of opened instruments
#[derive(Default)]
pub struct InstrumentRegistry {
    instruments: HashMap<String, Arc<dyn Instrument>>,
}

impl InstrumentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every enabled instrument of `config`.
    ///
    /// # Errors
    /// Fails on the first instrument that cannot be opened; instruments opened
    /// before it are dropped (closing their ports).
    pub async fn from_config(config: &LabConfig) -> Result<Self> {
        let mut registry = Self::new();
        for definition in config.enabled_instruments() {
            let instrument = build_instrument(definition)
                .await
                .with_context(|| format!("Failed to open instrument '{}'", definition.id))?;
            info!(
                id = %definition.id,
                model = instrument.model(),
                "Instrument ready"
            );
            registry.insert(instrument);
        }
        Ok(registry)
    }

    /// Register an instrument under its own id, replacing any previous entry
    pub fn insert(&mut self, instrument: Arc<dyn Instrument>) {
        self.instruments
            .insert(instrument.id().to_string(), instrument);
    }

    /// Look up an instrument
    pub fn get(&self, id: &str) -> AppResult<Arc<dyn Instrument>> {
        self.instruments
            .get(id)
            .cloned()
            .ok_or_else(|| LabError::UnknownInstrument(id.to_string()))
    }

    /// Check if an instrument is registered
    pub fn contains(&self, id: &str) -> bool {
        self.instruments.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instruments.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered instruments
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

/// Instantiate the driver for one definition.
pub async fn build_instrument(definition: &InstrumentDefinition) -> Result<Arc<dyn Instrument>> {
    let id = definition.id.as_str();

    if definition.r#type == "simulated" {
        let options = SimulatedOptions::from_value(id, &definition.options)?;
        return Ok(Arc::new(SimulatedInstrument::with_options(id, options)));
    }

    if !DRIVER_TYPES.contains(&definition.r#type.as_str()) {
        return Err(LabError::Configuration(format!(
            "Instrument '{}': unknown type '{}'. Must be one of: {}",
            id,
            definition.r#type,
            DRIVER_TYPES.join(", ")
        ))
        .into());
    }

    let transport_config = definition.transport.as_ref().ok_or_else(|| {
        LabError::Configuration(format!(
            "Instrument '{}' of type '{}' needs a transport",
            id, definition.r#type
        ))
    })?;
    let transport = open_transport(transport_config).await?;
    info!(id, transport = %transport.describe(), "Transport open");

    let instrument: Arc<dyn Instrument> = match definition.r#type.as_str() {
        "keithley2400" => Arc::new(keithley2400::connect(id, transport)),
        "keithley2000" => Arc::new(keithley2000::connect(id, transport)),
        "sr830" => Arc::new(sr830::connect(id, transport)),
        "itc503" => Arc::new(itc503::connect(id, transport).await?),
        "generic" => Arc::new(generic::connect(id, transport, &definition.options).await?),
        other => return Err(anyhow!("Unhandled driver type '{}'", other)),
    };
    Ok(instrument)
}
