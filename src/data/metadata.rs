//! Run metadata written above the data file header.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One measured column and where it comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Column label
    pub label: String,
    /// Instrument id
    pub device: String,
    /// Instrument variable
    pub variable: String,
}

/// Describes one sweep or record run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Unique run identifier
    pub run_id: Uuid,
    /// Primitive that produced the file (`sweep`, `record`)
    pub primitive: String,
    /// Wall clock start time
    pub started: DateTime<Utc>,
    /// Machine the experiment ran on
    pub host: String,
    /// Version of the toolbox
    pub software_version: String,
    /// Primitive parameters (device, start, stop, rate, ...)
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Measured channels in column order
    pub channels: Vec<ChannelInfo>,
}

impl RunMetadata {
    /// Start describing a new run
    pub fn builder(primitive: &str) -> RunMetadataBuilder {
        RunMetadataBuilder {
            inner: RunMetadata {
                run_id: Uuid::new_v4(),
                primitive: primitive.to_string(),
                started: Utc::now(),
                host: hostname::get()
                    .map(|h| h.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "unknown".to_string()),
                software_version: env!("CARGO_PKG_VERSION").to_string(),
                parameters: BTreeMap::new(),
                channels: Vec::new(),
            },
        }
    }
}

/// A builder for [`RunMetadata`].
pub struct RunMetadataBuilder {
    inner: RunMetadata,
}

impl RunMetadataBuilder {
    /// Add a primitive parameter
    pub fn parameter(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.inner.parameters.insert(key.to_string(), value.into());
        self
    }

    /// Add a measured channel
    pub fn channel(mut self, label: &str, device: &str, variable: &str) -> Self {
        self.inner.channels.push(ChannelInfo {
            label: label.to_string(),
            device: device.to_string(),
            variable: variable.to_string(),
        });
        self
    }

    pub fn build(self) -> RunMetadata {
        self.inner
    }
}
