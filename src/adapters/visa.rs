//! VISA transport (GPIB, USBTMC, VXI-11) gated behind `instrument_visa`.
//!
//! Requires a VISA runtime (NI-VISA, Keysight IO Libraries, ...) on the host.

use crate::adapters::Transport;
#[cfg(not(feature = "instrument_visa"))]
use crate::error::LabError;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

#[cfg(feature = "instrument_visa")]
use anyhow::{anyhow, Context};
#[cfg(feature = "instrument_visa")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "instrument_visa")]
use tracing::debug;

#[cfg(feature = "instrument_visa")]
struct VisaSession {
    // The resource manager must outlive the session; dropping it closes every session.
    _rm: visa_rs::DefaultRM,
    instrument: visa_rs::Instrument,
}

/// VISA transport
pub struct VisaTransport {
    resource: String,
    #[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
    terminator: String,
    #[cfg_attr(not(feature = "instrument_visa"), allow(dead_code))]
    timeout: Duration,
    #[cfg(feature = "instrument_visa")]
    session: Arc<Mutex<VisaSession>>,
}

impl VisaTransport {
    /// Open a VISA session for `resource`.
    #[cfg(feature = "instrument_visa")]
    pub async fn open(resource: &str, terminator: String, timeout: Duration) -> Result<Self> {
        use std::ffi::CString;
        use visa_rs::prelude::*;

        let resource_owned = resource.to_string();
        let session = tokio::task::spawn_blocking(move || -> Result<VisaSession> {
            let rm = DefaultRM::new().map_err(|e| anyhow!("VISA resource manager: {:?}", e))?;
            let name = CString::new(resource_owned.clone())
                .context("VISA resource string contains a NUL byte")?;
            let instrument = rm
                .open(&name.into(), AccessMode::NO_LOCK, timeout)
                .map_err(|e| anyhow!("Failed to open VISA resource '{}': {:?}", resource_owned, e))?;
            Ok(VisaSession {
                _rm: rm,
                instrument,
            })
        })
        .await
        .context("VISA open task panicked")??;

        debug!("VISA resource '{}' opened", resource);
        Ok(Self {
            resource: resource.to_string(),
            terminator,
            timeout,
            session: Arc::new(Mutex::new(session)),
        })
    }

    #[cfg(not(feature = "instrument_visa"))]
    pub async fn open(resource: &str, terminator: String, timeout: Duration) -> Result<Self> {
        let _ = (resource, terminator, timeout);
        Err(LabError::FeatureNotEnabled("instrument_visa".to_string()).into())
    }

    #[cfg(feature = "instrument_visa")]
    async fn exchange(&self, command: &str, expect_reply: bool) -> Result<Option<String>> {
        use std::io::{BufRead, BufReader, Write};

        let session = self.session.clone();
        let command_str = format!("{}{}", command, self.terminator);
        let resource = self.resource.clone();
        let command_for_log = command.to_string();

        tokio::task::spawn_blocking(move || {
            let mut guard = session
                .lock()
                .map_err(|_| anyhow!("VISA session lock poisoned"))?;
            guard
                .instrument
                .write_all(command_str.as_bytes())
                .with_context(|| format!("VISA write to '{}' failed", resource))?;
            debug!("Sent VISA command to {}: {}", resource, command_for_log);

            if !expect_reply {
                return Ok(None);
            }

            let mut response = String::new();
            let mut reader = BufReader::new(&guard.instrument);
            reader
                .read_line(&mut response)
                .with_context(|| format!("VISA read from '{}' failed", resource))?;
            let response = response.trim().to_string();
            debug!("Received VISA response from {}: {}", resource, response);
            Ok(Some(response))
        })
        .await
        .context("VISA I/O task panicked")?
    }

    #[cfg(not(feature = "instrument_visa"))]
    async fn exchange(&self, _command: &str, _expect_reply: bool) -> Result<Option<String>> {
        Err(LabError::FeatureNotEnabled("instrument_visa".to_string()).into())
    }
}

#[async_trait]
impl Transport for VisaTransport {
    async fn write(&mut self, command: &str) -> Result<()> {
        self.exchange(command, false).await.map(|_| ())
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.exchange(command, true)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No reply to '{}'", command))
    }

    fn describe(&self) -> String {
        format!("visa:{}", self.resource)
    }
}
