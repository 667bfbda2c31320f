//! Communication transports for instrument drivers.
//!
//! A [`Transport`] moves ASCII commands to a device and reads line-terminated
//! replies. Drivers own one transport each, behind a mutex, so commands and
//! their replies never interleave.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod mock;
pub mod serial;
pub mod tcp;
pub mod visa;

pub use mock::MockTransport;
pub use serial::SerialTransport;
pub use tcp::TcpTransport;
pub use visa::VisaTransport;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a command without waiting for a reply.
    async fn write(&mut self, command: &str) -> Result<()>;

    /// Send a command and return the trimmed reply line.
    async fn query(&mut self, command: &str) -> Result<String>;

    /// Human readable description for logs (e.g. `serial:/dev/ttyUSB0@9600`).
    fn describe(&self) -> String;
}

/// Transport section of an instrument definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// RS-232 / USB-serial port
    Serial {
        /// Port name (e.g. "/dev/ttyUSB0", "COM3")
        port: String,
        /// Baud rate
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Appended to every command
        #[serde(default = "default_terminator")]
        terminator: String,
        /// Character ending a reply
        #[serde(default = "default_delimiter")]
        response_delimiter: char,
        /// Reply timeout
        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    /// Raw socket (e.g. LAN SCPI on port 5025)
    Tcp {
        /// `host:port`
        address: String,
        /// Appended to every command
        #[serde(default = "default_tcp_terminator")]
        terminator: String,
        /// Reply timeout
        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
    /// VISA resource (GPIB, USBTMC, ...)
    Visa {
        /// VISA resource string (e.g. "GPIB0::24::INSTR")
        resource: String,
        /// Appended to every command
        #[serde(default = "default_tcp_terminator")]
        terminator: String,
        /// Reply timeout
        #[serde(default = "default_timeout", with = "humantime_serde")]
        timeout: Duration,
    },
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_terminator() -> String {
    "\r\n".to_string()
}

fn default_tcp_terminator() -> String {
    "\n".to_string()
}

fn default_delimiter() -> char {
    '\n'
}

fn default_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Open the transport described by `config`.
pub async fn open_transport(config: &TransportConfig) -> Result<Box<dyn Transport>> {
    match config {
        TransportConfig::Serial {
            port,
            baud_rate,
            terminator,
            response_delimiter,
            timeout,
        } => {
            let transport = SerialTransport::new(port.clone(), *baud_rate)
                .with_line_terminator(terminator.clone())
                .with_response_delimiter(*response_delimiter)
                .with_timeout(*timeout)
                .open()
                .await?;
            Ok(Box::new(transport))
        }
        TransportConfig::Tcp {
            address,
            terminator,
            timeout,
        } => {
            let transport = TcpTransport::connect(address, terminator.clone(), *timeout).await?;
            Ok(Box::new(transport))
        }
        TransportConfig::Visa {
            resource,
            terminator,
            timeout,
        } => {
            let transport = VisaTransport::open(resource, terminator.clone(), *timeout).await?;
            Ok(Box::new(transport))
        }
    }
}
