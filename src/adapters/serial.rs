//! Serial transport for RS-232/USB-serial instruments
//!
//! Wraps the `serialport` crate. Serial I/O is blocking, so every exchange runs
//! on Tokio's blocking thread pool.

use crate::adapters::Transport;
#[cfg(not(feature = "instrument_serial"))]
use crate::error::LabError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::sync::Arc;
#[cfg(feature = "instrument_serial")]
use tokio::sync::Mutex;

/// Serial transport
pub struct SerialTransport {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    /// Reply timeout
    timeout: Duration,

    /// Line terminator for commands (e.g., "\r\n")
    line_terminator: String,

    /// Response line ending character (e.g., '\n')
    response_delimiter: char,

    #[cfg(feature = "instrument_serial")]
    port: Option<Arc<Mutex<Box<dyn SerialPort>>>>,
}

impl SerialTransport {
    /// Create an unopened serial transport with default settings
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            timeout: Duration::from_secs(2),
            line_terminator: "\r\n".to_string(),
            response_delimiter: '\n',
            #[cfg(feature = "instrument_serial")]
            port: None,
        }
    }

    /// Set reply timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set line terminator for commands
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }

    /// Set response delimiter character
    pub fn with_response_delimiter(mut self, delimiter: char) -> Self {
        self.response_delimiter = delimiter;
        self
    }

    /// Open the port.
    #[cfg(feature = "instrument_serial")]
    pub async fn open(mut self) -> Result<Self> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(Duration::from_millis(100)) // Internal read timeout
            .open()
            .with_context(|| {
                format!(
                    "Failed to open serial port '{}' at {} baud",
                    self.port_name, self.baud_rate
                )
            })?;
        self.port = Some(Arc::new(Mutex::new(port)));
        debug!(
            "Serial port '{}' opened at {} baud",
            self.port_name, self.baud_rate
        );
        Ok(self)
    }

    #[cfg(not(feature = "instrument_serial"))]
    pub async fn open(self) -> Result<Self> {
        Err(LabError::SerialFeatureDisabled.into())
    }

    /// Whether the port has been opened.
    pub fn is_open(&self) -> bool {
        #[cfg(feature = "instrument_serial")]
        {
            self.port.is_some()
        }
        #[cfg(not(feature = "instrument_serial"))]
        {
            false
        }
    }

    #[cfg(feature = "instrument_serial")]
    async fn exchange(&self, command: &str, expect_reply: bool) -> Result<Option<String>> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| anyhow!("Serial port '{}' is not open", self.port_name))?
            .clone();

        let command_str = format!("{}{}", command, self.line_terminator);
        let command_for_log = command.to_string();
        let delimiter = self.response_delimiter;
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            use std::io::{Read, Write};

            let mut port_guard = port.blocking_lock();

            port_guard
                .write_all(command_str.as_bytes())
                .context("Failed to write to serial port")?;
            port_guard.flush().context("Failed to flush serial port")?;
            debug!("Sent serial command: {}", command_for_log);

            if !expect_reply {
                return Ok(None);
            }

            let mut response = String::new();
            let mut buffer = [0u8; 1];
            let start = std::time::Instant::now();

            loop {
                if start.elapsed() > timeout {
                    return Err(anyhow!(
                        "Serial read timeout after {:?} (command '{}')",
                        timeout,
                        command_for_log
                    ));
                }

                match port_guard.read(&mut buffer) {
                    Ok(1) => {
                        let ch = buffer[0] as char;
                        if ch == delimiter {
                            break;
                        }
                        response.push(ch);
                    }
                    Ok(_) => {
                        return Err(anyhow!("Unexpected EOF from serial port"));
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                    Err(e) => return Err(anyhow!("Serial read error: {}", e)),
                }
            }

            let response = response.trim().to_string();
            debug!("Received serial response: {}", response);
            Ok(Some(response))
        })
        .await
        .context("Serial I/O task panicked")?
    }

    #[cfg(not(feature = "instrument_serial"))]
    async fn exchange(&self, _command: &str, _expect_reply: bool) -> Result<Option<String>> {
        Err(LabError::SerialFeatureDisabled.into())
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, command: &str) -> Result<()> {
        self.exchange(command, false).await.map(|_| ())
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.exchange(command, true)
            .await?
            .ok_or_else(|| anyhow!("No reply to '{}'", command))
    }

    fn describe(&self) -> String {
        format!("serial:{}@{}", self.port_name, self.baud_rate)
    }
}
