//! Socket transport for LAN instruments speaking line-terminated ASCII.

use crate::adapters::Transport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// TCP transport
pub struct TcpTransport {
    address: String,
    stream: BufReader<TcpStream>,
    terminator: String,
    timeout: Duration,
}

impl TcpTransport {
    /// Connect to `address` (`host:port`).
    pub async fn connect(address: &str, terminator: String, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .with_context(|| format!("Timed out connecting to {}", address))?
            .with_context(|| format!("Failed to connect to {}", address))?;
        debug!("Connected to {}", address);

        Ok(Self {
            address: address.to_string(),
            stream: BufReader::new(stream),
            terminator,
            timeout,
        })
    }

    async fn send(&mut self, command: &str) -> Result<()> {
        let cmd = format!("{}{}", command, self.terminator);
        self.stream
            .get_mut()
            .write_all(cmd.as_bytes())
            .await
            .with_context(|| format!("Write to {} failed", self.address))?;
        debug!("Sent command to {}: {}", self.address, command);
        Ok(())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write(&mut self, command: &str) -> Result<()> {
        self.send(command).await
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.send(command).await?;

        let mut response = String::new();
        let read = tokio::time::timeout(self.timeout, self.stream.read_line(&mut response))
            .await
            .with_context(|| format!("Read timeout from {} (command '{}')", self.address, command))?
            .with_context(|| format!("Read from {} failed", self.address))?;
        if read == 0 {
            anyhow::bail!("Connection to {} closed", self.address);
        }

        let response = response.trim().to_string();
        debug!("Received response from {}: {}", self.address, response);
        Ok(response)
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.address)
    }
}
