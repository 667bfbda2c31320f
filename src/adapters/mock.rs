//! Mock transport for testing drivers without hardware
//!
//! Replies are scripted per command; every command sent is logged so tests can
//! assert on the exact wire traffic.

use crate::adapters::Transport;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockState {
    replies: HashMap<String, VecDeque<String>>,
    sticky: HashMap<String, String>,
    log: Vec<String>,
}

/// Mock transport with scripted replies.
///
/// Cloning shares the script and the call log, so a test can keep a clone after
/// handing the transport to a driver.
///
/// # Example
///
/// ```
/// use qtmlab::adapters::{MockTransport, Transport};
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let mut transport = MockTransport::new().with_reply("*IDN?", "MOCK,0,0,1.0");
///     assert_eq!(transport.query("*IDN?").await.unwrap(), "MOCK,0,0,1.0");
///     assert_eq!(transport.sent(), vec!["*IDN?".to_string()]);
/// });
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a mock with no scripted replies
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `command` with `reply`.
    pub fn with_reply(self, command: &str, reply: &str) -> Self {
        self.set_reply(command, reply);
        self
    }

    /// Always answer `command` with `reply` (replaces an earlier sticky reply).
    pub fn set_reply(&self, command: &str, reply: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.sticky.insert(command.to_string(), reply.to_string());
        }
    }

    /// Answer `command` once with `reply`; queued replies win over sticky ones.
    pub fn push_reply(&self, command: &str, reply: &str) {
        if let Ok(mut state) = self.state.lock() {
            state
                .replies
                .entry(command.to_string())
                .or_default()
                .push_back(reply.to_string());
        }
    }

    /// Commands sent so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.log.clone())
            .unwrap_or_default()
    }

    /// Forget the call log.
    pub fn clear_sent(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.log.clear();
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, command: &str) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("Mock transport lock poisoned"))?;
        state.log.push(command.to_string());
        Ok(())
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("Mock transport lock poisoned"))?;
        state.log.push(command.to_string());

        if let Some(reply) = state.replies.get_mut(command).and_then(VecDeque::pop_front) {
            return Ok(reply);
        }
        state
            .sticky
            .get(command)
            .cloned()
            .ok_or_else(|| anyhow!("Mock transport has no reply for '{}'", command))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
