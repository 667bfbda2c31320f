//! Stop flag shared between a running experiment and whoever may abort it.

use crate::error::{AppResult, LabError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Longest uninterrupted sleep; stop requests are noticed at least this often.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// A shared flag for stopping a measurement between steps.
///
/// Clones share the same flag, so a Ctrl+C handler can hold one clone while the
/// sweep holds another.
#[derive(Clone, Default)]
pub struct RunControl {
    flag: Arc<AtomicBool>,
    reason: Arc<RwLock<Option<String>>>,
}

impl RunControl {
    /// Create a new, running control
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.
    pub fn stop(&self, reason: impl Into<String>) {
        self.flag.store(true, Ordering::SeqCst);
        if let Ok(mut r) = self.reason.write() {
            *r = Some(reason.into());
        }
    }

    /// Check if a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Reason given with the stop request
    pub fn reason(&self) -> Option<String> {
        self.reason.read().ok().and_then(|r| r.clone())
    }

    /// Clear a previous stop request.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
        if let Ok(mut r) = self.reason.write() {
            *r = None;
        }
    }

    /// `Err(Aborted)` once a stop was requested
    pub fn check(&self) -> AppResult<()> {
        if self.is_stopped() {
            Err(LabError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, returning `Aborted` early if a stop is requested.
    ///
    /// Fails with `InvalidDuration` when the deadline is not representable.
    pub async fn sleep(&self, duration: Duration) -> AppResult<()> {
        let deadline = Instant::now()
            .checked_add(duration)
            .ok_or(LabError::InvalidDuration(duration))?;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            tokio::time::sleep((deadline - now).min(POLL_SLICE)).await;
        }
    }
}

impl std::fmt::Debug for RunControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunControl")
            .field("stopped", &self.is_stopped())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let control = RunControl::new();
        let handler = control.clone();
        assert!(control.check().is_ok());

        handler.stop("Ctrl+C");
        assert!(control.is_stopped());
        assert_eq!(control.reason().as_deref(), Some("Ctrl+C"));
        assert!(matches!(control.check(), Err(LabError::Aborted)));

        control.reset();
        assert!(!handler.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_is_interrupted_by_stop() {
        let control = RunControl::new();
        let stopper = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            stopper.stop("test");
        });

        let started = Instant::now();
        let result = control.sleep(Duration::from_secs(60)).await;
        assert!(matches!(result, Err(LabError::Aborted)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_runs_to_completion() {
        let control = RunControl::new();
        let started = Instant::now();
        control.sleep(Duration::from_millis(130)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(130));
    }

    #[tokio::test]
    async fn sleep_rejects_unrepresentable_deadline() {
        let control = RunControl::new();
        assert!(matches!(
            control.sleep(Duration::MAX).await,
            Err(LabError::InvalidDuration(d)) if d == Duration::MAX
        ));
    }
}
