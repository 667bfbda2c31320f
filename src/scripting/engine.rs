//! Rhai script host for experiment scripts.
//!
//! An experiment is a `.rhai` file copied from a template and edited for the
//! measurement at hand. The host opens nothing by itself: instruments come from
//! the [`InstrumentRegistry`] built from the configuration, and all primitives
//! share one [`MeasurementSession`].
//!
//! # Safety Limits
//!
//! `scripting.max_operations` bounds the number of Rhai operations (0 disables
//! the limit). Independently, a stop request on the session's run control ends
//! the script at the next operation, so Ctrl+C also interrupts pure script loops.
//!
//! # Example
//!
//! ```rust,ignore
//! let host = ScriptHost::new(registry, session, &config.scripting);
//! host.run_file(Path::new("scripts/iv_curve.rhai"))?;
//! ```

use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{LabConfig, ScriptingConfig};
use crate::error::{AppResult, LabError};
use crate::instrument::InstrumentRegistry;
use crate::measurement::MeasurementSession;
use crate::scripting::bindings::{self, ScriptContext};

/// Rhai engine with instrument and primitive bindings registered.
pub struct ScriptHost {
    engine: Engine,
    session: MeasurementSession,
}

impl ScriptHost {
    /// Create a host over opened instruments.
    pub fn new(
        registry: Arc<InstrumentRegistry>,
        session: MeasurementSession,
        scripting: &ScriptingConfig,
    ) -> Self {
        let mut engine = Engine::new();

        let limit = scripting.max_operations;
        let control = session.control().clone();
        engine.on_progress(move |count| {
            if control.is_stopped() {
                Some("Measurement aborted".into())
            } else if limit > 0 && count > limit {
                Some(format!("Safety limit exceeded: maximum {} operations", limit).into())
            } else {
                None
            }
        });
        engine.on_print(|text| info!(target: "script", "{}", text));
        engine.on_debug(|text, source, position| {
            info!(target: "script", source = source.unwrap_or(""), %position, "{}", text)
        });

        bindings::register(
            &mut engine,
            ScriptContext {
                registry,
                session: session.clone(),
            },
        );

        Self { engine, session }
    }

    /// Create a host from the configuration sections it needs.
    pub fn from_config(config: &LabConfig, registry: Arc<InstrumentRegistry>) -> Self {
        Self::new(
            registry,
            MeasurementSession::from_config(config),
            &config.scripting,
        )
    }

    /// The session shared by all primitives
    pub fn session(&self) -> &MeasurementSession {
        &self.session
    }

    /// Execute a Rhai script and return its last value.
    ///
    /// Must be called from a multi-thread tokio runtime (instrument calls block
    /// in place).
    pub fn run_script(&self, script: &str) -> Result<Dynamic, Box<EvalAltResult>> {
        let mut scope = Scope::new();
        self.engine.eval_with_scope(&mut scope, script)
    }

    /// Load and run an experiment script file.
    pub fn run_file(&self, path: &Path) -> AppResult<Dynamic> {
        let script = std::fs::read_to_string(path)?;
        info!(script = %path.display(), "Running experiment script");
        self.run_script(&script).map_err(|e| {
            if self.session.control().is_stopped() {
                warn!(script = %path.display(), "Script stopped");
                LabError::Aborted
            } else {
                LabError::Script(format!("{}: {}", path.display(), e))
            }
        })
    }

    /// Validate script syntax without executing it.
    pub fn validate_script(&self, script: &str) -> Result<(), Box<EvalAltResult>> {
        self.engine.compile(script)?;
        Ok(())
    }

    /// Get mutable access to the underlying Rhai engine.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::measurement::Timing;

    fn host(max_operations: u64) -> ScriptHost {
        let session = MeasurementSession::new(Timing::default(), StorageConfig::default());
        ScriptHost::new(
            Arc::new(InstrumentRegistry::new()),
            session,
            &ScriptingConfig { max_operations },
        )
    }

    #[test]
    fn evaluates_plain_scripts() {
        let result = host(0).run_script("let x = 10; x * 2").unwrap();
        assert_eq!(result.cast::<i64>(), 20);
    }

    #[test]
    fn operation_limit_stops_endless_loops() {
        let err = host(1_000).run_script("loop { }").unwrap_err();
        match *err {
            EvalAltResult::ErrorTerminated(token, _) => {
                assert!(token.to_string().contains("Safety limit"))
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn stop_request_ends_script() {
        let host = host(0);
        host.session().control().stop("test");
        let err = host.run_script("let i = 0; while true { i += 1; }").unwrap_err();
        match *err {
            EvalAltResult::ErrorTerminated(token, _) => {
                assert_eq!(token.to_string(), "Measurement aborted")
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn validates_syntax() {
        let host = host(0);
        assert!(host.validate_script("let x = 1 + 2;").is_ok());
        assert!(host.validate_script("let x = 1 +").is_err());
    }

    #[test]
    fn run_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.rhai");
        std::fs::write(&path, "undefined_function()").unwrap();

        match host(0).run_file(&path) {
            Err(LabError::Script(message)) => assert!(message.contains("broken.rhai")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        assert!(matches!(
            host(0).run_file(&dir.path().join("missing.rhai")),
            Err(LabError::Io(_))
        ));
    }

    #[test]
    fn run_file_maps_stop_to_aborted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.rhai");
        std::fs::write(&path, "loop { }").unwrap();

        let host = host(0);
        host.session().control().stop("test");
        assert!(matches!(host.run_file(&path), Err(LabError::Aborted)));
    }
}
