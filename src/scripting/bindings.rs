//! Instrument and primitive bindings for Rhai scripts
//!
//! # Async→Sync Bridge
//!
//! Rhai functions are synchronous; instruments and primitives are async. Every
//! binding runs its future with `block_in_place` + `Handle::block_on`, so scripts
//! must be evaluated on a multi-thread tokio runtime.
//!
//! # Script Example
//! ```rhai
//! let smu = instrument("k2400");
//! let lockin = instrument("sr830");
//!
//! let list = meas_list();
//! list.add("I", smu, "meas_i");
//! list.add("X", lockin, "x");
//!
//! move_to(smu, "dcv", 0.0, 0.5);
//! let file = sweep(smu, "dcv", 0.0, 1.0, 0.5, 101, "iv.dat", "Vbias", list);
//! print("written to " + file);
//! ```

use crate::error::{AppResult, LabError};
use crate::instrument::{Instrument, InstrumentRegistry};
use crate::measurement::{MeasurementList, MeasurementSession, SweepSpec};
use rhai::{Array, Dynamic, Engine, EvalAltResult, Position};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::block_in_place;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Everything the bindings need: opened instruments and the measurement session.
#[derive(Clone)]
pub struct ScriptContext {
    /// Instruments from the configuration
    pub registry: Arc<InstrumentRegistry>,
    /// Primitive settings and stop flag
    pub session: MeasurementSession,
}

/// Handle to an instrument that can be used in Rhai scripts
///
/// ```rhai
/// let dmm = instrument("k2000");
/// let v = dmm.read("dcv");
/// ```
#[derive(Clone)]
pub struct InstrumentHandle {
    /// Driver
    pub instrument: Arc<dyn Instrument>,
}

/// Measurement list being built by a script
///
/// ```rhai
/// let list = meas_list();
/// list.add("I", smu, "meas_i");
/// ```
#[derive(Clone, Default)]
pub struct ListHandle {
    /// Channels added so far
    pub list: MeasurementList,
}

fn script_error(err: impl std::fmt::Display) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        err.to_string().into(),
        Position::NONE,
    ))
}

fn block_on<T>(future: impl Future<Output = AppResult<T>>) -> ScriptResult<T> {
    let handle = Handle::try_current().map_err(script_error)?;
    block_in_place(|| handle.block_on(future)).map_err(script_error)
}

/// Numeric argument; scripts may pass `1` or `1.0`.
fn number(value: &Dynamic, name: &str) -> ScriptResult<f64> {
    if let Ok(float) = value.as_float() {
        return Ok(float);
    }
    if let Ok(int) = value.as_int() {
        return Ok(int as f64);
    }
    Err(script_error(format!(
        "{} must be a number, got {}",
        name,
        value.type_name()
    )))
}

/// Non-negative whole number argument (point counts).
fn count(value: &Dynamic, name: &str) -> ScriptResult<usize> {
    let number = number(value, name)?;
    if number < 0.0 || number.fract() != 0.0 || !number.is_finite() {
        return Err(script_error(format!(
            "{} must be a non-negative whole number, got {}",
            name, number
        )));
    }
    Ok(number as usize)
}

/// Register instrument handles, measurement lists and primitives.
///
/// Functions:
/// - `instrument(id)`
/// - `dev.read(var)`, `dev.write(var, value)`, `dev.id()`, `dev.model()`, `dev.variables()`
/// - `meas_list()`, `list.add(label, dev, var)`, `list.len()`, `list.labels()`
/// - `move_to(dev, var, setpoint, rate)`
/// - `measure(list)`
/// - `sweep(dev, var, start, stop, rate, npoints, file, [label,] list)`
/// - `record(list, npoints, interval_s, file)`
/// - `sleep(seconds)`
pub fn register(engine: &mut Engine, context: ScriptContext) {
    engine.register_type_with_name::<InstrumentHandle>("Instrument");
    engine.register_type_with_name::<ListHandle>("MeasList");

    // =========================================================================
    // Instruments
    // =========================================================================

    let registry = context.registry.clone();
    engine.register_fn("instrument", move |id: &str| -> ScriptResult<InstrumentHandle> {
        let instrument = registry.get(id).map_err(script_error)?;
        Ok(InstrumentHandle { instrument })
    });

    engine.register_fn("read", |dev: &mut InstrumentHandle, variable: &str| -> ScriptResult<f64> {
        let instrument = dev.instrument.clone();
        block_on(async move {
            instrument
                .read(variable)
                .await
                .map_err(|e| LabError::from_instrument(instrument.id(), e))
        })
    });

    engine.register_fn(
        "write",
        |dev: &mut InstrumentHandle, variable: &str, value: Dynamic| -> ScriptResult<()> {
            let value = number(&value, "value")?;
            let instrument = dev.instrument.clone();
            instrument.ensure_writable(variable).map_err(script_error)?;
            block_on(async move {
                instrument
                    .write(variable, value)
                    .await
                    .map_err(|e| LabError::from_instrument(instrument.id(), e))
            })
        },
    );

    engine.register_fn("id", |dev: &mut InstrumentHandle| dev.instrument.id().to_string());
    engine.register_fn("model", |dev: &mut InstrumentHandle| {
        dev.instrument.model().to_string()
    });
    engine.register_fn("variables", |dev: &mut InstrumentHandle| -> Array {
        dev.instrument
            .variables()
            .into_iter()
            .map(|v| Dynamic::from(v.name))
            .collect()
    });
    engine.register_fn("to_string", |dev: &mut InstrumentHandle| {
        format!("{} ({})", dev.instrument.id(), dev.instrument.model())
    });

    // =========================================================================
    // Measurement lists
    // =========================================================================

    engine.register_fn("meas_list", ListHandle::default);

    engine.register_fn(
        "add",
        |list: &mut ListHandle, label: &str, dev: InstrumentHandle, variable: &str| -> ScriptResult<()> {
            list.list
                .add(label, dev.instrument, variable)
                .map_err(script_error)
        },
    );
    engine.register_fn("len", |list: &mut ListHandle| list.list.len() as i64);
    engine.register_fn("labels", |list: &mut ListHandle| -> Array {
        list.list.labels().into_iter().map(Dynamic::from).collect()
    });

    // =========================================================================
    // Primitives
    // =========================================================================

    let session = context.session.clone();
    engine.register_fn(
        "move_to",
        move |dev: InstrumentHandle, variable: &str, setpoint: Dynamic, rate: Dynamic| -> ScriptResult<()> {
            let setpoint = number(&setpoint, "setpoint")?;
            let rate = number(&rate, "rate")?;
            let session = session.clone();
            block_on(async move {
                session
                    .move_to(dev.instrument.as_ref(), variable, setpoint, rate)
                    .await
            })
        },
    );

    let session = context.session.clone();
    engine.register_fn("measure", move |list: ListHandle| -> ScriptResult<Array> {
        let session = session.clone();
        let values = block_on(async move { session.measure(&list.list).await })?;
        Ok(values.into_iter().map(Dynamic::from_float).collect())
    });

    let session = context.session.clone();
    let sweep = move |dev: InstrumentHandle,
                      variable: &str,
                      start: Dynamic,
                      stop: Dynamic,
                      rate: Dynamic,
                      npoints: Dynamic,
                      file: &str,
                      label: Option<&str>,
                      list: ListHandle|
          -> ScriptResult<String> {
        let mut spec = SweepSpec::new(
            dev.instrument,
            variable,
            number(&start, "start")?,
            number(&stop, "stop")?,
            number(&rate, "rate")?,
            count(&npoints, "npoints")?,
        );
        if let Some(label) = label {
            spec = spec.with_label(label);
        }
        let session = session.clone();
        let path = block_on(async move { session.sweep(&spec, &list.list, Path::new(file)).await })?;
        Ok(path.display().to_string())
    };
    let with_label = sweep.clone();
    engine.register_fn(
        "sweep",
        move |dev: InstrumentHandle,
              variable: &str,
              start: Dynamic,
              stop: Dynamic,
              rate: Dynamic,
              npoints: Dynamic,
              file: &str,
              label: &str,
              list: ListHandle| {
            with_label(dev, variable, start, stop, rate, npoints, file, Some(label), list)
        },
    );
    engine.register_fn(
        "sweep",
        move |dev: InstrumentHandle,
              variable: &str,
              start: Dynamic,
              stop: Dynamic,
              rate: Dynamic,
              npoints: Dynamic,
              file: &str,
              list: ListHandle| {
            sweep(dev, variable, start, stop, rate, npoints, file, None, list)
        },
    );

    let session = context.session.clone();
    engine.register_fn(
        "record",
        move |list: ListHandle, npoints: Dynamic, interval: Dynamic, file: &str| -> ScriptResult<String> {
            let npoints = count(&npoints, "npoints")?;
            let interval = number(&interval, "interval")?;
            let interval = Duration::try_from_secs_f64(interval).map_err(script_error)?;
            let session = session.clone();
            let path = block_on(async move {
                session
                    .record(&list.list, npoints, interval, Path::new(file))
                    .await
            })?;
            Ok(path.display().to_string())
        },
    );

    // sleep(0.5) - interruptible by the session's stop flag
    let session = context.session;
    engine.register_fn("sleep", move |seconds: Dynamic| -> ScriptResult<()> {
        let seconds = number(&seconds, "seconds")?;
        let duration = Duration::try_from_secs_f64(seconds).map_err(script_error)?;
        let control = session.control().clone();
        block_on(async move { control.sleep(duration).await })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::instrument::SimulatedInstrument;
    use crate::measurement::Timing;
    use rhai::Scope;

    fn context(dir: &Path) -> (ScriptContext, Arc<SimulatedInstrument>) {
        let sim = Arc::new(SimulatedInstrument::new("sim"));
        let mut registry = InstrumentRegistry::new();
        registry.insert(sim.clone());
        let timing = Timing {
            move_step: Duration::from_millis(1),
            settle_wait: Duration::from_millis(1),
            settle_timeout: Duration::from_secs(1),
            decimals: 3,
        };
        let storage = StorageConfig {
            data_dir: dir.to_path_buf(),
            write_metadata: false,
        };
        let context = ScriptContext {
            registry: Arc::new(registry),
            session: MeasurementSession::new(timing, storage),
        };
        (context, sim)
    }

    fn engine(context: ScriptContext) -> Engine {
        let mut engine = Engine::new();
        register(&mut engine, context);
        engine
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn read_and_write_accept_ints_and_floats() {
        let dir = tempfile::tempdir().unwrap();
        let (context, sim) = context(dir.path());
        let engine = engine(context);

        let value = engine
            .eval::<f64>(
                r#"
                let dev = instrument("sim");
                dev.write("dcv", 2);
                dev.write("gate", 0.5);
                dev.read("dcv") + dev.read("gate")
                "#,
            )
            .unwrap();
        assert_eq!(value, 2.5);
        assert_eq!(sim.target("dcv").await, Some(2.0));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn errors_become_runtime_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (context, _) = context(dir.path());
        let engine = engine(context);

        let err = engine.eval::<()>(r#"instrument("nope")"#).unwrap_err();
        assert!(err.to_string().contains("Unknown instrument 'nope'"));

        let err = engine
            .eval::<()>(r#"instrument("sim").write("current", 1.0)"#)
            .unwrap_err();
        assert!(err.to_string().contains("cannot be written"));

        let err = engine
            .eval::<()>(r#"move_to(instrument("sim"), "dcv", 1.0, 0)"#)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid rate"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn measure_returns_values_in_list_order() {
        let dir = tempfile::tempdir().unwrap();
        let (context, sim) = context(dir.path());
        sim.preset("dcv", 1.0).await.unwrap();
        let engine = engine(context);

        let values = engine
            .eval::<Array>(
                r#"
                let sim = instrument("sim");
                let list = meas_list();
                list.add("V", sim, "dcv");
                list.add("I", sim, "current");
                measure(list)
                "#,
            )
            .unwrap();
        let values: Vec<f64> = values.into_iter().map(|v| v.as_float().unwrap()).collect();
        assert_eq!(values, vec![1.0, 0.001]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn duplicate_labels_fail() {
        let dir = tempfile::tempdir().unwrap();
        let (context, _) = context(dir.path());
        let engine = engine(context);

        let err = engine
            .eval::<()>(
                r#"
                let list = meas_list();
                list.add("I", instrument("sim"), "current");
                list.add("I", instrument("sim"), "dcv");
                "#,
            )
            .unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sweep_with_and_without_label() {
        let dir = tempfile::tempdir().unwrap();
        let (context, _) = context(dir.path());
        let engine = engine(context);
        let mut scope = Scope::new();

        let first = engine
            .eval_with_scope::<String>(
                &mut scope,
                r#"
                let sim = instrument("sim");
                let list = meas_list();
                list.add("I", sim, "current");
                sweep(sim, "dcv", 0, 1, 100, 3, "iv.dat", "Vbias", list)
                "#,
            )
            .unwrap();
        let second = engine
            .eval_with_scope::<String>(&mut scope, r#"sweep(sim, "dcv", 1.0, 0.0, 100.0, 2, "iv.dat", list)"#)
            .unwrap();

        assert!(first.ends_with("iv.dat"));
        assert!(second.ends_with("iv_1.dat"));
        let content = std::fs::read_to_string(&first).unwrap();
        assert!(content.starts_with("Vbias, I\n"));
        let content = std::fs::read_to_string(&second).unwrap();
        assert!(content.starts_with("sweepdev, I\n"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_fractional_point_count() {
        let dir = tempfile::tempdir().unwrap();
        let (context, _) = context(dir.path());
        let engine = engine(context);

        let err = engine
            .eval::<()>(r#"record(meas_list(), 2.5, 0.01, "t.dat")"#)
            .unwrap_err();
        assert!(err.to_string().contains("npoints"));
    }

    #[test]
    fn blocking_outside_runtime_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (context, _) = context(dir.path());
        let engine = engine(context);
        assert!(engine.eval::<f64>(r#"instrument("sim").read("dcv")"#).is_err());
    }
}
