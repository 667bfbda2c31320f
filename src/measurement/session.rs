//! Move, measure, sweep and record.
//!
//! A [`MeasurementSession`] carries the timing and storage settings shared by all
//! primitives of one experiment, plus the [`RunControl`] that can stop them.
//!
//! # Move
//! A move ramps a variable from its current reading to a setpoint at `rate`
//! units per second. The ramp is cut into one step per `move_step`; after every
//! write the variable is read back until it agrees with the step, rounded to
//! `decimals` places, so a slow source never falls behind the curve.
//!
//! # Sweep
//! A sweep moves to `start`, then visits `npoints` evenly spaced setpoints up to
//! `stop`. At each point it waits `settle_wait`, reads the measurement list and
//! appends a row to the data file.

use crate::config::{LabConfig, MeasurementConfig, StorageConfig};
use crate::data::metadata::RunMetadataBuilder;
use crate::data::{DataFileWriter, RunMetadata};
use crate::error::{AppResult, LabError};
use crate::instrument::Instrument;
use crate::measurement::control::RunControl;
use crate::measurement::curve::{agrees, linspace_iter, move_curve, round_to, step_count};
use crate::measurement::list::{validate_label, MeasurementList};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default first column of a sweep file
pub const DEFAULT_SWEEP_LABEL: &str = "sweepdev";

/// Timing of the primitives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Interval between move steps and between settle polls
    pub move_step: Duration,
    /// Wait between reaching a sweep point and measuring
    pub settle_wait: Duration,
    /// Maximum time one move step may take to settle
    pub settle_timeout: Duration,
    /// Decimals for rounding curves and settle comparison
    pub decimals: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self::from(&MeasurementConfig::default())
    }
}

impl From<&MeasurementConfig> for Timing {
    fn from(config: &MeasurementConfig) -> Self {
        Self {
            move_step: config.move_step,
            settle_wait: config.settle_wait,
            settle_timeout: config.settle_timeout,
            decimals: config.decimals,
        }
    }
}

/// Parameters of a sweep.
#[derive(Clone)]
pub struct SweepSpec {
    /// Instrument to sweep
    pub instrument: Arc<dyn Instrument>,
    /// Variable to sweep; must be readable and writable
    pub variable: String,
    /// First setpoint
    pub start: f64,
    /// Last setpoint
    pub stop: f64,
    /// Ramp rate between setpoints (units per second)
    pub rate: f64,
    /// Number of measurement points
    pub npoints: usize,
    /// Header of the setpoint column
    pub label: String,
}

impl SweepSpec {
    /// Create a sweep labelled [`DEFAULT_SWEEP_LABEL`]
    pub fn new(
        instrument: Arc<dyn Instrument>,
        variable: &str,
        start: f64,
        stop: f64,
        rate: f64,
        npoints: usize,
    ) -> Self {
        Self {
            instrument,
            variable: variable.to_string(),
            start,
            stop,
            rate,
            npoints,
            label: DEFAULT_SWEEP_LABEL.to_string(),
        }
    }

    /// Set the header of the setpoint column
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }
}

/// Runs primitives with shared settings.
#[derive(Debug, Clone)]
pub struct MeasurementSession {
    timing: Timing,
    storage: StorageConfig,
    control: RunControl,
}

impl MeasurementSession {
    pub fn new(timing: Timing, storage: StorageConfig) -> Self {
        Self {
            timing,
            storage,
            control: RunControl::new(),
        }
    }

    /// Session using the `[measurement]` and `[storage]` sections
    pub fn from_config(config: &LabConfig) -> Self {
        Self::new(Timing::from(&config.measurement), config.storage.clone())
    }

    /// Share an existing stop flag
    pub fn with_control(mut self, control: RunControl) -> Self {
        self.control = control;
        self
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// Ramp `variable` of `instrument` to `setpoint` at `rate` units per second.
    ///
    /// Returns without writing when the setpoint is less than half a step away,
    /// and fails before writing when the ramp would take too many steps.
    pub async fn move_to(
        &self,
        instrument: &dyn Instrument,
        variable: &str,
        setpoint: f64,
        rate: f64,
    ) -> AppResult<()> {
        check_movable(instrument, variable, rate)?;
        if !setpoint.is_finite() {
            return Err(LabError::InvalidSetpoint(setpoint));
        }
        self.control.check()?;

        let current = read(instrument, variable).await?;
        let steps = step_count(current, setpoint, rate, self.timing.move_step)?;
        if steps == 0 {
            debug!(device = instrument.id(), variable, current, setpoint, "Already at setpoint");
            return Ok(());
        }
        debug!(
            device = instrument.id(),
            variable,
            from = current,
            to = setpoint,
            steps,
            "Moving"
        );

        for point in move_curve(current, setpoint, steps, self.timing.decimals) {
            self.control.check()?;
            write(instrument, variable, point).await?;
            self.settle(instrument, variable, point).await?;
        }
        Ok(())
    }

    /// Read every channel of `list`, in order.
    pub async fn measure(&self, list: &MeasurementList) -> AppResult<Vec<f64>> {
        let mut values = Vec::with_capacity(list.len());
        for channel in list.channels() {
            values.push(read(channel.instrument.as_ref(), &channel.variable).await?);
        }
        Ok(values)
    }

    /// Sweep and write one row per point to a new data file.
    ///
    /// Returns the path written, which differs from `filename` when that file
    /// already existed or was relative.
    pub async fn sweep(
        &self,
        spec: &SweepSpec,
        list: &MeasurementList,
        filename: &Path,
    ) -> AppResult<PathBuf> {
        if spec.npoints == 0 {
            return Err(LabError::InvalidPointCount);
        }
        validate_label(&spec.label)?;
        let instrument = spec.instrument.as_ref();
        check_movable(instrument, &spec.variable, spec.rate)?;
        for value in [spec.start, spec.stop] {
            if !value.is_finite() {
                return Err(LabError::InvalidSetpoint(value));
            }
        }

        let mut header = vec![spec.label.clone()];
        header.extend(list.labels());
        let metadata = describe(list, RunMetadata::builder("sweep"))
            .parameter("device", instrument.id())
            .parameter("variable", spec.variable.as_str())
            .parameter("start", spec.start)
            .parameter("stop", spec.stop)
            .parameter("rate", spec.rate)
            .parameter("npoints", spec.npoints)
            .parameter("settle_wait_s", self.timing.settle_wait.as_secs_f64())
            .build();
        let mut file = DataFileWriter::create(filename, &self.storage, &header, Some(&metadata))?;
        info!(path = %file.path().display(), "Sweep started");

        self.move_to(instrument, &spec.variable, spec.start, spec.rate)
            .await?;

        let decimals = self.timing.decimals;
        let curve =
            linspace_iter(spec.start, spec.stop, spec.npoints).map(|v| round_to(v, decimals));
        for point in curve {
            info!("Sweeping to {}", point);
            self.move_to(instrument, &spec.variable, point, spec.rate)
                .await?;
            self.control.sleep(self.timing.settle_wait).await?;

            let mut row = vec![point];
            row.extend(self.measure(list).await?);
            file.append(&row)?;
        }

        info!(path = %file.path().display(), rows = file.rows(), "Sweep finished");
        Ok(file.path().to_path_buf())
    }

    /// Measure `npoints` times, `interval` apart, into a new data file.
    ///
    /// The first column is the time in seconds since the first measurement.
    pub async fn record(
        &self,
        list: &MeasurementList,
        npoints: usize,
        interval: Duration,
        filename: &Path,
    ) -> AppResult<PathBuf> {
        if npoints == 0 {
            return Err(LabError::InvalidPointCount);
        }

        let mut header = vec!["time".to_string()];
        header.extend(list.labels());
        let metadata = describe(list, RunMetadata::builder("record"))
            .parameter("npoints", npoints)
            .parameter("interval_s", interval.as_secs_f64())
            .build();
        let mut file = DataFileWriter::create(filename, &self.storage, &header, Some(&metadata))?;
        info!(path = %file.path().display(), npoints, "Recording started");

        let started = Instant::now();
        for index in 0..npoints {
            self.control.check()?;
            let elapsed = round_to(started.elapsed().as_secs_f64(), self.timing.decimals);
            let mut row = vec![elapsed];
            row.extend(self.measure(list).await?);
            file.append(&row)?;

            if index + 1 < npoints {
                self.control.sleep(interval).await?;
            }
        }

        info!(path = %file.path().display(), "Recording finished");
        Ok(file.path().to_path_buf())
    }

    async fn settle(&self, instrument: &dyn Instrument, variable: &str, target: f64) -> AppResult<()> {
        let started = Instant::now();
        loop {
            self.control.sleep(self.timing.move_step).await?;
            let reading = read(instrument, variable).await?;
            if agrees(reading, target, self.timing.decimals) {
                return Ok(());
            }
            if started.elapsed() >= self.timing.settle_timeout {
                return Err(LabError::SettleTimeout {
                    device: instrument.id().to_string(),
                    variable: variable.to_string(),
                    target,
                    last: reading,
                    timeout: self.timing.settle_timeout,
                });
            }
        }
    }
}

fn check_movable(instrument: &dyn Instrument, variable: &str, rate: f64) -> AppResult<()> {
    instrument.ensure_readable(variable)?;
    instrument.ensure_writable(variable)?;
    if !(rate.is_finite() && rate > 0.0) {
        return Err(LabError::InvalidRate(rate));
    }
    Ok(())
}

fn describe(list: &MeasurementList, builder: RunMetadataBuilder) -> RunMetadataBuilder {
    list.channels().iter().fold(builder, |builder, channel| {
        builder.channel(&channel.label, channel.instrument.id(), &channel.variable)
    })
}

async fn read(instrument: &dyn Instrument, variable: &str) -> AppResult<f64> {
    instrument
        .read(variable)
        .await
        .map_err(|e| LabError::from_instrument(instrument.id(), e))
}

async fn write(instrument: &dyn Instrument, variable: &str, value: f64) -> AppResult<()> {
    instrument
        .write(variable, value)
        .await
        .map_err(|e| LabError::from_instrument(instrument.id(), e))
}
