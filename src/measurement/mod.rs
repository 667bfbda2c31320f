//! Measurement primitives.
//!
//! - [`MeasurementSession::move_to`]: ramp a variable to a setpoint at a given rate
//! - [`MeasurementSession::measure`]: read a [`MeasurementList`]
//! - [`MeasurementSession::sweep`]: step a variable and write a data file
//! - [`MeasurementSession::record`]: measure at fixed intervals into a data file
//!
//! All primitives check the session's [`RunControl`] between steps.

pub mod control;
pub mod curve;
pub mod list;
pub mod session;

pub use control::RunControl;
pub use list::{validate_label, Channel, MeasurementList};
pub use session::{MeasurementSession, SweepSpec, Timing, DEFAULT_SWEEP_LABEL};
