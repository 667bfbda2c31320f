//! Experiment scripts.
//!
//! Experiments are Rhai scripts: one file per measurement, copied from a template
//! and edited. [`ScriptHost`] evaluates them with the instruments of the
//! configuration and the move/measure/sweep/record primitives registered (see
//! [`bindings::register`] for the full function list).
//!
//! # Example
//!
//! ```rhai
//! let smu = instrument("smu");
//! let list = meas_list();
//! list.add("I", smu, "meas_i");
//!
//! move_to(smu, "dcv", 0.0, 0.5);
//! sweep(smu, "dcv", 0.0, 1.0, 0.5, 101, "iv.dat", list);
//! move_to(smu, "dcv", 0.0, 0.5);
//! ```

pub mod bindings;
pub mod engine;

pub use bindings::{InstrumentHandle, ListHandle, ScriptContext};
pub use engine::ScriptHost;
