//! # QTMlab
//!
//! A toolbox for transport measurements: instrument drivers with a uniform
//! read/write surface, move/measure/sweep primitives writing plain-text data
//! files, Rhai experiment scripts, and a live plot tool that follows a data
//! file while it is written.
//!
//! ## Crate Structure
//!
//! - **`adapters`**: [`adapters::Transport`] trait plus serial, TCP, VISA and mock transports.
//! - **`config`**: [`config::LabConfig`], loaded with figment from `config/qtmlab.toml` and
//!   `QTMLAB_` environment variables.
//! - **`data`**: data file writer (collision-safe names, metadata comments, flushed rows) and
//!   the incremental [`data::DataTail`] reader.
//! - **`error`**: the [`error::LabError`] enum shared by measurement, storage and scripting code.
//! - **`instrument`**: the [`instrument::Instrument`] trait, command-table drivers (Keithley 2400,
//!   Keithley 2000, SR830, ITC503, config-defined), a simulated device and the registry.
//! - **`logging`**: tracing-subscriber setup.
//! - **`measurement`**: `move_to`, `measure`, `sweep` and `record`.
//! - **`plot`**: the egui plot tool behind the `qtmplot` binary.
//! - **`scripting`**: Rhai host and bindings behind `qtmlab run`.

pub mod adapters;
pub mod config;
pub mod data;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod measurement;
pub mod plot;
pub mod scripting;
