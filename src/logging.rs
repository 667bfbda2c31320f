//! Logging setup shared by `qtmlab` and `qtmlab-plot`.
//!
//! Output goes through `tracing-subscriber` in pretty, compact or JSON form.
//! `RUST_LOG` overrides the level from `[application]`, and initialising
//! twice is harmless, so tests may call [`init`] freely.
//!
//! # Example
//! ```no_run
//! use qtmlab::{config::LabConfig, logging};
//! use tracing::info;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LabConfig::load()?;
//! logging::init_from_config(&config)?;
//! info!(instruments = config.instruments.len(), "Configuration loaded");
//! # Ok(())
//! # }
//! ```

use crate::config::LabConfig;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line, coloured; for watching a run in a terminal
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid log format '{}'. Must be one of: pretty, compact, json",
                s
            )),
        }
    }
}

/// Subscriber settings
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub level: Level,
    pub format: OutputFormat,
    /// Print the source file and line of each event
    pub with_file_and_line: bool,
    /// Print the name of the emitting thread
    pub with_thread_names: bool,
    /// Colour output; JSON is never coloured
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_file_and_line: false,
            with_thread_names: false,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Settings from the `[application]` section
    pub fn from_lab_config(config: &LabConfig) -> Result<Self, String> {
        let app = &config.application;
        Ok(Self {
            level: parse_log_level(&app.log_level)?,
            format: app.log_format.parse()?,
            with_file_and_line: app.log_source_location,
            with_thread_names: app.log_thread_names,
            ..Default::default()
        })
    }

    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Install the global subscriber described by `[application]`.
pub fn init_from_config(config: &LabConfig) -> Result<(), String> {
    init(TracingConfig::from_lab_config(config)?)
}

/// Install the global subscriber.
///
/// Succeeds without changes when a subscriber is already installed.
pub fn init(config: TracingConfig) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(config.level).into())
    });

    let base = fmt::layer()
        .with_file(config.with_file_and_line)
        .with_line_number(config.with_file_and_line)
        .with_thread_names(config.with_thread_names)
        .with_ansi(config.with_ansi && config.format != OutputFormat::Json);
    let layer = match config.format {
        OutputFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        OutputFormat::Compact => base.compact().with_filter(filter).boxed(),
        OutputFormat::Json => base.json().with_filter(filter).boxed(),
    };

    match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => Ok(()),
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(e) => Err(format!("Failed to initialize tracing: {}", e)),
    }
}

fn parse_log_level(level: &str) -> Result<Level, String> {
    Level::from_str(level).map_err(|_| {
        format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_log_level("trace"), Ok(Level::TRACE));
        assert_eq!(parse_log_level("WARN"), Ok(Level::WARN));
        assert_eq!(parse_log_level("Error"), Ok(Level::ERROR));
        assert!(parse_log_level("loud").is_err());

        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn application_section_drives_subscriber_settings() {
        let mut config = LabConfig::default();
        config.application.log_level = "debug".to_string();
        config.application.log_format = "json".to_string();

        let tracing_config = TracingConfig::from_lab_config(&config).unwrap();
        assert_eq!(tracing_config.level, Level::DEBUG);
        assert_eq!(tracing_config.format, OutputFormat::Json);
        assert!(!tracing_config.with_file_and_line);
        assert!(!tracing_config.with_thread_names);

        config.application.log_source_location = true;
        config.application.log_thread_names = true;
        let tracing_config = TracingConfig::from_lab_config(&config).unwrap();
        assert!(tracing_config.with_file_and_line);
        assert!(tracing_config.with_thread_names);
    }

    #[test]
    fn init_twice_is_harmless() {
        assert!(init(TracingConfig::new(Level::WARN).with_ansi(false)).is_ok());
        assert!(init(TracingConfig::new(Level::WARN).with_format(OutputFormat::Json)).is_ok());
    }
}
