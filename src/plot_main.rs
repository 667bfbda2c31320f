//! QTMlab plot tool
//!
//! ```bash
//! qtmplot data/iv.dat            # follow the file while it is written
//! qtmplot --no-live data/iv.dat  # static view
//! qtmplot                        # empty window, Ctrl+O to open
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use eframe::egui;
use qtmlab::config::{LabConfig, DEFAULT_CONFIG_PATH};
use qtmlab::logging;
use qtmlab::plot::{PlotApp, PlotState};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "qtmplot")]
#[command(about = "Live and offline plotting of QTMlab data files", long_about = None)]
struct Cli {
    /// Data file to show
    file: Option<PathBuf>,

    /// Show the file as loaded instead of following it
    #[arg(long)]
    no_live: bool,

    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = LabConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let mut state = PlotState::new();
    if let Some(file) = &cli.file {
        if let Err(e) = state.open(file, !cli.no_live) {
            error!(path = %file.display(), "Failed to open data file: {}", e);
            state.set_status(format!("Failed to open {}: {}", file.display(), e));
        }
    }

    info!("Starting plot tool");
    let refresh_interval = config.plot.refresh_interval;
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1000.0, 700.0])
            .with_min_inner_size([500.0, 350.0])
            .with_title("QTMlab plot"),
        ..Default::default()
    };

    eframe::run_native(
        "QTMlab plot",
        options,
        Box::new(move |cc| Ok(Box::new(PlotApp::new(cc, state, refresh_interval)))),
    )
    .map_err(|e| anyhow::anyhow!("Plot window failed: {}", e))
}
