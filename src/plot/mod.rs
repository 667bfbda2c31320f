//! Live/offline plot tool.
//!
//! Plots two columns of a data file. In live mode the file is polled every
//! `plot.refresh_interval` and new rows are appended as the experiment writes
//! them; otherwise the file is shown as loaded.
//!
//! | Shortcut | Action |
//! |---|---|
//! | Ctrl+O | stop live plotting and open a file |
//! | Ctrl+R | rescale once |
//! | Ctrl+A | toggle automatic rescaling |
//! | Ctrl+L | toggle live plotting |
//!
//! All behaviour lives in [`PlotState`]; [`PlotApp`] only draws it.

pub mod shortcuts;
pub mod state;

pub use shortcuts::{handle_shortcuts, ShortcutAction};
pub use state::PlotState;

use eframe::egui;
use egui_plot::{Line, Plot, PlotPoints};
use std::time::{Duration, Instant};
use tracing::warn;

/// File name filters of the open dialog
const FILE_FILTERS: &[&str] = &["dat", "txt", "csv"];

/// The eframe application.
pub struct PlotApp {
    state: PlotState,
    refresh_interval: Duration,
    last_poll: Instant,
}

impl PlotApp {
    /// Creates the app around an already prepared state.
    pub fn new(_cc: &eframe::CreationContext<'_>, state: PlotState, refresh_interval: Duration) -> Self {
        Self {
            state,
            refresh_interval,
            last_poll: Instant::now(),
        }
    }

    fn poll(&mut self) {
        if !self.state.is_live() || self.last_poll.elapsed() < self.refresh_interval {
            return;
        }
        self.last_poll = Instant::now();
        if let Err(e) = self.state.poll() {
            self.state.set_status(format!("Read error: {}", e));
        }
    }

    fn open_dialog(&mut self) {
        let mut dialog = rfd::FileDialog::new().add_filter("Data files", FILE_FILTERS);
        if let Some(dir) = self.state.path().and_then(|p| p.parent()) {
            dialog = dialog.set_directory(dir);
        }
        if let Some(path) = dialog.pick_file() {
            if let Err(e) = self.state.open(&path, false) {
                warn!(path = %path.display(), "Failed to open data file: {}", e);
                self.state.set_status(format!("Failed to open {}: {}", path.display(), e));
            }
        }
    }

    fn top_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui
                .button("Open…")
                .on_hover_text(ShortcutAction::OpenFile.hint())
                .clicked()
            {
                self.state.apply(ShortcutAction::OpenFile);
            }
            let name = self
                .state
                .path()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "no file".to_string());
            ui.label(name);
            ui.separator();

            let (mut x, mut y) = self.state.columns();
            let header = self.state.data().header.clone();
            column_selector(ui, "x", &header, &mut x);
            column_selector(ui, "y", &header, &mut y);
            self.state.set_columns(x, y);
            ui.separator();

            if ui
                .selectable_label(self.state.is_live(), "Live")
                .on_hover_text(ShortcutAction::ToggleLive.hint())
                .clicked()
            {
                self.state.apply(ShortcutAction::ToggleLive);
            }
            if ui
                .selectable_label(self.state.auto_rescale(), "Auto rescale")
                .on_hover_text(ShortcutAction::ToggleAutoRescale.hint())
                .clicked()
            {
                self.state.apply(ShortcutAction::ToggleAutoRescale);
            }
            if ui
                .button("Rescale")
                .on_hover_text(ShortcutAction::Rescale.hint())
                .clicked()
            {
                self.state.apply(ShortcutAction::Rescale);
            }
        });
    }
}

fn column_selector(ui: &mut egui::Ui, label: &str, header: &[String], selected: &mut usize) {
    let current = header.get(*selected).cloned().unwrap_or_default();
    egui::ComboBox::from_label(label)
        .selected_text(current)
        .show_ui(ui, |ui| {
            for (index, name) in header.iter().enumerate() {
                ui.selectable_value(selected, index, name);
            }
        });
}

impl eframe::App for PlotApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for action in handle_shortcuts(ctx) {
            self.state.apply(action);
        }
        if self.state.take_dialog_request() {
            self.open_dialog();
        }
        self.poll();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| self.top_bar(ui));

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(self.state.status());
                if self.state.is_live() {
                    ui.separator();
                    ui.label("● live");
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let (x, y) = self.state.columns();
            let x_name = self.state.column_name(x).to_string();
            let y_name = self.state.column_name(y).to_string();

            let mut plot = Plot::new("data_plot")
                .x_axis_label(x_name)
                .y_axis_label(y_name.clone());
            if self.state.take_rescale() {
                plot = plot.reset();
            }
            let auto_rescale = self.state.auto_rescale();
            let points = self.state.points();

            plot.show(ui, |plot_ui| {
                if auto_rescale {
                    plot_ui.set_auto_bounds(egui::Vec2b::TRUE);
                }
                plot_ui.line(Line::new(PlotPoints::from(points)).name(y_name));
            });
        });

        if self.state.is_live() {
            ctx.request_repaint_after(self.refresh_interval);
        }
    }
}
