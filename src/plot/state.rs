//! Plot tool state, independent of the GUI toolkit.

use crate::data::{DataSet, DataTail};
use crate::error::{AppResult, LabError};
use crate::plot::shortcuts::ShortcutAction;
use std::path::Path;
use tracing::{debug, info};

/// What is plotted and how the view behaves.
#[derive(Debug, Default)]
pub struct PlotState {
    tail: Option<DataTail>,
    data: DataSet,
    x_column: usize,
    y_column: usize,
    live: bool,
    auto_rescale: bool,
    rescale_requested: bool,
    dialog_requested: bool,
    status: String,
}

impl PlotState {
    pub fn new() -> Self {
        Self {
            status: "No file loaded (Ctrl+O to open)".to_string(),
            ..Self::default()
        }
    }

    /// Load `path` from the start; with `live` it is followed as it grows.
    ///
    /// Column 0 becomes x and column 1 (if present) y.
    pub fn open(&mut self, path: &Path, live: bool) -> AppResult<()> {
        let mut tail = DataTail::new(path);
        let update = tail.poll()?;
        let header = update.header.ok_or_else(|| {
            LabError::DataFile(format!("{} has no header line", path.display()))
        })?;

        self.x_column = 0;
        self.y_column = usize::from(header.len() > 1);
        self.data = DataSet {
            header,
            rows: update.rows,
        };
        self.tail = Some(tail);
        self.live = live;
        self.rescale_requested = true;
        self.status = format!("{} rows", self.data.len());
        info!(path = %path.display(), rows = self.data.len(), live, "Opened data file");
        Ok(())
    }

    /// Append rows written since the last poll. Does nothing unless live.
    ///
    /// Returns the number of new rows. A file that shrank is re-read from scratch.
    pub fn poll(&mut self) -> AppResult<usize> {
        if !self.live {
            return Ok(0);
        }
        let Some(tail) = self.tail.as_mut() else {
            return Ok(0);
        };
        let update = tail.poll()?;
        if update.reset {
            debug!("Data file was replaced, reloading");
            self.data.rows.clear();
            self.rescale_requested = true;
        }
        if let Some(header) = update.header {
            if header != self.data.header {
                self.data.header = header;
                self.x_column = self.x_column.min(self.data.header.len().saturating_sub(1));
                self.y_column = self.y_column.min(self.data.header.len().saturating_sub(1));
            }
        }

        let added = update.rows.len();
        self.data.rows.extend(update.rows);
        if added > 0 {
            self.status = format!("{} rows", self.data.len());
            if self.auto_rescale {
                self.rescale_requested = true;
            }
        }
        Ok(added)
    }

    /// React to a keyboard shortcut (or the equivalent button).
    pub fn apply(&mut self, action: ShortcutAction) {
        match action {
            ShortcutAction::OpenFile => {
                self.live = false;
                self.dialog_requested = true;
            }
            ShortcutAction::Rescale => self.rescale_requested = true,
            ShortcutAction::ToggleAutoRescale => {
                self.auto_rescale = !self.auto_rescale;
                if self.auto_rescale {
                    self.rescale_requested = true;
                }
            }
            ShortcutAction::ToggleLive => {
                if self.tail.is_some() {
                    self.live = !self.live;
                }
            }
        }
    }

    /// Consume a pending rescale request
    pub fn take_rescale(&mut self) -> bool {
        std::mem::take(&mut self.rescale_requested)
    }

    /// Consume a pending file dialog request
    pub fn take_dialog_request(&mut self) -> bool {
        std::mem::take(&mut self.dialog_requested)
    }

    /// Choose the plotted columns; out of range indices are ignored.
    pub fn set_columns(&mut self, x: usize, y: usize) {
        let width = self.data.header.len();
        if x < width && y < width && (x, y) != (self.x_column, self.y_column) {
            self.x_column = x;
            self.y_column = y;
            self.rescale_requested = true;
        }
    }

    /// `[x, y]` pairs of the selected columns
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.data.points(self.x_column, self.y_column)
    }

    pub fn data(&self) -> &DataSet {
        &self.data
    }

    pub fn columns(&self) -> (usize, usize) {
        (self.x_column, self.y_column)
    }

    /// Name of column `index`
    pub fn column_name(&self, index: usize) -> &str {
        self.data.header.get(index).map(String::as_str).unwrap_or("")
    }

    /// File being shown
    pub fn path(&self) -> Option<&Path> {
        self.tail.as_ref().map(|t| t.path())
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn auto_rescale(&self) -> bool {
        self.auto_rescale
    }

    /// One-line status for the status bar
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }
}
