//! Data file writer.
//!
//! Files are plain text: optional `# ` metadata lines, a header line and one
//! row per measurement, fields joined by `", "`. Every row is flushed as soon
//! as it is appended so the plot tool can tail the file while it grows.

use crate::config::StorageConfig;
use crate::data::metadata::RunMetadata;
use crate::error::{AppResult, LabError};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Separator between fields of the header and of every row
pub const FIELD_SEPARATOR: &str = ", ";

/// Resolve `requested` against `data_dir` when it is relative.
pub fn resolve_path(requested: &Path, data_dir: &Path) -> PathBuf {
    if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        data_dir.join(requested)
    }
}

/// Append `_1` to the file stem until the path does not exist.
///
/// `data.dat` becomes `data_1.dat`, then `data_1_1.dat`. A warning is logged
/// for every rename so an operator notices the new name.
pub fn unique_path(path: &Path) -> PathBuf {
    let mut candidate = path.to_path_buf();
    while candidate.exists() {
        let mut name: OsString = candidate
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        name.push("_1");
        if let Some(extension) = candidate.extension() {
            name.push(".");
            name.push(extension);
        }
        let renamed = candidate.with_file_name(name);
        warn!(
            "File {} already exists, writing to {} instead",
            candidate.display(),
            renamed.display()
        );
        candidate = renamed;
    }
    candidate
}

/// Format a value for a data row.
///
/// Plain decimal for `0` and `1e-4 <= |x| < 1e6`, scientific otherwise.
pub fn format_number(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 || !value.is_finite() || (1e-4..1e6).contains(&magnitude) {
        format!("{}", value)
    } else {
        format!("{:e}", value)
    }
}

/// Writes one data file.
#[derive(Debug)]
pub struct DataFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    columns: usize,
    rows: usize,
}

impl DataFileWriter {
    /// Create a data file next to (never over) `requested`.
    ///
    /// Relative paths are resolved against `storage.data_dir`; missing parent
    /// directories are created. Metadata is written only when both given and
    /// enabled by `storage.write_metadata`.
    pub fn create(
        requested: &Path,
        storage: &StorageConfig,
        header: &[String],
        metadata: Option<&RunMetadata>,
    ) -> AppResult<Self> {
        if header.is_empty() {
            return Err(LabError::DataFile("header has no columns".to_string()));
        }

        let path = unique_path(&resolve_path(requested, &storage.data_dir));
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(&path)?;
        let mut writer = BufWriter::new(file);

        if let (Some(metadata), true) = (metadata, storage.write_metadata) {
            let json = serde_json::to_string_pretty(metadata)
                .map_err(|e| LabError::DataFile(format!("metadata: {}", e)))?;
            for line in json.lines() {
                writeln!(writer, "# {}", line)?;
            }
        }
        writeln!(writer, "{}", header.join(FIELD_SEPARATOR))?;
        writer.flush()?;

        debug!(path = %path.display(), columns = header.len(), "Data file created");
        Ok(Self {
            path,
            writer,
            columns: header.len(),
            rows: 0,
        })
    }

    /// Path actually written (after collision renaming)
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Append one row and flush it to disk.
    pub fn append(&mut self, row: &[f64]) -> AppResult<()> {
        if row.len() != self.columns {
            return Err(LabError::DataFile(format!(
                "row has {} values, header has {} columns",
                row.len(),
                self.columns
            )));
        }
        let line = row
            .iter()
            .map(|v| format_number(*v))
            .collect::<Vec<_>>()
            .join(FIELD_SEPARATOR);
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }
}
