//! Incremental data file reader.
//!
//! [`DataTail`] remembers how far into a file it has read, so polling a file
//! that is still being written only parses the new rows. A line is consumed
//! only once its terminating newline is on disk; a half-written row is picked
//! up by the next poll.

use crate::error::{AppResult, LabError};
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Parsed table: column names and numeric rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    /// Column names from the header line
    pub header: Vec<String>,
    /// Data rows, each `header.len()` wide
    pub rows: Vec<Vec<f64>>,
}

impl DataSet {
    /// Values of one column
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.get(index).copied()).collect()
    }

    /// `[x, y]` pairs for plotting
    pub fn points(&self, x: usize, y: usize) -> Vec<[f64; 2]> {
        self.rows
            .iter()
            .filter_map(|r| Some([*r.get(x)?, *r.get(y)?]))
            .collect()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of one [`DataTail::poll`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TailUpdate {
    /// The file shrank and was read again from the start; earlier rows are stale
    pub reset: bool,
    /// Header, once it has been read
    pub header: Option<Vec<String>>,
    /// Rows completed since the previous poll
    pub rows: Vec<Vec<f64>>,
}

/// Follows a data file as it grows.
#[derive(Debug, Clone)]
pub struct DataTail {
    path: PathBuf,
    offset: u64,
    header: Option<Vec<String>>,
}

impl DataTail {
    /// Start at the beginning of `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            header: None,
        }
    }

    /// File being followed
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header, once read
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read rows completed since the last poll.
    pub fn poll(&mut self) -> AppResult<TailUpdate> {
        let mut file = File::open(&self.path)?;
        let length = file.metadata()?.len();

        let mut update = TailUpdate::default();
        if length < self.offset {
            debug!(path = %self.path.display(), "Data file shrank, reading from start");
            self.offset = 0;
            self.header = None;
            update.reset = true;
        }
        if length == self.offset {
            update.header = self.header.clone();
            return Ok(update);
        }

        file.seek(SeekFrom::Start(self.offset))?;
        let mut chunk = Vec::with_capacity((length - self.offset) as usize);
        file.take(length - self.offset).read_to_end(&mut chunk)?;

        let complete = match chunk.iter().rposition(|b| *b == b'\n') {
            Some(last_newline) => last_newline + 1,
            None => {
                update.header = self.header.clone();
                return Ok(update);
            }
        };
        self.offset += complete as u64;
        update.rows = self.parse_lines(&chunk[..complete]);
        update.header = self.header.clone();
        Ok(update)
    }

    /// Read the whole file from the start.
    pub fn read_all(path: impl Into<PathBuf>) -> AppResult<DataSet> {
        let mut tail = Self::new(path);
        let update = tail.poll()?;
        let header = update.header.ok_or_else(|| {
            LabError::DataFile(format!("{} has no header line", tail.path.display()))
        })?;
        Ok(DataSet {
            header,
            rows: update.rows,
        })
    }

    fn parse_lines(&mut self, bytes: &[u8]) -> Vec<Vec<f64>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .flexible(true)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %self.path.display(), "Skipping unreadable row: {}", e);
                    continue;
                }
            };
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            if self.header.is_none() {
                self.header = Some(
                    record
                        .iter()
                        .map(|field| String::from_utf8_lossy(field).into_owned())
                        .collect(),
                );
                continue;
            }
            let width = self.header.as_ref().map_or(0, Vec::len);

            let fields: Result<Vec<&str>, _> = record.iter().map(std::str::from_utf8).collect();
            let fields = match fields {
                Ok(fields) => fields,
                Err(e) => {
                    warn!(path = %self.path.display(), "Skipping undecodable row: {}", e);
                    continue;
                }
            };
            let parsed: Result<Vec<f64>, _> = fields.into_iter().map(str::parse::<f64>).collect();
            match parsed {
                Ok(row) if row.len() == width => rows.push(row),
                Ok(row) => warn!(
                    path = %self.path.display(),
                    "Skipping row with {} values (header has {})",
                    row.len(),
                    width
                ),
                Err(e) => warn!(path = %self.path.display(), "Skipping malformed row: {}", e),
            }
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;

    fn append(path: &Path, text: &str) {
        let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn reads_header_and_rows_skipping_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.dat");
        append(&path, "# {\n#   \"primitive\": \"sweep\"\n# }\nsweepdev, I\n0, 1e-9\n0.5, 2e-9\n");

        let data = DataTail::read_all(&path).unwrap();
        assert_eq!(data.header, vec!["sweepdev", "I"]);
        assert_eq!(data.rows, vec![vec![0.0, 1e-9], vec![0.5, 2e-9]]);
        assert_eq!(data.points(0, 1)[1], [0.5, 2e-9]);
    }

    #[test]
    fn only_consumes_complete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.dat");
        append(&path, "x, y\n1, 2\n3, ");

        let mut tail = DataTail::new(&path);
        let first = tail.poll().unwrap();
        assert_eq!(first.rows, vec![vec![1.0, 2.0]]);

        append(&path, "4\n5, 6\n");
        let second = tail.poll().unwrap();
        assert_eq!(second.rows, vec![vec![3.0, 4.0], vec![5.0, 6.0]]);
        assert!(tail.poll().unwrap().rows.is_empty());
    }

    #[test]
    fn restarts_after_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.dat");
        append(&path, "x, y\n1, 2\n3, 4\n");

        let mut tail = DataTail::new(&path);
        assert_eq!(tail.poll().unwrap().rows.len(), 2);

        std::fs::write(&path, "a, b\n9, 9\n").unwrap();
        let update = tail.poll().unwrap();
        assert!(update.reset);
        assert_eq!(update.header, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(update.rows, vec![vec![9.0, 9.0]]);
    }

    #[test]
    fn skips_malformed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.dat");
        append(&path, "x, y\n1, 2\n1, oops\n3\n\n4, 5\n");

        let data = DataTail::read_all(&path).unwrap();
        assert_eq!(data.rows, vec![vec![1.0, 2.0], vec![4.0, 5.0]]);
    }

    #[test]
    fn undecodable_row_does_not_hide_later_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("binary.dat");
        let mut file = OpenOptions::new().create(true).append(true).open(&path).unwrap();
        file.write_all(b"x, y\n1, 2\n\xff\xfe, 3\n4, 5\n").unwrap();

        let mut tail = DataTail::new(&path);
        assert_eq!(tail.poll().unwrap().rows, vec![vec![1.0, 2.0], vec![4.0, 5.0]]);

        append(&path, "6, 7\n");
        assert_eq!(tail.poll().unwrap().rows, vec![vec![6.0, 7.0]]);
    }

    #[test]
    fn empty_file_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dat");
        append(&path, "");
        assert!(matches!(
            DataTail::read_all(&path),
            Err(LabError::DataFile(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let mut tail = DataTail::new("/nonexistent/data.dat");
        assert!(matches!(tail.poll(), Err(LabError::Io(_))));
    }
}
