//! Raw output log
//!
//! Every line the child prints is appended here with a capture timestamp.
//! The log is diagnostic only: write failures are logged and swallowed.

use crate::storage::status::TIMESTAMP_FORMAT;
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only timestamped log of raw child output
#[derive(Debug, Clone)]
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    /// Create a sink writing to `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the log at the start of a run
    pub fn clear(&self) {
        if let Err(e) = self.try_clear() {
            warn!("Failed to clear log file {}: {}", self.path.display(), e);
        }
    }

    /// Append one line as `[YYYY-MM-DD HH:MM:SS] line`
    pub fn append(&self, line: &str) {
        if let Err(e) = self.try_append(line) {
            warn!("Failed to write log file {}: {}", self.path.display(), e);
        }
    }

    fn try_clear(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::File::create(&self.path)?;
        Ok(())
    }

    fn try_append(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let timestamp = Local::now().format(TIMESTAMP_FORMAT);
        writeln!(file, "[{}] {}", timestamp, line.trim_end_matches(['\r', '\n']))
    }
}
