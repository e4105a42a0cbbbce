//! Monitor settings and configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Monitor settings
///
/// Where the monitor writes its artifacts and how it launches the traversal
/// tool. Settings are stored in JSON format; missing fields take defaults.
///
/// # Example
/// ```rust,no_run
/// use natmon::storage::MonitorSettings;
///
/// // Load settings (returns default if file doesn't exist)
/// let settings = MonitorSettings::load("natmon.json").expect("Failed to load");
///
/// println!("Status file: {}", settings.status_path().display());
/// println!("Launching: {} {:?}", settings.program, settings.program_args);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Directory holding the status snapshot and the raw log
    pub data_dir: PathBuf,
    /// Snapshot file name, relative to `data_dir`
    pub status_file: String,
    /// Raw log file name, relative to `data_dir`
    pub log_file: String,
    /// Executable used to launch the traversal tool
    pub program: String,
    /// Arguments placed before the launch flags (e.g. the script path)
    pub program_args: Vec<String>,
    /// Echo every child output line to stdout
    pub echo_output: bool,
    /// Buffered output lines between the pipe readers and the supervisor
    pub channel_capacity: usize,
}

impl MonitorSettings {
    /// Load settings from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the settings file
    ///
    /// # Returns
    /// The loaded settings, or default settings if file doesn't exist
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read settings: {}", e)))?;

        // Handle empty file (return defaults)
        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        let settings: Self = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("Failed to parse settings: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to save the settings file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create settings directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| Error::Config(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }

    /// Reject settings the supervisor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(Error::Config("program must not be empty".to_string()));
        }
        if self.status_file.trim().is_empty() || self.log_file.trim().is_empty() {
            return Err(Error::Config(
                "status_file and log_file must not be empty".to_string(),
            ));
        }
        if self.status_file == self.log_file {
            return Err(Error::Config(
                "status_file and log_file must differ".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Full path of the published status snapshot
    pub fn status_path(&self) -> PathBuf {
        self.data_dir.join(&self.status_file)
    }

    /// Full path of the raw output log
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            status_file: "status.json".to_string(),
            log_file: "natter.log".to_string(),
            program: "python3".to_string(),
            program_args: vec!["natter.py".to_string()],
            echo_output: true,
            channel_capacity: 256,
        }
    }
}
