//! Status publication and polling
//!
//! The status snapshot is the only channel between the monitor and its
//! readers. Every publish writes a complete snapshot to a temporary file in
//! the same directory and renames it over the published path, so a reader
//! sees either the previous snapshot or the new one, never a partial write.

use crate::{
    connectivity::{is_shared_address, ConnectivityFact},
    storage::status::{Phase, StatusRecord, StatusSnapshot},
    Error, Result,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Owner of the run's `StatusRecord` and its published snapshot
///
/// Mutations go through the store so each one is followed by a publish.
/// Publish failures are logged and never undo the in-memory change.
///
/// # Example
/// ```rust,no_run
/// use natmon::storage::{Phase, StatusRecord, StatusStore};
/// use natmon::supervisor::LaunchConfig;
///
/// let mut store = StatusStore::new("data/status.json", StatusRecord::new(LaunchConfig::new()));
/// store.transition(Phase::Running);
/// assert_eq!(store.record().phase(), &Phase::Running);
/// ```
#[derive(Debug)]
pub struct StatusStore {
    record: StatusRecord,
    path: PathBuf,
}

impl StatusStore {
    /// Create a store publishing to `path`
    pub fn new<P: AsRef<Path>>(path: P, record: StatusRecord) -> Self {
        Self {
            record,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Current in-memory record
    pub fn record(&self) -> &StatusRecord {
        &self.record
    }

    /// Path of the published snapshot
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the record at the start of a new run and publish it
    pub fn reset(&mut self, record: StatusRecord) {
        self.record = record;
        self.commit();
    }

    /// Move to a new phase and publish
    ///
    /// Returns `false` if the transition was rejected.
    pub fn transition(&mut self, phase: Phase) -> bool {
        let changed = self.record.set_phase(phase);
        if changed {
            self.commit();
        }
        changed
    }

    /// Record a connectivity fact and publish
    pub fn apply_fact(&mut self, fact: &ConnectivityFact, line: &str) -> bool {
        if !self.record.apply_fact(fact, line) {
            return false;
        }

        info!("Mapping established: {}", fact.outer);
        if is_shared_address(fact.outer.ip) {
            warn!(
                "Public address {} is in 100.64.0.0/10; an upstream carrier NAT will block inbound traffic",
                fact.outer.ip
            );
        }
        self.commit();
        true
    }

    /// Publish, logging instead of returning failures
    pub fn commit(&self) {
        if let Err(e) = self.publish() {
            warn!("Failed to publish status to {}: {}", self.path.display(), e);
        }
    }

    /// Write the current snapshot, atomically replacing the previous one
    ///
    /// # Errors
    /// Returns an error if serialization or any file operation fails
    pub fn publish(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.record.snapshot())?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!("Published status '{}' to {}", self.record.phase(), self.path.display());
        Ok(())
    }
}

/// Write `contents` to a sibling temp file, fsync it, then rename over `path`
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    std::fs::create_dir_all(dir)
        .map_err(|e| Error::Publish(format!("Failed to create {}: {}", dir.display(), e)))?;

    let mut file = NamedTempFile::new_in(dir)
        .map_err(|e| Error::Publish(format!("Failed to create temp file: {}", e)))?;

    file.write_all(contents)
        .map_err(|e| Error::Publish(format!("Failed to write temp file: {}", e)))?;

    // Readers may run as another user
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(|e| Error::Publish(format!("Failed to set permissions: {}", e)))?;
    }

    file.as_file()
        .sync_all()
        .map_err(|e| Error::Publish(format!("Failed to sync temp file: {}", e)))?;

    file.persist(path).map_err(|e| {
        Error::Publish(format!("Failed to replace {}: {}", path.display(), e.error))
    })?;

    Ok(())
}

/// Poll-side access to a published snapshot
///
/// Readers run in other processes without any coordination, so a read that
/// fails to parse is retried a few times before giving up.
#[derive(Debug, Clone)]
pub struct StatusReader {
    path: PathBuf,
    attempts: u32,
    retry_delay: Duration,
}

impl StatusReader {
    /// Default number of read attempts
    pub const DEFAULT_ATTEMPTS: u32 = 3;

    /// Create a reader for the snapshot at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            attempts: Self::DEFAULT_ATTEMPTS,
            retry_delay: Duration::from_millis(50),
        }
    }

    /// Override retry behaviour
    pub fn with_retry(mut self, attempts: u32, retry_delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Read the published snapshot
    ///
    /// # Returns
    /// `Ok(None)` if nothing has been published yet
    ///
    /// # Errors
    /// Returns the last read or parse error once all attempts are used
    pub fn read(&self) -> Result<Option<StatusSnapshot>> {
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            if !self.path.exists() {
                return Ok(None);
            }

            match std::fs::read_to_string(&self.path)
                .map_err(Error::from)
                .and_then(|data| serde_json::from_str::<StatusSnapshot>(&data).map_err(Error::from))
            {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(e) => {
                    debug!(
                        "Status read attempt {}/{} failed: {}",
                        attempt, self.attempts, e
                    );
                    last_error = Some(e);
                    if attempt < self.attempts {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Publish("no read attempted".to_string())))
    }

    /// Read the snapshot, substituting a placeholder when none is usable
    ///
    /// A missing file yields a `waiting` snapshot, a broken one an `error`
    /// snapshot carrying the failure message.
    pub fn read_or_placeholder(&self) -> StatusSnapshot {
        match self.read() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => StatusSnapshot::placeholder("waiting", "Waiting for natter to start..."),
            Err(e) => StatusSnapshot::placeholder("error", format!("Failed to read status: {}", e)),
        }
    }
}
