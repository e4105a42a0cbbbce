//! Natmon - NAT traversal process monitor
//!
//! This library supervises an external NAT traversal tool, extracts the
//! public/private endpoint mappings it reports on its output, and publishes
//! the latest connectivity state as a JSON snapshot that other processes poll.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connectivity;
pub mod storage;
pub mod supervisor;

/// Result type alias for Natmon operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Natmon operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration could not be loaded or is invalid
    #[error("Config error: {0}")]
    Config(String),

    /// Child process could not be started
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// Status snapshot could not be written
    #[error("Publish error: {0}")]
    Publish(String),

    /// Fault while supervising a running child process
    #[error("Supervisor error: {0}")]
    Supervisor(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Initialize the Natmon library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}

#[cfg(test)]
mod tests;
