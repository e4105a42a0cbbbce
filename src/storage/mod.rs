//! Local storage module
//!
//! This module handles everything the monitor persists:
//! - `settings` - Monitor configuration (paths, launched program)
//! - `status` - The status record and its published snapshot form
//! - `publisher` - Atomic snapshot publication and the polling reader
//! - `log_sink` - Timestamped raw output log

// Submodules
pub mod log_sink;
pub mod publisher;
pub mod settings;
pub mod status;

// Re-export commonly used types
pub use log_sink::LogSink;
pub use publisher::{write_atomic, StatusReader, StatusStore};
pub use settings::MonitorSettings;
pub use status::{Phase, StatusRecord, StatusSnapshot, LOG_TAIL_LIMIT, TIMESTAMP_FORMAT};
