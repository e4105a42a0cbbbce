//! Process supervision for the traversal tool
//!
//! - `launch` - Launch flags and the resulting child invocation
//! - `process` - Spawning and merged stdout/stderr capture
//! - `monitor` - The supervision loop driving the status store

// Submodules
pub mod launch;
pub mod monitor;
pub mod process;

// Re-export commonly used types
pub use launch::{Invocation, LaunchConfig, LaunchValue};
pub use monitor::Supervisor;
pub use process::{decode_lossy, exit_code, ChildProcess};
