//! Connectivity facts extracted from traversal tool output
//!
//! This module turns raw output lines into typed endpoint mappings:
//! - `classify` - public vs. private address classification
//! - `parser` - ordered rule matching over output lines
//! - `types` - endpoints, protocols and connectivity facts

// Submodules
pub mod classify;
pub mod parser;
pub mod types;

// Re-export commonly used types
pub use types::{ConnectivityFact, Endpoint, InnerMapping, Protocol};

// Re-export main functions
pub use classify::{classify, classify_literal, is_shared_address, AddressClass};
pub use parser::{is_heartbeat, parse_port, LineParser, RuleKind};
