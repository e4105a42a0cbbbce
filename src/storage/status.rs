//! Status record and its published snapshot form

use crate::connectivity::{classify, ConnectivityFact, Endpoint, Protocol};
use crate::supervisor::LaunchConfig;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Maximum number of characters kept from the most recent accepted line
pub const LOG_TAIL_LIMIT: usize = 500;

/// Timestamp format used in the published snapshot
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lifecycle phase of a supervised run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Record created, child not launched yet
    Starting,
    /// Child launched, no public endpoint seen yet
    Running,
    /// At least one public endpoint has been reported
    Success,
    /// Child exited; `code` is its exit status (negative signal number on Unix)
    Stopped {
        /// Exit status, if the platform reported one
        code: Option<i32>,
    },
    /// Run ended because of a failure
    Error(String),
}

impl Phase {
    /// Whether the run is over
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Stopped { .. } | Phase::Error(_))
    }

    /// Whether moving from `self` to `next` keeps the run monotonic
    pub fn can_transition_to(&self, next: &Phase) -> bool {
        match (self, next) {
            (Phase::Starting, Phase::Running | Phase::Error(_)) => true,
            (Phase::Running | Phase::Success, Phase::Success) => true,
            (Phase::Running | Phase::Success, Phase::Stopped { .. } | Phase::Error(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Starting => f.write_str("starting"),
            Phase::Running => f.write_str("running"),
            Phase::Success => f.write_str("success"),
            Phase::Stopped { code: Some(code) } => write!(f, "stopped (code: {})", code),
            Phase::Stopped { code: None } => f.write_str("stopped (code: unknown)"),
            Phase::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// The single authoritative connectivity status of a run
///
/// Only `StatusStore` mutates it; every mutation refreshes `last_updated`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    outer: Option<Endpoint>,
    inner: Option<Endpoint>,
    protocol: Protocol,
    phase: Phase,
    last_updated: Option<DateTime<Local>>,
    log_tail: String,
    launch_config: LaunchConfig,
}

impl StatusRecord {
    /// Create the record for a new run
    pub fn new(launch_config: LaunchConfig) -> Self {
        Self {
            outer: None,
            inner: None,
            protocol: Protocol::default(),
            phase: Phase::Starting,
            last_updated: None,
            log_tail: String::new(),
            launch_config,
        }
    }

    /// Last known public endpoint
    pub fn outer(&self) -> Option<Endpoint> {
        self.outer
    }

    /// Local endpoint paired with the public one
    pub fn inner(&self) -> Option<Endpoint> {
        self.inner
    }

    /// Protocol of the last paired announcement
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Current phase
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Time of the last mutation
    pub fn last_updated(&self) -> Option<DateTime<Local>> {
        self.last_updated
    }

    /// Tail of the most recent accepted line
    pub fn log_tail(&self) -> &str {
        &self.log_tail
    }

    /// Launch configuration of this run
    pub fn launch_config(&self) -> &LaunchConfig {
        &self.launch_config
    }

    /// Move to `phase` if the transition is allowed
    ///
    /// Returns `false` (and leaves the record untouched) otherwise.
    pub fn set_phase(&mut self, phase: Phase) -> bool {
        if !self.phase.can_transition_to(&phase) {
            warn!("Ignoring phase change {} -> {}", self.phase, phase);
            return false;
        }
        self.phase = phase;
        self.touch();
        true
    }

    /// Record a connectivity fact parsed from `line`
    ///
    /// Protocol and inner endpoint only change when the fact carries both.
    /// Returns `false` if the record was left untouched.
    pub fn apply_fact(&mut self, fact: &ConnectivityFact, line: &str) -> bool {
        if !classify(fact.outer.ip).is_public() {
            warn!("Refusing to publish private address {}", fact.outer);
            return false;
        }
        if !self.phase.can_transition_to(&Phase::Success) {
            warn!("Ignoring endpoint {} in phase {}", fact.outer, self.phase);
            return false;
        }

        self.outer = Some(fact.outer);
        self.phase = Phase::Success;
        if let (Some(protocol), Some(inner)) = (fact.protocol, fact.inner) {
            self.protocol = protocol;
            self.inner = Some(inner);
        }
        self.log_tail = tail_chars(line.trim_end_matches(['\r', '\n']), LOG_TAIL_LIMIT);
        self.touch();
        true
    }

    /// Published form of the record
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            outer_ip: self.outer.map(|e| e.ip.to_string()),
            outer_port: self.outer.map(|e| e.port),
            inner_ip: self.inner.map(|e| e.ip.to_string()),
            inner_port: self.inner.map(|e| e.port),
            protocol: self.protocol,
            status: self.phase.to_string(),
            timestamp: self
                .last_updated
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
            log: self.log_tail.clone(),
            natter_args: self.launch_config.clone(),
        }
    }

    fn touch(&mut self) {
        self.last_updated = Some(Local::now());
    }
}

/// Published JSON form of a `StatusRecord`
///
/// This is the contract with external readers; field names are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Public address, if known
    pub outer_ip: Option<String>,
    /// Public port, if known
    pub outer_port: Option<u16>,
    /// Local address paired with the public one
    pub inner_ip: Option<String>,
    /// Local port paired with the public one
    pub inner_port: Option<u16>,
    /// Mapping protocol
    pub protocol: Protocol,
    /// Phase rendered as text, e.g. `success` or `stopped (code: 0)`
    pub status: String,
    /// Last update, `YYYY-MM-DD HH:MM:SS` local time
    pub timestamp: Option<String>,
    /// Tail of the most recent accepted output line
    pub log: String,
    /// Launch flags the child was started with
    #[serde(default)]
    pub natter_args: LaunchConfig,
}

impl StatusSnapshot {
    /// Synthetic snapshot for readers when nothing usable is published
    pub fn placeholder(status: &str, message: impl Into<String>) -> Self {
        Self {
            outer_ip: None,
            outer_port: None,
            inner_ip: None,
            inner_port: None,
            protocol: Protocol::default(),
            status: status.to_string(),
            timestamp: Some(Local::now().format(TIMESTAMP_FORMAT).to_string()),
            log: message.into(),
            natter_args: LaunchConfig::default(),
        }
    }

    /// Whether a public endpoint has been published
    pub fn has_outer(&self) -> bool {
        self.outer_ip.is_some() && self.outer_port.is_some()
    }
}

/// Last `limit` characters of `text`
pub fn tail_chars(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(limit)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Starting.to_string(), "starting");
        assert_eq!(Phase::Running.to_string(), "running");
        assert_eq!(Phase::Success.to_string(), "success");
        assert_eq!(Phase::Stopped { code: Some(0) }.to_string(), "stopped (code: 0)");
        assert_eq!(Phase::Stopped { code: Some(-9) }.to_string(), "stopped (code: -9)");
        assert_eq!(
            Phase::Error("boom".to_string()).to_string(),
            "error: boom"
        );
    }

    #[test]
    fn test_tail_chars_multibyte() {
        assert_eq!(tail_chars("héllo", 3), "llo");
        assert_eq!(tail_chars("ab", 10), "ab");
        assert_eq!(tail_chars("打洞成功", 2), "成功");
    }
}
