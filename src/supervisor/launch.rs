//! Launch configuration and child invocation

use crate::storage::MonitorSettings;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value attached to a launch flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LaunchValue {
    /// Switch; emitted bare when `true`, omitted when `false`
    Flag(bool),
    /// Numeric option
    Int(i64),
    /// Text option
    Text(String),
}

impl From<bool> for LaunchValue {
    fn from(value: bool) -> Self {
        LaunchValue::Flag(value)
    }
}

impl From<i64> for LaunchValue {
    fn from(value: i64) -> Self {
        LaunchValue::Int(value)
    }
}

impl From<u16> for LaunchValue {
    fn from(value: u16) -> Self {
        LaunchValue::Int(i64::from(value))
    }
}

impl From<u32> for LaunchValue {
    fn from(value: u32) -> Self {
        LaunchValue::Int(i64::from(value))
    }
}

impl From<String> for LaunchValue {
    fn from(value: String) -> Self {
        LaunchValue::Text(value)
    }
}

impl From<&str> for LaunchValue {
    fn from(value: &str) -> Self {
        LaunchValue::Text(value.to_string())
    }
}

/// Ordered flag -> value mapping passed to the traversal tool
///
/// `None` marks a flag as absent. Insertion order is the argument order.
///
/// # Example
/// ```
/// use natmon::supervisor::LaunchConfig;
///
/// let mut config = LaunchConfig::new();
/// config
///     .set("-p", 8080u16)
///     .set("-u", true)
///     .set("-r", false)
///     .set_opt("-s", None::<String>);
///
/// assert_eq!(config.to_args(), vec!["-p", "8080", "-u"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LaunchConfig {
    entries: IndexMap<String, Option<LaunchValue>>,
}

impl LaunchConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `flag`, keeping its original position if already present
    pub fn set(&mut self, flag: impl Into<String>, value: impl Into<LaunchValue>) -> &mut Self {
        self.entries.insert(flag.into(), Some(value.into()));
        self
    }

    /// Set `flag` from an optional value; `None` records it as absent
    pub fn set_opt<V: Into<LaunchValue>>(
        &mut self,
        flag: impl Into<String>,
        value: Option<V>,
    ) -> &mut Self {
        self.entries.insert(flag.into(), value.map(Into::into));
        self
    }

    /// Value of `flag`; `None` if missing or absent
    pub fn get(&self, flag: &str) -> Option<&LaunchValue> {
        self.entries.get(flag).and_then(Option::as_ref)
    }

    /// Whether no flags are configured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&LaunchValue>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Command-line arguments for the configured flags
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for (flag, value) in &self.entries {
            match value {
                Some(LaunchValue::Flag(true)) => args.push(flag.clone()),
                Some(LaunchValue::Int(n)) => {
                    args.push(flag.clone());
                    args.push(n.to_string());
                }
                Some(LaunchValue::Text(s)) => {
                    args.push(flag.clone());
                    args.push(s.clone());
                }
                Some(LaunchValue::Flag(false)) | None => {}
            }
        }
        args
    }
}

impl fmt::Display for LaunchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_args().join(" "))
    }
}

/// Fully resolved program and argument list for the child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable
    pub program: String,
    /// Arguments in order
    pub args: Vec<String>,
}

impl Invocation {
    /// Build the invocation from settings and launch flags
    ///
    /// Settings' `program_args` come first, then the launch flags.
    pub fn build(settings: &MonitorSettings, launch: &LaunchConfig) -> Self {
        let mut args = settings.program_args.clone();
        args.extend(launch.to_args());
        Self {
            program: settings.program.clone(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
