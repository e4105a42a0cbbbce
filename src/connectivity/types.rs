//! Common types for connectivity module

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Transport protocol of a reported mapping
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP mapping (the traversal tool's default)
    #[default]
    Tcp,
    /// UDP mapping
    Udp,
}

impl Protocol {
    /// Lowercase tag as it appears in `tcp://` / `udp://` URLs
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An IP address and port pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    /// IP address
    pub ip: IpAddr,
    /// Port, always in 1..=65535
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

/// Local side of a paired `<inner> <--natter--> <outer>` announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerMapping {
    /// Protocol tag taken from the announcement
    pub protocol: Protocol,
    /// Local endpoint
    pub endpoint: Endpoint,
}

/// Structured connectivity fact extracted from one output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityFact {
    /// Public endpoint; its address always classified public
    pub outer: Endpoint,
    /// Protocol, when the matching rule names one
    pub protocol: Option<Protocol>,
    /// Local endpoint paired with `outer`, if the line carried one
    pub inner: Option<Endpoint>,
}

impl ConnectivityFact {
    /// Create a fact carrying only a public endpoint
    pub fn outer(outer: Endpoint) -> Self {
        Self {
            outer,
            protocol: None,
            inner: None,
        }
    }

    /// Merge the paired local endpoint into this fact
    pub fn with_inner(mut self, inner: InnerMapping) -> Self {
        self.protocol = Some(inner.protocol);
        self.inner = Some(inner.endpoint);
        self
    }
}
