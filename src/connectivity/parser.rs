//! Output line parser
//!
//! Extracts the public endpoint (and, when announced, the paired local
//! endpoint) from one line of traversal tool output. Rules are evaluated in a
//! fixed priority order; within a rule the leftmost accepted match wins.

use super::classify::classify_literal;
use super::types::{ConnectivityFact, Endpoint, InnerMapping, Protocol};
use regex::{Captures, Regex};
use std::fmt;
use std::net::IpAddr;
use std::sync::OnceLock;
use tracing::debug;

/// Heartbeat lines the tool prints between events (`HH:MM:SS`)
static HEARTBEAT_REGEX: OnceLock<Regex> = OnceLock::new();

fn heartbeat_regex() -> &'static Regex {
    HEARTBEAT_REGEX
        .get_or_init(|| Regex::new(r"^\d{2}:\d{2}:\d{2}$").expect("static regex pattern is valid"))
}

/// Which announcement a rule recognizes, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// `tcp://inner <--natter--> tcp://outer`
    PairedTcp,
    /// `udp://inner <--natter--> udp://outer`
    PairedUdp,
    /// `Please check [ http://outer ]`
    CheckUrl,
    /// `WAN > outer [ OPEN ]`
    WanOpen,
    /// Any `a.b.c.d:port` token
    Generic,
}

impl RuleKind {
    /// Protocol implied by the rule itself
    pub fn protocol(&self) -> Option<Protocol> {
        match self {
            RuleKind::PairedTcp => Some(Protocol::Tcp),
            RuleKind::PairedUdp => Some(Protocol::Udp),
            _ => None,
        }
    }
}

/// A compiled matcher; its `ip` and `port` groups name the outer endpoint
struct Rule {
    kind: RuleKind,
    pattern: Regex,
}

impl Rule {
    fn new(kind: RuleKind, pattern: &str) -> Self {
        Self {
            kind,
            pattern: Regex::new(pattern).expect("static regex pattern is valid"),
        }
    }

    /// First match in the line whose endpoint passes validation
    fn first_accepted(&self, line: &str) -> Option<Endpoint> {
        self.pattern
            .captures_iter(line)
            .find_map(|caps| public_endpoint(&caps))
    }
}

/// Ordered rule-based parser for traversal tool output
///
/// Cheap to construct; the compiled patterns are shared.
///
/// # Example
///
/// ```
/// use natmon::connectivity::LineParser;
///
/// let parser = LineParser::new();
/// let fact = parser
///     .extract("tcp://192.168.1.5:40000 <--Natter--> tcp://203.0.113.9:51000")
///     .unwrap();
///
/// assert_eq!(fact.outer.to_string(), "203.0.113.9:51000");
/// assert_eq!(fact.inner.unwrap().to_string(), "192.168.1.5:40000");
/// ```
#[derive(Clone, Copy)]
pub struct LineParser {
    rules: &'static [Rule],
    inner_rules: &'static [(Protocol, Regex)],
}

static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
static INNER_RULES: OnceLock<Vec<(Protocol, Regex)>> = OnceLock::new();

const IPV4: &str = r"\d+\.\d+\.\d+\.\d+";

fn rules() -> &'static [Rule] {
    RULES.get_or_init(|| {
        vec![
            Rule::new(
                RuleKind::PairedTcp,
                &format!(r"(?i)tcp://{IPV4}:\d+\s*<--[a-z]+-->\s*tcp://(?P<ip>{IPV4}):(?P<port>\d+)"),
            ),
            Rule::new(
                RuleKind::PairedUdp,
                &format!(r"(?i)udp://{IPV4}:\d+\s*<--[a-z]+-->\s*udp://(?P<ip>{IPV4}):(?P<port>\d+)"),
            ),
            Rule::new(
                RuleKind::CheckUrl,
                &format!(r"(?i)check\s*\[\s*http://(?P<ip>{IPV4}):(?P<port>\d+)\s*\]"),
            ),
            Rule::new(
                RuleKind::WanOpen,
                &format!(r"(?i)WAN\s*>\s*(?P<ip>{IPV4}):(?P<port>\d+)\s*\[\s*OPEN\s*\]"),
            ),
            Rule::new(
                RuleKind::Generic,
                &format!(r"\b(?P<ip>{IPV4}):(?P<port>\d{{2,5}})\b"),
            ),
        ]
    })
}

fn inner_rules() -> &'static [(Protocol, Regex)] {
    INNER_RULES.get_or_init(|| {
        [Protocol::Tcp, Protocol::Udp]
            .into_iter()
            .map(|protocol| {
                let pattern = format!(
                    r"(?i){}://(?P<ip>{IPV4}):(?P<port>\d+)\s*<--[a-z]+-->",
                    protocol.as_str()
                );
                (
                    protocol,
                    Regex::new(&pattern).expect("static regex pattern is valid"),
                )
            })
            .collect()
    })
}

impl LineParser {
    /// Create a parser with the standard rule set
    pub fn new() -> Self {
        Self {
            rules: rules(),
            inner_rules: inner_rules(),
        }
    }

    /// Extract the public endpoint from a line
    ///
    /// Returns `None` for blank and heartbeat lines, and for lines where no
    /// rule produced a public address with a valid port.
    pub fn parse(&self, line: &str) -> Option<ConnectivityFact> {
        let line = line.trim();
        if is_heartbeat(line) {
            return None;
        }

        for rule in self.rules {
            if let Some(outer) = rule.first_accepted(line) {
                debug!("Rule {:?} matched outer endpoint {}", rule.kind, outer);
                let mut fact = ConnectivityFact::outer(outer);
                fact.protocol = rule.kind.protocol();
                return Some(fact);
            }
        }

        None
    }

    /// Recover the local side of a paired announcement
    ///
    /// TCP announcements are searched before UDP ones. The inner address is
    /// not classified; it is expected to be private.
    pub fn parse_inner(&self, line: &str) -> Option<InnerMapping> {
        self.inner_rules.iter().find_map(|(protocol, pattern)| {
            let caps = pattern.captures(line)?;
            let endpoint = endpoint_from(&caps)?;
            Some(InnerMapping {
                protocol: *protocol,
                endpoint,
            })
        })
    }

    /// Parse a line and merge in its paired local endpoint, if any
    pub fn extract(&self, line: &str) -> Option<ConnectivityFact> {
        let fact = self.parse(line)?;
        Some(match self.parse_inner(line) {
            Some(inner) => fact.with_inner(inner),
            None => fact,
        })
    }
}

impl fmt::Debug for LineParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineParser")
            .field("rules", &self.rules.iter().map(|r| r.kind).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a trimmed line carries no information (blank or `HH:MM:SS`)
pub fn is_heartbeat(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || heartbeat_regex().is_match(line)
}

/// Parse a port, accepting only 1..=65535
pub fn parse_port(text: &str) -> Option<u16> {
    match text.parse::<u32>() {
        Ok(port @ 1..=65535) => Some(port as u16),
        _ => None,
    }
}

fn endpoint_from(caps: &Captures<'_>) -> Option<Endpoint> {
    let ip: IpAddr = caps.name("ip")?.as_str().parse().ok()?;
    let port = parse_port(caps.name("port")?.as_str())?;
    Some(Endpoint::new(ip, port))
}

fn public_endpoint(caps: &Captures<'_>) -> Option<Endpoint> {
    let ip_text = caps.name("ip")?.as_str();
    let port_text = caps.name("port")?.as_str();

    let Some(port) = parse_port(port_text) else {
        debug!("Skipping {}:{} (port out of range)", ip_text, port_text);
        return None;
    };

    match classify_literal(ip_text) {
        Some(class) if class.is_public() => {}
        _ => {
            debug!("Skipping {}:{} (not a public address)", ip_text, port_text);
            return None;
        }
    }

    let ip = ip_text.parse().ok()?;
    Some(Endpoint::new(ip, port))
}
