//! Public/private address classification
//!
//! Decides whether an address reported by the traversal tool can be published
//! as the outer endpoint. Only a fixed set of IPv4 blocks counts as private;
//! every IPv6 address is treated as public.

use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// Shared address space (RFC 6598): 100.64.0.0/10
const SHARED_RANGE_START: u32 = 0x64400000; // 100.64.0.0
const SHARED_RANGE_END: u32 = 0x647FFFFF; // 100.127.255.255

/// Classification of an IP literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressClass {
    /// Routable on the internet
    Public,
    /// Private, link-local or loopback
    Private,
}

impl AddressClass {
    /// Whether the address may be published as an outer endpoint
    pub fn is_public(&self) -> bool {
        matches!(self, AddressClass::Public)
    }
}

/// Classify an IP address as public or private
///
/// Private ranges are 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16,
/// 169.254.0.0/16 and 127.0.0.0/8. Anything else is public.
///
/// # Example
///
/// ```
/// use std::net::IpAddr;
/// use natmon::connectivity::{classify, AddressClass};
///
/// let ip: IpAddr = "192.168.1.5".parse().unwrap();
/// assert_eq!(classify(ip), AddressClass::Private);
///
/// let ip: IpAddr = "203.0.113.9".parse().unwrap();
/// assert_eq!(classify(ip), AddressClass::Public);
/// ```
pub fn classify(ip: IpAddr) -> AddressClass {
    match ip {
        IpAddr::V4(ipv4) if is_private_ipv4(ipv4) => AddressClass::Private,
        IpAddr::V4(_) => AddressClass::Public,
        // No IPv6 private ranges are recognized
        IpAddr::V6(_) => AddressClass::Public,
    }
}

/// Classify a textual IP literal
///
/// Returns `None` when the literal does not parse as an IP address.
pub fn classify_literal(literal: &str) -> Option<AddressClass> {
    match literal.parse::<IpAddr>() {
        Ok(ip) => Some(classify(ip)),
        Err(_) => {
            debug!("Not an IP literal: {}", literal);
            None
        }
    }
}

/// Check whether an address lies in the carrier-grade NAT block 100.64.0.0/10
///
/// Such an address classifies as public but is not reachable from the
/// internet, which usually means another NAT sits upstream.
pub fn is_shared_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let ip_u32 = u32::from(ipv4);
            (SHARED_RANGE_START..=SHARED_RANGE_END).contains(&ip_u32)
        }
        IpAddr::V6(_) => false,
    }
}

fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    match a {
        10 | 127 => true,
        172 => (16..=31).contains(&b),
        192 => b == 168,
        169 => b == 254,
        _ => false,
    }
}
