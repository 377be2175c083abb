//! Network address helpers
//!
//! `Prefix` is an IP address with a prefix length (`10.0.0.1/24`). The address
//! part keeps its host bits; use `network()` to mask them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// Errors parsing a prefix.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrefixError {
    /// Address part is not an IP address
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// Prefix length is not a number or out of range for the family
    #[error("invalid prefix length in {0:?}")]
    InvalidLength(String),
}

/// IP prefix in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Prefix {
    addr: IpAddr,
    len: u8,
}

impl Prefix {
    /// Creates a prefix, checking the length against the address family.
    pub fn new(addr: IpAddr, len: u8) -> Result<Self, PrefixError> {
        if len > max_len(&addr) {
            return Err(PrefixError::InvalidLength(format!("{}/{}", addr, len)));
        }
        Ok(Self { addr, len })
    }

    /// Single-address prefix (`/32` or `/128`).
    pub fn host(addr: IpAddr) -> Self {
        Self {
            len: max_len(&addr),
            addr,
        }
    }

    /// Address part, including host bits.
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length in bits.
    pub fn len(&self) -> u8 {
        self.len
    }

    /// True for `/0` prefixes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True for IPv4 prefixes.
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// The prefix with host bits cleared.
    pub fn network(&self) -> Self {
        let bits = to_bits(self.addr) & mask(&self.addr, self.len);
        Self {
            addr: from_bits(&self.addr, bits),
            len: self.len,
        }
    }

    /// Whether `ip` falls inside the prefix.
    pub fn contains(&self, ip: IpAddr) -> bool {
        if ip.is_ipv4() != self.addr.is_ipv4() {
            return false;
        }
        let m = mask(&self.addr, self.len);
        to_bits(ip) & m == to_bits(self.addr) & m
    }

    /// Whether two prefixes share at least one address.
    pub fn overlaps(&self, other: &Prefix) -> bool {
        self.contains(other.network().addr) || other.contains(self.network().addr)
    }

    /// The `n`-th address of the network (0 is the network address).
    pub fn nth(&self, n: u128) -> Option<IpAddr> {
        let host_bits = u32::from(max_len(&self.addr) - self.len);
        if host_bits < 128 && n >= (1u128 << host_bits) {
            return None;
        }
        let base = to_bits(self.network().addr);
        Some(from_bits(&self.addr, base.checked_add(n)?))
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl FromStr for Prefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| PrefixError::InvalidLength(s.to_string()))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| PrefixError::InvalidAddress(s.to_string()))?;
        let len: u8 = len
            .parse()
            .map_err(|_| PrefixError::InvalidLength(s.to_string()))?;
        Self::new(addr, len)
    }
}

impl Serialize for Prefix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Prefix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses either a bare IP address (as a host prefix) or a CIDR prefix.
pub fn parse_ip_or_prefix(s: &str) -> Result<Prefix, PrefixError> {
    if s.contains('/') {
        s.parse()
    } else {
        s.parse::<IpAddr>()
            .map(Prefix::host)
            .map_err(|_| PrefixError::InvalidAddress(s.to_string()))
    }
}

/// Validates an interface address: a prefix with a specified address.
pub fn validate_address(s: &str) -> Result<Prefix, String> {
    let prefix: Prefix = s
        .parse()
        .map_err(|e| format!("address {:?} is invalid: {}", s, e))?;
    if prefix.addr().is_unspecified() {
        return Err(format!("address {:?} is unspecified", s));
    }
    Ok(prefix)
}

fn max_len(addr: &IpAddr) -> u8 {
    if addr.is_ipv4() { 32 } else { 128 }
}

fn to_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn from_bits(family: &IpAddr, bits: u128) -> IpAddr {
    match family {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from((bits & u128::from(u32::MAX)) as u32)),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(bits)),
    }
}

fn mask(family: &IpAddr, len: u8) -> u128 {
    let width = u32::from(max_len(family));
    let len = u32::from(len);
    if len == 0 {
        return 0;
    }
    let full: u128 = if width == 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    };
    full & !((1u128 << (width - len)) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let prefix: Prefix = "10.244.3.4/24".parse().unwrap();
        assert_eq!(prefix.to_string(), "10.244.3.4/24");
        assert_eq!(prefix.network().to_string(), "10.244.3.0/24");
    }

    #[test]
    fn test_contains() {
        let prefix: Prefix = "10.244.0.0/16".parse().unwrap();
        assert!(prefix.contains("10.244.3.4".parse().unwrap()));
        assert!(!prefix.contains("10.245.0.1".parse().unwrap()));
        assert!(!prefix.contains("fd00::1".parse().unwrap()));
    }

    #[test]
    fn test_nth() {
        let prefix: Prefix = "10.96.0.0/12".parse().unwrap();
        assert_eq!(prefix.nth(10), Some("10.96.0.10".parse().unwrap()));
        let v6: Prefix = "fd00:10:96::/112".parse().unwrap();
        assert_eq!(v6.nth(10), Some("fd00:10:96::a".parse().unwrap()));
        let tiny: Prefix = "10.0.0.0/30".parse().unwrap();
        assert_eq!(tiny.nth(4), None);
    }

    #[test]
    fn test_invalid() {
        assert!("10.0.0.0/33".parse::<Prefix>().is_err());
        assert!("10.0.0.0".parse::<Prefix>().is_err());
        assert!("nope/8".parse::<Prefix>().is_err());
        assert!(validate_address("0.0.0.0/0").is_err());
    }

    #[test]
    fn test_overlaps() {
        let a: Prefix = "10.0.0.0/8".parse().unwrap();
        let b: Prefix = "10.1.0.0/16".parse().unwrap();
        let c: Prefix = "192.168.0.0/16".parse().unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_parse_ip_or_prefix() {
        assert_eq!(parse_ip_or_prefix("1.2.3.4").unwrap().len(), 32);
        assert_eq!(parse_ip_or_prefix("::1").unwrap().len(), 128);
        assert_eq!(parse_ip_or_prefix("10.0.0.0/8").unwrap().len(), 8);
    }
}
