//! IP denylist with CIDR ranges

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::PolicyError;

/// A CIDR range such as `10.0.0.0/8` or `2001:db8::/32`.
///
/// A bare address is read as a single-host range (`/32` or `/128`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    pub fn new(network: IpAddr, prefix_len: u8) -> Result<Self, PolicyError> {
        let max = Self::max_prefix(&network);
        if prefix_len > max {
            return Err(PolicyError::InvalidCidr(format!("{}/{}", network, prefix_len)));
        }
        Ok(Self { network, prefix_len })
    }

    fn max_prefix(ip: &IpAddr) -> u8 {
        match ip {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    /// Whether `ip` falls inside this range. An IPv4-mapped IPv6 address
    /// (`::ffff:a.b.c.d`) is matched as the IPv4 address it carries.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, canonical(ip)) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = prefix_mask_u32(self.prefix_len);
                (u32::from(net) & mask) == (u32::from(addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = prefix_mask_u128(self.prefix_len);
                (u128::from(net) & mask) == (u128::from(addr) & mask)
            }
            _ => false,
        }
    }
}

fn canonical(ip: &IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(*ip, IpAddr::V4),
        IpAddr::V4(_) => *ip,
    }
}

fn prefix_mask_u32(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len as u32)
    }
}

fn prefix_mask_u128(prefix_len: u8) -> u128 {
    if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - prefix_len as u32)
    }
}

impl FromStr for CidrRange {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || PolicyError::InvalidCidr(s.to_string());

        match s.split_once('/') {
            Some((addr, len)) => {
                let network: IpAddr = addr.parse().map_err(|_| invalid())?;
                let prefix_len: u8 = len.parse().map_err(|_| invalid())?;
                Self::new(network, prefix_len)
            }
            None => {
                let network: IpAddr = s.parse().map_err(|_| invalid())?;
                let prefix_len = Self::max_prefix(&network);
                Self::new(network, prefix_len)
            }
        }
    }
}

impl TryFrom<String> for CidrRange {
    type Error = PolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CidrRange> for String {
    fn from(range: CidrRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for CidrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Denylisted origin ranges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpDenylist {
    #[serde(default)]
    pub ranges: Vec<CidrRange>,
}

impl IpDenylist {
    pub fn new(ranges: Vec<CidrRange>) -> Self {
        Self { ranges }
    }

    /// Build from textual ranges, failing on the first malformed one
    pub fn parse<'a>(ranges: impl IntoIterator<Item = &'a str>) -> Result<Self, PolicyError> {
        let ranges = ranges.into_iter().map(str::parse).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ranges })
    }

    /// First range that matches `ip`, if any
    pub fn matching(&self, ip: &IpAddr) -> Option<&CidrRange> {
        self.ranges.iter().find(|range| range.contains(ip))
    }

    pub fn is_denied(&self, ip: &IpAddr) -> bool {
        self.matching(ip).is_some()
    }
}
