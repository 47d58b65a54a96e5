//! IP addresses and route prefixes.
//!
//! [`IpPrefix`] always stores the network address: host bits below the mask
//! are cleared on construction, so `10.0.0.7/24` and `10.0.0.0/24` are the
//! same route key.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IPv4 or IPv6 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpAddress {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl IpAddress {
    pub const fn v4(a: u8, b: u8, c: u8, d: u8) -> Self {
        IpAddress::V4(Ipv4Addr::new(a, b, c, d))
    }

    pub const fn is_ipv4(&self) -> bool {
        matches!(self, IpAddress::V4(_))
    }

    pub const fn is_ipv6(&self) -> bool {
        matches!(self, IpAddress::V6(_))
    }

    /// Widest valid mask for this family (32 or 128).
    pub const fn max_prefix_len(&self) -> u8 {
        match self {
            IpAddress::V4(_) => 32,
            IpAddress::V6(_) => 128,
        }
    }

    /// True for IPv6 fe80::/10 and IPv4 169.254.0.0/16.
    pub fn is_link_local(&self) -> bool {
        match self {
            IpAddress::V4(addr) => addr.is_link_local(),
            IpAddress::V6(addr) => (addr.segments()[0] & 0xffc0) == 0xfe80,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        match self {
            IpAddress::V4(addr) => addr.is_unspecified(),
            IpAddress::V6(addr) => addr.is_unspecified(),
        }
    }

    fn to_bits(self) -> u128 {
        match self {
            IpAddress::V4(addr) => u128::from(u32::from(addr)),
            IpAddress::V6(addr) => u128::from(addr),
        }
    }

    fn with_bits(self, bits: u128) -> Self {
        match self {
            // Only the low 32 bits are ever set for a v4 address.
            IpAddress::V4(_) => IpAddress::V4(Ipv4Addr::from(bits as u32)),
            IpAddress::V6(_) => IpAddress::V6(Ipv6Addr::from(bits)),
        }
    }

    fn mask_to(self, prefix_len: u8) -> Self {
        let width = u32::from(self.max_prefix_len());
        let host_bits = width - u32::from(prefix_len);
        let mask = if host_bits >= 128 {
            0
        } else {
            !0u128 << host_bits
        };
        self.with_bits(self.to_bits() & mask)
    }
}

impl Default for IpAddress {
    /// 0.0.0.0
    fn default() -> Self {
        IpAddress::V4(Ipv4Addr::UNSPECIFIED)
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpAddress::V4(addr) => addr.fmt(f),
            IpAddress::V6(addr) => addr.fmt(f),
        }
    }
}

impl FromStr for IpAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>()
            .map(IpAddress::from)
            .map_err(|_| ParseError::InvalidIpAddress(s.to_string()))
    }
}

impl From<IpAddr> for IpAddress {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => IpAddress::V4(v4),
            IpAddr::V6(v6) => IpAddress::V6(v6),
        }
    }
}

impl From<Ipv4Addr> for IpAddress {
    fn from(addr: Ipv4Addr) -> Self {
        IpAddress::V4(addr)
    }
}

impl From<Ipv6Addr> for IpAddress {
    fn from(addr: Ipv6Addr) -> Self {
        IpAddress::V6(addr)
    }
}

/// A route destination in CIDR form.
///
/// Ordering sorts by family, then network address, then mask length. The
/// default value is the IPv4 default route.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    network: IpAddress,
    prefix_len: u8,
}

impl IpPrefix {
    /// Builds a prefix, clearing any host bits in `address`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidIpPrefix`] if `prefix_len` is wider than
    /// the address family allows.
    pub fn new(address: IpAddress, prefix_len: u8) -> Result<Self, ParseError> {
        let max_len = address.max_prefix_len();
        if prefix_len > max_len {
            return Err(ParseError::InvalidIpPrefix(format!(
                "{}/{}: mask length exceeds {}",
                address, prefix_len, max_len
            )));
        }

        Ok(IpPrefix {
            network: address.mask_to(prefix_len),
            prefix_len,
        })
    }

    /// The /32 or /128 prefix covering exactly `address`.
    pub fn host(address: IpAddress) -> Self {
        IpPrefix {
            network: address,
            prefix_len: address.max_prefix_len(),
        }
    }

    pub const fn network(&self) -> &IpAddress {
        &self.network
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub const fn is_ipv4(&self) -> bool {
        self.network.is_ipv4()
    }

    pub const fn is_host_route(&self) -> bool {
        self.prefix_len == self.network.max_prefix_len()
    }

    pub fn is_default(&self) -> bool {
        self.prefix_len == 0
    }

    /// True if `addr` falls inside this prefix. Always false across families.
    pub fn contains(&self, addr: &IpAddress) -> bool {
        if addr.is_ipv4() != self.network.is_ipv4() {
            return false;
        }
        addr.mask_to(self.prefix_len) == self.network
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;

        let address: IpAddress = addr_str.parse()?;
        let prefix_len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;

        IpPrefix::new(address, prefix_len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> String {
        prefix.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_families() {
        let v4: IpAddress = "10.0.0.1".parse().unwrap();
        assert!(v4.is_ipv4());
        assert_eq!(v4, IpAddress::v4(10, 0, 0, 1));

        let v6: IpAddress = "2001:db8::1".parse().unwrap();
        assert!(v6.is_ipv6());
        assert_eq!(v6.max_prefix_len(), 128);

        assert!("10.0.0".parse::<IpAddress>().is_err());
    }

    #[test]
    fn test_link_local() {
        assert!("fe80::1".parse::<IpAddress>().unwrap().is_link_local());
        assert!("169.254.3.4".parse::<IpAddress>().unwrap().is_link_local());
        assert!(!"2001:db8::1".parse::<IpAddress>().unwrap().is_link_local());
    }

    #[test]
    fn test_prefix_normalises_host_bits() {
        let prefix: IpPrefix = "10.0.0.77/24".parse().unwrap();
        assert_eq!(prefix.network(), &IpAddress::v4(10, 0, 0, 0));
        assert_eq!(prefix, "10.0.0.0/24".parse().unwrap());

        let v6: IpPrefix = "2001:db8:1:2::5/32".parse().unwrap();
        assert_eq!(v6.to_string(), "2001:db8::/32");
    }

    #[test]
    fn test_default_and_host() {
        let default_v4: IpPrefix = "192.0.2.1/0".parse().unwrap();
        assert!(default_v4.is_default());
        assert_eq!(default_v4.to_string(), "0.0.0.0/0");

        let default_v6: IpPrefix = "::/0".parse().unwrap();
        assert!(default_v6.is_default());

        let host = IpPrefix::host("fe80::1".parse().unwrap());
        assert!(host.is_host_route());
        assert_eq!(host.prefix_len(), 128);
    }

    #[test]
    fn test_contains() {
        let prefix: IpPrefix = "10.1.0.0/16".parse().unwrap();
        assert!(prefix.contains(&IpAddress::v4(10, 1, 200, 3)));
        assert!(!prefix.contains(&IpAddress::v4(10, 2, 0, 1)));
        assert!(!prefix.contains(&"::1".parse().unwrap()));

        let everything: IpPrefix = "0.0.0.0/0".parse().unwrap();
        assert!(everything.contains(&IpAddress::v4(8, 8, 8, 8)));
    }

    #[test]
    fn test_invalid_prefix() {
        assert!("10.0.0.0/33".parse::<IpPrefix>().is_err());
        assert!("2001:db8::/129".parse::<IpPrefix>().is_err());
        assert!("10.0.0.0".parse::<IpPrefix>().is_err());
        assert!("10.0.0.0/x".parse::<IpPrefix>().is_err());
    }

    #[test]
    fn test_ordering_groups_by_network() {
        let mut prefixes: Vec<IpPrefix> = ["10.0.1.0/24", "10.0.0.0/8", "10.0.0.0/24"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        prefixes.sort();
        let rendered: Vec<String> = prefixes.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["10.0.0.0/8", "10.0.0.0/24", "10.0.1.0/24"]);
    }
}
