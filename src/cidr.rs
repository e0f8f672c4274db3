//! Address ranges in CIDR notation.
//!
//! [`AddressRange`] is a thin wrapper over [`ipnet::IpNet`] that guarantees
//! only network bits are set in the base address. Both IPv4 and IPv6 are
//! supported; ranges of different families never overlap.
//!
//! # Example
//!
//! ```
//! use dx_provider::cidr::AddressRange;
//!
//! let vpc: AddressRange = "10.0.0.0/16".parse().unwrap();
//! let subnet = vpc.subnet(24, 1).unwrap();
//! assert_eq!(subnet.to_string(), "10.0.1.0/24");
//! assert!(vpc.contains(&subnet));
//! ```

use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::{AddrParseError, IpNet, PrefixLenError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when building an [`AddressRange`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The text is not of the form `address/prefix-length`.
    #[error("invalid CIDR '{input}': {source}")]
    Malformed {
        /// The rejected input.
        input: String,
        /// The underlying parser error.
        #[source]
        source: AddrParseError,
    },

    /// The prefix length does not fit the address family.
    #[error("prefix length {len} is invalid for {address}, max is {max}")]
    PrefixTooLong {
        /// The base address.
        address: IpAddr,
        /// The rejected prefix length.
        len: u8,
        /// The family width (32 or 128).
        max: u8,
    },
}

/// A contiguous block of addresses: a base address plus a prefix length.
///
/// The base address is always the network address for the prefix length;
/// constructors zero any host bits they are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AddressRange(IpNet);

impl AddressRange {
    /// Build a range from a base address and prefix length.
    ///
    /// Host bits in `address` are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError::PrefixTooLong`] if `prefix_len` is wider than the
    /// address family.
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, RangeError> {
        let net = IpNet::new(address, prefix_len).map_err(|_: PrefixLenError| {
            RangeError::PrefixTooLong {
                address,
                len: prefix_len,
                max: family_width(&address),
            }
        })?;
        Ok(Self(net.trunc()))
    }

    /// The base (network) address.
    pub fn network(&self) -> IpAddr {
        self.0.network()
    }

    /// The prefix length.
    pub fn prefix_len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// The largest prefix length of this range's family (32 or 128).
    pub fn max_prefix_len(&self) -> u8 {
        self.0.max_prefix_len()
    }

    /// Whether this is an IPv4 range.
    pub fn is_ipv4(&self) -> bool {
        matches!(self.0, IpNet::V4(_))
    }

    /// Whether `address` falls inside this range.
    pub fn contains_addr(&self, address: IpAddr) -> bool {
        self.0.contains(&address)
    }

    /// Whether `other` lies entirely inside this range.
    pub fn contains(&self, other: &AddressRange) -> bool {
        self.0.contains(&other.0)
    }

    /// Whether the two ranges share at least one address.
    ///
    /// CIDR blocks are either nested or disjoint, so it is enough to test
    /// whether either base address falls within the other block.
    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.contains_addr(other.network()) || other.contains_addr(self.network())
    }

    /// Number of `/new_prefix_len` subnets this range splits into.
    ///
    /// Returns `None` if `new_prefix_len` is shorter than this range's prefix,
    /// wider than the family, or the count does not fit in a `u128`.
    pub fn subnet_count(&self, new_prefix_len: u8) -> Option<u128> {
        if new_prefix_len < self.prefix_len() || new_prefix_len > self.max_prefix_len() {
            return None;
        }
        1u128.checked_shl(u32::from(new_prefix_len - self.prefix_len()))
    }

    /// The `index`-th `/new_prefix_len` subnet of this range, counting from
    /// the lowest address.
    pub fn subnet(&self, new_prefix_len: u8, index: u128) -> Option<AddressRange> {
        if new_prefix_len < self.prefix_len() || new_prefix_len > self.max_prefix_len() {
            return None;
        }
        // A `None` count means 2^128 subnets, so every index is in bounds.
        if let Some(count) = self.subnet_count(new_prefix_len) {
            if index >= count {
                return None;
            }
        }
        if new_prefix_len == self.prefix_len() {
            return Some(*self);
        }
        let size = self.block_size_at(new_prefix_len)?;
        let first = self.first().checked_add(index.checked_mul(size)?)?;
        AddressRange::from_bits(first, new_prefix_len, self.is_ipv4())
    }

    /// The base address as an integer.
    pub(crate) fn first(&self) -> u128 {
        addr_to_bits(self.network())
    }

    /// The last address in the range as an integer.
    pub(crate) fn last(&self) -> u128 {
        self.first() | host_mask(self.prefix_len(), self.max_prefix_len())
    }

    /// Size of a `/prefix_len` block in this range's family, `None` for a
    /// whole IPv6 space (2^128 addresses).
    pub(crate) fn block_size_at(&self, prefix_len: u8) -> Option<u128> {
        1u128.checked_shl(u32::from(self.max_prefix_len() - prefix_len))
    }

    /// Rebuild a range from an integer base address.
    pub(crate) fn from_bits(bits: u128, prefix_len: u8, ipv4: bool) -> Option<AddressRange> {
        let address = if ipv4 {
            IpAddr::V4(Ipv4Addr::from(u32::try_from(bits).ok()?))
        } else {
            IpAddr::V6(Ipv6Addr::from(bits))
        };
        AddressRange::new(address, prefix_len).ok()
    }
}

impl FromStr for AddressRange {
    type Err = RangeError;

    /// Parse `address/prefix-length`, clearing any host bits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let net: IpNet = trimmed.parse().map_err(|source| RangeError::Malformed {
            input: trimmed.to_string(),
            source,
        })?;
        Ok(Self(net.trunc()))
    }
}

impl TryFrom<String> for AddressRange {
    type Error = RangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AddressRange> for String {
    fn from(value: AddressRange) -> Self {
        value.to_string()
    }
}

impl From<AddressRange> for IpNet {
    fn from(value: AddressRange) -> Self {
        value.0
    }
}

impl From<IpNet> for AddressRange {
    fn from(value: IpNet) -> Self {
        Self(value.trunc())
    }
}

impl Display for AddressRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn family_width(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn addr_to_bits(address: IpAddr) -> u128 {
    match address {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn host_mask(prefix_len: u8, width: u8) -> u128 {
    let host_bits = u32::from(width - prefix_len);
    1u128
        .checked_shl(host_bits)
        .map_or(u128::MAX, |size| size - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(s: &str) -> AddressRange {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let r = range("10.0.0.0/16");
        assert_eq!(r.to_string(), "10.0.0.0/16");
        assert_eq!(r.prefix_len(), 16);
        assert_eq!(r.max_prefix_len(), 32);
        assert!(r.is_ipv4());

        let v6 = range("fd00:10::/48");
        assert_eq!(v6.to_string(), "fd00:10::/48");
        assert!(!v6.is_ipv4());
    }

    #[test]
    fn test_parse_clears_host_bits() {
        let r = range(" 10.0.0.5/24 ");
        assert_eq!(r.to_string(), "10.0.0.0/24");
        assert_eq!(r.network(), "10.0.0.0".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "10.0.0.0", "10.0.0.0/33", "not-a-cidr", "10.0.0/24"] {
            let err = input.parse::<AddressRange>().unwrap_err();
            assert!(matches!(err, RangeError::Malformed { .. }), "{input}");
        }
    }

    #[test]
    fn test_new_validates_prefix_len() {
        let addr: IpAddr = "10.1.2.3".parse().unwrap();
        assert_eq!(
            AddressRange::new(addr, 16).unwrap().to_string(),
            "10.1.0.0/16"
        );

        let err = AddressRange::new(addr, 40).unwrap_err();
        assert_eq!(
            err,
            RangeError::PrefixTooLong {
                address: addr,
                len: 40,
                max: 32
            }
        );
        assert_eq!(
            err.to_string(),
            "prefix length 40 is invalid for 10.1.2.3, max is 32"
        );
    }

    #[test]
    fn test_overlaps_checks_both_directions() {
        let parent = range("10.0.0.0/16");
        let child = range("10.0.3.0/24");
        let sibling = range("10.1.0.0/16");

        assert!(parent.overlaps(&child));
        assert!(child.overlaps(&parent));
        assert!(!parent.overlaps(&sibling));
        assert!(parent.overlaps(&parent));
    }

    #[test]
    fn test_overlaps_ignores_other_family() {
        let v4 = range("0.0.0.0/0");
        let v6 = range("::/0");
        assert!(!v4.overlaps(&v6));
        assert!(!v6.overlaps(&v4));
    }

    #[test]
    fn test_contains() {
        let parent = range("192.168.0.0/30");
        assert!(parent.contains(&range("192.168.0.2/31")));
        assert!(!parent.contains(&range("192.168.0.0/29")));
        assert!(parent.contains_addr("192.168.0.3".parse().unwrap()));
        assert!(!parent.contains_addr("192.168.0.4".parse().unwrap()));
    }

    #[test]
    fn test_subnet_count() {
        let r = range("10.0.0.0/16");
        assert_eq!(r.subnet_count(24), Some(256));
        assert_eq!(r.subnet_count(16), Some(1));
        assert_eq!(r.subnet_count(8), None);
        assert_eq!(r.subnet_count(33), None);

        let everything = range("::/0");
        assert_eq!(everything.subnet_count(127), Some(1u128 << 127));
        assert_eq!(everything.subnet_count(128), None);
    }

    #[test]
    fn test_subnet_by_index() {
        let r = range("10.0.0.0/24");
        assert_eq!(r.subnet(25, 0), Some(range("10.0.0.0/25")));
        assert_eq!(r.subnet(25, 1), Some(range("10.0.0.128/25")));
        assert_eq!(r.subnet(25, 2), None);
        assert_eq!(r.subnet(32, 255), Some(range("10.0.0.255/32")));

        let v6 = range("fd00::/32");
        assert_eq!(v6.subnet(64, 3), Some(range("fd00:0:0:3::/64")));
    }

    #[test]
    fn test_first_and_last() {
        let r = range("10.0.1.0/24");
        assert_eq!(r.first(), u128::from(u32::from(Ipv4Addr::new(10, 0, 1, 0))));
        assert_eq!(r.last(), u128::from(u32::from(Ipv4Addr::new(10, 0, 1, 255))));

        let everything = range("::/0");
        assert_eq!(everything.first(), 0);
        assert_eq!(everything.last(), u128::MAX);
    }

    #[test]
    fn test_serde_as_string() {
        let r = range("10.0.1.0/24");
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json, serde_json::json!("10.0.1.0/24"));

        let parsed: Vec<AddressRange> =
            serde_json::from_value(serde_json::json!(["10.0.0.0/16", "fd00::/8"])).unwrap();
        assert_eq!(parsed, vec![range("10.0.0.0/16"), range("fd00::/8")]);

        assert!(serde_json::from_value::<AddressRange>(serde_json::json!("bogus")).is_err());
    }
}
