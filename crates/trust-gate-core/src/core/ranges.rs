// crates/trust-gate-core/src/core/ranges.rs
// ============================================================================
// Module: Trust Gate IP Ranges
// Description: CIDR range parsing and containment.
// Purpose: Represent edge-provider published ranges with strict validation.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! [`IpRange`] is a normalized CIDR block. Parsing is strict: host bits must
//! be zero and the prefix must fit the address family, so two equal ranges
//! always have one textual form. Containment checks map IPv4-mapped IPv6
//! addresses back to IPv4 before comparing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing CIDR ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// Address portion is not a valid IP address.
    #[error("invalid address in range: {0}")]
    InvalidAddress(String),
    /// Prefix length is not a number or exceeds the family width.
    #[error("invalid prefix length in range: {0}")]
    InvalidPrefix(String),
    /// Address has bits set beyond the prefix length.
    #[error("range has host bits set: {0}")]
    HostBitsSet(String),
}

// ============================================================================
// SECTION: IP Range
// ============================================================================

/// Normalized CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpRange {
    /// Network address with host bits cleared.
    network: IpAddr,
    /// Prefix length in bits.
    prefix_len: u8,
}

impl IpRange {
    /// Creates a range from a network address and prefix length.
    ///
    /// # Errors
    ///
    /// Returns [`RangeError`] when the prefix exceeds the family width or
    /// host bits are set.
    pub fn new(network: IpAddr, prefix_len: u8) -> Result<Self, RangeError> {
        let width = family_width(network);
        if prefix_len > width {
            return Err(RangeError::InvalidPrefix(format!("{network}/{prefix_len}")));
        }
        if mask_address(network, prefix_len) != network {
            return Err(RangeError::HostBitsSet(format!("{network}/{prefix_len}")));
        }
        Ok(Self {
            network,
            prefix_len,
        })
    }

    /// Returns the network address.
    #[must_use]
    pub const fn network(&self) -> IpAddr {
        self.network
    }

    /// Returns the prefix length.
    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns true for IPv4 ranges.
    #[must_use]
    pub const fn is_ipv4(&self) -> bool {
        self.network.is_ipv4()
    }

    /// Returns true when `addr` falls inside this range.
    #[must_use]
    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = addr.to_canonical();
        if addr.is_ipv4() != self.network.is_ipv4() {
            return false;
        }
        mask_address(addr, self.prefix_len) == self.network
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

impl FromStr for IpRange {
    type Err = RangeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (addr_part, prefix_part) = match trimmed.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (trimmed, None),
        };
        let network = IpAddr::from_str(addr_part)
            .map_err(|_| RangeError::InvalidAddress(value.to_string()))?;
        let prefix_len = match prefix_part {
            Some(prefix) => {
                if prefix.is_empty() || !prefix.bytes().all(|byte| byte.is_ascii_digit()) {
                    return Err(RangeError::InvalidPrefix(value.to_string()));
                }
                prefix.parse::<u8>().map_err(|_| RangeError::InvalidPrefix(value.to_string()))?
            }
            None => family_width(network),
        };
        Self::new(network, prefix_len)
    }
}

impl TryFrom<String> for IpRange {
    type Error = RangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<IpRange> for String {
    fn from(value: IpRange) -> Self {
        value.to_string()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the bit width of the address family.
const fn family_width(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Clears every bit beyond `prefix_len`.
fn mask_address(addr: IpAddr, prefix_len: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = if prefix_len == 0 { 0 } else { u32::MAX << (32 - u32::from(prefix_len)) };
            IpAddr::V4(Ipv4Addr::from(bits & mask))
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = if prefix_len == 0 { 0 } else { u128::MAX << (128 - u32::from(prefix_len)) };
            IpAddr::V6(Ipv6Addr::from(bits & mask))
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
