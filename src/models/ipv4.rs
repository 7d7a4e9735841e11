//! IPv4 address and CIDR notation utilities.
//!
//! Provides the [`Ipv4`] struct for representing a network as address + prefix
//! length, the bit helpers used for subnet calculations, and [`partition`],
//! which subdivides a parent block into equally sized children.

use crate::error::CidrError;
use serde::de;
use serde::{Deserialize, Deserializer, Serialize};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Maximum length for an IPv4 subnet mask (32 bits).
pub const MAX_LENGTH: u8 = 32;

/// Convert a CIDR prefix length to a subnet mask as u32.
///
/// # Examples
/// ```
/// use vpc_topology::models::get_cidr_mask;
/// assert_eq!(get_cidr_mask(24).unwrap(), 0xFFFFFF00);
/// ```
pub fn get_cidr_mask(len: u8) -> Result<u32, CidrError> {
    if len > MAX_LENGTH {
        Err(CidrError::MaskTooLong(len))
    } else {
        let right_len = MAX_LENGTH - len;
        let all_bits = u32::MAX as u64;

        let mask = (all_bits >> right_len) << right_len;

        Ok(mask as u32)
    }
}

/// Get the network address for a given IP and prefix length.
pub fn cut_addr(addr: Ipv4Addr, len: u8) -> Result<Ipv4Addr, CidrError> {
    let mask = get_cidr_mask(len)?;
    Ok(Ipv4Addr::from(u32::from(addr) & mask))
}

/// The block of the same size directly after `ipv4`.
pub fn next_subnet_ipv4(ipv4: Ipv4) -> Result<Ipv4, CidrError> {
    Ok(Ipv4 {
        addr: ip_after_subnet(ipv4.addr, ipv4.mask)?,
        mask: ipv4.mask,
    })
}

/// Returns the IP address following the given subnet.
pub fn ip_after_subnet(addr: Ipv4Addr, cidr: u8) -> Result<Ipv4Addr, CidrError> {
    let subnet_size = block_size(cidr)?;
    let network_bits = u32::from(addr) & get_cidr_mask(cidr)?;
    let next_subnet_bits = (network_bits as u64) + subnet_size;
    u32::try_from(next_subnet_bits)
        .map(Ipv4Addr::from)
        .map_err(|_| CidrError::Overflow)
}

/// Calculate the broadcast address for a given IP and prefix length.
pub fn broadcast_addr(addr: Ipv4Addr, len: u8) -> Result<Ipv4Addr, CidrError> {
    let mask = get_cidr_mask(len)?;
    let network_bits = u32::from(addr) & mask;
    Ok(Ipv4Addr::from(network_bits | !mask))
}

/// Number of addresses in a block of the given prefix length.
pub fn block_size(len: u8) -> Result<u64, CidrError> {
    if len > MAX_LENGTH {
        Err(CidrError::MaskTooLong(len))
    } else {
        Ok(1u64 << (MAX_LENGTH - len))
    }
}

/// Calculate the number of usable host addresses in an AWS subnet.
///
/// AWS reserves 5 IP addresses per subnet (network, router, DNS, future use and
/// broadcast), and the smallest subnet it accepts is a /28.
pub fn num_aws_hosts(len: u8) -> Result<u64, CidrError> {
    if len > 28 {
        Err(CidrError::MaskTooLong(len))
    } else {
        Ok(block_size(len)? - 5)
    }
}

/// IPv4 network with CIDR notation support.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Copy, Clone, Hash)]
pub struct Ipv4 {
    /// The IPv4 address.
    pub addr: Ipv4Addr,
    /// The subnet mask length (0-32).
    pub mask: u8,
}

impl Serialize for Ipv4 {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Ipv4 {
    fn deserialize<D>(deserializer: D) -> Result<Ipv4, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ipv4::new(&s).map_err(de::Error::custom)
    }
}

impl FromStr for Ipv4 {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ipv4::new(s)
    }
}

impl Ipv4 {
    /// Create a new [`Ipv4`] from a CIDR string (e.g., "10.0.0.0/24").
    pub fn new(addr_cidr: &str) -> Result<Ipv4, CidrError> {
        let addr_cidr = addr_cidr.trim();
        let (addr, mask) = addr_cidr
            .split_once('/')
            .ok_or_else(|| CidrError::Parse(addr_cidr.to_string()))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| CidrError::Parse(addr_cidr.to_string()))?;
        let mask: u8 = mask
            .parse()
            .map_err(|_| CidrError::Parse(addr_cidr.to_string()))?;
        if mask > MAX_LENGTH {
            return Err(CidrError::MaskTooLong(mask));
        }
        Ok(Ipv4 { addr, mask })
    }

    /// The same block with host bits cleared.
    pub fn network(&self) -> Ipv4 {
        Ipv4 {
            addr: self.lo(),
            mask: self.mask,
        }
    }

    /// Get the highest (broadcast) address in the subnet.
    pub fn hi(&self) -> Ipv4Addr {
        broadcast_addr(self.addr, self.mask).unwrap_or(self.addr)
    }

    /// Get the lowest (network) address in the subnet.
    pub fn lo(&self) -> Ipv4Addr {
        cut_addr(self.addr, self.mask).unwrap_or(self.addr)
    }

    /// Whether `addr` falls inside this block.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.lo() <= addr && addr <= self.hi()
    }

    /// Whether the two blocks share any address.
    pub fn overlaps(&self, other: &Ipv4) -> bool {
        self.lo() <= other.hi() && other.lo() <= self.hi()
    }
}

impl std::fmt::Display for Ipv4 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.mask)
    }
}

/// Iterator over the `/new_prefix` children of a parent block, ascending.
#[derive(Debug, Clone)]
pub struct Subnets {
    next: Option<Ipv4>,
    remaining: u64,
}

impl Subnets {
    /// Prepare the subdivision of `parent` into `/new_prefix` blocks.
    pub fn new(parent: Ipv4, new_prefix: u8) -> Result<Subnets, CidrError> {
        if new_prefix < parent.mask || new_prefix > MAX_LENGTH {
            return Err(CidrError::InvalidPrefix {
                parent: parent.to_string(),
                new_prefix,
            });
        }
        Ok(Subnets {
            next: Some(Ipv4 {
                addr: parent.lo(),
                mask: new_prefix,
            }),
            remaining: 1u64 << (new_prefix - parent.mask),
        })
    }
}

impl Iterator for Subnets {
    type Item = Ipv4;

    fn next(&mut self) -> Option<Ipv4> {
        if self.remaining == 0 {
            return None;
        }
        let subnet = self.next?;
        self.remaining -= 1;
        // the last block of the address space has no successor
        self.next = next_subnet_ipv4(subnet).ok();
        Some(subnet)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Subnets {}

/// Partition `parent` into every `/new_prefix` block it contains.
///
/// Blocks come back in ascending address order; there are exactly
/// `2^(new_prefix - parent.mask)` of them and together they cover the parent.
pub fn partition(parent: Ipv4, new_prefix: u8) -> Result<Vec<Ipv4>, CidrError> {
    let subnets = Subnets::new(parent, new_prefix)?;
    log::debug!(
        "partition {} into {} x /{}",
        parent.network(),
        subnets.len(),
        new_prefix
    );
    Ok(subnets.collect())
}
