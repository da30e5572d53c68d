//! IPv4 CIDR value object and the sequential block allocator used to carve
//! subnets out of a VPC address block.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Smallest prefix (largest block) AWS accepts for a VPC or subnet.
pub const MIN_PREFIX: u8 = 16;
/// Largest prefix (smallest block) AWS accepts for a VPC or subnet.
pub const MAX_PREFIX: u8 = 28;

/// Address block the lab VPC uses unless configured otherwise.
pub const DEFAULT_VPC_CIDR: Ipv4Cidr = Ipv4Cidr {
    network: Ipv4Addr::new(10, 0, 0, 0),
    prefix: 16,
};

/// An IPv4 network in CIDR notation.
///
/// Invariants:
/// - prefix length is at most 32
/// - no host bits are set below the prefix
///
/// ```rust
/// use cloudlab::network::Ipv4Cidr;
///
/// let block: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
/// assert_eq!(block.prefix(), 16);
/// assert_eq!(block.size(), 65_536);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Build a block from its network address and prefix length.
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self> {
        let text = format!("{}/{}", network, prefix);
        if prefix > 32 {
            return Err(Error::invalid_cidr(text, "prefix length must be 0-32"));
        }
        let host_mask = host_mask(prefix);
        if u32::from(network) & host_mask != 0 {
            return Err(Error::invalid_cidr(
                text,
                "host bits are set below the prefix",
            ));
        }
        Ok(Self { network, prefix })
    }

    /// Network address.
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses in the block.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix))
    }

    /// First address as an integer.
    pub fn first(&self) -> u64 {
        u64::from(u32::from(self.network))
    }

    /// One past the last address, as an integer.
    pub fn end(&self) -> u64 {
        self.first() + self.size()
    }

    /// Whether `other` lies entirely inside this block.
    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.first() >= self.first() && other.end() <= self.end()
    }

    /// Whether the two blocks share any address.
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.first() < other.end() && other.first() < self.end()
    }

    /// Reject prefixes outside the range AWS accepts for VPCs and subnets.
    pub fn ensure_prefix_in_range(&self) -> Result<()> {
        ensure_mask_in_range(self.prefix)
    }

    fn from_parts(first: u64, prefix: u8) -> Self {
        // Callers guarantee alignment and that `first` fits in 32 bits.
        Self {
            network: Ipv4Addr::from(first as u32),
            prefix,
        }
    }
}

/// Reject subnet masks outside `/16../28`.
pub fn ensure_mask_in_range(mask: u8) -> Result<()> {
    if !(MIN_PREFIX..=MAX_PREFIX).contains(&mask) {
        return Err(Error::PrefixOutOfRange {
            prefix: mask,
            min: MIN_PREFIX,
            max: MAX_PREFIX,
        });
    }
    Ok(())
}

fn host_mask(prefix: u8) -> u32 {
    if prefix >= 32 {
        0
    } else {
        u32::MAX >> prefix
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::invalid_cidr(s, "missing '/<prefix>'"))?;
        let network = Ipv4Addr::from_str(addr)
            .map_err(|_| Error::invalid_cidr(s, format!("'{}' is not an IPv4 address", addr)))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|_| Error::invalid_cidr(s, format!("'{}' is not a prefix length", prefix)))?;
        Self::new(network, prefix)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(value: Ipv4Cidr) -> Self {
        value.to_string()
    }
}

/// Carves consecutive, mask-aligned blocks out of a parent block.
#[derive(Debug, Clone)]
pub struct CidrAllocator {
    block: Ipv4Cidr,
    next: u64,
}

impl CidrAllocator {
    /// Start allocating at the beginning of `block`.
    pub fn new(block: Ipv4Cidr) -> Self {
        Self {
            next: block.first(),
            block,
        }
    }

    /// Addresses not yet handed out.
    pub fn remaining(&self) -> u64 {
        self.block.end().saturating_sub(self.next)
    }

    /// Largest mask that lets `count` equal subnets share the remaining space.
    pub fn mask_for_remaining(&self, count: usize) -> Result<u8> {
        let count = count.max(1) as u64;
        let per_subnet = self.remaining() / count;
        if per_subnet == 0 {
            return Err(Error::AddressSpaceExhausted {
                block: self.block.to_string(),
                mask: 32,
                requested: count as usize,
            });
        }
        let log2 = 63 - per_subnet.leading_zeros();
        Ok((32 - log2) as u8)
    }

    /// Hand out the next block of the given mask.
    pub fn allocate(&mut self, mask: u8) -> Result<Ipv4Cidr> {
        if mask < self.block.prefix() || mask > 32 {
            return Err(Error::invalid_cidr(
                format!("/{}", mask),
                format!("does not fit inside {}", self.block),
            ));
        }
        let size = 1u64 << (32 - u32::from(mask));
        let aligned = self.next.div_ceil(size) * size;
        if aligned + size > self.block.end() {
            return Err(Error::AddressSpaceExhausted {
                block: self.block.to_string(),
                mask,
                requested: 1,
            });
        }
        self.next = aligned + size;
        Ok(Ipv4Cidr::from_parts(aligned, mask))
    }
}
