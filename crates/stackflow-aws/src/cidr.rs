//! IPv4 CIDR blocks and sequential subnet allocation

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CidrError {
    #[error("Invalid CIDR block: {0} (expected a.b.c.d/n)")]
    InvalidCidr(String),

    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("Invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(String),

    #[error("{0} has host bits set")]
    HostBitsSet(String),

    #[error("Prefix /{requested} does not fit inside {parent}")]
    PrefixTooShort { parent: String, requested: u8 },

    #[error("{parent} holds {available} /{prefix} blocks, block #{index} requested")]
    OutOfRange {
        parent: String,
        prefix: u8,
        index: u32,
        available: u64,
    },
}

/// An IPv4 network in CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(network: Ipv4Addr, prefix: u8) -> Result<Self, CidrError> {
        if prefix > 32 {
            return Err(CidrError::InvalidPrefixLength(prefix.to_string()));
        }
        let cidr = Self { network, prefix };
        if u32::from(network) & !mask(prefix) != 0 {
            return Err(CidrError::HostBitsSet(cidr.to_string()));
        }
        Ok(cidr)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Number of `/prefix` blocks this network splits into
    pub fn block_count(&self, prefix: u8) -> Result<u64, CidrError> {
        if prefix > 32 {
            return Err(CidrError::InvalidPrefixLength(prefix.to_string()));
        }
        if prefix < self.prefix {
            return Err(CidrError::PrefixTooShort {
                parent: self.to_string(),
                requested: prefix,
            });
        }
        Ok(1u64 << (prefix - self.prefix))
    }

    /// The `index`-th `/prefix` block, counting from the network address
    pub fn subnet(&self, prefix: u8, index: u32) -> Result<Ipv4Cidr, CidrError> {
        let available = self.block_count(prefix)?;
        if u64::from(index) >= available {
            return Err(CidrError::OutOfRange {
                parent: self.to_string(),
                prefix,
                index,
                available,
            });
        }
        let size = 1u64 << (32 - prefix);
        let base = u64::from(u32::from(self.network)) + u64::from(index) * size;
        let network = u32::try_from(base).map_err(|_| CidrError::OutOfRange {
            parent: self.to_string(),
            prefix,
            index,
            available,
        })?;
        Ok(Ipv4Cidr {
            network: Ipv4Addr::from(network),
            prefix,
        })
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CidrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| CidrError::InvalidCidr(s.to_string()))?;
        let network =
            Ipv4Addr::from_str(addr).map_err(|_| CidrError::InvalidAddress(addr.to_string()))?;
        let prefix = prefix
            .parse::<u8>()
            .map_err(|_| CidrError::InvalidPrefixLength(prefix.to_string()))?;
        Ipv4Cidr::new(network, prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.prefix(), 16);
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(cidr.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn test_invalid_blocks() {
        assert!(matches!("10.0.0.0".parse::<Ipv4Cidr>(), Err(CidrError::InvalidCidr(_))));
        assert!(matches!("10.0.0/16".parse::<Ipv4Cidr>(), Err(CidrError::InvalidAddress(_))));
        assert!(matches!("10.0.0.0/33".parse::<Ipv4Cidr>(), Err(CidrError::InvalidPrefixLength(_))));
        assert!(matches!("10.0.1.0/16".parse::<Ipv4Cidr>(), Err(CidrError::HostBitsSet(_))));
    }

    #[test]
    fn test_sequential_subnets() {
        let vpc: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        let blocks: Vec<String> = (0..6)
            .map(|i| vpc.subnet(20, i).unwrap().to_string())
            .collect();

        assert_eq!(
            blocks,
            [
                "10.0.0.0/20",
                "10.0.16.0/20",
                "10.0.32.0/20",
                "10.0.48.0/20",
                "10.0.64.0/20",
                "10.0.80.0/20"
            ]
        );
        assert_eq!(vpc.block_count(20).unwrap(), 16);
    }

    #[test]
    fn test_allocation_limits() {
        let small: Ipv4Cidr = "192.168.0.0/22".parse().unwrap();
        assert!(matches!(small.subnet(20, 0), Err(CidrError::PrefixTooShort { .. })));
        assert!(matches!(
            small.subnet(24, 4),
            Err(CidrError::OutOfRange { available: 4, .. })
        ));
        assert_eq!(small.subnet(24, 3).unwrap().to_string(), "192.168.3.0/24");
    }
}
