//! IPv4 CIDR blocks for vswitch placement
//!
//! Fallback vswitches are created while the original vswitch still holds the
//! configured block, so each fallback attempt takes the next sibling block.

use ipnet::{Ipv4Net, Ipv4Subnets};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid CIDR block: {0}")]
pub struct InvalidCidr(String);

/// Parse a network block, rejecting addresses with host bits set
pub fn parse_block(value: &str) -> Result<Ipv4Net, InvalidCidr> {
    let block: Ipv4Net = value.parse().map_err(|_| InvalidCidr(value.to_string()))?;
    if block.trunc() != block {
        return Err(InvalidCidr(value.to_string()));
    }
    Ok(block)
}

/// The block `n` positions after `block`, same prefix length
///
/// Returns `None` past the end of the address space.
pub fn sibling(block: Ipv4Net, n: u32) -> Option<Ipv4Net> {
    Ipv4Subnets::new(block.network(), Ipv4Addr::BROADCAST, block.prefix_len()).nth(n as usize)
}

/// CIDR for the `n`th fallback vswitch, `n` starting at 1
pub fn fallback_cidr(configured: &str, n: u32) -> Result<String, InvalidCidr> {
    let block = parse_block(configured)?;
    sibling(block, n)
        .map(|b| b.to_string())
        .ok_or_else(|| InvalidCidr(format!("{configured} has no sibling #{n}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_block() {
        let block = parse_block("172.16.0.0/24").unwrap();
        assert_eq!(block.to_string(), "172.16.0.0/24");
        assert!(parse_block("172.16.0.1/24").is_err());
        assert!(parse_block("172.16.0.0/33").is_err());
        assert!(parse_block("172.16.0.0").is_err());
        assert!(parse_block("not-an-ip/8").is_err());
    }

    #[test]
    fn test_fallback_cidr_steps_by_block() {
        assert_eq!(fallback_cidr("172.16.0.0/24", 1).unwrap(), "172.16.1.0/24");
        assert_eq!(fallback_cidr("172.16.0.0/24", 3).unwrap(), "172.16.3.0/24");
        assert_eq!(fallback_cidr("10.0.0.0/20", 1).unwrap(), "10.0.16.0/20");
        assert!(fallback_cidr("255.255.255.0/24", 1).is_err());
    }

    proptest! {
        #[test]
        fn prop_siblings_never_overlap(prefix in 16u8..=29, n in 1u32..64) {
            let base = parse_block(&format!("10.0.0.0/{prefix}")).unwrap();
            let next = sibling(base, n).unwrap();
            prop_assert_eq!(next.prefix_len(), prefix);
            prop_assert!(!base.contains(&next));
            prop_assert!(!next.contains(&base));
            prop_assert_eq!(parse_block(&next.to_string()).unwrap(), next);
        }
    }
}
