// crates/trust-gate-core/tests/range_props.rs
// ============================================================================
// Module: IP Range Property Tests
// Description: Property checks for CIDR parsing and containment.
// Purpose: Guard the range math that every origin policy depends on.
// Dependencies: proptest, trust-gate-core
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;

use proptest::prelude::*;
use trust_gate_core::IpRange;

fn v4_range(bits: u32, prefix: u8) -> IpRange {
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - u32::from(prefix)) };
    IpRange::new(IpAddr::V4(Ipv4Addr::from(bits & mask)), prefix).unwrap()
}

proptest! {
    #[test]
    fn v4_range_contains_its_network(bits in any::<u32>(), prefix in 0u8..=32) {
        let range = v4_range(bits, prefix);
        prop_assert!(range.contains(range.network()));
        prop_assert!(range.contains(IpAddr::V4(Ipv4Addr::from(bits))));
    }

    #[test]
    fn display_parse_is_identity(bits in any::<u32>(), prefix in 0u8..=32) {
        let range = v4_range(bits, prefix);
        let reparsed: IpRange = range.to_string().parse().unwrap();
        prop_assert_eq!(reparsed, range);
    }

    #[test]
    fn narrower_range_is_covered_by_wider(bits in any::<u32>(), wide in 0u8..=32, extra in 0u8..=32) {
        let narrow_prefix = wide.saturating_add(extra).min(32);
        let wide_range = v4_range(bits, wide);
        let narrow_range = v4_range(bits, narrow_prefix);
        prop_assert!(wide_range.contains(narrow_range.network()));
    }

    #[test]
    fn v6_range_never_contains_v4(bits in any::<u128>(), prefix in 0u8..=128, v4 in any::<u32>()) {
        let bits = bits | (1u128 << 127);
        let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - u32::from(prefix)) };
        let range = IpRange::new(IpAddr::V6(Ipv6Addr::from(bits & mask)), prefix).unwrap();
        prop_assert!(range.contains(IpAddr::V6(Ipv6Addr::from(bits))));
        prop_assert!(!range.contains(IpAddr::V4(Ipv4Addr::from(v4))));
    }
}
