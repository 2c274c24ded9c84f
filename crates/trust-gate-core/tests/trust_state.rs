// crates/trust-gate-core/tests/trust_state.rs
// ============================================================================
// Module: Trust State Tests
// Description: Typed record access and monotonic version enforcement.
// Purpose: Ensure range and secret versions never move backwards.
// Dependencies: trust-gate-core
// ============================================================================

//! ## Overview
//! Exercises [`TrustState`] over the in-memory store.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;
use std::sync::Arc;

use trust_gate_core::EdgeSecret;
use trust_gate_core::InMemoryTrustStore;
use trust_gate_core::IpRange;
use trust_gate_core::PublishedRanges;
use trust_gate_core::SecretValue;
use trust_gate_core::StoreError;
use trust_gate_core::Timestamp;
use trust_gate_core::TrustState;
use trust_gate_core::TrustedRangeSet;

fn published(values: &[&str]) -> PublishedRanges {
    PublishedRanges::from_ranges(
        values.iter().map(|value| value.parse::<IpRange>().unwrap()),
        "test",
        Timestamp::from_secs(100),
    )
}

fn state() -> TrustState {
    TrustState::new(Arc::new(InMemoryTrustStore::new()))
}

#[test]
fn commit_ranges_requires_increasing_version() {
    let state = state();
    let source = published(&["10.0.0.0/8"]);
    let first = TrustedRangeSet::successor(None, &source.ranges(), &source).unwrap();
    let revision = state.commit_ranges(0, &first, Timestamp::from_secs(1)).unwrap();

    let loaded = state.load_ranges().unwrap().unwrap();
    assert_eq!(loaded.value, first);
    assert_eq!(loaded.revision, revision);

    let err = state.commit_ranges(revision, &first, Timestamp::from_secs(2)).unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));

    let second = TrustedRangeSet::successor(Some(&first), &source.ranges(), &source).unwrap();
    state.commit_ranges(revision, &second, Timestamp::from_secs(2)).unwrap();
    assert_eq!(state.load_ranges().unwrap().unwrap().value.version, 2);
}

#[test]
fn stale_revision_is_a_conflict() {
    let state = state();
    let secret = EdgeSecret {
        value: SecretValue::new("one"),
        created_at: Timestamp::from_secs(1),
        version: 1,
    };
    state.commit_secret(0, &secret, Timestamp::from_secs(1)).unwrap();
    let next = EdgeSecret {
        value: SecretValue::new("two"),
        created_at: Timestamp::from_secs(2),
        version: 2,
    };
    let err = state.commit_secret(0, &next, Timestamp::from_secs(2)).unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { expected: 0, actual: 1, .. }));
}

#[test]
fn corrupt_payload_is_reported() {
    let store = Arc::new(InMemoryTrustStore::new());
    trust_gate_core::TrustStore::compare_and_swap(
        store.as_ref(),
        trust_gate_core::RecordKey::TrustedRanges,
        0,
        b"not json",
        Timestamp::from_secs(1),
    )
    .unwrap();
    let state = TrustState::new(store);
    assert!(matches!(state.load_ranges(), Err(StoreError::Corrupt(_))));
}

#[test]
fn successor_preserves_family_split() {
    let source = published(&["10.0.0.0/8", "2600:9000::/28"]);
    let ranges: BTreeSet<IpRange> = source.ranges();
    let set = TrustedRangeSet::successor(None, &ranges, &source).unwrap();
    assert!(set.contains("10.2.3.4".parse().unwrap()));
    assert!(set.contains("2600:9000::1".parse().unwrap()));
    assert!(!set.contains("11.0.0.1".parse().unwrap()));
}
