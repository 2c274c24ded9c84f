// crates/trust-gate-sync/tests/synchronizer_scenarios.rs
// ============================================================================
// Module: Synchronizer Scenario Tests
// Description: Bootstrap, unchanged, widen/narrow, and partial failure runs.
// Purpose: Validate ordering, idempotence, and version rules end to end.
// Dependencies: trust-gate-sync, trust-gate-core, tokio
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::time::Duration;

use common::BUCKET;
use common::GRACE;
use common::Harness;
use common::ip;
use common::ranges;
use trust_gate_core::Clock;
use trust_gate_core::OriginPhase;
use trust_gate_core::Timestamp;
use trust_gate_sync::SyncError;
use trust_gate_sync::SyncOutcome;
use trust_gate_sync::SyncTrigger;

const OLD_A: &str = "130.176.0.0/18";
const OLD_B: &str = "15.158.0.0/16";
const NEW_C: &str = "64.252.64.0/18";

/// Bootstraps the harness with `[OLD_A, OLD_B]` committed as version 1.
async fn bootstrapped() -> Harness {
    let harness = Harness::new(&[OLD_A, OLD_B]);
    let report = harness.synchronizer().run_once(SyncTrigger::Bootstrap).await.unwrap();
    assert_eq!(
        report.outcome,
        SyncOutcome::Completed {
            range_version: 1,
            secret_version: 1,
        }
    );
    harness
}

// ============================================================================
// SECTION: Bootstrap
// ============================================================================

#[tokio::test]
async fn bootstrap_applies_target_without_grace_and_commits() {
    let harness = bootstrapped().await;

    assert_eq!(harness.range_version(), 1);
    assert_eq!(harness.secret_version(), 1);
    assert!(harness.state().load_transition().unwrap().is_none());
    for access in [harness.bucket_access().await, harness.api_access().await] {
        assert_eq!(access.ranges, ranges(&[OLD_A, OLD_B]));
        assert!(access.accepts(ip("130.176.1.1"), "edge-secret-1"));
        assert!(!access.accepts(ip("203.0.113.9"), "edge-secret-1"));
    }
}

// ============================================================================
// SECTION: Unchanged Upstream
// ============================================================================

#[tokio::test]
async fn unchanged_upstream_makes_no_policy_call_and_keeps_version() {
    let harness = bootstrapped().await;
    let writes = harness.writes();

    for _ in 0 .. 2 {
        let report = harness.synchronizer().run_once(SyncTrigger::Scheduled).await.unwrap();
        assert_eq!(report.outcome, SyncOutcome::Unchanged);
    }

    assert_eq!(harness.writes(), writes);
    assert_eq!(harness.range_version(), 1);
    assert_eq!(harness.secret_version(), 1);
    assert_eq!(harness.source.fetch_count(), 3);
}

// ============================================================================
// SECTION: Range Change
// ============================================================================

#[tokio::test]
async fn added_range_is_widened_then_narrowed_with_one_version_step() {
    let harness = bootstrapped().await;
    harness.source.publish(&[OLD_A, OLD_B, NEW_C]);
    let synchronizer = harness.synchronizer();

    let report = synchronizer.run_once(SyncTrigger::Scheduled).await.unwrap();
    let widened_at = harness.clock.now();
    assert_eq!(
        report.outcome,
        SyncOutcome::AwaitingGrace {
            narrow_at: Timestamp::from_millis(widened_at.as_millis() + 900_000),
        }
    );
    assert_eq!(harness.range_version(), 1);
    assert_eq!(harness.bucket_access().await.ranges, ranges(&[OLD_A, OLD_B, NEW_C]));

    harness.clock.advance(GRACE);
    let report = synchronizer.run_once(SyncTrigger::Scheduled).await.unwrap();
    assert_eq!(
        report.outcome,
        SyncOutcome::Completed {
            range_version: 2,
            secret_version: 1,
        }
    );
    assert_eq!(harness.range_version(), 2);
    assert_eq!(harness.api_access().await.ranges, ranges(&[OLD_A, OLD_B, NEW_C]));
    assert!(harness.state().load_transition().unwrap().is_none());
}

#[tokio::test]
async fn grace_policy_accepts_old_and_new_on_every_origin() {
    let harness = bootstrapped().await;
    harness.source.publish(&[OLD_A, NEW_C]);
    let synchronizer = harness.synchronizer();

    let report = synchronizer.run_once(SyncTrigger::Scheduled).await.unwrap();
    assert!(matches!(report.outcome, SyncOutcome::AwaitingGrace { .. }));
    for access in [harness.bucket_access().await, harness.api_access().await] {
        assert!(access.accepts(ip("15.158.4.4"), "edge-secret-1"), "removed range still accepted");
        assert!(access.accepts(ip("64.252.70.1"), "edge-secret-1"), "added range already accepted");
    }

    harness.clock.advance(Duration::from_secs(60));
    let report = synchronizer.run_once(SyncTrigger::Scheduled).await.unwrap();
    assert!(matches!(report.outcome, SyncOutcome::AwaitingGrace { .. }), "narrowed before grace elapsed");

    harness.clock.advance(GRACE);
    synchronizer.run_once(SyncTrigger::Scheduled).await.unwrap();
    for access in [harness.bucket_access().await, harness.api_access().await] {
        assert_eq!(access.ranges, ranges(&[OLD_A, NEW_C]));
        assert!(!access.accepts(ip("15.158.4.4"), "edge-secret-1"));
    }
}

// ============================================================================
// SECTION: Partial Failure
// ============================================================================

#[tokio::test]
async fn failed_narrow_on_one_origin_holds_version_until_both_confirm() {
    let harness = bootstrapped().await;
    harness.source.publish(&[OLD_A, NEW_C]);
    let synchronizer = harness.synchronizer();
    synchronizer.run_once(SyncTrigger::Scheduled).await.unwrap();
    harness.clock.advance(GRACE);

    harness.bucket.fail_next_writes(1);
    let err = synchronizer.run_once(SyncTrigger::Scheduled).await.unwrap_err();
    match err {
        SyncError::PolicyApplyFailed {
            origins,
            ..
        } => assert_eq!(origins, vec![format!("object_store:{BUCKET}")]),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(harness.api_access().await.ranges, ranges(&[OLD_A, NEW_C]));
    assert_eq!(harness.bucket_access().await.ranges, ranges(&[OLD_A, OLD_B, NEW_C]));
    assert_eq!(harness.range_version(), 1);

    let pending = harness.state().load_transition().unwrap().unwrap().value;
    assert_eq!(pending.origins.values().filter(|p| p.phase == OriginPhase::Narrowed).count(), 1);

    let api_writes = harness.api.write_count();
    let report = synchronizer.run_once(SyncTrigger::Scheduled).await.unwrap();
    assert_eq!(
        report.outcome,
        SyncOutcome::Completed {
            range_version: 2,
            secret_version: 1,
        }
    );
    assert_eq!(harness.api.write_count(), api_writes, "narrowed origin was not re-applied");
    assert_eq!(harness.bucket_access().await.ranges, ranges(&[OLD_A, NEW_C]));
}

#[tokio::test]
async fn failed_widen_blocks_narrowing_everywhere() {
    let harness = bootstrapped().await;
    harness.source.publish(&[NEW_C]);
    let synchronizer = harness.synchronizer();

    harness.bucket.fail_next_writes(1);
    let err = synchronizer.run_once(SyncTrigger::Scheduled).await.unwrap_err();
    assert!(matches!(err, SyncError::PolicyApplyFailed { .. }));
    assert_eq!(harness.api_access().await.ranges, ranges(&[OLD_A, OLD_B, NEW_C]));
    assert_eq!(harness.bucket_access().await.ranges, ranges(&[OLD_A, OLD_B]));

    harness.clock.advance(GRACE);
    let report = synchronizer.run_once(SyncTrigger::Scheduled).await.unwrap();
    assert!(matches!(report.outcome, SyncOutcome::AwaitingGrace { .. }));
    assert_eq!(harness.api_access().await.ranges, ranges(&[OLD_A, OLD_B, NEW_C]));
    assert_eq!(harness.bucket_access().await.ranges, ranges(&[OLD_A, OLD_B, NEW_C]));
    assert_eq!(harness.range_version(), 1);
}

#[tokio::test]
async fn unreadable_origin_blocks_bootstrap_commit() {
    let harness = Harness::new(&[OLD_A]);
    harness.bucket.fail_next_reads(1);
    let err = harness.synchronizer().run_once(SyncTrigger::Bootstrap).await.unwrap_err();
    assert!(matches!(err, SyncError::PolicyApplyFailed { .. }));
    assert_eq!(harness.range_version(), 0);
    assert_eq!(harness.secret_version(), 0);
}

// ============================================================================
// SECTION: Dry Run
// ============================================================================

#[tokio::test]
async fn plan_reports_delta_without_writing() {
    let harness = bootstrapped().await;
    harness.source.publish(&[OLD_A, NEW_C]);
    let writes = harness.writes();

    let plan = harness.synchronizer().plan(SyncTrigger::Operator).await.unwrap().unwrap();
    assert!(plan.ranges_changed);
    assert!(!plan.secret_rotation);
    assert_eq!(plan.base_version, 1);
    assert_eq!(plan.target_version, 2);
    assert_eq!(plan.added, ranges(&[NEW_C]));
    assert_eq!(plan.removed, ranges(&[OLD_B]));

    assert_eq!(harness.writes(), writes);
    assert_eq!(harness.range_version(), 1);
    assert!(harness.state().load_transition().unwrap().is_none());
}

#[tokio::test]
async fn plan_is_none_when_nothing_changed() {
    let harness = bootstrapped().await;
    assert!(harness.synchronizer().plan(SyncTrigger::Operator).await.unwrap().is_none());
}
