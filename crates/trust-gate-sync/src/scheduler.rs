// crates/trust-gate-sync/src/scheduler.rs
// ============================================================================
// Module: Synchronizer Scheduler
// Description: Interval loop with manual triggers and shutdown.
// Purpose: Drive the synchronizer on a schedule inside a long-running process.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! The scheduler runs a bootstrap pass on start, then waits for the next
//! interval tick, a manual trigger, or shutdown. When a pass leaves origins
//! in their grace window, the next pass is scheduled for the narrowing
//! deadline instead of the full interval. Failed passes retry with a
//! doubling back-off starting at [`RETRY_BASE`]. The back-off is capped at
//! the interval, or at the grace window while a transition is half applied,
//! so origins never stay widened for a full interval after a failed narrow.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::synchronizer::SyncOutcome;
use crate::synchronizer::SyncTrigger;
use crate::synchronizer::Synchronizer;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Pending manual triggers kept before new ones are dropped.
const TRIGGER_QUEUE_DEPTH: usize = 8;

/// Shortest delay before re-running after a grace wait.
const MIN_RESCHEDULE: Duration = Duration::from_secs(1);

/// First retry delay after a failed pass.
pub const RETRY_BASE: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Control handle for a running scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    /// Manual trigger sender.
    triggers: mpsc::Sender<SyncTrigger>,
    /// Shutdown signal.
    shutdown: Arc<watch::Sender<bool>>,
}

impl SchedulerHandle {
    /// Requests a run; returns false when the queue is full or the loop stopped.
    #[must_use]
    pub fn trigger(&self, trigger: SyncTrigger) -> bool {
        self.triggers.try_send(trigger).is_ok()
    }

    /// Signals the loop to stop after the current pass.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Spawns the scheduling loop on the current runtime.
#[must_use]
pub fn spawn_scheduler(synchronizer: Arc<Synchronizer>, interval: Duration) -> (SchedulerHandle, JoinHandle<()>) {
    let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_loop(synchronizer, interval, trigger_rx, shutdown_rx));
    (
        SchedulerHandle {
            triggers: trigger_tx,
            shutdown: Arc::new(shutdown_tx),
        },
        task,
    )
}

/// Scheduling loop body.
async fn run_loop(
    synchronizer: Arc<Synchronizer>,
    interval: Duration,
    mut triggers: mpsc::Receiver<SyncTrigger>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failures = 0_u32;
    let mut delay = next_delay(&synchronizer, SyncTrigger::Bootstrap, interval, &mut failures).await;
    loop {
        if *shutdown.borrow() {
            break;
        }
        let trigger = tokio::select! {
            _ = shutdown.changed() => break,
            Some(trigger) = triggers.recv() => trigger,
            () = tokio::time::sleep(delay) => SyncTrigger::Scheduled,
        };
        delay = next_delay(&synchronizer, trigger, interval, &mut failures).await;
    }
}

/// Runs one pass and returns the delay until the next scheduled pass.
async fn next_delay(
    synchronizer: &Synchronizer,
    trigger: SyncTrigger,
    interval: Duration,
    failures: &mut u32,
) -> Duration {
    match synchronizer.run_once(trigger).await {
        Ok(report) => {
            *failures = 0;
            match report.outcome {
                SyncOutcome::AwaitingGrace {
                    narrow_at,
                } => narrow_at.duration_since(synchronizer.now()).max(MIN_RESCHEDULE),
                SyncOutcome::Unchanged
                | SyncOutcome::Completed {
                    ..
                } => interval,
            }
        }
        Err(_) => {
            *failures = failures.saturating_add(1);
            let cap = if synchronizer.has_pending_transition() {
                interval.min(synchronizer.settings().grace)
            } else {
                interval
            };
            retry_delay(*failures, cap)
        }
    }
}

/// Returns the back-off after `failures` consecutive failed passes.
fn retry_delay(failures: u32, cap: Duration) -> Duration {
    let doublings = failures.saturating_sub(1).min(16);
    RETRY_BASE.saturating_mul(1_u32 << doublings).min(cap).max(MIN_RESCHEDULE)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_up_to_cap() {
        let cap = Duration::from_secs(900);
        assert_eq!(retry_delay(1, cap), RETRY_BASE);
        assert_eq!(retry_delay(2, cap), RETRY_BASE * 2);
        assert_eq!(retry_delay(3, cap), RETRY_BASE * 4);
        assert_eq!(retry_delay(10, cap), cap);
        assert_eq!(retry_delay(u32::MAX, cap), cap);
    }

    #[test]
    fn retry_delay_never_drops_below_reschedule_floor() {
        assert_eq!(retry_delay(1, Duration::ZERO), MIN_RESCHEDULE);
    }
}
