// crates/trust-gate-cli/src/tests.rs
// ============================================================================
// Module: CLI Unit Tests
// Description: Unit tests for the message catalog and runtime wiring.
// Purpose: Keep CLI output and component construction predictable.
// Dependencies: trust-gate-cli
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod i18n;
