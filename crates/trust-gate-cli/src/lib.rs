// crates/trust-gate-cli/src/lib.rs
// ============================================================================
// Module: Trust Gate CLI Library
// Description: Shared helpers for the `trust-gate` binary.
// Purpose: Expose the message catalog and runtime wiring to the binary and tests.
// Dependencies: trust-gate-config, trust-gate-core, trust-gate-store-sqlite,
//               trust-gate-sync
// ============================================================================

//! ## Overview
//! The `trust-gate` binary is a thin dispatcher; configuration-to-runtime
//! wiring and user-facing strings live here so they can be unit tested.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod i18n;
pub mod wiring;

#[cfg(test)]
mod tests;
