// crates/trust-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Trust Gate Runtime
// Description: Typed trust state access, in-memory store, and audit output.
// Purpose: Provide reusable runtime helpers on top of the core interfaces.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! Runtime helpers wrap the byte-level [`crate::TrustStore`] contract with
//! typed accessors and provide the reference in-memory store plus the
//! JSON-lines audit writer shared by the authorizer and synchronizer.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod state;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::JsonLinesAuditSink;
pub use state::TrustState;
pub use state::Versioned;
pub use store::InMemoryTrustStore;
