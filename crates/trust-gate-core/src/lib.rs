// crates/trust-gate-core/src/lib.rs
// ============================================================================
// Module: Trust Gate Core Library
// Description: Public API surface for the Trust Gate core.
// Purpose: Expose trust model types, store interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Trust Gate core defines the shared model for the two trust boundaries the
//! platform enforces: dual-tenant bearer token authorization and origin
//! access gated on the edge network's published address ranges plus a
//! rotating shared secret. It is backend-agnostic; durable storage, identity
//! providers, and origin platforms integrate through explicit interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::Lease;
pub use interfaces::LeaseRequest;
pub use interfaces::RecordKey;
pub use interfaces::StoreError;
pub use interfaces::StoredRecord;
pub use interfaces::TrustStore;
pub use runtime::InMemoryTrustStore;
pub use runtime::JsonLinesAuditSink;
pub use runtime::TrustState;
pub use runtime::Versioned;
