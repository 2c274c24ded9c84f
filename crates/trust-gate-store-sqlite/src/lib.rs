// crates/trust-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Trust Store
// Description: Durable TrustStore backend using SQLite WAL.
// Purpose: Persist versioned trust records and synchronizer leases.
// Dependencies: trust-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`trust_gate_core::TrustStore`] that
//! keeps the current revision of each trust record, an append-only history
//! of prior revisions, and named leases for single-writer jobs. Every write
//! is a compare-and-swap inside a transaction. Security posture: database
//! contents are untrusted; payload hashes are verified on every load.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_RECORD_BYTES;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::SqliteTrustStore;
