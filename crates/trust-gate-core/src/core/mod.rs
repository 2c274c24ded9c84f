// crates/trust-gate-core/src/core/mod.rs
// ============================================================================
// Module: Trust Gate Core Types
// Description: Canonical trust model for authorization and origin access.
// Purpose: Provide stable, serializable types shared by every Trust Gate crate.
// Dependencies: serde, sha2, subtle
// ============================================================================

//! ## Overview
//! Core types describe identity domains, authorization contexts, trusted
//! address ranges, edge secrets, and the origin access policies derived from
//! them. These types are the canonical source of truth for persisted records
//! and for the policy documents rendered by origin publishers.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod context;
pub mod hashing;
pub mod identifiers;
pub mod policy;
pub mod ranges;
pub mod time;
pub mod trust;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::AuthorizationContext;
pub use context::ordered_groups;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::fingerprint_token;
pub use hashing::hash_bytes;
pub use identifiers::DomainId;
pub use identifiers::OriginId;
pub use identifiers::OriginKind;
pub use identifiers::OriginRef;
pub use policy::OriginAccessPolicy;
pub use policy::OriginPhase;
pub use policy::OriginProgress;
pub use policy::PendingTransition;
pub use policy::PolicyPhase;
pub use ranges::IpRange;
pub use ranges::RangeError;
pub use time::Clock;
pub use time::ManualClock;
pub use time::SystemClock;
pub use time::Timestamp;
pub use trust::EdgeSecret;
pub use trust::PublishedRanges;
pub use trust::SecretValue;
pub use trust::TrustedRangeSet;
