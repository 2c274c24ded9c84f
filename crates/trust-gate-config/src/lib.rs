// crates/trust-gate-config/src/lib.rs
// ============================================================================
// Module: Trust Gate Config Library
// Description: Public API surface for Trust Gate configuration.
// Purpose: Expose the config model, loader, and validation entry points.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! `trust-gate.toml` describes the two identity domains, the durable store,
//! the origin synchronizer, audit output, and the authorizer HTTP endpoint.
//! Loading validates the whole file and fails closed on any inconsistency.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AuditConfig;
pub use config::AuditSinkKind;
pub use config::AuthorizerConfig;
pub use config::ClaimKind;
pub use config::ClaimRuleConfig;
pub use config::ConfigError;
pub use config::DomainConfig;
pub use config::KeySourceConfig;
pub use config::OriginConfig;
pub use config::RangeSourceConfig;
pub use config::ServerConfig;
pub use config::StoreConfig;
pub use config::StoreType;
pub use config::SyncConfig;
pub use config::TrustGateConfig;
