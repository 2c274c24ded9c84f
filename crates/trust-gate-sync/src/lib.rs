// crates/trust-gate-sync/src/lib.rs
// ============================================================================
// Module: Trust Gate Sync Library
// Description: Origin trust synchronizer.
// Purpose: Keep origin resource policies aligned with the edge network.
// Dependencies: trust-gate-core, trust-gate-config, reqwest, aws-sdk-s3,
//               aws-sdk-apigateway, tokio
// ============================================================================

//! ## Overview
//! The synchronizer fetches the edge provider's published address ranges,
//! compares them with the committed [`trust_gate_core::TrustedRangeSet`], and
//! rolls any change (or a secret rotation) out to every protected origin in
//! two steps: a grace policy accepting old and new, then the target policy.
//! A store lease keeps a single writer; compare-and-swap keeps versions
//! monotonic.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod aws;
pub mod builder;
pub mod document;
pub mod publisher;
pub mod scheduler;
pub mod secret;
pub mod source;
pub mod synchronizer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::NoopSyncMetrics;
pub use audit::SyncAuditEvent;
pub use audit::SyncAuditSink;
pub use audit::SyncEventKind;
pub use audit::SyncMetrics;
pub use aws::ApiGatewayPlatform;
pub use aws::S3BucketPlatform;
pub use builder::OriginSet;
pub use builder::publishers_from_config;
pub use builder::synchronizer_from_config;
pub use document::DocumentError;
pub use document::MANAGED_SID;
pub use document::ManagedAccess;
pub use document::PolicyTarget;
pub use publisher::ApplyOutcome;
pub use publisher::DocumentPublisher;
pub use publisher::InMemoryPolicyPlatform;
pub use publisher::PolicyPlatform;
pub use publisher::PolicyPublisher;
pub use publisher::PublishError;
pub use scheduler::RETRY_BASE;
pub use scheduler::SchedulerHandle;
pub use scheduler::spawn_scheduler;
pub use secret::OsSecretGenerator;
pub use secret::SecretGenerator;
pub use secret::SequenceSecretGenerator;
pub use source::HttpRangeSource;
pub use source::HttpRangeSourceConfig;
pub use source::RangeSource;
pub use source::SourceError;
pub use source::StaticRangeSource;
pub use source::parse_ip_ranges;
pub use source::range_source_from_config;
pub use synchronizer::SYNC_LEASE_NAME;
pub use synchronizer::SyncError;
pub use synchronizer::SyncOutcome;
pub use synchronizer::SyncPlan;
pub use synchronizer::SyncReport;
pub use synchronizer::SyncSettings;
pub use synchronizer::SyncState;
pub use synchronizer::SyncTrigger;
pub use synchronizer::Synchronizer;
