// crates/trust-gate-sync/src/builder.rs
// ============================================================================
// Module: Synchronizer Builder
// Description: Publishers and synchronizer construction from configuration.
// Purpose: Wire origin adapters and the range source for the CLI and tests.
// Dependencies: trust-gate-config, trust-gate-core
// ============================================================================

//! ## Overview
//! Each configured origin becomes a [`DocumentPublisher`] over the matching
//! platform adapter. Memory origins are kept in [`OriginSet::memory`] so
//! callers can inspect what was published.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use trust_gate_config::OriginConfig;
use trust_gate_config::SyncConfig;
use trust_gate_core::Clock;
use trust_gate_core::OriginKind;
use trust_gate_core::OriginRef;
use trust_gate_core::TrustState;

use crate::aws::ApiGatewayPlatform;
use crate::aws::S3BucketPlatform;
use crate::document::PolicyTarget;
use crate::publisher::DocumentPublisher;
use crate::publisher::InMemoryPolicyPlatform;
use crate::publisher::PolicyPlatform;
use crate::publisher::PolicyPublisher;
use crate::source::SourceError;
use crate::source::range_source_from_config;
use crate::synchronizer::SyncSettings;
use crate::synchronizer::Synchronizer;

// ============================================================================
// SECTION: Origins
// ============================================================================

/// Publishers built from configuration.
pub struct OriginSet {
    /// One publisher per configured origin, in configuration order.
    pub publishers: Vec<Arc<dyn PolicyPublisher>>,
    /// Memory platforms keyed by origin key.
    pub memory: BTreeMap<String, Arc<InMemoryPolicyPlatform>>,
}

/// Builds one publisher per configured origin.
pub async fn publishers_from_config(config: &SyncConfig) -> OriginSet {
    let key = config.secret_condition_key.as_str();
    let mut publishers: Vec<Arc<dyn PolicyPublisher>> = Vec::with_capacity(config.origins.len());
    let mut memory = BTreeMap::new();
    for origin in &config.origins {
        let (origin_ref, target, platform): (OriginRef, PolicyTarget, Arc<dyn PolicyPlatform>) = match origin {
            OriginConfig::S3Bucket {
                bucket,
                region,
                endpoint,
                force_path_style,
            } => {
                let platform =
                    S3BucketPlatform::connect(bucket, region.as_deref(), endpoint.as_deref(), *force_path_style)
                        .await;
                (
                    OriginRef::new(OriginKind::ObjectStore, bucket.as_str()),
                    PolicyTarget::object_store(bucket, key),
                    Arc::new(platform),
                )
            }
            OriginConfig::ApiGateway {
                rest_api_id,
                stage,
                region,
                endpoint,
            } => {
                let platform =
                    ApiGatewayPlatform::connect(rest_api_id, stage, region.as_deref(), endpoint.as_deref()).await;
                (
                    OriginRef::new(OriginKind::ApiLayer, rest_api_id.as_str()),
                    PolicyTarget::api_layer(key),
                    Arc::new(platform),
                )
            }
            OriginConfig::Memory {
                kind,
                id,
            } => {
                let platform = Arc::new(InMemoryPolicyPlatform::new());
                memory.insert(origin.key(), Arc::clone(&platform));
                let target = match kind {
                    OriginKind::ObjectStore => PolicyTarget::object_store(id, key),
                    OriginKind::ApiLayer => PolicyTarget::api_layer(key),
                };
                (OriginRef::new(*kind, id.as_str()), target, platform)
            }
        };
        publishers.push(Arc::new(DocumentPublisher::new(origin_ref, target, platform)));
    }
    OriginSet {
        publishers,
        memory,
    }
}

// ============================================================================
// SECTION: Synchronizer
// ============================================================================

/// Builds a synchronizer and its origin set from configuration.
///
/// # Errors
///
/// Returns [`SourceError`] when the range source cannot be constructed.
pub async fn synchronizer_from_config(
    config: &SyncConfig,
    state: TrustState,
    clock: Arc<dyn Clock>,
) -> Result<(Synchronizer, OriginSet), SourceError> {
    let source = range_source_from_config(&config.source, Arc::clone(&clock))?;
    let origins = publishers_from_config(config).await;
    let synchronizer = Synchronizer::new(
        SyncSettings::from_config(config),
        state,
        source,
        origins.publishers.clone(),
        clock,
    );
    Ok((synchronizer, origins))
}
