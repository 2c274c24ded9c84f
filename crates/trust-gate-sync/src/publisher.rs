// crates/trust-gate-sync/src/publisher.rs
// ============================================================================
// Module: Policy Publisher
// Description: Idempotent, verified policy application per origin.
// Purpose: Materialize abstract origin policies on platform resource policies.
// Dependencies: trust-gate-core, async-trait
// ============================================================================

//! ## Overview
//! A [`PolicyPlatform`] reads and writes one origin's raw resource policy.
//! [`DocumentPublisher`] layers the publisher contract on top:
//! - skip the write when the managed statement already grants exactly the
//!   requested access;
//! - otherwise render, write, and read back before reporting success.
//!
//! A platform write is a single call, so an origin either holds the new
//! document or the old one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use thiserror::Error;
use trust_gate_core::OriginAccessPolicy;
use trust_gate_core::OriginRef;

use crate::document::DocumentError;
use crate::document::ManagedAccess;
use crate::document::PolicyTarget;
use crate::document::managed_access;
use crate::document::render_document;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Publisher errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Platform call failed.
    #[error("platform call failed: {0}")]
    Platform(String),
    /// Existing or rendered document is invalid.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// Read-back did not match the written policy.
    #[error("read-after-write verification failed: {0}")]
    Verification(String),
    /// Step exceeded its timeout.
    #[error("policy apply timed out")]
    Timeout,
}

// ============================================================================
// SECTION: Interfaces
// ============================================================================

/// Raw resource policy access for one origin.
#[async_trait]
pub trait PolicyPlatform: Send + Sync {
    /// Returns the current policy document, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Platform`] when the read fails.
    async fn current_policy(&self) -> Result<Option<String>, PublishError>;

    /// Replaces the policy document.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Platform`] when the write fails.
    async fn set_policy(&self, document: &str) -> Result<(), PublishError>;
}

/// Result of a successful apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Origin already granted the requested access.
    Unchanged,
    /// Document written and verified.
    Written,
}

/// Applies abstract policies to one origin.
#[async_trait]
pub trait PolicyPublisher: Send + Sync {
    /// Returns the origin this publisher manages.
    fn origin(&self) -> &OriginRef;

    /// Applies `policy`; idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the policy is not confirmed in place.
    async fn apply(&self, policy: &OriginAccessPolicy) -> Result<ApplyOutcome, PublishError>;

    /// Returns the access currently granted by the managed statement.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] when the policy cannot be read.
    async fn current_access(&self) -> Result<Option<ManagedAccess>, PublishError>;
}

// ============================================================================
// SECTION: Document Publisher
// ============================================================================

/// Publisher over a raw policy platform.
pub struct DocumentPublisher {
    /// Managed origin.
    origin: OriginRef,
    /// Statement target.
    target: PolicyTarget,
    /// Platform adapter.
    platform: Arc<dyn PolicyPlatform>,
}

impl DocumentPublisher {
    /// Creates a publisher.
    #[must_use]
    pub fn new(origin: OriginRef, target: PolicyTarget, platform: Arc<dyn PolicyPlatform>) -> Self {
        Self {
            origin,
            target,
            platform,
        }
    }

    /// Parses the managed access out of an optional document.
    fn access_of(&self, document: Option<&str>) -> Result<Option<ManagedAccess>, PublishError> {
        match document {
            Some(raw) if !raw.trim().is_empty() => Ok(managed_access(raw, &self.target)?),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl PolicyPublisher for DocumentPublisher {
    fn origin(&self) -> &OriginRef {
        &self.origin
    }

    async fn apply(&self, policy: &OriginAccessPolicy) -> Result<ApplyOutcome, PublishError> {
        let wanted = ManagedAccess::from_policy(policy);
        let current = self.platform.current_policy().await?;
        if self.access_of(current.as_deref())?.as_ref() == Some(&wanted) {
            return Ok(ApplyOutcome::Unchanged);
        }
        let document = render_document(current.as_deref(), policy, &self.target)?;
        self.platform.set_policy(&document).await?;
        let written = self.platform.current_policy().await?;
        match self.access_of(written.as_deref())? {
            Some(access) if access == wanted => Ok(ApplyOutcome::Written),
            Some(_) => Err(PublishError::Verification(format!("{} holds a different policy", self.origin.key()))),
            None => Err(PublishError::Verification(format!("{} has no managed statement", self.origin.key()))),
        }
    }

    async fn current_access(&self) -> Result<Option<ManagedAccess>, PublishError> {
        let current = self.platform.current_policy().await?;
        self.access_of(current.as_deref())
    }
}

// ============================================================================
// SECTION: In-Memory Platform
// ============================================================================

/// In-memory policy platform with failure injection.
#[derive(Debug, Default)]
pub struct InMemoryPolicyPlatform {
    /// Current document.
    document: Mutex<Option<String>>,
    /// Remaining writes to fail.
    failing_writes: AtomicUsize,
    /// Remaining reads to fail.
    failing_reads: AtomicUsize,
    /// Writes that succeeded.
    writes: AtomicUsize,
    /// Drops writes silently when set.
    drop_writes: AtomicBool,
}

impl InMemoryPolicyPlatform {
    /// Creates an empty platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a platform holding `document`.
    #[must_use]
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: Mutex::new(Some(document.into())),
            ..Self::default()
        }
    }

    /// Returns the current document.
    #[must_use]
    pub fn document(&self) -> Option<String> {
        self.document.lock().ok().and_then(|guard| guard.clone())
    }

    /// Fails the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Fails the next `count` reads.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Acknowledges writes without storing them.
    pub fn drop_writes(&self, enabled: bool) {
        self.drop_writes.store(enabled, Ordering::SeqCst);
    }

    /// Returns the number of successful writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Consumes one injected failure from `counter`.
    fn take_failure(counter: &AtomicUsize) -> bool {
        counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
    }
}

#[async_trait]
impl PolicyPlatform for InMemoryPolicyPlatform {
    async fn current_policy(&self) -> Result<Option<String>, PublishError> {
        if Self::take_failure(&self.failing_reads) {
            return Err(PublishError::Platform("injected read failure".to_string()));
        }
        self.document
            .lock()
            .map(|guard| guard.clone())
            .map_err(|_| PublishError::Platform("policy mutex poisoned".to_string()))
    }

    async fn set_policy(&self, document: &str) -> Result<(), PublishError> {
        if Self::take_failure(&self.failing_writes) {
            return Err(PublishError::Platform("injected write failure".to_string()));
        }
        if !self.drop_writes.load(Ordering::SeqCst) {
            let mut guard =
                self.document.lock().map_err(|_| PublishError::Platform("policy mutex poisoned".to_string()))?;
            *guard = Some(document.to_string());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
