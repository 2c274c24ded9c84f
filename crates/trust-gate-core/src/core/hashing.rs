// crates/trust-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Trust Gate Hashing
// Description: Content hashing and token fingerprint utilities.
// Purpose: Provide stable digests for cache keys, audit logs, and records.
// Dependencies: hex, serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Bearer tokens never appear in logs or cache keys; only their SHA-256
//! fingerprints do. Persisted records are hashed over RFC 8785 canonical JSON
//! so integrity checks are stable across serializer versions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// SHA-256 digest in lowercase hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashDigest(String);

impl HashDigest {
    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Hashes raw bytes with SHA-256.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> HashDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    HashDigest(hex::encode(hasher.finalize()))
}

/// Returns the fingerprint used to identify a bearer token in logs and caches.
#[must_use]
pub fn fingerprint_token(token: &str) -> HashDigest {
    hash_bytes(token.as_bytes())
}

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
