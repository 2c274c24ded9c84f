// crates/trust-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Trust Gate Identifiers
// Description: Identity domain and origin identifiers.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Identity domains are a closed set: every credential belongs to exactly one
//! of the customer or staff populations. Origins are identified by their kind
//! plus a platform identifier (bucket name, REST API id).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identity Domains
// ============================================================================

/// Isolated credential population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainId {
    /// Marketplace customers.
    Customer,
    /// Internal staff and operators.
    Staff,
}

impl DomainId {
    /// Returns a stable label for logs and cache keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Staff => "staff",
        }
    }
}

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Origins
// ============================================================================

/// Kind of protected origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    /// Public object store serving the static site.
    ObjectStore,
    /// API layer fronting business handlers.
    ApiLayer,
}

impl OriginKind {
    /// Returns a stable label for the origin kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ObjectStore => "object_store",
            Self::ApiLayer => "api_layer",
        }
    }
}

/// Platform identifier of an origin (bucket name, REST API id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginId(String);

impl OriginId {
    /// Creates a new origin identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OriginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for OriginId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Fully qualified reference to a protected origin.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OriginRef {
    /// Origin kind.
    pub kind: OriginKind,
    /// Platform identifier.
    pub id: OriginId,
}

impl OriginRef {
    /// Creates a new origin reference.
    #[must_use]
    pub fn new(kind: OriginKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: OriginId::new(id),
        }
    }

    /// Returns the stable key used to track per-origin transition progress.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id.as_str())
    }
}

impl fmt::Display for OriginRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}
