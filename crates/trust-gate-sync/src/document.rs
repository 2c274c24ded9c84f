// crates/trust-gate-sync/src/document.rs
// ============================================================================
// Module: Policy Documents
// Description: IAM-style resource policy rendering and inspection.
// Purpose: Translate abstract origin policies into platform documents.
// Dependencies: trust-gate-core, serde_json
// ============================================================================

//! ## Overview
//! The synchronizer owns exactly one statement per resource policy,
//! identified by [`MANAGED_SID`]. Rendering replaces that statement and
//! keeps every other statement untouched. Inspection parses the managed
//! statement back into a [`ManagedAccess`] so publishers can compare
//! policies semantically; platforms reorder keys and collapse single-item
//! arrays.
//!
//! Documents are rendered as canonical JSON so equal policies produce equal
//! bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::net::IpAddr;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use trust_gate_core::IpRange;
use trust_gate_core::OriginAccessPolicy;
use trust_gate_core::SecretValue;
use trust_gate_core::canonical_json_bytes;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Statement id of the managed statement.
pub const MANAGED_SID: &str = "TrustGateEdgeAccess";

/// Policy language version.
const POLICY_VERSION: &str = "2012-10-17";

/// Condition key carrying the source address.
const SOURCE_IP_KEY: &str = "aws:SourceIp";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Policy document errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// Existing document is not a JSON object policy.
    #[error("policy document invalid: {0}")]
    Invalid(String),
    /// Managed statement is malformed.
    #[error("managed statement invalid: {0}")]
    Managed(String),
    /// Rendering failed.
    #[error("policy render failed: {0}")]
    Render(String),
}

/// Action and resource the managed statement grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTarget {
    /// Granted action.
    pub action: String,
    /// Resource pattern.
    pub resource: String,
    /// Request attribute carrying the edge secret.
    pub secret_key: String,
}

impl PolicyTarget {
    /// Target for public object reads from a bucket.
    #[must_use]
    pub fn object_store(bucket: &str, secret_key: &str) -> Self {
        Self {
            action: "s3:GetObject".to_string(),
            resource: format!("arn:aws:s3:::{bucket}/*"),
            secret_key: secret_key.to_string(),
        }
    }

    /// Target for API invocations.
    #[must_use]
    pub fn api_layer(secret_key: &str) -> Self {
        Self {
            action: "execute-api:Invoke".to_string(),
            resource: "execute-api:/*".to_string(),
            secret_key: secret_key.to_string(),
        }
    }
}

/// Access granted by a managed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedAccess {
    /// Accepted source ranges.
    pub ranges: BTreeSet<IpRange>,
    /// Accepted secrets.
    pub secrets: BTreeSet<SecretValue>,
}

impl ManagedAccess {
    /// Returns the access an abstract policy grants.
    #[must_use]
    pub fn from_policy(policy: &OriginAccessPolicy) -> Self {
        Self {
            ranges: policy.allowed_ranges.clone(),
            secrets: policy.required_secrets.clone(),
        }
    }

    /// Returns true when a request from `addr` carrying `secret` is granted.
    #[must_use]
    pub fn accepts(&self, addr: IpAddr, secret: &str) -> bool {
        self.ranges.iter().any(|range| range.contains(addr))
            && self.secrets.iter().any(|value| value.matches(secret))
    }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders the managed statement for `policy`.
#[must_use]
pub fn managed_statement(policy: &OriginAccessPolicy, target: &PolicyTarget) -> Value {
    let ranges: Vec<String> = policy.allowed_ranges.iter().map(ToString::to_string).collect();
    let secrets: Vec<&str> = policy.required_secrets.iter().map(SecretValue::expose).collect();
    json!({
        "Sid": MANAGED_SID,
        "Effect": "Allow",
        "Principal": "*",
        "Action": target.action,
        "Resource": target.resource,
        "Condition": {
            "IpAddress": { SOURCE_IP_KEY: ranges },
            "StringEquals": { target.secret_key.as_str(): secrets }
        }
    })
}

/// Replaces the managed statement in `existing`, keeping foreign statements.
///
/// # Errors
///
/// Returns [`DocumentError`] when `existing` is not a policy object.
pub fn merge_document(existing: Option<&str>, statement: Value) -> Result<String, DocumentError> {
    let mut document = match existing.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(DocumentError::Invalid("policy is not an object".to_string())),
            Err(err) => return Err(DocumentError::Invalid(err.to_string())),
        },
        None => Map::new(),
    };
    let mut statements: Vec<Value> = statements_of(&document)?
        .into_iter()
        .filter(|existing| existing.get("Sid").and_then(Value::as_str) != Some(MANAGED_SID))
        .collect();
    statements.push(statement);
    document.entry("Version").or_insert_with(|| Value::String(POLICY_VERSION.to_string()));
    document.insert("Statement".to_string(), Value::Array(statements));
    let bytes =
        canonical_json_bytes(&Value::Object(document)).map_err(|err| DocumentError::Render(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| DocumentError::Render(err.to_string()))
}

/// Renders a full document for `policy` on top of `existing`.
///
/// # Errors
///
/// Returns [`DocumentError`] when `existing` is not a policy object.
pub fn render_document(
    existing: Option<&str>,
    policy: &OriginAccessPolicy,
    target: &PolicyTarget,
) -> Result<String, DocumentError> {
    merge_document(existing, managed_statement(policy, target))
}

// ============================================================================
// SECTION: Inspection
// ============================================================================

/// Reads the access granted by the managed statement of `document`.
///
/// Returns `None` when the document has no managed statement.
///
/// # Errors
///
/// Returns [`DocumentError`] when the document or statement is malformed.
pub fn managed_access(document: &str, target: &PolicyTarget) -> Result<Option<ManagedAccess>, DocumentError> {
    let parsed: Value = serde_json::from_str(document).map_err(|err| DocumentError::Invalid(err.to_string()))?;
    let Value::Object(map) = parsed else {
        return Err(DocumentError::Invalid("policy is not an object".to_string()));
    };
    let Some(statement) = statements_of(&map)?
        .into_iter()
        .find(|statement| statement.get("Sid").and_then(Value::as_str) == Some(MANAGED_SID))
    else {
        return Ok(None);
    };
    if statement.get("Effect").and_then(Value::as_str) != Some("Allow") {
        return Err(DocumentError::Managed("effect is not Allow".to_string()));
    }
    let condition = statement.get("Condition").ok_or_else(|| DocumentError::Managed("missing condition".to_string()))?;
    let ranges = string_list(condition.get("IpAddress").and_then(|block| block.get(SOURCE_IP_KEY)))?
        .into_iter()
        .map(|value| value.parse::<IpRange>().map_err(|err| DocumentError::Managed(format!("{value}: {err}"))))
        .collect::<Result<BTreeSet<_>, _>>()?;
    let secrets = string_list(condition.get("StringEquals").and_then(|block| block.get(&target.secret_key)))?
        .into_iter()
        .map(SecretValue::new)
        .collect();
    Ok(Some(ManagedAccess {
        ranges,
        secrets,
    }))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the statements of a policy object; a single object counts as one.
fn statements_of(document: &Map<String, Value>) -> Result<Vec<Value>, DocumentError> {
    match document.get("Statement") {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(Value::Object(item)) => Ok(vec![Value::Object(item.clone())]),
        Some(_) => Err(DocumentError::Invalid("Statement must be an array or object".to_string())),
    }
}

/// Reads a condition value that may be a string or an array of strings.
fn string_list(value: Option<&Value>) -> Result<Vec<String>, DocumentError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::String(item)) => Ok(vec![item.clone()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(ToString::to_string)
                    .ok_or_else(|| DocumentError::Managed("condition values must be strings".to_string()))
            })
            .collect(),
        Some(_) => Err(DocumentError::Managed("condition value must be a string or array".to_string())),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
