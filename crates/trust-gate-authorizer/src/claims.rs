// crates/trust-gate-authorizer/src/claims.rs
// ============================================================================
// Module: Claim Schema
// Description: Required and optional custom claims with expected JSON types.
// Purpose: Reject verified tokens whose claims do not match the domain schema.
// Dependencies: trust-gate-config, serde_json
// ============================================================================

//! ## Overview
//! A [`ClaimSchema`] lists the custom claims a domain expects. Required
//! claims must be present with the declared type; optional claims are only
//! type-checked when present. Unlisted claims pass through untouched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use trust_gate_config::ClaimKind;
use trust_gate_config::ClaimRuleConfig;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One claim expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRule {
    /// Claim name.
    pub name: String,
    /// Expected JSON type.
    pub kind: ClaimKind,
    /// True when the claim must be present.
    pub required: bool,
}

impl From<&ClaimRuleConfig> for ClaimRule {
    fn from(config: &ClaimRuleConfig) -> Self {
        Self {
            name: config.name.clone(),
            kind: config.kind,
            required: config.required,
        }
    }
}

/// Custom claim schema for a domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSchema {
    /// Claim rules.
    rules: Vec<ClaimRule>,
}

impl ClaimSchema {
    /// Creates a schema from rules.
    #[must_use]
    pub const fn new(rules: Vec<ClaimRule>) -> Self {
        Self {
            rules,
        }
    }

    /// Returns the rules.
    #[must_use]
    pub fn rules(&self) -> &[ClaimRule] {
        &self.rules
    }

    /// Checks `claims` and returns the first offending claim name.
    ///
    /// # Errors
    ///
    /// Returns the claim name when a required claim is missing or any listed
    /// claim has the wrong type.
    pub fn check(&self, claims: &Map<String, Value>) -> Result<(), String> {
        for rule in &self.rules {
            match claims.get(&rule.name) {
                None | Some(Value::Null) if rule.required => return Err(rule.name.clone()),
                None | Some(Value::Null) => {}
                Some(value) if !kind_matches(rule.kind, value) => return Err(rule.name.clone()),
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Returns true when `value` has the JSON shape of `kind`.
#[must_use]
pub fn kind_matches(kind: ClaimKind, value: &Value) -> bool {
    match kind {
        ClaimKind::String => value.is_string(),
        ClaimKind::StringArray => {
            value.as_array().is_some_and(|items| items.iter().all(Value::is_string))
        }
        ClaimKind::Number => value.is_number(),
        ClaimKind::Boolean => value.is_boolean(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
