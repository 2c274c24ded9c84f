// crates/trust-gate-authorizer/src/gateway.rs
// ============================================================================
// Module: Gateway Authorizer Response
// Description: IAM-style authorizer response rendering.
// Purpose: Translate decisions into the API gateway authorizer contract.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! API gateways expect an authorizer to return a principal id, a policy
//! document allowing or denying `execute-api:Invoke` on the method, and a
//! flat string context. Deny responses carry no reason and no context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::authorizer::AuthorizationRequest;
use crate::authorizer::AuthorizationResponse;
use crate::authorizer::Effect;
use crate::authorizer::SourceAttributes;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Principal id used for denied requests.
const ANONYMOUS_PRINCIPAL: &str = "anonymous";

/// Gateway token authorizer event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayTokenEvent {
    /// Raw `Authorization` header value.
    #[serde(default)]
    pub authorization_token: Option<String>,
    /// Invoked method ARN.
    pub method_arn: String,
}

impl GatewayTokenEvent {
    /// Converts the event into an authorizer request.
    #[must_use]
    pub fn into_request(self, request_id: Option<String>) -> AuthorizationRequest {
        AuthorizationRequest {
            path: String::new(),
            bearer_token: self.authorization_token,
            source_attributes: SourceAttributes {
                peer_ip: None,
                request_id,
                method_arn: Some(self.method_arn),
            },
        }
    }
}

/// Policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GatewayStatement {
    /// Action.
    pub action: String,
    /// `Allow` or `Deny`.
    pub effect: String,
    /// Resource ARN.
    pub resource: String,
}

/// Policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GatewayPolicyDocument {
    /// Policy language version.
    pub version: String,
    /// Statements.
    pub statement: Vec<GatewayStatement>,
}

/// Gateway authorizer response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthorizerResponse {
    /// Principal id.
    pub principal_id: String,
    /// Policy document.
    pub policy_document: GatewayPolicyDocument,
    /// Context forwarded to the integration.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl GatewayAuthorizerResponse {
    /// Renders a decision for `method_arn`.
    #[must_use]
    pub fn from_decision(response: &AuthorizationResponse, method_arn: &str) -> Self {
        let (principal_id, effect, context) = match (&response.effect, &response.context) {
            (Effect::Allow, Some(context)) => {
                let mut fields = BTreeMap::new();
                fields.insert("subjectId".to_string(), context.subject_id.clone());
                fields.insert("domainId".to_string(), context.domain_id.as_str().to_string());
                fields.insert("groups".to_string(), context.groups.join(","));
                (context.subject_id.clone(), "Allow", fields)
            }
            _ => (ANONYMOUS_PRINCIPAL.to_string(), "Deny", BTreeMap::new()),
        };
        Self {
            principal_id,
            policy_document: GatewayPolicyDocument {
                version: "2012-10-17".to_string(),
                statement: vec![GatewayStatement {
                    action: "execute-api:Invoke".to_string(),
                    effect: effect.to_string(),
                    resource: method_arn.to_string(),
                }],
            },
            context,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Test assertions use expect/unwrap for clarity."
    )]

    use serde_json::Map;
    use serde_json::json;
    use trust_gate_core::AuthorizationContext;
    use trust_gate_core::DomainId;
    use trust_gate_core::Timestamp;

    use super::*;
    use crate::authorizer::DenyReason;

    const ARN: &str = "arn:aws:execute-api:us-east-1:1:api/prod/GET/api/staff/reports";

    #[test]
    fn allow_renders_context() {
        let response = AuthorizationResponse {
            effect: Effect::Allow,
            context: Some(AuthorizationContext {
                subject_id: "emp-7".to_string(),
                domain_id: DomainId::Staff,
                groups: vec!["admins".to_string(), "ops".to_string()],
                issued_at: None,
                expires_at: Timestamp::from_secs(10),
                raw_claims: Map::new(),
            }),
            cache_ttl_secs: 60,
            deny_reason: None,
        };
        let rendered = serde_json::to_value(GatewayAuthorizerResponse::from_decision(&response, ARN)).unwrap();
        assert_eq!(
            rendered,
            json!({
                "principalId": "emp-7",
                "policyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{"Action": "execute-api:Invoke", "Effect": "Allow", "Resource": ARN}]
                },
                "context": {"subjectId": "emp-7", "domainId": "staff", "groups": "admins,ops"}
            })
        );
    }

    #[test]
    fn deny_carries_no_reason_or_context() {
        let response = AuthorizationResponse {
            effect: Effect::Deny,
            context: None,
            cache_ttl_secs: 0,
            deny_reason: Some(DenyReason::DomainMismatch),
        };
        let rendered = serde_json::to_string(&GatewayAuthorizerResponse::from_decision(&response, ARN)).unwrap();
        assert!(rendered.contains("\"Effect\":\"Deny\""));
        assert!(!rendered.contains("domain_mismatch"));
        assert!(!rendered.contains("context"));
    }

    #[test]
    fn token_event_maps_to_request() {
        let event: GatewayTokenEvent = serde_json::from_value(json!({
            "type": "TOKEN",
            "authorizationToken": "Bearer abc",
            "methodArn": ARN
        }))
        .unwrap();
        let request = event.into_request(None);
        assert_eq!(request.resource_path().as_deref(), Some("/api/staff/reports"));
        assert_eq!(request.token(), Some("abc"));
    }
}
