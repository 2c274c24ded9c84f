// crates/trust-gate-sync/src/aws.rs
// ============================================================================
// Module: AWS Policy Platforms
// Description: Bucket policy and REST API resource policy adapters.
// Purpose: Read and write origin resource policies on AWS.
// Dependencies: aws-config, aws-sdk-s3, aws-sdk-apigateway
// ============================================================================

//! ## Overview
//! - [`S3BucketPlatform`]: `GetBucketPolicy` / `PutBucketPolicy`. A bucket
//!   without a policy reads as `None`.
//! - [`ApiGatewayPlatform`]: `GetRestApi` / `UpdateRestApi` replacing
//!   `/policy`, then a stage deployment so the policy takes effect.
//!
//! Credentials and region come from the default provider chain with
//! optional per-origin region and endpoint overrides.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_config::SdkConfig;
use aws_sdk_apigateway::types::Op;
use aws_sdk_apigateway::types::PatchOperation;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::error::ProvideErrorMetadata;
use serde_json::Value;

use crate::publisher::PolicyPlatform;
use crate::publisher::PublishError;

// ============================================================================
// SECTION: Shared Config
// ============================================================================

/// S3 error code for a bucket without a policy.
const NO_BUCKET_POLICY: &str = "NoSuchBucketPolicy";

/// Loads SDK configuration with optional region and endpoint overrides.
async fn load_sdk_config(region: Option<&str>, endpoint: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    if let Some(endpoint) = endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    loader.load().await
}

// ============================================================================
// SECTION: S3
// ============================================================================

/// Bucket policy adapter.
pub struct S3BucketPlatform {
    /// S3 client.
    client: aws_sdk_s3::Client,
    /// Bucket name.
    bucket: String,
}

impl S3BucketPlatform {
    /// Connects to S3 for `bucket`.
    pub async fn connect(bucket: &str, region: Option<&str>, endpoint: Option<&str>, force_path_style: bool) -> Self {
        let shared = load_sdk_config(region, endpoint).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if force_path_style {
            builder = builder.force_path_style(true);
        }
        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl PolicyPlatform for S3BucketPlatform {
    async fn current_policy(&self) -> Result<Option<String>, PublishError> {
        match self.client.get_bucket_policy().bucket(&self.bucket).send().await {
            Ok(output) => Ok(output.policy().map(ToString::to_string)),
            Err(err) if err.code() == Some(NO_BUCKET_POLICY) => Ok(None),
            Err(err) => Err(PublishError::Platform(format!(
                "GetBucketPolicy {}: {}",
                self.bucket,
                DisplayErrorContext(&err)
            ))),
        }
    }

    async fn set_policy(&self, document: &str) -> Result<(), PublishError> {
        self.client
            .put_bucket_policy()
            .bucket(&self.bucket)
            .policy(document)
            .send()
            .await
            .map_err(|err| {
                PublishError::Platform(format!("PutBucketPolicy {}: {}", self.bucket, DisplayErrorContext(&err)))
            })?;
        Ok(())
    }
}

// ============================================================================
// SECTION: API Gateway
// ============================================================================

/// REST API resource policy adapter.
pub struct ApiGatewayPlatform {
    /// API Gateway client.
    client: aws_sdk_apigateway::Client,
    /// REST API id.
    rest_api_id: String,
    /// Stage redeployed after a policy change.
    stage: String,
}

impl ApiGatewayPlatform {
    /// Connects to API Gateway for `rest_api_id`.
    pub async fn connect(rest_api_id: &str, stage: &str, region: Option<&str>, endpoint: Option<&str>) -> Self {
        let shared = load_sdk_config(region, endpoint).await;
        Self {
            client: aws_sdk_apigateway::Client::new(&shared),
            rest_api_id: rest_api_id.to_string(),
            stage: stage.to_string(),
        }
    }
}

#[async_trait]
impl PolicyPlatform for ApiGatewayPlatform {
    async fn current_policy(&self) -> Result<Option<String>, PublishError> {
        let output = self.client.get_rest_api().rest_api_id(&self.rest_api_id).send().await.map_err(|err| {
            PublishError::Platform(format!(
                "GetRestApi {}: {}",
                self.rest_api_id,
                aws_sdk_apigateway::error::DisplayErrorContext(&err)
            ))
        })?;
        Ok(output.policy().filter(|raw| !raw.trim().is_empty()).map(normalize_gateway_policy))
    }

    async fn set_policy(&self, document: &str) -> Result<(), PublishError> {
        let patch = PatchOperation::builder().op(Op::Replace).path("/policy").value(document).build();
        self.client
            .update_rest_api()
            .rest_api_id(&self.rest_api_id)
            .patch_operations(patch)
            .send()
            .await
            .map_err(|err| {
                PublishError::Platform(format!(
                    "UpdateRestApi {}: {}",
                    self.rest_api_id,
                    aws_sdk_apigateway::error::DisplayErrorContext(&err)
                ))
            })?;
        self.client
            .create_deployment()
            .rest_api_id(&self.rest_api_id)
            .stage_name(&self.stage)
            .description("trust-gate resource policy update")
            .send()
            .await
            .map_err(|err| {
                PublishError::Platform(format!(
                    "CreateDeployment {}/{}: {}",
                    self.rest_api_id,
                    self.stage,
                    aws_sdk_apigateway::error::DisplayErrorContext(&err)
                ))
            })?;
        Ok(())
    }
}

/// Undoes the quote escaping API Gateway applies to stored policies.
fn normalize_gateway_policy(raw: &str) -> String {
    if serde_json::from_str::<Value>(raw).is_ok_and(|value| value.is_object()) {
        return raw.to_string();
    }
    raw.replace("\\\"", "\"").replace("\\/", "/")
}

// ============================================================================
// SECTION: Tests
// ============================================================================
