// crates/trust-gate-sync/src/source.rs
// ============================================================================
// Module: Range Sources
// Description: Retrieval of the edge provider's published ranges.
// Purpose: Produce a complete, validated range document or fail.
// Dependencies: trust-gate-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! [`HttpRangeSource`] reads the cloud provider `ip-ranges.json` document and
//! keeps the prefixes of one service. [`StaticRangeSource`] serves a fixed
//! list from configuration.
//!
//! Security posture: the document is untrusted input. Any malformed prefix
//! fails the whole fetch and an empty result is an error, so a partial or
//! empty document can never narrow an origin.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::redirect::Policy;
use serde::Deserialize;
use thiserror::Error;
use trust_gate_config::RangeSourceConfig;
use trust_gate_core::Clock;
use trust_gate_core::IpRange;
use trust_gate_core::PublishedRanges;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Range source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Source settings are invalid.
    #[error("range source invalid: {0}")]
    Invalid(String),
    /// Transport failure or non-success status.
    #[error("range fetch failed: {0}")]
    Http(String),
    /// Response exceeded the size limit.
    #[error("range document exceeds {0} bytes")]
    TooLarge(usize),
    /// Document did not parse.
    #[error("range document invalid: {0}")]
    Parse(String),
    /// No ranges matched the configured service.
    #[error("range document has no prefixes for service {0}")]
    Empty(String),
}

// ============================================================================
// SECTION: Range Source Trait
// ============================================================================

/// Authoritative source of published edge ranges.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Fetches the current published ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the document cannot be retrieved or is
    /// incomplete.
    async fn fetch(&self) -> Result<PublishedRanges, SourceError>;

    /// Returns a label for logs.
    fn describe(&self) -> String;
}

// ============================================================================
// SECTION: ip-ranges.json
// ============================================================================

/// `ip-ranges.json` document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpRangesDocument {
    /// Publication token.
    #[serde(default)]
    sync_token: Option<String>,
    /// IPv4 prefixes.
    #[serde(default)]
    prefixes: Vec<Ipv4Prefix>,
    /// IPv6 prefixes.
    #[serde(default)]
    ipv6_prefixes: Vec<Ipv6Prefix>,
}

/// IPv4 prefix entry.
#[derive(Debug, Deserialize)]
struct Ipv4Prefix {
    /// CIDR.
    ip_prefix: String,
    /// Owning service.
    service: String,
}

/// IPv6 prefix entry.
#[derive(Debug, Deserialize)]
struct Ipv6Prefix {
    /// CIDR.
    ipv6_prefix: String,
    /// Owning service.
    service: String,
}

/// Parses an `ip-ranges.json` document, keeping prefixes of `service`.
///
/// # Errors
///
/// Returns [`SourceError::Parse`] on malformed JSON or prefixes and
/// [`SourceError::Empty`] when nothing matches `service`.
pub fn parse_ip_ranges(
    document: &[u8],
    service: &str,
    source: &str,
    clock: &dyn Clock,
) -> Result<PublishedRanges, SourceError> {
    let parsed: IpRangesDocument =
        serde_json::from_slice(document).map_err(|err| SourceError::Parse(err.to_string()))?;
    let v4 = parsed.prefixes.iter().filter(|p| p.service == service).map(|p| p.ip_prefix.as_str());
    let v6 = parsed.ipv6_prefixes.iter().filter(|p| p.service == service).map(|p| p.ipv6_prefix.as_str());
    let ranges = parse_ranges(v4.chain(v6))?;
    if ranges.is_empty() {
        return Err(SourceError::Empty(service.to_string()));
    }
    let mut published = PublishedRanges::from_ranges(ranges, source, clock.now());
    published.sync_token = parsed.sync_token;
    Ok(published)
}

/// Parses CIDR strings, failing on the first invalid entry.
fn parse_ranges<'a, I>(values: I) -> Result<BTreeSet<IpRange>, SourceError>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .map(|value| value.parse::<IpRange>().map_err(|err| SourceError::Parse(format!("{value}: {err}"))))
        .collect()
}

// ============================================================================
// SECTION: HTTP Source
// ============================================================================

/// HTTP source settings.
#[derive(Debug, Clone)]
pub struct HttpRangeSourceConfig {
    /// Document URL.
    pub url: String,
    /// Service whose prefixes are kept.
    pub service: String,
    /// Fetch timeout.
    pub timeout: Duration,
    /// Response size limit in bytes.
    pub max_response_bytes: usize,
    /// Allow cleartext http.
    pub allow_http: bool,
}

/// Range source backed by the provider's published document.
pub struct HttpRangeSource {
    /// Settings.
    config: HttpRangeSourceConfig,
    /// Parsed URL.
    url: Url,
    /// HTTP client.
    client: Client,
    /// Clock stamping `fetched_at`.
    clock: Arc<dyn Clock>,
}

impl HttpRangeSource {
    /// Creates an HTTP range source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Invalid`] when the URL or client is invalid.
    pub fn new(config: HttpRangeSourceConfig, clock: Arc<dyn Clock>) -> Result<Self, SourceError> {
        let url = Url::parse(&config.url).map_err(|err| SourceError::Invalid(format!("url: {err}")))?;
        match url.scheme() {
            "https" => {}
            "http" if config.allow_http => {}
            scheme => return Err(SourceError::Invalid(format!("url scheme {scheme} not allowed"))),
        }
        if config.max_response_bytes == 0 {
            return Err(SourceError::Invalid("max_response_bytes must be > 0".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|_| SourceError::Invalid("http client build failed".to_string()))?;
        Ok(Self {
            config,
            url,
            client,
            clock,
        })
    }
}

#[async_trait]
impl RangeSource for HttpRangeSource {
    async fn fetch(&self) -> Result<PublishedRanges, SourceError> {
        let mut response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|err| SourceError::Http(err.to_string()))?;
        if !response.status().is_success() {
            return Err(SourceError::Http(format!("status {}", response.status())));
        }
        let limit = self.config.max_response_bytes;
        if response.content_length().is_some_and(|len| usize::try_from(len).map_or(true, |len| len > limit)) {
            return Err(SourceError::TooLarge(limit));
        }
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|err| SourceError::Http(err.to_string()))? {
            if body.len().saturating_add(chunk.len()) > limit {
                return Err(SourceError::TooLarge(limit));
            }
            body.extend_from_slice(&chunk);
        }
        parse_ip_ranges(&body, &self.config.service, &self.config.url, self.clock.as_ref())
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.config.url, self.config.service)
    }
}

// ============================================================================
// SECTION: Static Source
// ============================================================================

/// Fixed range list.
pub struct StaticRangeSource {
    /// Ranges served on every fetch.
    ranges: BTreeSet<IpRange>,
    /// Source label.
    label: String,
    /// Clock stamping `fetched_at`.
    clock: Arc<dyn Clock>,
}

impl StaticRangeSource {
    /// Creates a static source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when a range is invalid or the list is empty.
    pub fn new<'a, I>(ranges: I, label: impl Into<String>, clock: Arc<dyn Clock>) -> Result<Self, SourceError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let label = label.into();
        let ranges = parse_ranges(ranges)?;
        if ranges.is_empty() {
            return Err(SourceError::Empty(label));
        }
        Ok(Self {
            ranges,
            label,
            clock,
        })
    }
}

#[async_trait]
impl RangeSource for StaticRangeSource {
    async fn fetch(&self) -> Result<PublishedRanges, SourceError> {
        Ok(PublishedRanges::from_ranges(self.ranges.iter().copied(), self.label.clone(), self.clock.now()))
    }

    fn describe(&self) -> String {
        format!("static ({})", self.label)
    }
}

/// Builds the configured range source.
///
/// # Errors
///
/// Returns [`SourceError`] when the source cannot be constructed.
pub fn range_source_from_config(
    config: &RangeSourceConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn RangeSource>, SourceError> {
    match config {
        RangeSourceConfig::Http {
            url,
            service,
            timeout_ms,
            max_response_bytes,
            allow_http,
        } => {
            let source = HttpRangeSource::new(
                HttpRangeSourceConfig {
                    url: url.clone(),
                    service: service.clone(),
                    timeout: Duration::from_millis(*timeout_ms),
                    max_response_bytes: *max_response_bytes,
                    allow_http: *allow_http,
                },
                clock,
            )?;
            Ok(Arc::new(source))
        }
        RangeSourceConfig::Static {
            ipv4,
            ipv6,
            label,
        } => {
            let values = ipv4.iter().chain(ipv6.iter()).map(String::as_str);
            Ok(Arc::new(StaticRangeSource::new(values, label.clone(), clock)?))
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

    use trust_gate_core::ManualClock;
    use trust_gate_core::Timestamp;

    use super::*;

    const DOCUMENT: &str = r#"{
        "syncToken": "1700000000",
        "createDate": "2024-01-01-00-00-00",
        "prefixes": [
            {"ip_prefix": "120.52.22.96/27", "region": "GLOBAL", "service": "CLOUDFRONT_ORIGIN_FACING", "network_border_group": "GLOBAL"},
            {"ip_prefix": "3.5.140.0/22", "region": "ap-northeast-2", "service": "AMAZON", "network_border_group": "ap-northeast-2"}
        ],
        "ipv6_prefixes": [
            {"ipv6_prefix": "2600:9000:2000::/36", "region": "GLOBAL", "service": "CLOUDFRONT_ORIGIN_FACING", "network_border_group": "GLOBAL"}
        ]
    }"#;

    #[test]
    fn keeps_only_configured_service() {
        let clock = ManualClock::new(Timestamp::from_secs(5));
        let published =
            parse_ip_ranges(DOCUMENT.as_bytes(), "CLOUDFRONT_ORIGIN_FACING", "test", &clock).unwrap();
        assert_eq!(published.ipv4_ranges.len(), 1);
        assert_eq!(published.ipv6_ranges.len(), 1);
        assert_eq!(published.sync_token.as_deref(), Some("1700000000"));
        assert_eq!(published.fetched_at, Timestamp::from_secs(5));
    }

    #[test]
    fn unknown_service_is_empty_error() {
        let clock = ManualClock::new(Timestamp::from_secs(5));
        let err = parse_ip_ranges(DOCUMENT.as_bytes(), "NOPE", "test", &clock).unwrap_err();
        assert_eq!(err, SourceError::Empty("NOPE".to_string()));
    }

    #[test]
    fn one_bad_prefix_fails_the_whole_document() {
        let clock = ManualClock::new(Timestamp::from_secs(5));
        let document = DOCUMENT.replace("120.52.22.96/27", "120.52.22.96/99");
        let err = parse_ip_ranges(document.as_bytes(), "CLOUDFRONT_ORIGIN_FACING", "test", &clock).unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[tokio::test]
    async fn static_source_splits_families() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Timestamp::from_secs(9)));
        let source = StaticRangeSource::new(["10.0.0.0/8", "2001:db8::/32"], "lab", clock).unwrap();
        let published = source.fetch().await.unwrap();
        assert_eq!(published.ipv4_ranges.len(), 1);
        assert_eq!(published.ipv6_ranges.len(), 1);
        assert_eq!(published.source, "lab");
    }
}
