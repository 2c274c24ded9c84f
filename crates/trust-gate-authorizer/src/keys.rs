// crates/trust-gate-authorizer/src/keys.rs
// ============================================================================
// Module: Signing Key Sources
// Description: JWKS and shared-secret key sources with bounded remote fetches.
// Purpose: Supply verification keys for exactly one identity domain.
// Dependencies: jsonwebtoken, reqwest, tokio, async-trait
// ============================================================================

//! ## Overview
//! A [`KeySource`] maps a token key id to a [`DecodingKey`]. Each identity
//! domain owns its own source, so a lookup can never return another
//! domain's keys. Three sources exist:
//! - [`StaticJwksSource`]: an inline JWKS document.
//! - [`RemoteJwksSource`]: a JWKS URL cached for `Cache-Control: max-age`
//!   or the configured TTL, with unknown key ids refreshing at most once
//!   per minimum refresh interval. Fetches run on spawned tasks and are
//!   shared by concurrent lookups.
//! - [`SharedSecretSource`]: an HMAC secret for development setups.
//!
//! Security posture: remote responses are size-limited, redirects are not
//! followed, and fetch failures fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use reqwest::Client;
use reqwest::header::CACHE_CONTROL;
use reqwest::redirect::Policy;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::sync::watch;
use trust_gate_core::Clock;
use trust_gate_core::Timestamp;
use url::Url;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Key lookup errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    /// No key matches the token key id.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),
    /// The key source could not be reached or returned unusable data.
    #[error("key source unavailable: {0}")]
    Unavailable(String),
    /// Key material or source settings are invalid.
    #[error("invalid key material: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Key Source Trait
// ============================================================================

/// Source of verification keys for one identity domain.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Returns the key for `kid`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::UnknownKey`] when no key matches, or
    /// [`KeyError::Unavailable`] when the source cannot be consulted.
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, KeyError>;

    /// Loads keys ahead of the first lookup. Sources without remote state
    /// have nothing to load.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Unavailable`] when the initial load fails.
    async fn prewarm(&self) -> Result<(), KeyError> {
        Ok(())
    }

    /// Returns a redacted description for logs.
    fn describe(&self) -> String;
}

// ============================================================================
// SECTION: JWKS Documents
// ============================================================================

/// JSON Web Key as published in a JWKS document.
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    /// Key type.
    kty: String,
    /// Key id.
    #[serde(default)]
    kid: Option<String>,
    /// Public key use.
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    /// RSA modulus.
    #[serde(default)]
    n: Option<String>,
    /// RSA exponent.
    #[serde(default)]
    e: Option<String>,
    /// EC curve.
    #[serde(default)]
    crv: Option<String>,
    /// EC x coordinate.
    #[serde(default)]
    x: Option<String>,
    /// EC y coordinate.
    #[serde(default)]
    y: Option<String>,
}

/// JWKS document.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    /// Keys.
    keys: Vec<Jwk>,
}

/// Decoded verification keys.
#[derive(Clone, Default)]
pub struct KeySet {
    /// Keys by key id.
    by_kid: HashMap<String, DecodingKey>,
    /// Keys published without a key id.
    anonymous: Vec<DecodingKey>,
}

impl KeySet {
    /// Parses a JWKS document, skipping encryption keys and unsupported types.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Invalid`] when the document does not parse or
    /// contains no usable signing keys.
    pub fn from_jwks_json(document: &[u8]) -> Result<Self, KeyError> {
        let parsed: JwksDocument = serde_json::from_slice(document)
            .map_err(|err| KeyError::Invalid(format!("jwks document: {err}")))?;
        let mut set = Self::default();
        for jwk in &parsed.keys {
            if jwk.key_use.as_deref() == Some("enc") {
                continue;
            }
            let Some(key) = jwk_to_decoding_key(jwk)? else {
                continue;
            };
            match &jwk.kid {
                Some(kid) => {
                    set.by_kid.insert(kid.clone(), key);
                }
                None => set.anonymous.push(key),
            }
        }
        if set.is_empty() {
            return Err(KeyError::Invalid("jwks document has no usable signing keys".to_string()));
        }
        Ok(set)
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kid.len() + self.anonymous.len()
    }

    /// Returns true when the set holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finds the key for `kid`. A token without a key id only matches a set
    /// holding exactly one key.
    #[must_use]
    pub fn find(&self, kid: Option<&str>) -> Option<DecodingKey> {
        match kid {
            Some(kid) => self.by_kid.get(kid).cloned(),
            None if self.len() == 1 => {
                self.anonymous.first().or_else(|| self.by_kid.values().next()).cloned()
            }
            None => None,
        }
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kids: Vec<&String> = self.by_kid.keys().collect();
        kids.sort();
        f.debug_struct("KeySet").field("kids", &kids).field("anonymous", &self.anonymous.len()).finish()
    }
}

/// Converts a JWK to a decoding key; `None` for unsupported key types.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<Option<DecodingKey>, KeyError> {
    let label = jwk.kid.as_deref().unwrap_or("<no kid>");
    match jwk.kty.as_str() {
        "RSA" => {
            let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
                return Err(KeyError::Invalid(format!("rsa key {label} missing n or e")));
            };
            DecodingKey::from_rsa_components(n, e)
                .map(Some)
                .map_err(|err| KeyError::Invalid(format!("rsa key {label}: {err}")))
        }
        "EC" => {
            let (Some(crv), Some(x), Some(y)) = (&jwk.crv, &jwk.x, &jwk.y) else {
                return Err(KeyError::Invalid(format!("ec key {label} missing crv, x, or y")));
            };
            match crv.as_str() {
                "P-256" | "P-384" => DecodingKey::from_ec_components(x, y)
                    .map(Some)
                    .map_err(|err| KeyError::Invalid(format!("ec key {label}: {err}"))),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

// ============================================================================
// SECTION: Static Sources
// ============================================================================

/// Inline JWKS key source.
#[derive(Debug, Clone)]
pub struct StaticJwksSource {
    /// Parsed keys.
    keys: KeySet,
}

impl StaticJwksSource {
    /// Parses an inline JWKS document.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Invalid`] when the document is unusable.
    pub fn from_json(document: &str) -> Result<Self, KeyError> {
        Ok(Self {
            keys: KeySet::from_jwks_json(document.as_bytes())?,
        })
    }
}

#[async_trait]
impl KeySource for StaticJwksSource {
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        self.keys.find(kid).ok_or_else(|| KeyError::UnknownKey(kid.unwrap_or("<none>").to_string()))
    }

    fn describe(&self) -> String {
        format!("jwks(inline, {} keys)", self.keys.len())
    }
}

/// Shared HMAC secret key source.
#[derive(Clone)]
pub struct SharedSecretSource {
    /// HMAC key.
    key: DecodingKey,
    /// Key id the token must carry, when configured.
    kid: Option<String>,
}

impl SharedSecretSource {
    /// Creates a source from raw secret bytes.
    #[must_use]
    pub fn new(secret: &[u8], kid: Option<String>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            kid,
        }
    }
}

impl fmt::Debug for SharedSecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecretSource").field("kid", &self.kid).finish_non_exhaustive()
    }
}

#[async_trait]
impl KeySource for SharedSecretSource {
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        match (&self.kid, kid) {
            (Some(expected), Some(kid)) if expected == kid => Ok(self.key.clone()),
            (Some(_), kid) => Err(KeyError::UnknownKey(kid.unwrap_or("<none>").to_string())),
            (None, _) => Ok(self.key.clone()),
        }
    }

    fn describe(&self) -> String {
        "shared_secret".to_string()
    }
}

// ============================================================================
// SECTION: Remote JWKS
// ============================================================================

/// Remote JWKS fetch settings.
#[derive(Debug, Clone)]
pub struct RemoteJwksConfig {
    /// JWKS URL.
    pub url: String,
    /// Cache lifetime when the response carries no max-age.
    pub cache_ttl: Duration,
    /// Fetch timeout.
    pub timeout: Duration,
    /// Response size limit in bytes.
    pub max_response_bytes: usize,
    /// Minimum interval between refreshes triggered by unknown key ids.
    pub min_refresh_interval: Duration,
    /// Allow cleartext http.
    pub allow_http: bool,
}

/// Cached key set with its freshness deadlines.
#[derive(Debug, Clone)]
struct CachedKeys {
    /// Keys.
    keys: KeySet,
    /// Time after which a background refresh is started.
    fresh_until: Timestamp,
    /// Time after which the set is no longer served while refreshing.
    usable_until: Timestamp,
}

/// Progress of a JWKS refresh task.
#[derive(Debug, Clone)]
enum RefreshStatus {
    /// Fetch still running.
    Pending,
    /// Fetch finished; carries the failure when the cache was not updated.
    Done(Option<KeyError>),
}

/// Single-flight refresh bookkeeping.
#[derive(Debug, Default)]
struct RefreshState {
    /// Start time of the last fetch.
    last_started: Option<Timestamp>,
    /// Status of the most recent fetch.
    status: Option<watch::Receiver<RefreshStatus>>,
}

/// Fetch state shared with spawned refresh tasks.
struct RemoteState {
    /// Fetch settings.
    config: RemoteJwksConfig,
    /// Parsed URL.
    url: Url,
    /// HTTP client.
    client: Client,
    /// Cached keys.
    cache: RwLock<Option<CachedKeys>>,
    /// In-flight refresh, if any.
    refresh: Mutex<RefreshState>,
}

impl RemoteState {
    /// Looks up `kid` in a still-usable cached set. The flag reports whether
    /// the set is within its freshness window.
    async fn lookup(&self, kid: Option<&str>, now: Timestamp) -> (Option<DecodingKey>, bool) {
        let guard = self.cache.read().await;
        match guard.as_ref().filter(|cached| now < cached.usable_until) {
            Some(cached) => (cached.keys.find(kid), now < cached.fresh_until),
            None => (None, false),
        }
    }

    /// Starts a refresh or joins the one in flight. Returns `None` when a
    /// throttled refresh was skipped.
    ///
    /// The fetch runs on its own task, so a caller dropped by a timeout does
    /// not cancel it and the cache still fills.
    fn start_refresh(self: &Arc<Self>, now: Timestamp, throttle: bool) -> Option<watch::Receiver<RefreshStatus>> {
        let mut state = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(status) = &state.status
            && matches!(*status.borrow(), RefreshStatus::Pending)
        {
            return Some(status.clone());
        }
        if throttle && state.last_started.is_some_and(|at| now < at.saturating_add(self.config.min_refresh_interval)) {
            return None;
        }
        let (sender, receiver) = watch::channel(RefreshStatus::Pending);
        state.last_started = Some(now);
        state.status = Some(receiver.clone());
        drop(state);

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let failure = shared.refresh_cache(now).await.err();
            sender.send_replace(RefreshStatus::Done(failure));
        });
        Some(receiver)
    }

    /// Fetches the document and replaces the cached set.
    async fn refresh_cache(&self, now: Timestamp) -> Result<(), KeyError> {
        let (keys, max_age) = self.fetch().await?;
        let ttl = max_age.unwrap_or(self.config.cache_ttl);
        let fresh_until = now.saturating_add(ttl);
        *self.cache.write().await = Some(CachedKeys {
            keys,
            fresh_until,
            usable_until: fresh_until.saturating_add(ttl),
        });
        Ok(())
    }

    /// Fetches and parses the JWKS document.
    async fn fetch(&self) -> Result<(KeySet, Option<Duration>), KeyError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|err| KeyError::Unavailable(format!("jwks fetch failed: {err}")))?;
        if !response.status().is_success() {
            return Err(KeyError::Unavailable(format!("jwks fetch returned {}", response.status())));
        }
        let max_age = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_max_age);
        let body = read_body_limited(response, self.config.max_response_bytes).await?;
        let keys = KeySet::from_jwks_json(&body).map_err(|err| KeyError::Unavailable(err.to_string()))?;
        Ok((keys, max_age))
    }
}

/// Waits for a refresh task and returns its failure, if any.
async fn refresh_outcome(mut status: watch::Receiver<RefreshStatus>) -> Option<KeyError> {
    match status.wait_for(|status| matches!(status, RefreshStatus::Done(_))).await {
        Ok(done) => match &*done {
            RefreshStatus::Done(failure) => failure.clone(),
            RefreshStatus::Pending => None,
        },
        Err(_) => Some(KeyError::Unavailable("jwks refresh task stopped".to_string())),
    }
}

/// JWKS key source backed by a URL.
///
/// Keys are fetched on first use and cached. Once the freshness window
/// passes the cached set keeps being served for one more TTL while a
/// background refresh runs; after that lookups wait for the fetch and fail
/// closed when it fails.
pub struct RemoteJwksSource {
    /// Shared fetch state.
    state: Arc<RemoteState>,
    /// Clock used for cache freshness.
    clock: Arc<dyn Clock>,
}

impl RemoteJwksSource {
    /// Creates a remote JWKS source.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Invalid`] when the URL or client settings are invalid.
    pub fn new(config: RemoteJwksConfig, clock: Arc<dyn Clock>) -> Result<Self, KeyError> {
        let url = Url::parse(&config.url).map_err(|err| KeyError::Invalid(format!("jwks url: {err}")))?;
        match url.scheme() {
            "https" => {}
            "http" if config.allow_http => {}
            scheme => {
                return Err(KeyError::Invalid(format!("jwks url scheme {scheme} not allowed")));
            }
        }
        if config.max_response_bytes == 0 {
            return Err(KeyError::Invalid("jwks max_response_bytes must be > 0".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|_| KeyError::Invalid("http client build failed".to_string()))?;
        Ok(Self {
            state: Arc::new(RemoteState {
                config,
                url,
                client,
                cache: RwLock::new(None),
                refresh: Mutex::new(RefreshState::default()),
            }),
            clock,
        })
    }
}

impl fmt::Debug for RemoteJwksSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteJwksSource").field("url", &self.state.config.url).finish_non_exhaustive()
    }
}

#[async_trait]
impl KeySource for RemoteJwksSource {
    async fn decoding_key(&self, kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        let now = self.clock.now();
        let (key, fresh) = self.state.lookup(kid, now).await;
        if let Some(key) = key {
            if !fresh {
                self.state.start_refresh(now, true);
            }
            return Ok(key);
        }
        let Some(status) = self.state.start_refresh(now, fresh) else {
            return Err(KeyError::UnknownKey(kid.unwrap_or("<none>").to_string()));
        };
        let failure = refresh_outcome(status).await;
        match self.state.lookup(kid, now).await {
            (Some(key), _) => Ok(key),
            (None, _) => Err(failure.unwrap_or_else(|| KeyError::UnknownKey(kid.unwrap_or("<none>").to_string()))),
        }
    }

    async fn prewarm(&self) -> Result<(), KeyError> {
        let now = self.clock.now();
        match self.state.start_refresh(now, false) {
            Some(status) => refresh_outcome(status).await.map_or(Ok(()), Err),
            None => Ok(()),
        }
    }

    fn describe(&self) -> String {
        format!("jwks({})", self.state.config.url)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses `max-age` from a `Cache-Control` header value.
fn parse_max_age(value: &str) -> Option<Duration> {
    value.split(',').find_map(|directive| {
        let (name, seconds) = directive.trim().split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("max-age") {
            return None;
        }
        seconds.trim().trim_matches('"').parse::<u64>().ok().map(Duration::from_secs)
    })
}

/// Reads a response body, failing once `max_bytes` is exceeded.
async fn read_body_limited(mut response: reqwest::Response, max_bytes: usize) -> Result<Vec<u8>, KeyError> {
    let max_bytes_u64 = u64::try_from(max_bytes)
        .map_err(|_| KeyError::Invalid("response size limit exceeds u64".to_string()))?;
    if response.content_length().is_some_and(|expected| expected > max_bytes_u64) {
        return Err(KeyError::Unavailable("jwks response exceeds size limit".to_string()));
    }
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| KeyError::Unavailable(format!("failed to read jwks response: {err}")))?
    {
        if body.len().saturating_add(chunk.len()) > max_bytes {
            return Err(KeyError::Unavailable("jwks response exceeds size limit".to_string()));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
