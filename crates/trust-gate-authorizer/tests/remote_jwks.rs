// crates/trust-gate-authorizer/tests/remote_jwks.rs
// ============================================================================
// Module: Remote JWKS Tests
// Description: Fetch, cache, and refresh behavior of URL-backed key sources.
// Purpose: Validate caching, unknown-key throttling, background refresh, and
//          response limits.
// Dependencies: trust-gate-authorizer, tiny_http, tokio
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use tiny_http::Header;
use tiny_http::Response;
use tiny_http::Server;
use trust_gate_authorizer::KeyError;
use trust_gate_authorizer::KeySource;
use trust_gate_authorizer::RemoteJwksConfig;
use trust_gate_authorizer::RemoteJwksSource;
use trust_gate_core::Clock;
use trust_gate_core::ManualClock;
use trust_gate_core::Timestamp;

const JWKS: &str = r#"{"keys":[{"kty":"RSA","kid":"k1","use":"sig","alg":"RS256","n":"sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw","e":"AQAB"}]}"#;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serves `body` for every request and counts hits.
fn spawn_jwks_server(status: u16, body: &'static str, cache_control: Option<&'static str>) -> (String, Arc<AtomicUsize>) {
    spawn_scripted_server(vec![(status, body)], cache_control, Duration::ZERO)
}

/// Serves the scripted responses in order, repeating the last one, after
/// sleeping `delay` per request.
fn spawn_scripted_server(
    script: Vec<(u16, &'static str)>,
    cache_control: Option<&'static str>,
    delay: Duration,
) -> (String, Arc<AtomicUsize>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    thread::spawn(move || {
        while let Ok(request) = server.recv() {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let (status, body) = script.get(index).or_else(|| script.last()).copied().unwrap();
            thread::sleep(delay);
            let mut response = Response::from_string(body)
                .with_status_code(status)
                .with_header(Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).unwrap());
            if let Some(value) = cache_control {
                response = response.with_header(Header::from_bytes(&b"Cache-Control"[..], value.as_bytes()).unwrap());
            }
            let _ = request.respond(response);
        }
    });
    (format!("http://{addr}/.well-known/jwks.json"), hits)
}

/// Waits until the server has seen `expected` requests.
async fn wait_for_hits(hits: &AtomicUsize, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while hits.load(Ordering::SeqCst) < expected {
        assert!(Instant::now() < deadline, "server saw {} of {expected} requests", hits.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn source(url: String, max_response_bytes: usize) -> (RemoteJwksSource, Arc<ManualClock>) {
    source_with_refresh(url, max_response_bytes, Duration::from_secs(30))
}

fn source_with_refresh(
    url: String,
    max_response_bytes: usize,
    min_refresh_interval: Duration,
) -> (RemoteJwksSource, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_000)));
    let config = RemoteJwksConfig {
        url,
        cache_ttl: Duration::from_secs(60),
        timeout: Duration::from_secs(2),
        max_response_bytes,
        min_refresh_interval,
        allow_http: true,
    };
    let source = RemoteJwksSource::new(config, Arc::clone(&clock) as Arc<dyn Clock>).unwrap();
    (source, clock)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn keys_are_cached_until_ttl() {
    let (url, hits) = spawn_jwks_server(200, JWKS, None);
    let (source, clock) = source(url, 64 * 1024);

    source.decoding_key(Some("k1")).await.unwrap();
    source.decoding_key(Some("k1")).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(61));
    source.decoding_key(Some("k1")).await.unwrap();
    wait_for_hits(&hits, 2).await;
}

#[tokio::test]
async fn unknown_kid_refresh_is_throttled() {
    let (url, hits) = spawn_jwks_server(200, JWKS, None);
    let (source, clock) = source(url, 64 * 1024);

    source.decoding_key(Some("k1")).await.unwrap();
    let err = source.decoding_key(Some("rotated")).await.unwrap_err();
    assert!(matches!(err, KeyError::UnknownKey(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(31));
    let err = source.decoding_key(Some("rotated")).await.unwrap_err();
    assert!(matches!(err, KeyError::UnknownKey(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cache_control_max_age_overrides_configured_ttl() {
    let (url, hits) = spawn_jwks_server(200, JWKS, Some("public, max-age=5"));
    let (source, clock) = source(url, 64 * 1024);

    source.decoding_key(Some("k1")).await.unwrap();
    clock.advance(Duration::from_secs(6));
    source.decoding_key(Some("k1")).await.unwrap();
    wait_for_hits(&hits, 2).await;
}

#[tokio::test]
async fn oversized_document_is_unavailable() {
    let (url, _hits) = spawn_jwks_server(200, JWKS, None);
    let (source, _clock) = source(url, 64);

    let err = source.decoding_key(Some("k1")).await.unwrap_err();
    assert!(matches!(err, KeyError::Unavailable(_)));
}

#[tokio::test]
async fn server_error_is_unavailable() {
    let (url, _hits) = spawn_jwks_server(503, "{}", None);
    let (source, _clock) = source(url, 64 * 1024);

    let err = source.decoding_key(Some("k1")).await.unwrap_err();
    assert!(matches!(err, KeyError::Unavailable(_)));
}

#[tokio::test]
async fn fetch_outliving_a_timed_out_lookup_still_fills_cache() {
    let (url, hits) = spawn_scripted_server(vec![(200, JWKS)], None, Duration::from_millis(400));
    let (source, _clock) = source_with_refresh(url, 64 * 1024, Duration::ZERO);
    let budget = Duration::from_millis(250);

    let first = tokio::time::timeout(budget, source.decoding_key(Some("k1"))).await;
    assert!(first.is_err(), "cold fetch should outlast the lookup budget");

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(found) = tokio::time::timeout(budget, source.decoding_key(Some("k1"))).await {
            found.unwrap();
            break;
        }
        assert!(Instant::now() < deadline, "key set never became available");
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_cold_lookups_share_one_fetch() {
    let (url, hits) = spawn_scripted_server(vec![(200, JWKS)], None, Duration::from_millis(100));
    let (source, _clock) = source(url, 64 * 1024);

    let (a, b, c) = tokio::join!(
        source.decoding_key(Some("k1")),
        source.decoding_key(Some("k1")),
        source.decoding_key(Some("k1")),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_keys_serve_through_failed_refresh_then_fail_closed() {
    let (url, hits) = spawn_scripted_server(vec![(200, JWKS), (503, "{}")], None, Duration::ZERO);
    let (source, clock) = source(url, 64 * 1024);

    source.decoding_key(Some("k1")).await.unwrap();
    clock.advance(Duration::from_secs(61));
    source.decoding_key(Some("k1")).await.unwrap();
    wait_for_hits(&hits, 2).await;
    source.decoding_key(Some("k1")).await.unwrap();

    clock.advance(Duration::from_secs(60));
    let err = source.decoding_key(Some("k1")).await.unwrap_err();
    assert!(matches!(err, KeyError::Unavailable(_)));
}

#[tokio::test]
async fn prewarm_loads_keys_before_first_lookup() {
    let (url, hits) = spawn_jwks_server(200, JWKS, None);
    let (source, _clock) = source(url, 64 * 1024);

    source.prewarm().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    source.decoding_key(Some("k1")).await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
