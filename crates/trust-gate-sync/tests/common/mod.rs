// crates/trust-gate-sync/tests/common/mod.rs
// ============================================================================
// Module: Synchronizer Test Fixtures
// Description: Scripted range source, capturing audit, two-origin harness.
// Purpose: Drive the synchronizer deterministically against in-memory origins.
// Dependencies: trust-gate-sync, trust-gate-core
// ============================================================================

#![allow(dead_code, reason = "Each integration test uses a subset of the fixtures.")]

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use trust_gate_core::Clock;
use trust_gate_core::InMemoryTrustStore;
use trust_gate_core::IpRange;
use trust_gate_core::ManualClock;
use trust_gate_core::OriginKind;
use trust_gate_core::OriginRef;
use trust_gate_core::PublishedRanges;
use trust_gate_core::Timestamp;
use trust_gate_core::TrustState;
use trust_gate_core::TrustStore;
use trust_gate_sync::DocumentPublisher;
use trust_gate_sync::InMemoryPolicyPlatform;
use trust_gate_sync::ManagedAccess;
use trust_gate_sync::PolicyPlatform;
use trust_gate_sync::PolicyPublisher;
use trust_gate_sync::PolicyTarget;
use trust_gate_sync::RangeSource;
use trust_gate_sync::SequenceSecretGenerator;
use trust_gate_sync::SourceError;
use trust_gate_sync::SyncAuditEvent;
use trust_gate_sync::SyncAuditSink;
use trust_gate_sync::SyncEventKind;
use trust_gate_sync::SyncSettings;
use trust_gate_sync::Synchronizer;

pub const BUCKET: &str = "site-assets";
pub const API: &str = "a1b2c3d4e5";
pub const GRACE: Duration = Duration::from_secs(900);

// ============================================================================
// SECTION: Range Source
// ============================================================================

/// Range source whose answer the test controls.
pub struct ScriptedSource {
    answer: Mutex<Result<Vec<String>, SourceError>>,
    fetches: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    clock: Arc<dyn Clock>,
}

impl ScriptedSource {
    pub fn new(ranges: &[&str], clock: Arc<dyn Clock>) -> Self {
        Self {
            answer: Mutex::new(Ok(ranges.iter().map(ToString::to_string).collect())),
            fetches: AtomicUsize::new(0),
            delay: Mutex::new(None),
            clock,
        }
    }

    pub fn publish(&self, ranges: &[&str]) {
        *self.answer.lock().unwrap() = Ok(ranges.iter().map(ToString::to_string).collect());
    }

    pub fn fail(&self, err: SourceError) {
        *self.answer.lock().unwrap() = Err(err);
    }

    pub fn stall(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RangeSource for ScriptedSource {
    async fn fetch(&self) -> Result<PublishedRanges, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let answer = self.answer.lock().unwrap().clone()?;
        let ranges = answer.iter().map(|value| value.parse::<IpRange>().unwrap());
        Ok(PublishedRanges::from_ranges(ranges, "scripted", self.clock.now()))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink that keeps every event.
#[derive(Default)]
pub struct CapturingAudit {
    events: Mutex<Vec<SyncAuditEvent>>,
}

impl CapturingAudit {
    pub fn kinds(&self) -> Vec<SyncEventKind> {
        self.events.lock().unwrap().iter().map(|event| event.kind).collect()
    }

    pub fn count(&self, kind: SyncEventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn serialized(&self) -> String {
        let events = self.events.lock().unwrap();
        events.iter().map(|event| serde_json::to_string(event).unwrap()).collect::<Vec<_>>().join("\n")
    }
}

impl SyncAuditSink for CapturingAudit {
    fn record(&self, event: &SyncAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Clock that follows the tokio runtime clock, so paused-time tests move
/// grace deadlines and scheduler sleeps together.
pub struct RuntimeClock {
    origin: Timestamp,
    started: tokio::time::Instant,
}

impl RuntimeClock {
    pub fn starting_at(origin: Timestamp) -> Self {
        Self {
            origin,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for RuntimeClock {
    fn now(&self) -> Timestamp {
        self.origin.saturating_add(self.started.elapsed())
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Two origins (bucket then API) over one in-memory store.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryTrustStore>,
    pub source: Arc<ScriptedSource>,
    pub bucket: Arc<InMemoryPolicyPlatform>,
    pub api: Arc<InMemoryPolicyPlatform>,
    pub secrets: Arc<SequenceSecretGenerator>,
    pub audit: Arc<CapturingAudit>,
}

impl Harness {
    pub fn new(ranges: &[&str]) -> Self {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_700_000_000)));
        let source = Arc::new(ScriptedSource::new(ranges, Arc::clone(&clock) as Arc<dyn Clock>));
        Self {
            clock,
            store: Arc::new(InMemoryTrustStore::new()),
            source,
            bucket: Arc::new(InMemoryPolicyPlatform::new()),
            api: Arc::new(InMemoryPolicyPlatform::new()),
            secrets: Arc::new(SequenceSecretGenerator::default()),
            audit: Arc::new(CapturingAudit::default()),
        }
    }

    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            holder_id: "sync-a".to_string(),
            grace: GRACE,
            step_timeout: Duration::from_secs(5),
            lease_ttl: Duration::from_secs(3_600),
            secret_rotation_interval: None,
            alert_after_failures: 3,
        }
    }

    pub fn state(&self) -> TrustState {
        TrustState::new(Arc::clone(&self.store) as Arc<dyn TrustStore>)
    }

    pub fn bucket_publisher(&self) -> DocumentPublisher {
        DocumentPublisher::new(
            OriginRef::new(OriginKind::ObjectStore, BUCKET),
            PolicyTarget::object_store(BUCKET, "aws:Referer"),
            Arc::clone(&self.bucket) as Arc<dyn PolicyPlatform>,
        )
    }

    pub fn api_publisher(&self) -> DocumentPublisher {
        DocumentPublisher::new(
            OriginRef::new(OriginKind::ApiLayer, API),
            PolicyTarget::api_layer("aws:Referer"),
            Arc::clone(&self.api) as Arc<dyn PolicyPlatform>,
        )
    }

    pub fn synchronizer(&self) -> Synchronizer {
        self.synchronizer_with(self.settings())
    }

    pub fn synchronizer_with(&self, settings: SyncSettings) -> Synchronizer {
        self.synchronizer_from(
            settings,
            Arc::clone(&self.store) as Arc<dyn TrustStore>,
            Arc::clone(&self.clock) as Arc<dyn Clock>,
            self.publishers(),
        )
    }

    /// Builds a synchronizer over a substitute store, clock, or origins.
    pub fn synchronizer_from(
        &self,
        settings: SyncSettings,
        store: Arc<dyn TrustStore>,
        clock: Arc<dyn Clock>,
        publishers: Vec<Arc<dyn PolicyPublisher>>,
    ) -> Synchronizer {
        Synchronizer::new(
            settings,
            TrustState::new(store),
            Arc::clone(&self.source) as Arc<dyn RangeSource>,
            publishers,
            clock,
        )
        .with_secret_generator(Arc::clone(&self.secrets) as Arc<dyn trust_gate_sync::SecretGenerator>)
        .with_audit(Arc::clone(&self.audit) as Arc<dyn SyncAuditSink>)
    }

    pub fn publishers(&self) -> Vec<Arc<dyn PolicyPublisher>> {
        vec![Arc::new(self.bucket_publisher()), Arc::new(self.api_publisher())]
    }

    pub async fn bucket_access(&self) -> ManagedAccess {
        self.bucket_publisher().current_access().await.unwrap().expect("bucket has a managed statement")
    }

    pub async fn api_access(&self) -> ManagedAccess {
        self.api_publisher().current_access().await.unwrap().expect("api has a managed statement")
    }

    pub fn writes(&self) -> usize {
        self.bucket.write_count() + self.api.write_count()
    }

    pub fn range_version(&self) -> u64 {
        self.state().load_ranges().unwrap().map_or(0, |record| record.value.version)
    }

    pub fn secret_version(&self) -> u64 {
        self.state().load_secret().unwrap().map_or(0, |record| record.value.version)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

pub fn ip(value: &str) -> IpAddr {
    value.parse().unwrap()
}

pub fn ranges(values: &[&str]) -> std::collections::BTreeSet<IpRange> {
    values.iter().map(|value| value.parse().unwrap()).collect()
}
