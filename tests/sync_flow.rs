//! Orchestrator scenarios against an in-process collection service
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use proptest::prelude::*;
use tempfile::TempDir;

use planner_scout::application::{EnqueueOutcome, OrchestratorHandle, OrchestratorSettings, PageAgent, SyncOrchestrator};
use planner_scout::domain::{AnalysisRecord, CollectionService, ProductRecord, ProductSubmission, RemoteProduct, SyncEvent};
use planner_scout::infrastructure::parsing::{ExtractionEngine, ParsingConfig};
use planner_scout::infrastructure::{DatabaseConnection, MergeOutcome, ProductCache, StaticPage, SyncError, SyncResult};

const PAGE: &str = r#"<html><body>
    <span id="productTitle">Widget</span>
    <span class="a-price"><span class="a-offscreen">$19.99</span></span>
    <table id="productDetails_detailBullets_sections1">
        <tr><th>Best Sellers Rank</th><td>#12 in Tools</td></tr>
        <tr><th>Date First Available</th><td>March 3, 2021</td></tr>
    </table>
</body></html>"#;

/// Records every outbound call; queued failures are returned first
#[derive(Default)]
struct FakeService {
    calls: Mutex<Vec<(String, Instant)>>,
    failures: Mutex<VecDeque<SyncError>>,
}

impl FakeService {
    fn failing_with(errors: Vec<SyncError>) -> Self {
        Self { failures: Mutex::new(errors.into()), ..Self::default() }
    }

    fn call_ids(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }

    fn call_instants(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    fn record(&self, submission: &ProductSubmission) -> SyncResult<()> {
        self.calls.lock().unwrap().push((submission.record.product_id.clone(), Instant::now()));
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CollectionService for FakeService {
    async fn submit_product(&self, submission: &ProductSubmission) -> SyncResult<RemoteProduct> {
        self.record(submission)?;
        Ok(RemoteProduct { id: format!("remote-{}", submission.record.product_id) })
    }

    async fn analyze_product(&self, submission: &ProductSubmission) -> SyncResult<AnalysisRecord> {
        self.record(submission)?;
        Ok(AnalysisRecord {
            product_id: submission.record.product_id.clone(),
            scores: BTreeMap::from([("overall".to_string(), 0.7)]),
            sections: BTreeMap::from([("summary".to_string(), "Solid widget".to_string())]),
            analyzed_at: Utc::now(),
        })
    }
}

struct Harness {
    _dir: TempDir,
    db: DatabaseConnection,
    engine: Arc<ExtractionEngine>,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseConnection::open(&dir.path().join("sync.db")).await.unwrap();
        let config = ParsingConfig { retry_backoff_ms: 5, ..ParsingConfig::default() };
        Self { _dir: dir, db, engine: Arc::new(ExtractionEngine::new(&config).unwrap()) }
    }

    async fn orchestrator(&self, interval: Duration, service: Arc<FakeService>) -> OrchestratorHandle {
        let settings = OrchestratorSettings {
            min_request_interval: interval,
            navigation_cooldown: Duration::from_secs(2),
            channel_timeout: Duration::from_secs(5),
            ..OrchestratorSettings::default()
        };
        SyncOrchestrator::spawn(settings, &self.db, service).await.unwrap().0
    }

    async fn visit(&self, orchestrator: &OrchestratorHandle, url: &str) -> EnqueueOutcome {
        let (page, _agent) = PageAgent::spawn(StaticPage::new(url, PAGE), Arc::clone(&self.engine));
        orchestrator.navigate(&page).await.unwrap()
    }
}

fn drain(events: &mut tokio::sync::broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn rapid_repeat_navigation_yields_one_entry() {
    let harness = Harness::new().await;
    let service = Arc::new(FakeService::default());
    let orchestrator = harness.orchestrator(Duration::from_millis(10), service.clone()).await;

    let url = "https://www.amazon.com/dp/B000TESTAA";
    assert_eq!(harness.visit(&orchestrator, url).await, EnqueueOutcome::Enqueued);
    assert_eq!(harness.visit(&orchestrator, url).await, EnqueueOutcome::CooldownSkipped);
    orchestrator.wait_idle().await.unwrap();

    assert_eq!(service.call_ids(), ["B000TESTAA"]);
}

#[tokio::test]
async fn identifier_is_sent_once_within_dedup_window() {
    let harness = Harness::new().await;
    let service = Arc::new(FakeService::default());
    let orchestrator = harness.orchestrator(Duration::from_millis(10), service.clone()).await;
    let mut events = orchestrator.subscribe();

    harness.visit(&orchestrator, "https://www.amazon.com/dp/B000TESTAA").await;
    orchestrator.wait_idle().await.unwrap();
    harness.visit(&orchestrator, "https://www.amazon.com/Widget/dp/B000TESTAA?th=1").await;
    orchestrator.wait_idle().await.unwrap();

    assert_eq!(service.call_ids().len(), 1);
    assert!(drain(&mut events).contains(&SyncEvent::Deduplicated { product_id: "B000TESTAA".into() }));
    assert_eq!(orchestrator.current_stats().cached_products, 1);
}

#[tokio::test]
async fn server_error_releases_identifier_for_a_later_send() {
    let harness = Harness::new().await;
    let service = Arc::new(FakeService::failing_with(vec![SyncError::transport(Some(500), "Internal Server Error")]));
    let orchestrator = harness.orchestrator(Duration::from_millis(10), service.clone()).await;
    let mut events = orchestrator.subscribe();

    harness.visit(&orchestrator, "https://www.amazon.com/dp/B000TESTAA").await;
    orchestrator.wait_idle().await.unwrap();

    let seen = drain(&mut events);
    assert!(seen.iter().any(|e| matches!(e, SyncEvent::DeliveryFailed { product_id, .. } if product_id == "B000TESTAA")));
    // cache write is kept
    assert_eq!(orchestrator.current_stats().cached_products, 1);

    harness.visit(&orchestrator, "https://www.amazon.com/Widget/dp/B000TESTAA").await;
    orchestrator.wait_idle().await.unwrap();

    assert_eq!(service.call_ids(), ["B000TESTAA", "B000TESTAA"]);
    assert!(drain(&mut events).contains(&SyncEvent::Delivered { product_id: "B000TESTAA".into() }));
}

#[tokio::test]
async fn expired_credentials_surface_as_event() {
    let harness = Harness::new().await;
    let service = Arc::new(FakeService::failing_with(vec![SyncError::AuthExpired]));
    let orchestrator = harness.orchestrator(Duration::from_millis(10), service.clone()).await;
    let mut events = orchestrator.subscribe();

    harness.visit(&orchestrator, "https://www.amazon.com/dp/B000TESTAA").await;
    orchestrator.wait_idle().await.unwrap();

    assert!(drain(&mut events).contains(&SyncEvent::AuthExpired { product_id: "B000TESTAA".into() }));
}

#[tokio::test]
async fn outbound_calls_respect_minimum_interval() {
    let harness = Harness::new().await;
    let service = Arc::new(FakeService::default());
    let interval = Duration::from_millis(400);
    let orchestrator = harness.orchestrator(interval, service.clone()).await;

    harness.visit(&orchestrator, "https://www.amazon.com/dp/B000TESTAA").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.visit(&orchestrator, "https://www.amazon.com/dp/B000TESTBB").await;
    orchestrator.wait_idle().await.unwrap();

    let instants = service.call_instants();
    assert_eq!(instants.len(), 2);
    assert!(instants[1].duration_since(instants[0]) >= interval);
}

#[tokio::test]
async fn dedup_and_spacing_survive_restart() {
    let harness = Harness::new().await;
    let service = Arc::new(FakeService::default());
    let interval = Duration::from_millis(500);

    let orchestrator = harness.orchestrator(interval, service.clone()).await;
    harness.visit(&orchestrator, "https://www.amazon.com/dp/B000TESTAA").await;
    orchestrator.wait_idle().await.unwrap();
    orchestrator.shutdown().await;

    let restarted = harness.orchestrator(interval, service.clone()).await;
    assert_eq!(restarted.current_stats().cached_products, 1);

    harness.visit(&restarted, "https://www.amazon.com/Widget/dp/B000TESTAA").await;
    harness.visit(&restarted, "https://www.amazon.com/dp/B000TESTBB").await;
    restarted.wait_idle().await.unwrap();

    assert_eq!(service.call_ids(), ["B000TESTAA", "B000TESTBB"]);
    let instants = service.call_instants();
    assert!(instants[1].duration_since(instants[0]) >= interval);
}

#[tokio::test]
async fn analyze_is_idempotent_and_requires_cache() {
    let harness = Harness::new().await;
    let service = Arc::new(FakeService::default());
    let orchestrator = harness.orchestrator(Duration::from_millis(10), service.clone()).await;

    assert!(matches!(orchestrator.analyze("B000TESTAA").await, Err(SyncError::NotCached(id)) if id == "B000TESTAA"));

    harness.visit(&orchestrator, "https://www.amazon.com/dp/B000TESTAA").await;
    orchestrator.wait_idle().await.unwrap();

    let mut stats = orchestrator.stats();
    orchestrator.analyze("B000TESTAA").await.unwrap();
    orchestrator.analyze("B000TESTAA").await.unwrap();

    // one submit, one analyze
    assert_eq!(service.call_ids().len(), 2);
    assert!(stats.has_changed().unwrap());
    assert_eq!(stats.borrow_and_update().analyzed_products, 1);

    let cached = ProductCache::new(&harness.db).get("B000TESTAA").await.unwrap().unwrap();
    assert!(cached.analyzed);
    assert_eq!(cached.analysis.unwrap().sections["summary"], "Solid widget");
}

#[tokio::test]
async fn failed_analysis_reports_error_and_keeps_flag_clear() {
    let harness = Harness::new().await;
    let service = Arc::new(FakeService::default());
    let orchestrator = harness.orchestrator(Duration::from_millis(10), service.clone()).await;

    harness.visit(&orchestrator, "https://www.amazon.com/dp/B000TESTAA").await;
    orchestrator.wait_idle().await.unwrap();

    service.failures.lock().unwrap().push_back(SyncError::transport(Some(503), "busy"));
    assert!(matches!(orchestrator.analyze("B000TESTAA").await, Err(SyncError::Transport { status: Some(503), .. })));
    assert_eq!(orchestrator.current_stats().analyzed_products, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn merging_an_unchanged_record_twice_is_a_noop(title in "[A-Za-z ]{1,30}", price in "\\$[0-9]{1,4}\\.[0-9]{2}") {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let harness = Harness::new().await;
            let cache = ProductCache::new(&harness.db);

            let mut record = ProductRecord::new("B000TESTAA", "https://www.amazon.com/dp/B000TESTAA", Utc::now());
            record.title = Some(title);
            record.price = Some(price);

            assert_eq!(cache.merge(&record).await.unwrap(), MergeOutcome::Inserted);
            assert_eq!(cache.merge(&record).await.unwrap(), MergeOutcome::Unchanged);
            assert_eq!(cache.get("B000TESTAA").await.unwrap().unwrap().record, record);
        });
    }
}
