//! Sync orchestrator
//!
//! A single task owns the navigation queue, the dedup set and the delivery
//! backlog. Everything reaches it as a [`Command`]; long-running work (page
//! extraction, remote calls) runs in spawned tasks that report back through
//! the same channel, so state is only ever touched from the loop.
//!
//! At most one extraction and one outbound call are in flight. Outbound calls
//! (submit and analyze alike) pass through one [`OutboundRateLimiter`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dedup::DedupSet;
use super::page_agent::PageHandle;
use super::queue::{EnqueueRejection, NavigationQueue, QueueEntry};
use super::rate_limiter::OutboundRateLimiter;
use crate::domain::events::{EntryState, SyncEvent, SyncStats};
use crate::domain::extraction::ExtractionResult;
use crate::domain::product::{AnalysisRecord, ProductRecord};
use crate::domain::services::{CollectionService, ProductSubmission, RemoteProduct};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::product_cache::ProductCache;
use crate::infrastructure::sync_error::{SyncError, SyncResult};
use crate::infrastructure::sync_state_repository::SyncStateRepository;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Orchestrator tuning, taken from [`AppConfig`]
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub min_request_interval: Duration,
    pub dedup_ttl: Duration,
    pub navigation_cooldown: Duration,
    pub channel_timeout: Duration,
    pub queue_capacity: usize,
    pub project_id: String,
    pub user_id: String,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            min_request_interval: config.sync.min_request_interval(),
            dedup_ttl: config.sync.dedup_ttl(),
            navigation_cooldown: config.sync.navigation_cooldown(),
            channel_timeout: config.sync.channel_timeout(),
            queue_capacity: config.sync.queue_capacity,
            project_id: config.remote.project_id.clone(),
            user_id: config.remote.user_id.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// What happened to a navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    CooldownSkipped,
    NotEligible,
    QueueFull,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzeOutcome {
    Analyzed(AnalysisRecord),
    /// Already analyzed; nothing was sent
    AlreadyAnalyzed,
}

type AnalyzeReply = oneshot::Sender<SyncResult<AnalyzeOutcome>>;

enum Command {
    Enqueue { page: PageHandle, reply: oneshot::Sender<EnqueueOutcome> },
    ExtractionFinished { url: String, result: ExtractionResult },
    DeliveryFinished { product_id: String, finished: DateTime<Utc>, outcome: DeliveryOutcome },
    Analyze { product_id: String, reply: AnalyzeReply },
    WaitIdle { reply: oneshot::Sender<()> },
    Reset { reply: oneshot::Sender<Result<()>> },
    Shutdown,
}

enum DeliveryJob {
    Submit(ProductRecord),
    Analyze { record: ProductRecord, reply: AnalyzeReply },
}

enum DeliveryOutcome {
    Submitted(SyncResult<RemoteProduct>),
    Analyzed { result: SyncResult<AnalysisRecord>, reply: AnalyzeReply },
}

/// Cloneable front door to the orchestrator task
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<SyncEvent>,
    stats: watch::Receiver<SyncStats>,
    channel_timeout: Duration,
}

impl OrchestratorHandle {
    /// Report a navigation: ineligible pages are rejected here, eligible ones
    /// go through the cooldown check and onto the queue
    pub async fn navigate(&self, page: &PageHandle) -> SyncResult<EnqueueOutcome> {
        let classification = page.check_eligible(self.channel_timeout).await;
        if !classification.eligible {
            debug!(url = page.url(), signals = ?classification.signals, "page not eligible");
            let _ = self.events.send(SyncEvent::NotEligible { url: page.url().to_string() });
            return Ok(EnqueueOutcome::NotEligible);
        }

        let (reply, rx) = oneshot::channel();
        self.send(Command::Enqueue { page: page.clone(), reply }).await?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    /// User-initiated analysis of a cached product
    pub async fn analyze(&self, product_id: &str) -> SyncResult<AnalyzeOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Analyze { product_id: product_id.to_string(), reply }).await?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    /// Resolves once the queue is drained and nothing is in flight
    pub async fn wait_idle(&self) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::WaitIdle { reply }).await?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    /// Drop queued work and clear every persisted table
    pub async fn reset(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Reset { reply }).await?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Derived counters; updated after every cache change
    pub fn stats(&self) -> watch::Receiver<SyncStats> {
        self.stats.clone()
    }

    pub fn current_stats(&self) -> SyncStats {
        *self.stats.borrow()
    }

    async fn send(&self, command: Command) -> SyncResult<()> {
        self.tx.send(command).await.map_err(|_| SyncError::ChannelClosed)
    }
}

pub struct SyncOrchestrator {
    settings: OrchestratorSettings,
    rx: mpsc::Receiver<Command>,
    self_tx: mpsc::WeakSender<Command>,
    events: broadcast::Sender<SyncEvent>,
    stats: watch::Sender<SyncStats>,

    db: DatabaseConnection,
    cache: ProductCache,
    state: SyncStateRepository,
    service: Arc<dyn CollectionService>,
    limiter: Arc<OutboundRateLimiter>,

    queue: NavigationQueue,
    dedup: DedupSet,
    extracting: Option<QueueEntry>,
    deliveries: VecDeque<DeliveryJob>,
    delivering: bool,
    idle_waiters: Vec<oneshot::Sender<()>>,
}

impl SyncOrchestrator {
    /// Restore persisted state and start the orchestrator task
    ///
    /// Dedup entries and the last request time are restored as-is. Journaled
    /// queue entries lost their page agents with the previous process: they
    /// keep their cooldown but are not re-extracted.
    pub async fn spawn(
        settings: OrchestratorSettings,
        db: &DatabaseConnection,
        service: Arc<dyn CollectionService>,
    ) -> SyncResult<(OrchestratorHandle, JoinHandle<()>)> {
        let cache = ProductCache::new(db);
        let state = SyncStateRepository::new(db);
        let now = Utc::now();

        let mut dedup = DedupSet::new(settings.dedup_ttl);
        let restored = state.load_dedup(now).await?;
        let restored_count = restored.len();
        for (product_id, expires_at) in restored {
            dedup.seed(product_id, expires_at);
        }

        let mut queue = NavigationQueue::new(settings.navigation_cooldown, settings.queue_capacity);
        let journal = state.load_journal().await?;
        if !journal.is_empty() {
            info!(entries = journal.len(), "discarding queue entries from previous run");
        }
        for entry in &journal {
            queue.seed_cooldown(&entry.url, entry.enqueued_at);
        }
        state.clear_journal().await?;

        let limiter = OutboundRateLimiter::seeded(settings.min_request_interval, state.last_request().await?, now);
        let initial_stats = cache.stats().await?;

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (stats_tx, stats_rx) = watch::channel(initial_stats);

        let handle = OrchestratorHandle {
            tx: tx.clone(),
            events: events.clone(),
            stats: stats_rx,
            channel_timeout: settings.channel_timeout,
        };

        info!(
            dedup_entries = restored_count,
            cached = initial_stats.cached_products,
            analyzed = initial_stats.analyzed_products,
            interval_ms = settings.min_request_interval.as_millis(),
            "sync orchestrator starting"
        );

        let orchestrator = Self {
            settings,
            rx,
            self_tx: tx.downgrade(),
            events,
            stats: stats_tx,
            db: db.clone(),
            cache,
            state,
            service,
            limiter: Arc::new(limiter),
            queue,
            dedup,
            extracting: None,
            deliveries: VecDeque::new(),
            delivering: false,
            idle_waiters: Vec::new(),
        };
        Ok((handle, tokio::spawn(orchestrator.run())))
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Enqueue { page, reply } => {
                    let outcome = self.enqueue(page).await;
                    let _ = reply.send(outcome);
                }
                Command::ExtractionFinished { url, result } => self.on_extraction_finished(&url, result).await,
                Command::DeliveryFinished { product_id, finished, outcome } => {
                    self.on_delivery_finished(&product_id, finished, outcome).await;
                }
                Command::Analyze { product_id, reply } => self.on_analyze(product_id, reply).await,
                Command::WaitIdle { reply } => self.idle_waiters.push(reply),
                Command::Reset { reply } => {
                    let result = self.reset().await;
                    let _ = reply.send(result);
                }
                Command::Shutdown => break,
            }

            self.start_extraction().await;
            self.start_delivery().await;
            self.notify_if_idle();
        }
        info!("sync orchestrator stopped");
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.extracting.is_none() && !self.delivering && self.deliveries.is_empty()
    }

    fn notify_if_idle(&mut self) {
        if self.is_idle() {
            for waiter in self.idle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        debug!(event = event.event_name(), "sync event");
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn publish_stats(&self) {
        match self.cache.stats().await {
            Ok(stats) => {
                self.stats.send_replace(stats);
            }
            Err(e) => error!("Failed to recompute sync stats: {}", e),
        }
    }

    // ---- navigation queue ----

    async fn enqueue(&mut self, page: PageHandle) -> EnqueueOutcome {
        let url = page.url().to_string();
        let now = Utc::now();
        match self.queue.try_enqueue(page, now) {
            Ok(()) => {
                if let Err(e) = self.state.journal_enqueue(&url, now).await {
                    warn!("Failed to journal {}: {}", url, e);
                }
                info!(url = %url, queued = self.queue.len(), "page enqueued");
                self.emit(SyncEvent::Enqueued { url });
                EnqueueOutcome::Enqueued
            }
            Err(EnqueueRejection::Cooldown) => {
                debug!(url = %url, "navigation within cooldown, skipped");
                self.emit(SyncEvent::CooldownSkipped { url });
                EnqueueOutcome::CooldownSkipped
            }
            Err(EnqueueRejection::Full) => {
                warn!(url = %url, capacity = self.settings.queue_capacity, "navigation queue full");
                EnqueueOutcome::QueueFull
            }
        }
    }

    async fn start_extraction(&mut self) {
        if self.extracting.is_some() {
            return;
        }
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let Some(entry) = self.queue.pop_next() else {
            return;
        };

        if let Err(e) = self.state.journal_attempt(entry.url()).await {
            warn!("Failed to journal attempt for {}: {}", entry.url(), e);
        }
        debug!(url = entry.url(), attempt = entry.attempts, "extraction started");

        let page = entry.page.clone();
        let limit = self.settings.channel_timeout;
        self.extracting = Some(entry);
        tokio::spawn(async move {
            let result = page.extract(limit).await;
            let _ = tx.send(Command::ExtractionFinished { url: page.url().to_string(), result }).await;
        });
    }

    async fn on_extraction_finished(&mut self, url: &str, result: ExtractionResult) {
        let Some(mut entry) = self.extracting.take() else {
            warn!(url, "extraction result with no extraction in flight");
            return;
        };
        if let Err(e) = self.state.journal_remove(url).await {
            warn!("Failed to clear journal entry {}: {}", url, e);
        }

        let missing = result.missing_fields().to_vec();
        let record = match result {
            ExtractionResult::Failure { reason } => {
                entry.state = EntryState::Discarded;
                warn!(url, attempts = entry.attempts, state = ?entry.state, "extraction failed: {}", reason);
                self.emit(SyncEvent::Discarded { url: url.to_string(), reason });
                return;
            }
            ExtractionResult::Success { record } | ExtractionResult::PartialSuccess { record, .. } => record,
        };

        let product_id = record.product_id.clone();
        if missing.is_empty() {
            self.emit(SyncEvent::Extracted { product_id: product_id.clone() });
        } else {
            info!(product_id = %product_id, ?missing, "partial extraction accepted");
            self.emit(SyncEvent::PartialExtraction { product_id: product_id.clone(), missing });
        }

        let now = Utc::now();
        self.dedup.purge_expired(now);
        match self.state.prune_dedup(now).await {
            Ok(0) => {}
            Ok(pruned) => debug!(pruned, "expired dedup entries removed"),
            Err(e) => warn!("Failed to prune dedup entries: {}", e),
        }
        if self.dedup.contains(&product_id, now) {
            entry.state = EntryState::Deduplicated;
            debug!(product_id = %product_id, state = ?entry.state, "recently sent, dropped");
            self.emit(SyncEvent::Deduplicated { product_id });
            return;
        }

        let expires_at = self.dedup.insert(&product_id, now);
        if let Err(e) = self.state.record_dedup(&product_id, expires_at).await {
            warn!("Failed to persist dedup entry {}: {}", product_id, e);
        }

        match self.cache.merge(&record).await {
            Ok(outcome) if outcome.changed() => {
                debug!(product_id = %product_id, ?outcome, "cache updated");
                self.publish_stats().await;
            }
            Ok(_) => debug!(product_id = %product_id, "cached record unchanged"),
            Err(e) => error!("Failed to cache {}: {}", product_id, e),
        }

        entry.state = EntryState::Sent;
        debug!(product_id = %product_id, state = ?entry.state, "queued for delivery");
        self.deliveries.push_back(DeliveryJob::Submit(record));
    }

    // ---- remote delivery ----

    async fn on_analyze(&mut self, product_id: String, reply: AnalyzeReply) {
        match self.cache.get(&product_id).await {
            Ok(None) => {
                let _ = reply.send(Err(SyncError::NotCached(product_id)));
            }
            Ok(Some(cached)) if cached.analyzed => {
                debug!(product_id = %product_id, "already analyzed");
                let _ = reply.send(Ok(AnalyzeOutcome::AlreadyAnalyzed));
            }
            Ok(Some(cached)) => self.deliveries.push_back(DeliveryJob::Analyze { record: cached.record, reply }),
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    async fn start_delivery(&mut self) {
        if self.delivering {
            return;
        }
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };

        while let Some(job) = self.deliveries.pop_front() {
            // an earlier job may have analyzed the same product
            let analyzed = match &job {
                DeliveryJob::Analyze { record, .. } => self.is_analyzed(&record.product_id).await,
                DeliveryJob::Submit(_) => false,
            };
            if analyzed {
                if let DeliveryJob::Analyze { reply, .. } = job {
                    let _ = reply.send(Ok(AnalyzeOutcome::AlreadyAnalyzed));
                }
                continue;
            }
            self.spawn_delivery(tx, job);
            return;
        }
    }

    async fn is_analyzed(&self, product_id: &str) -> bool {
        matches!(self.cache.get(product_id).await, Ok(Some(cached)) if cached.analyzed)
    }

    fn spawn_delivery(&mut self, tx: mpsc::Sender<Command>, job: DeliveryJob) {
        self.delivering = true;
        let limiter = Arc::clone(&self.limiter);
        let service = Arc::clone(&self.service);
        let project_id = self.settings.project_id.clone();
        let user_id = self.settings.user_id.clone();

        tokio::spawn(async move {
            limiter.acquire().await;

            let (product_id, outcome) = match job {
                DeliveryJob::Submit(record) => {
                    let product_id = record.product_id.clone();
                    let submission = ProductSubmission::new(record, &project_id, &user_id);
                    (product_id, DeliveryOutcome::Submitted(service.submit_product(&submission).await))
                }
                DeliveryJob::Analyze { record, reply } => {
                    let product_id = record.product_id.clone();
                    let submission = ProductSubmission::new(record, &project_id, &user_id);
                    let result = service.analyze_product(&submission).await;
                    (product_id, DeliveryOutcome::Analyzed { result, reply })
                }
            };
            limiter.finished().await;
            let finished = Utc::now();
            let _ = tx.send(Command::DeliveryFinished { product_id, finished, outcome }).await;
        });
    }

    async fn on_delivery_finished(&mut self, product_id: &str, finished: DateTime<Utc>, outcome: DeliveryOutcome) {
        self.delivering = false;
        if let Err(e) = self.state.set_last_request(finished).await {
            warn!("Failed to persist last request time: {}", e);
        }

        match outcome {
            DeliveryOutcome::Submitted(Ok(remote)) => {
                info!(product_id, remote_id = %remote.id, "delivered");
                self.emit(SyncEvent::Delivered { product_id: product_id.to_string() });
            }
            DeliveryOutcome::Submitted(Err(e)) => self.on_delivery_failed(product_id, &e).await,
            DeliveryOutcome::Analyzed { result: Ok(analysis), reply } => match self.cache.attach_analysis(&analysis).await {
                Ok(_) => {
                    info!(product_id, "analysis attached");
                    self.publish_stats().await;
                    self.emit(SyncEvent::Analyzed { product_id: product_id.to_string() });
                    let _ = reply.send(Ok(AnalyzeOutcome::Analyzed(analysis)));
                }
                Err(e) => {
                    error!("Failed to store analysis for {}: {}", product_id, e);
                    let _ = reply.send(Err(e));
                }
            },
            DeliveryOutcome::Analyzed { result: Err(e), reply } => {
                self.on_delivery_failed(product_id, &e).await;
                let _ = reply.send(Err(e));
            }
        }
    }

    /// The cache keeps the record; only the dedup entry is released
    async fn on_delivery_failed(&mut self, product_id: &str, error: &SyncError) {
        warn!(product_id, "delivery failed: {}", error);
        if error.releases_dedup() {
            self.dedup.remove(product_id);
            if let Err(e) = self.state.remove_dedup(product_id).await {
                warn!("Failed to release dedup entry {}: {}", product_id, e);
            }
        }
        if matches!(error, SyncError::AuthExpired) {
            self.emit(SyncEvent::AuthExpired { product_id: product_id.to_string() });
        }
        self.emit(SyncEvent::DeliveryFailed { product_id: product_id.to_string(), error: error.to_string() });
    }

    // ---- reset ----

    /// In-flight extraction and delivery finish normally; their results land
    /// on the emptied state
    async fn reset(&mut self) -> Result<()> {
        self.queue.clear();
        self.dedup.clear();
        self.deliveries.clear();
        self.db.reset().await?;
        self.publish_stats().await;
        info!("sync state reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::page_agent::PageAgent;
    use crate::infrastructure::page_sources::StaticPage;
    use crate::infrastructure::parsing::{ExtractionEngine, ParsingConfig};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const PAGE: &str = r#"<html><body>
        <span id="productTitle">Widget</span>
        <span class="a-price"><span class="a-offscreen">$19.99</span></span>
        <table id="productDetails_detailBullets_sections1">
            <tr><th>Best Sellers Rank</th><td>#12 in Tools</td></tr>
            <tr><th>Date First Available</th><td>March 3, 2021</td></tr>
        </table>
    </body></html>"#;

    #[derive(Default)]
    struct RecordingService {
        submitted: Mutex<Vec<String>>,
        analyzed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CollectionService for RecordingService {
        async fn submit_product(&self, submission: &ProductSubmission) -> SyncResult<RemoteProduct> {
            self.submitted.lock().unwrap().push(submission.record.product_id.clone());
            Ok(RemoteProduct { id: "remote-1".into() })
        }

        async fn analyze_product(&self, submission: &ProductSubmission) -> SyncResult<AnalysisRecord> {
            self.analyzed.lock().unwrap().push(submission.record.product_id.clone());
            Ok(AnalysisRecord {
                product_id: submission.record.product_id.clone(),
                scores: BTreeMap::from([("overall".to_string(), 0.8)]),
                sections: BTreeMap::new(),
                analyzed_at: Utc::now(),
            })
        }
    }

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings {
            min_request_interval: Duration::from_millis(20),
            channel_timeout: Duration::from_secs(5),
            ..OrchestratorSettings::default()
        }
    }

    fn engine() -> Arc<ExtractionEngine> {
        let config = ParsingConfig { retry_backoff_ms: 5, ..ParsingConfig::default() };
        Arc::new(ExtractionEngine::new(&config).unwrap())
    }

    async fn database(dir: &TempDir) -> DatabaseConnection {
        DatabaseConnection::open(&dir.path().join("sync.db")).await.unwrap()
    }

    #[tokio::test]
    async fn eligible_page_is_extracted_cached_and_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(&dir).await;
        let service = Arc::new(RecordingService::default());
        let (handle, _task) = SyncOrchestrator::spawn(settings(), &db, service.clone()).await.unwrap();
        let mut events = handle.subscribe();

        let (page, _agent) = PageAgent::spawn(StaticPage::new("https://www.amazon.com/dp/B000TESTAA", PAGE), engine());
        assert_eq!(handle.navigate(&page).await.unwrap(), EnqueueOutcome::Enqueued);
        handle.wait_idle().await.unwrap();

        assert_eq!(*service.submitted.lock().unwrap(), vec!["B000TESTAA".to_string()]);
        assert_eq!(handle.current_stats(), SyncStats { cached_products: 1, analyzed_products: 0 });

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.event_name());
        }
        assert_eq!(names, ["enqueued", "extracted", "delivered"]);
    }

    #[tokio::test]
    async fn ineligible_page_is_not_enqueued() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(&dir).await;
        let (handle, _task) = SyncOrchestrator::spawn(settings(), &db, Arc::new(RecordingService::default())).await.unwrap();

        let (page, _agent) = PageAgent::spawn(StaticPage::new("https://www.amazon.com/s?k=widgets", "<html></html>"), engine());
        assert_eq!(handle.navigate(&page).await.unwrap(), EnqueueOutcome::NotEligible);
        handle.wait_idle().await.unwrap();
        assert_eq!(handle.current_stats().cached_products, 0);
    }

    #[tokio::test]
    async fn analyze_attaches_scores_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(&dir).await;
        let service = Arc::new(RecordingService::default());
        let (handle, _task) = SyncOrchestrator::spawn(settings(), &db, service.clone()).await.unwrap();

        assert!(matches!(handle.analyze("B000TESTAA").await, Err(SyncError::NotCached(_))));

        let (page, _agent) = PageAgent::spawn(StaticPage::new("https://www.amazon.com/dp/B000TESTAA", PAGE), engine());
        handle.navigate(&page).await.unwrap();
        handle.wait_idle().await.unwrap();

        let first = handle.analyze("B000TESTAA").await.unwrap();
        assert!(matches!(first, AnalyzeOutcome::Analyzed(ref a) if a.scores["overall"] > 0.5));
        assert_eq!(handle.analyze("B000TESTAA").await.unwrap(), AnalyzeOutcome::AlreadyAnalyzed);
        assert_eq!(service.analyzed.lock().unwrap().len(), 1);
        assert_eq!(handle.current_stats().analyzed_products, 1);
        assert_eq!(handle.current_stats().badge_text(), "1");
    }

    #[tokio::test]
    async fn reset_clears_cache_and_counters() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(&dir).await;
        let (handle, _task) = SyncOrchestrator::spawn(settings(), &db, Arc::new(RecordingService::default())).await.unwrap();

        let (page, _agent) = PageAgent::spawn(StaticPage::new("https://www.amazon.com/dp/B000TESTAA", PAGE), engine());
        handle.navigate(&page).await.unwrap();
        handle.wait_idle().await.unwrap();
        assert_eq!(handle.current_stats().cached_products, 1);

        handle.reset().await.unwrap();
        assert_eq!(handle.current_stats(), SyncStats::default());
    }

    async fn persisted_dedup_ids(db: &DatabaseConnection) -> Vec<String> {
        sqlx::query_scalar("SELECT product_id FROM dedup_entries ORDER BY product_id")
            .fetch_all(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn expired_dedup_entries_are_dropped_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(&dir).await;
        let settings = OrchestratorSettings { dedup_ttl: Duration::from_millis(150), ..settings() };
        let (handle, _task) = SyncOrchestrator::spawn(settings, &db, Arc::new(RecordingService::default())).await.unwrap();

        let (first, _a) = PageAgent::spawn(StaticPage::new("https://www.amazon.com/dp/B000TESTAA", PAGE), engine());
        handle.navigate(&first).await.unwrap();
        handle.wait_idle().await.unwrap();
        assert_eq!(persisted_dedup_ids(&db).await, ["B000TESTAA"]);

        tokio::time::sleep(Duration::from_millis(250)).await;

        let (second, _b) = PageAgent::spawn(StaticPage::new("https://www.amazon.com/dp/B000TESTBB", PAGE), engine());
        handle.navigate(&second).await.unwrap();
        handle.wait_idle().await.unwrap();
        assert_eq!(persisted_dedup_ids(&db).await, ["B000TESTBB"]);
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(&dir).await;
        let (handle, task) = SyncOrchestrator::spawn(settings(), &db, Arc::new(RecordingService::default())).await.unwrap();

        handle.shutdown().await;
        task.await.unwrap();
        assert!(matches!(handle.wait_idle().await, Err(SyncError::ChannelClosed)));
    }
}
