//! Entry point that wires the engine together and exposes the operator surface.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::broadcast::{
    ItemError, JobEvent, JobEventBroadcaster, JobStore, QueueStats, StatsBroadcaster,
    StatsSnapshot,
};
use crate::categorizer::{CategoryCatalog, CategoryDirective, CategoryId, CategoryTree};
use crate::config::loader::validate_config;
use crate::config::schema::{Config, PricingConfig, Settings};
use crate::collaborators::Scraper;
use crate::config::SettingsStore;
use crate::error::{Result, SchedulerError};
use crate::job::{is_list_page, normalize_url, Job, JobFlags, JobId};
use crate::ledger::{UsageLedger, UsageSummary};
use crate::limiter::RateLimiter;
use crate::pipeline::{Collaborators, DelayPolicy, PipelineExecutor};
use crate::scheduler::{CancelOutcome, JobScheduler};

fn default_true() -> bool {
    true
}

/// One URL in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub url: String,
    /// Overrides every batch-level category choice when non-empty.
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
}

impl BatchItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            category_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub items: Vec<BatchItem>,
    /// Used for items without their own ids when auto-detection is off.
    #[serde(default)]
    pub default_category_ids: Vec<CategoryId>,
    #[serde(default = "default_true")]
    pub use_auto_category: bool,
    #[serde(default)]
    pub include_all_pages: bool,
    #[serde(default)]
    pub no_publish: bool,
    /// `None` follows the `auto_publish` setting at admission.
    #[serde(default)]
    pub publish_now: Option<bool>,
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            default_category_ids: Vec::new(),
            use_auto_category: true,
            include_all_pages: false,
            no_publish: false,
            publish_now: None,
        }
    }
}

impl BatchRequest {
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: urls.into_iter().map(BatchItem::new).collect(),
            ..Self::default()
        }
    }

    /// Per-item ids first, then batch defaults in manual mode, else auto-detect.
    fn directive_for(&self, item: &BatchItem) -> CategoryDirective {
        if !item.category_ids.is_empty() {
            CategoryDirective::Explicit(item.category_ids.clone())
        } else if !self.use_auto_category && !self.default_category_ids.is_empty() {
            CategoryDirective::Explicit(self.default_category_ids.clone())
        } else {
            CategoryDirective::AutoDetect
        }
    }

    fn flags(&self) -> JobFlags {
        JobFlags {
            publish_now: self.publish_now,
            include_all_pages: self.include_all_pages,
            no_publish: self.no_publish,
        }
    }
}

pub struct OrchestratorBuilder {
    config: Config,
    collaborators: Collaborators,
    categories: CategoryTree,
    delay: Option<Arc<dyn DelayPolicy>>,
}

impl OrchestratorBuilder {
    pub fn categories(mut self, tree: CategoryTree) -> Self {
        self.categories = tree;
        self
    }

    /// Replaces the randomized pause between scrape retries.
    pub fn delay_policy(mut self, delay: Arc<dyn DelayPolicy>) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        validate_config(&self.config)?;
        let config = self.config;

        let settings = Arc::new(SettingsStore::new(config.settings));
        let store = Arc::new(JobStore::new());
        let events = JobEventBroadcaster::new(config.stats.channel_capacity);
        let ledger = Arc::new(UsageLedger::new(config.pricing));
        let limiter = Arc::new(RateLimiter::new(config.settings.articles_per_hour));
        let catalog = Arc::new(CategoryCatalog::new(self.categories));
        let scraper = Arc::clone(&self.collaborators.scraper);

        let mut executor = PipelineExecutor::new(
            self.collaborators,
            &config.scraping,
            &config.categories,
            Arc::clone(&catalog),
            Arc::clone(&ledger),
        );
        if let Some(delay) = self.delay {
            executor = executor.with_delay_policy(delay);
        }

        let scheduler = Arc::new(JobScheduler::new(
            Arc::clone(&store),
            events.clone(),
            Arc::new(executor),
            Arc::clone(&limiter),
            Arc::clone(&settings),
            config.scheduler.tick_interval(),
        ));
        let stats = Arc::new(StatsBroadcaster::new(
            scheduler.clone(),
            Arc::clone(&ledger),
            config.stats.interval(),
            config.stats.channel_capacity,
        ));

        Ok(Orchestrator {
            scraper,
            settings,
            store,
            events,
            ledger,
            limiter,
            catalog,
            scheduler,
            stats,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// Job orchestration engine.
///
/// Owns the stores and background loops; everything an operator or observer
/// does goes through here.
pub struct Orchestrator {
    scraper: Arc<dyn Scraper>,
    settings: Arc<SettingsStore>,
    store: Arc<JobStore>,
    events: JobEventBroadcaster,
    ledger: Arc<UsageLedger>,
    limiter: Arc<RateLimiter>,
    catalog: Arc<CategoryCatalog>,
    scheduler: Arc<JobScheduler>,
    stats: Arc<StatsBroadcaster>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn builder(config: Config, collaborators: Collaborators) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            collaborators,
            categories: CategoryTree::default(),
            delay: None,
        }
    }

    /// Starts the admission loop and the stats broadcaster. Must be called
    /// from inside a tokio runtime; later calls are no-ops.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let handles = [self.scheduler.start(), self.stats.start()];
        self.lock_tasks().extend(handles);
        log::info!("Orchestrator started");
    }

    /// Creates one job per new URL and queues them in order.
    ///
    /// List pages are expanded into the restaurants they link to, each
    /// taking the list item's categories; a list page that yields nothing is
    /// reported on [`Orchestrator::subscribe_item_errors`] and skipped.
    /// URLs are normalized first; empty URLs and URLs already tracked (or
    /// repeated in the batch) are skipped, so the result may be shorter than
    /// `request.items`.
    pub async fn submit(&self, request: BatchRequest) -> Result<Vec<JobId>> {
        if self.scheduler.is_shut_down() {
            return Err(SchedulerError::ShutDown.into());
        }
        let flags = request.flags();
        let mut seen = HashSet::new();
        let mut jobs = Vec::with_capacity(request.items.len());

        for item in &request.items {
            let raw = item.url.trim();
            if raw.is_empty() {
                continue;
            }
            let urls = if is_list_page(raw) {
                match self.expand_list_page(raw, request.include_all_pages).await {
                    Some(urls) => urls,
                    None => continue,
                }
            } else {
                vec![raw.to_string()]
            };

            for url in urls {
                let url = normalize_url(&url);
                if self.store.contains_url(&url) || !seen.insert(url.clone()) {
                    log::info!("Skipping duplicate URL: {}", url);
                    continue;
                }
                jobs.push(Job::new(url, request.directive_for(item), flags));
            }
        }

        Ok(self.scheduler.submit(jobs)?)
    }

    async fn expand_list_page(&self, url: &str, include_all_pages: bool) -> Option<Vec<String>> {
        let error = match self.scraper.list_restaurants(url, include_all_pages).await {
            Ok(urls) if !urls.is_empty() => {
                log::info!("Found {} restaurants on list page {}", urls.len(), url);
                return Some(urls);
            }
            Ok(_) => "No restaurants found on list page".to_string(),
            Err(e) => format!("Failed to read list page: {}", e),
        };
        log::error!("{}: {}", error, url);
        self.events.send_item_error(ItemError::new(url, error));
        None
    }

    pub fn job(&self, id: &JobId) -> Option<Job> {
        self.store.get(id)
    }

    /// Every tracked job in submission order.
    pub fn jobs(&self) -> Vec<Job> {
        self.store.list()
    }

    pub fn subscribe_jobs(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Batch items that produced no job.
    pub fn subscribe_item_errors(&self) -> broadcast::Receiver<ItemError> {
        self.events.subscribe_item_errors()
    }

    pub fn subscribe_stats(&self) -> broadcast::Receiver<StatsSnapshot> {
        self.stats.subscribe()
    }

    /// Current stats, without pushing them to subscribers.
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Current stats, also pushed to every subscriber.
    pub fn publish_stats(&self) -> StatsSnapshot {
        self.stats.publish_now()
    }

    pub fn usage(&self) -> UsageSummary {
        self.ledger.summary()
    }

    pub fn queue_length(&self) -> usize {
        self.scheduler.queue_length()
    }

    pub fn active_jobs(&self) -> usize {
        self.scheduler.active_jobs()
    }

    pub fn settings(&self) -> Settings {
        self.settings.get()
    }

    /// Applies new settings to future admissions and returns the old ones.
    pub fn update_settings(&self, next: Settings) -> Result<Settings> {
        let previous = self.settings.replace(next)?;
        self.limiter.set_max_per_hour(next.articles_per_hour);
        log::info!(
            "Settings updated: {} articles/hour, {} concurrent jobs, auto publish {}",
            next.articles_per_hour,
            next.concurrent_jobs,
            next.auto_publish
        );
        Ok(previous)
    }

    /// Changes the token price table; recorded costs are untouched.
    pub fn update_pricing(&self, pricing: PricingConfig) {
        self.ledger.set_pricing(pricing);
    }

    pub fn cancel(&self, id: &JobId) -> Result<CancelOutcome> {
        Ok(self.scheduler.cancel(id)?)
    }

    pub fn cancel_queued(&self) -> usize {
        self.scheduler.cancel_queued()
    }

    /// Evicts finished jobs.
    pub fn clear_finished(&self) -> usize {
        self.store.clear_finished()
    }

    /// Cancels queued jobs, then evicts everything not in flight.
    pub fn clear(&self) -> usize {
        self.scheduler.cancel_queued();
        let removed = self.store.remove_where(|job| !job.status.is_in_flight());
        log::info!("Cleared {} jobs", removed);
        removed
    }

    /// Swaps in a freshly loaded category tree. Running pipelines keep the
    /// tree they already resolved against.
    pub fn reload_categories(&self, tree: CategoryTree) {
        self.catalog.reload(tree);
    }

    pub fn categories(&self) -> Arc<CategoryTree> {
        self.catalog.current()
    }

    /// Stops both loops, cancels queued jobs and signals running pipelines,
    /// then waits for the loops to exit.
    pub async fn shutdown(&self) {
        self.scheduler.stop();
        self.stats.stop();

        let handles: Vec<_> = self.lock_tasks().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                log::error!("Background task failed: {}", e);
            }
        }
        log::info!("Orchestrator stopped");
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Task list lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str, ids: &[CategoryId]) -> BatchItem {
        BatchItem {
            url: url.to_string(),
            category_ids: ids.to_vec(),
        }
    }

    #[test]
    fn test_directive_per_item_ids_win() {
        let request = BatchRequest {
            default_category_ids: vec![5],
            use_auto_category: false,
            ..BatchRequest::default()
        };
        assert_eq!(
            request.directive_for(&item("u", &[7, 8])),
            CategoryDirective::Explicit(vec![7, 8])
        );
    }

    #[test]
    fn test_directive_batch_defaults_in_manual_mode() {
        let request = BatchRequest {
            default_category_ids: vec![5],
            use_auto_category: false,
            ..BatchRequest::default()
        };
        assert_eq!(
            request.directive_for(&item("u", &[])),
            CategoryDirective::Explicit(vec![5])
        );
    }

    #[test]
    fn test_directive_auto_when_enabled_or_no_defaults() {
        let auto = BatchRequest {
            default_category_ids: vec![5],
            use_auto_category: true,
            ..BatchRequest::default()
        };
        assert_eq!(
            auto.directive_for(&item("u", &[])),
            CategoryDirective::AutoDetect
        );

        let manual_without_defaults = BatchRequest {
            use_auto_category: false,
            ..BatchRequest::default()
        };
        assert_eq!(
            manual_without_defaults.directive_for(&item("u", &[])),
            CategoryDirective::AutoDetect
        );
    }

    #[test]
    fn test_batch_request_deserializes_with_defaults() {
        let request: BatchRequest = serde_json::from_str(
            r#"{"items": [{"url": "https://e.com/1/"}, {"url": "https://e.com/2/", "categoryIds": [3]}]}"#,
        )
        .unwrap();
        assert!(request.use_auto_category);
        assert!(!request.no_publish);
        assert_eq!(request.publish_now, None);
        assert_eq!(request.items[1].category_ids, vec![3]);
    }
}
