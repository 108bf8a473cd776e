use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::categorizer::{CategoryCatalog, CategoryId, CategoryResolver};
use crate::collaborators::{Article, ArticleGenerator, Listing, Publisher, Scraper};
use crate::config::schema::{CategoryConfig, ScrapingConfig};
use crate::job::{Job, JobResult, JobStatus};
use crate::ledger::UsageLedger;

use super::cancel::CancelSignal;
use super::error::{ErrorClass, JobFailure, Stage};
use super::progress::{ProgressEvent, ProgressReporter};
use super::retry::{DelayPolicy, RandomDelay};

const PROGRESS_SCRAPING: u8 = 10;
const PROGRESS_SCRAPED: u8 = 40;
const PROGRESS_GENERATED: u8 = 80;

/// External services a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub scraper: Arc<dyn Scraper>,
    pub generator: Arc<dyn ArticleGenerator>,
    pub publisher: Arc<dyn Publisher>,
}

/// Drives one job through scrape, generate and publish.
///
/// Holds no per-job state, so a single executor is shared by every running
/// pipeline.
pub struct PipelineExecutor {
    collaborators: Collaborators,
    resolver: CategoryResolver,
    catalog: Arc<CategoryCatalog>,
    ledger: Arc<UsageLedger>,
    max_retries: u32,
    min_photo_count: u32,
    delay: Arc<dyn DelayPolicy>,
}

impl PipelineExecutor {
    pub fn new(
        collaborators: Collaborators,
        scraping: &ScrapingConfig,
        categories: &CategoryConfig,
        catalog: Arc<CategoryCatalog>,
        ledger: Arc<UsageLedger>,
    ) -> Self {
        Self {
            collaborators,
            resolver: CategoryResolver::new(categories),
            catalog,
            ledger,
            max_retries: scraping.max_retries,
            min_photo_count: scraping.min_photo_count,
            delay: Arc::new(RandomDelay::new(scraping.min_delay(), scraping.max_delay())),
        }
    }

    /// First transition of every run. The scheduler applies it when it admits
    /// a job, so an admitted job is never seen as queued.
    pub fn admission_event() -> ProgressEvent {
        ProgressEvent::Stage {
            status: JobStatus::Scraping,
            label: "Scraping listing".to_string(),
            progress: PROGRESS_SCRAPING,
        }
    }

    /// Replaces the pause between scrape retries.
    pub fn with_delay_policy(mut self, delay: Arc<dyn DelayPolicy>) -> Self {
        self.delay = delay;
        self
    }

    /// Runs the pipeline for `job`, reporting every transition.
    ///
    /// `publish_now` was resolved at admission; nothing here reads live
    /// settings. The outcome is both reported and returned.
    pub async fn run(
        &self,
        job: &Job,
        publish_now: bool,
        cancel: &CancelSignal,
        progress: &dyn ProgressReporter,
    ) -> Result<JobResult, JobFailure> {
        let span = info_span!("pipeline", job_id = %job.id, url = %job.url);
        let outcome = self
            .run_stages(job, publish_now, cancel, progress)
            .instrument(span.clone())
            .await;

        let _entered = span.enter();
        match &outcome {
            Ok((status, result)) => {
                info!(status = %status, name = %result.restaurant_name, "Job finished");
                progress.report(ProgressEvent::Completed {
                    status: *status,
                    result: result.clone(),
                });
            }
            Err(failure) => {
                if failure.class == ErrorClass::Cancelled {
                    info!("{}", failure);
                } else {
                    warn!("{}", failure);
                }
                progress.report(ProgressEvent::Failed {
                    failure: failure.clone(),
                });
            }
        }
        outcome.map(|(_, result)| result)
    }

    async fn run_stages(
        &self,
        job: &Job,
        publish_now: bool,
        cancel: &CancelSignal,
        progress: &dyn ProgressReporter,
    ) -> Result<(JobStatus, JobResult), JobFailure> {
        // Step 1: Scrape
        check_cancelled(cancel, Stage::Scrape)?;
        progress.report(Self::admission_event());
        let listing = self
            .step_scrape(job, cancel)
            .instrument(info_span!("scrape"))
            .await?;

        // Step 2: Resolve categories and generate
        check_cancelled(cancel, Stage::Generate)?;
        progress.report(ProgressEvent::Stage {
            status: JobStatus::Generating,
            label: "Generating article".to_string(),
            progress: PROGRESS_SCRAPED,
        });
        let category_ids = self.step_resolve_categories(job, &listing);
        let article = self
            .step_generate(&listing)
            .instrument(info_span!("generate"))
            .await?;

        let mut result = JobResult {
            restaurant_name: listing.name.clone(),
            post_id: None,
            post_url: None,
            category_ids,
            article: None,
        };

        if job.flags.no_publish {
            debug!("Publishing disabled for this job, keeping the article");
            result.article = Some(article);
            return Ok((JobStatus::CompletedNoPublish, result));
        }

        // Step 3: Publish
        check_cancelled(cancel, Stage::Publish)?;
        progress.report(ProgressEvent::Stage {
            status: JobStatus::Publishing,
            label: "Publishing article".to_string(),
            progress: PROGRESS_GENERATED,
        });
        let post = self
            .collaborators
            .publisher
            .publish(&article, &result.category_ids, publish_now)
            .instrument(info_span!("publish", publish_now))
            .await
            .map_err(|e| JobFailure::publish(&e))?;

        result.post_id = Some(post.post_id);
        result.post_url = Some(post.post_url);
        Ok((JobStatus::Completed, result))
    }

    async fn step_scrape(&self, job: &Job, cancel: &CancelSignal) -> Result<Listing, JobFailure> {
        let max_attempts = self.max_retries.saturating_add(1);
        let mut attempt = 0;

        let listing = loop {
            attempt += 1;
            match self
                .collaborators
                .scraper
                .fetch(&job.url, job.flags.include_all_pages)
                .await
            {
                Ok(listing) => break listing,
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay.delay(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Scrape failed, retrying: {}",
                        e
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    check_cancelled(cancel, Stage::Scrape)?;
                }
                Err(e) => return Err(JobFailure::scrape(&e, attempt)),
            }
        };

        self.validate_listing(&listing)
            .map_err(|message| {
                JobFailure::new(Stage::Scrape, ErrorClass::Permanent, message)
                    .with_attempts(attempt)
            })?;

        debug!(
            attempts = attempt,
            photos = listing.photo_count,
            "Scraped '{}'",
            listing.name
        );
        Ok(listing)
    }

    fn validate_listing(&self, listing: &Listing) -> Result<(), String> {
        if listing.name.trim().is_empty() {
            return Err("invalid listing: restaurant name is missing".to_string());
        }
        if listing.photo_count < self.min_photo_count {
            return Err(format!(
                "invalid listing: {} photos, at least {} required",
                listing.photo_count, self.min_photo_count
            ));
        }
        Ok(())
    }

    fn step_resolve_categories(&self, job: &Job, listing: &Listing) -> Vec<CategoryId> {
        let tree = self.catalog.current();
        let ids = self
            .resolver
            .resolve(&job.directive, &listing.categories, &tree);
        debug!(categories = ?ids, "Resolved categories");
        ids
    }

    async fn step_generate(&self, listing: &Listing) -> Result<Article, JobFailure> {
        match self.collaborators.generator.generate(listing).await {
            Ok((article, usage)) => {
                self.ledger.record(usage);
                Ok(article)
            }
            Err(e) => {
                if let Some(usage) = e.usage {
                    self.ledger.record(usage);
                }
                Err(JobFailure::generate(&e))
            }
        }
    }
}

fn check_cancelled(cancel: &CancelSignal, next: Stage) -> Result<(), JobFailure> {
    if cancel.is_cancelled() {
        Err(JobFailure::cancelled(next))
    } else {
        Ok(())
    }
}
