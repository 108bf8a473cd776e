//! Test harness wiring an orchestrator to fake collaborators.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use umaten::config::schema::Config;
use umaten::pipeline::NoDelay;
use umaten::{Collaborators, Job, JobId, Orchestrator};

use super::builders::sample_tree;
use super::fakes::{FakeGenerator, FakePublisher, FakeScraper};

pub struct TestHarness {
    pub orchestrator: Orchestrator,
    pub scraper: Arc<FakeScraper>,
    pub generator: Arc<FakeGenerator>,
    pub publisher: Arc<FakePublisher>,
}

impl TestHarness {
    pub fn new(config: Config) -> Self {
        Self::with_scraper(config, FakeScraper::new())
    }

    /// Builds and starts an orchestrator over the given scraper. Must be
    /// called inside a tokio runtime.
    pub fn with_scraper(config: Config, scraper: FakeScraper) -> Self {
        let scraper = Arc::new(scraper);
        let generator = Arc::new(FakeGenerator::new());
        let publisher = Arc::new(FakePublisher::new());

        let orchestrator = Orchestrator::builder(
            config,
            Collaborators {
                scraper: scraper.clone(),
                generator: generator.clone(),
                publisher: publisher.clone(),
            },
        )
        .categories(sample_tree())
        .delay_policy(Arc::new(NoDelay))
        .build()
        .expect("valid test config");
        orchestrator.start();

        Self {
            orchestrator,
            scraper,
            generator,
            publisher,
        }
    }

    /// Polls until every job in `ids` is terminal and returns their final state.
    pub async fn wait_for_terminal(&self, ids: &[JobId]) -> Vec<Job> {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let jobs: Vec<Job> = ids
                    .iter()
                    .filter_map(|id| self.orchestrator.job(id))
                    .collect();
                if jobs.len() == ids.len() && jobs.iter().all(Job::is_terminal) {
                    return jobs;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("jobs reached a terminal state in time")
    }
}
