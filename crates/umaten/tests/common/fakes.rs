//! Fake collaborators for driving the engine without network access.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use umaten::{
    Article, ArticleGenerator, CategoryId, GenerateError, Listing, PostResult, PublishError,
    Publisher, ScrapeError, Scraper, TokenUsage,
};

/// Scraper that fails transiently a fixed number of times, then succeeds.
/// Tracks how many fetches run at once. List pages answer from a script.
pub struct FakeScraper {
    latency: Duration,
    transient_failures: AtomicUsize,
    categories: Vec<String>,
    list_pages: HashMap<String, Result<Vec<String>, ScrapeError>>,
    list_requests: Mutex<Vec<(String, bool)>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeScraper {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            transient_failures: AtomicUsize::new(0),
            categories: vec!["焼き鳥".to_string()],
            list_pages: HashMap::new(),
            list_requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_transiently(self, times: usize) -> Self {
        self.transient_failures.store(times, Ordering::SeqCst);
        self
    }

    pub fn with_categories(mut self, names: &[&str]) -> Self {
        self.categories = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_list_page(mut self, list_url: &str, restaurants: Vec<String>) -> Self {
        self.list_pages.insert(list_url.to_string(), Ok(restaurants));
        self
    }

    pub fn with_broken_list_page(mut self, list_url: &str, error: ScrapeError) -> Self {
        self.list_pages.insert(list_url.to_string(), Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(list_url, include_all_pages)` for every list page requested.
    pub fn list_requests(&self) -> Vec<(String, bool)> {
        self.list_requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scraper for FakeScraper {
    async fn fetch(&self, url: &str, _include_all_pages: bool) -> Result<Listing, ScrapeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ScrapeError::Transient("connection reset".to_string()));
        }

        Ok(Listing {
            url: url.to_string(),
            name: format!("店舗 {}", url.trim_end_matches('/').rsplit('/').next().unwrap_or("")),
            categories: self.categories.clone(),
            photo_count: 8,
            ..Listing::default()
        })
    }

    async fn list_restaurants(
        &self,
        list_url: &str,
        include_all_pages: bool,
    ) -> Result<Vec<String>, ScrapeError> {
        self.list_requests
            .lock()
            .unwrap()
            .push((list_url.to_string(), include_all_pages));
        self.list_pages
            .get(list_url)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub struct FakeGenerator {
    usage: TokenUsage,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self {
            usage: TokenUsage {
                input_tokens: 2_000,
                output_tokens: 1_000,
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleGenerator for FakeGenerator {
    async fn generate(&self, listing: &Listing) -> Result<(Article, TokenUsage), GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((
            Article {
                title: listing.name.clone(),
                html_content: format!("<h2>{}</h2>", listing.name),
                ..Article::default()
            },
            self.usage,
        ))
    }
}

/// Publisher recording every call.
#[derive(Default)]
pub struct FakePublisher {
    calls: Mutex<Vec<(String, Vec<CategoryId>, bool)>>,
}

impl FakePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, Vec<CategoryId>, bool)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &self,
        article: &Article,
        category_ids: &[CategoryId],
        publish_now: bool,
    ) -> Result<PostResult, PublishError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((article.title.clone(), category_ids.to_vec(), publish_now));
        let post_id = calls.len() as u64;
        Ok(PostResult {
            post_id,
            post_url: format!("https://blog.example.com/?p={}", post_id),
        })
    }
}
