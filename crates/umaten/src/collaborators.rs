//! Contracts for the external services a pipeline drives.
//!
//! Implementations live outside this crate; the engine only depends on these
//! traits and their error classifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::categorizer::CategoryId;

/// Structured restaurant listing returned by a scrape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub url: String,
    pub name: String,
    /// Category names as shown on the listing site.
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub photo_count: u32,
    #[serde(default)]
    pub images: Vec<String>,
    /// Remaining scraped fields, passed through to the generator untouched.
    #[serde(default)]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    pub html_content: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResult {
    pub post_id: u64,
    pub post_url: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("listing not found: {0}")]
    NotFound(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("blocked by site: {0}")]
    Blocked(String),
}

impl ScrapeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScrapeError::Transient(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerateErrorKind {
    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("invalid input")]
    InvalidInput,

    #[error("transient failure")]
    Transient,
}

/// Generation failure. `usage` is set when tokens were spent before the failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct GenerateError {
    pub kind: GenerateErrorKind,
    pub message: String,
    pub usage: Option<TokenUsage>,
}

impl GenerateError {
    pub fn new(kind: GenerateErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
}

#[async_trait]
pub trait Scraper: Send + Sync {
    async fn fetch(&self, url: &str, include_all_pages: bool) -> Result<Listing, ScrapeError>;

    /// Restaurant URLs linked from a ranking or search result page, following
    /// pagination when `include_all_pages` is set. Scrapers without list
    /// support find nothing.
    async fn list_restaurants(
        &self,
        _list_url: &str,
        _include_all_pages: bool,
    ) -> Result<Vec<String>, ScrapeError> {
        Ok(Vec::new())
    }
}

#[async_trait]
pub trait ArticleGenerator: Send + Sync {
    async fn generate(&self, listing: &Listing) -> Result<(Article, TokenUsage), GenerateError>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        article: &Article,
        category_ids: &[CategoryId],
        publish_now: bool,
    ) -> Result<PostResult, PublishError>;
}
