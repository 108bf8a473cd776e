//! Job records and the values that describe them.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::categorizer::{CategoryDirective, CategoryId};
use crate::collaborators::Article;
use crate::pipeline::JobFailure;

static RE_RESTAURANT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://[^/]+/[^/]+/A\d+/A\d+/\d+)/?.*").unwrap());

/// Opaque job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Scraping,
    Generating,
    Publishing,
    Completed,
    CompletedNoPublish,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedNoPublish | JobStatus::Error
        )
    }

    /// Admitted and not yet finished.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            JobStatus::Scraping | JobStatus::Generating | JobStatus::Publishing
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Scraping => write!(f, "scraping"),
            JobStatus::Generating => write!(f, "generating"),
            JobStatus::Publishing => write!(f, "publishing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::CompletedNoPublish => write!(f, "completed_no_publish"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

/// Per-job processing flags, fixed at submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFlags {
    /// Publish immediately instead of as a draft. `None` takes the
    /// `auto_publish` setting in force when the job is admitted.
    #[serde(default)]
    pub publish_now: Option<bool>,
    #[serde(default)]
    pub include_all_pages: bool,
    /// Stop after generation without posting to the backend.
    #[serde(default)]
    pub no_publish: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub restaurant_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
    /// The generated article, kept when the job stops before publishing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<Article>,
}

/// One URL's journey through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub directive: CategoryDirective,
    pub flags: JobFlags,
    pub status: JobStatus,
    /// Human-readable label of the current step.
    pub stage: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(url: impl Into<String>, directive: CategoryDirective, flags: JobFlags) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            url: url.into(),
            directive,
            flags,
            status: JobStatus::Queued,
            stage: "Queued".to_string(),
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Canonical form of a restaurant URL, used for duplicate detection.
///
/// Drops query and fragment, trims sub-pages after the restaurant id and
/// always ends with a single `/`.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split(['?', '#']).next().unwrap_or_default();

    match RE_RESTAURANT_URL.captures(url).and_then(|caps| caps.get(1)) {
        Some(base) => format!("{}/", base.as_str()),
        None => format!("{}/", url.trim_end_matches('/')),
    }
}

/// Ranking and search result pages fan out into one job per linked restaurant.
pub fn is_list_page(url: &str) -> bool {
    url.contains("/rstLst/") || url.contains("/lst/")
}
