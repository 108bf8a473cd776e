use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::collaborators::{GenerateError, GenerateErrorKind, PublishError, ScrapeError};

/// Pipeline step a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queue,
    Scrape,
    Generate,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Queue => write!(f, "queue"),
            Stage::Scrape => write!(f, "scrape"),
            Stage::Generate => write!(f, "generate"),
            Stage::Publish => write!(f, "publish"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Worth resubmitting later.
    Transient,
    Permanent,
    Cancelled,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "transient"),
            ErrorClass::Permanent => write!(f, "permanent"),
            ErrorClass::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Terminal failure of one job, as shown to operators.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub stage: Stage,
    pub class: ErrorClass,
    pub message: String,
    /// Collaborator calls made for the failing stage.
    pub attempts: u32,
}

impl JobFailure {
    pub fn new(stage: Stage, class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            stage,
            class,
            message: message.into(),
            attempts: 1,
        }
    }

    pub fn cancelled(stage: Stage) -> Self {
        Self {
            stage,
            class: ErrorClass::Cancelled,
            message: "cancellation requested".to_string(),
            attempts: 0,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn scrape(error: &ScrapeError, attempts: u32) -> Self {
        let class = if error.is_retryable() {
            ErrorClass::Transient
        } else {
            ErrorClass::Permanent
        };
        Self::new(Stage::Scrape, class, error.to_string()).with_attempts(attempts)
    }

    pub fn generate(error: &GenerateError) -> Self {
        let class = match error.kind {
            GenerateErrorKind::Transient => ErrorClass::Transient,
            GenerateErrorKind::QuotaExceeded | GenerateErrorKind::InvalidInput => {
                ErrorClass::Permanent
            }
        };
        Self::new(Stage::Generate, class, error.to_string())
    }

    pub fn publish(error: &PublishError) -> Self {
        let class = match error {
            PublishError::Auth(_) => ErrorClass::Permanent,
            PublishError::BackendUnavailable(_) => ErrorClass::Transient,
        };
        Self::new(Stage::Publish, class, error.to_string())
    }

    pub fn is_cancelled(&self) -> bool {
        self.class == ErrorClass::Cancelled
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class == ErrorClass::Cancelled {
            return write!(f, "cancelled at {} stage: {}", self.stage, self.message);
        }
        if self.attempts > 1 {
            write!(
                f,
                "{} failed ({}, after {} attempts): {}",
                self.stage, self.class, self.attempts, self.message
            )
        } else {
            write!(f, "{} failed ({}): {}", self.stage, self.class, self.message)
        }
    }
}
