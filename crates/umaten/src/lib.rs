pub mod broadcast;
pub mod categorizer;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod job;
pub mod ledger;
pub mod limiter;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod scheduler;

pub use broadcast::{
    ItemError, JobEvent, JobEventBroadcaster, JobStore, StatsBroadcaster, StatsSnapshot,
};
pub use categorizer::{CategoryDirective, CategoryId, CategoryRecord, CategoryTree};
pub use collaborators::{
    Article, ArticleGenerator, GenerateError, GenerateErrorKind, Listing, PostResult,
    PublishError, Publisher, ScrapeError, Scraper, TokenUsage,
};
pub use config::{load_config, load_config_from_str, Config, Settings};
pub use error::{ConfigError, Result, SchedulerError, UmatenError};
pub use job::{is_list_page, normalize_url, Job, JobFlags, JobId, JobResult, JobStatus};
pub use ledger::{UsageAggregate, UsageLedger, UsageSummary, UsageWindow};
pub use limiter::RateLimiter;
pub use logging::init_logging;
pub use orchestrator::{BatchItem, BatchRequest, Orchestrator, OrchestratorBuilder};
pub use pipeline::{Collaborators, ErrorClass, JobFailure, Stage};
pub use scheduler::{CancelOutcome, JobScheduler};
