use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::categorizer::CategoryId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub scraping: ScrapingConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub categories: CategoryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Runtime-tunable settings. Changes apply to jobs admitted afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_articles_per_hour", alias = "articles_per_hour")]
    pub articles_per_hour: u32,
    #[serde(default = "default_concurrent_jobs", alias = "concurrent_jobs")]
    pub concurrent_jobs: usize,
    #[serde(default, alias = "auto_publish")]
    pub auto_publish: bool,
}

fn default_articles_per_hour() -> u32 {
    10
}

fn default_concurrent_jobs() -> usize {
    3
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            articles_per_hour: default_articles_per_hour(),
            concurrent_jobs: default_concurrent_jobs(),
            auto_publish: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapingConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Lower bound of the randomized delay between retries, in seconds.
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: f64,
    /// Upper bound of the randomized delay between retries, in seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,
    /// Listings with fewer photos are rejected after scraping.
    #[serde(default = "default_min_photo_count")]
    pub min_photo_count: u32,
}

fn default_max_retries() -> u32 {
    3
}

fn default_min_delay() -> f64 {
    2.0
}

fn default_max_delay() -> f64 {
    5.0
}

fn default_min_photo_count() -> u32 {
    4
}

impl ScrapingConfig {
    /// Out-of-range values (rejected by validation) read as zero.
    pub fn min_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_delay_secs.max(0.0)).unwrap_or_default()
    }

    pub fn max_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_delay_secs.max(0.0)).unwrap_or_default()
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
            min_photo_count: default_min_photo_count(),
        }
    }
}

/// Per-million-token prices used to compute the cost of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_input_price")]
    pub input_per_million: f64,
    #[serde(default = "default_output_price")]
    pub output_per_million: f64,
}

fn default_input_price() -> f64 {
    3.0
}

fn default_output_price() -> f64 {
    15.0
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_per_million: default_input_price(),
            output_per_million: default_output_price(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Category used when none of the detected names match.
    #[serde(default = "default_uncategorized_id")]
    pub uncategorized_id: CategoryId,
    /// Add the parents of every auto-detected category.
    #[serde(default = "default_true")]
    pub include_ancestors: bool,
    /// Scraped name -> backend category display name.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_uncategorized_id() -> CategoryId {
    1
}

fn default_true() -> bool {
    true
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            uncategorized_id: default_uncategorized_id(),
            include_ancestors: true,
            aliases: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_ms() -> u64 {
    500
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_stats_interval_ms() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    256
}

impl StatsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_stats_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
