//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use umaten::categorizer::CategoryRecord;
use umaten::config::schema::{
    CategoryConfig, Config, SchedulerConfig, ScrapingConfig, Settings, StatsConfig,
};
use umaten::{BatchItem, BatchRequest, CategoryId, CategoryTree};

/// Builder for creating `Config` instances with fast loops for tests.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config {
                settings: Settings {
                    articles_per_hour: 100,
                    concurrent_jobs: 3,
                    auto_publish: false,
                },
                scraping: ScrapingConfig {
                    max_retries: 3,
                    min_delay_secs: 0.0,
                    max_delay_secs: 0.0,
                    min_photo_count: 4,
                },
                categories: CategoryConfig::default(),
                scheduler: SchedulerConfig {
                    tick_interval_ms: 10,
                },
                stats: StatsConfig {
                    interval_ms: 50,
                    channel_capacity: 1024,
                },
                ..Config::default()
            },
        }
    }

    pub fn concurrent_jobs(mut self, limit: usize) -> Self {
        self.config.settings.concurrent_jobs = limit;
        self
    }

    pub fn articles_per_hour(mut self, rate: u32) -> Self {
        self.config.settings.articles_per_hour = rate;
        self
    }

    pub fn auto_publish(mut self, enabled: bool) -> Self {
        self.config.settings.auto_publish = enabled;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.scraping.max_retries = retries;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

fn record(id: CategoryId, name: &str, parent: Option<CategoryId>) -> CategoryRecord {
    CategoryRecord {
        id,
        name: name.to_string(),
        parent,
        count: 0,
    }
}

/// Small tree: region and genre branches plus the uncategorized root.
pub fn sample_tree() -> CategoryTree {
    CategoryTree::from_records(vec![
        record(1, "未分類", None),
        record(10, "北海道", None),
        record(11, "札幌市", Some(10)),
        record(20, "ジャンル", None),
        record(21, "焼き鳥", Some(20)),
        record(22, "ラーメン", Some(20)),
    ])
}

pub fn restaurant_url(n: usize) -> String {
    format!("https://tabelog.com/hokkaido/A0101/A010101/{}/", 1_000_000 + n)
}

pub fn batch(count: usize) -> BatchRequest {
    BatchRequest::from_urls((0..count).map(restaurant_url))
}

pub fn item_with_categories(url: String, ids: &[CategoryId]) -> BatchItem {
    BatchItem {
        url,
        category_ids: ids.to_vec(),
    }
}
