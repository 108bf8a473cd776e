//! Token usage ledger with rolling-window aggregation.

use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::TokenUsage;
use crate::config::schema::PricingConfig;

/// One generation event. Cost is fixed at record time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageWindow {
    Minute,
    Hour,
    Day,
    Total,
}

impl UsageWindow {
    pub const ALL: [UsageWindow; 4] = [
        UsageWindow::Minute,
        UsageWindow::Hour,
        UsageWindow::Day,
        UsageWindow::Total,
    ];

    fn span(self) -> Option<Duration> {
        match self {
            UsageWindow::Minute => Some(Duration::minutes(1)),
            UsageWindow::Hour => Some(Duration::hours(1)),
            UsageWindow::Day => Some(Duration::days(1)),
            UsageWindow::Total => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAggregate {
    pub count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

/// Aggregates for every window, taken under one read lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub minute: UsageAggregate,
    pub hour: UsageAggregate,
    pub day: UsageAggregate,
    pub total: UsageAggregate,
}

/// Append-only usage store.
///
/// Records are pushed under a write lock so readers never see a partial entry.
/// Aggregates are recomputed from the records on every query.
pub struct UsageLedger {
    records: RwLock<Vec<UsageRecord>>,
    pricing: RwLock<PricingConfig>,
}

impl UsageLedger {
    pub fn new(pricing: PricingConfig) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            pricing: RwLock::new(pricing),
        }
    }

    /// Prices `usage` with the current rate table and appends it.
    pub fn record(&self, usage: TokenUsage) -> UsageRecord {
        self.record_at(usage, Utc::now())
    }

    pub(crate) fn record_at(&self, usage: TokenUsage, timestamp: DateTime<Utc>) -> UsageRecord {
        let pricing = self.pricing();
        let record = UsageRecord {
            timestamp,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost: compute_cost(&pricing, usage),
        };

        match self.records.write() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => {
                log::warn!("Usage ledger lock was poisoned, recovering");
                poisoned.into_inner().push(record);
            }
        }

        log::debug!(
            "Recorded usage: {} in / {} out tokens, cost {:.6}",
            record.input_tokens,
            record.output_tokens,
            record.cost
        );
        record
    }

    pub fn aggregate(&self, window: UsageWindow) -> UsageAggregate {
        self.aggregate_at(window, Utc::now())
    }

    pub(crate) fn aggregate_at(&self, window: UsageWindow, now: DateTime<Utc>) -> UsageAggregate {
        self.with_records(|records| sum_window(records, window, now))
    }

    pub fn summary(&self) -> UsageSummary {
        self.summary_at(Utc::now())
    }

    pub(crate) fn summary_at(&self, now: DateTime<Utc>) -> UsageSummary {
        self.with_records(|records| UsageSummary {
            minute: sum_window(records, UsageWindow::Minute, now),
            hour: sum_window(records, UsageWindow::Hour, now),
            day: sum_window(records, UsageWindow::Day, now),
            total: sum_window(records, UsageWindow::Total, now),
        })
    }

    pub fn pricing(&self) -> PricingConfig {
        match self.pricing.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Replaces the rate table. Already recorded costs are unchanged.
    pub fn set_pricing(&self, pricing: PricingConfig) {
        match self.pricing.write() {
            Ok(mut guard) => *guard = pricing,
            Err(poisoned) => *poisoned.into_inner() = pricing,
        }
    }

    pub fn len(&self) -> usize {
        self.with_records(|records| records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_records<R>(&self, f: impl FnOnce(&[UsageRecord]) -> R) -> R {
        match self.records.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => {
                log::warn!("Usage ledger lock was poisoned, recovering");
                f(&poisoned.into_inner())
            }
        }
    }
}

impl Default for UsageLedger {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

pub fn compute_cost(pricing: &PricingConfig, usage: TokenUsage) -> f64 {
    (usage.input_tokens as f64 / 1_000_000.0) * pricing.input_per_million
        + (usage.output_tokens as f64 / 1_000_000.0) * pricing.output_per_million
}

fn sum_window(records: &[UsageRecord], window: UsageWindow, now: DateTime<Utc>) -> UsageAggregate {
    let since = window.span().map(|span| now - span);
    records
        .iter()
        .filter(|r| r.timestamp <= now && since.map_or(true, |s| r.timestamp > s))
        .fold(UsageAggregate::default(), |mut acc, r| {
            acc.count += 1;
            acc.input_tokens += r.input_tokens;
            acc.output_tokens += r.output_tokens;
            acc.cost += r.cost;
            acc
        })
}
