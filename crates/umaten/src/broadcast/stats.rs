//! Periodic system/queue/usage snapshots for observers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use crate::ledger::{UsageLedger, UsageSummary};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Queue length and active count read together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueLoad {
    pub queued: usize,
    pub active: usize,
}

/// Read-only view of scheduler counters.
pub trait QueueStats: Send + Sync {
    fn queue_length(&self) -> usize;
    fn active_jobs(&self) -> usize;
    fn concurrency_limit(&self) -> usize;

    /// Both counters from one consistent view. A job moving from the queue
    /// to a pipeline is counted exactly once.
    fn load(&self) -> QueueLoad;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStats {
    pub cpu_percent: f32,
    pub memory_percent: f64,
    pub memory_used_gb: f64,
    pub memory_total_gb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub system: SystemStats,
    pub token_usage: UsageSummary,
    pub queue_length: usize,
    pub active_jobs: usize,
    /// Any job in flight.
    pub processing: bool,
    pub concurrent_limit: usize,
    pub timestamp: DateTime<Utc>,
}

/// Assembles [`StatsSnapshot`]s on a fixed interval and on demand.
pub struct StatsBroadcaster {
    system: Mutex<System>,
    queue: Arc<dyn QueueStats>,
    ledger: Arc<UsageLedger>,
    sender: broadcast::Sender<StatsSnapshot>,
    interval: Duration,
    shutdown: AtomicBool,
    stop_signal: Notify,
}

impl StatsBroadcaster {
    pub fn new(
        queue: Arc<dyn QueueStats>,
        ledger: Arc<UsageLedger>,
        interval: Duration,
        capacity: usize,
    ) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();

        Self {
            system: Mutex::new(system),
            queue,
            ledger,
            sender,
            interval,
            shutdown: AtomicBool::new(false),
            stop_signal: Notify::new(),
        }
    }

    /// Builds a snapshot without broadcasting it.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = self.queue.load();
        StatsSnapshot {
            system: self.system_stats(),
            token_usage: self.ledger.summary(),
            queue_length: load.queued,
            active_jobs: load.active,
            processing: load.active > 0,
            concurrent_limit: self.queue.concurrency_limit(),
            timestamp: Utc::now(),
        }
    }

    /// Builds a snapshot, sends it to every subscriber and returns it.
    pub fn publish_now(&self) -> StatsSnapshot {
        let snapshot = self.snapshot();
        // No receivers is fine
        let _ = self.sender.send(snapshot.clone());
        snapshot
    }

    /// Subscribers only see snapshots sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StatsSnapshot> {
        self.sender.subscribe()
    }

    /// Spawns the periodic loop on the current tokio runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            log::info!("Stats broadcaster started with interval {:?}", this.interval);
            let mut ticker = tokio::time::interval(this.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {},
                    _ = this.stop_signal.notified() => {},
                }
                if this.shutdown.load(Ordering::Acquire) {
                    break;
                }

                let snapshot = this.publish_now();
                log::trace!(
                    "Stats tick: cpu {:.1}%, mem {:.1}%, queue {}, active {}",
                    snapshot.system.cpu_percent,
                    snapshot.system.memory_percent,
                    snapshot.queue_length,
                    snapshot.active_jobs
                );
            }
            log::info!("Stats broadcaster stopped");
        })
    }

    /// Signals the loop to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.stop_signal.notify_one();
    }

    fn system_stats(&self) -> SystemStats {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("System stats lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        system.refresh_cpu_all();
        system.refresh_memory();

        let total = system.total_memory();
        let used = system.used_memory();
        let memory_percent = if total > 0 {
            (used as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        SystemStats {
            cpu_percent: system.global_cpu_usage(),
            memory_percent,
            memory_used_gb: round_gb(used),
            memory_total_gb: round_gb(total),
        }
    }
}

fn round_gb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_GB * 100.0).round() / 100.0
}
