//! FIFO job scheduler with bounded concurrency and rate-limited admission.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::broadcast::{JobEvent, JobEventBroadcaster, JobStore, QueueLoad, QueueStats};
use crate::config::SettingsStore;
use crate::error::SchedulerError;
use crate::job::{Job, JobId};
use crate::limiter::RateLimiter;
use crate::pipeline::{
    BroadcastProgress, CancelSignal, ErrorClass, JobFailure, PipelineExecutor, ProgressEvent,
    ProgressReporter, Stage,
};

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Removed from the queue before admission.
    Dequeued,
    /// Flag set; the running pipeline stops at its next stage boundary.
    Signalled,
    AlreadyFinished,
}

/// Owns the pending queue and admits jobs to pipelines.
///
/// Admission always happens under the queue lock, so concurrent callers can
/// never push the active count past the limit. A head job refused by the
/// rate limiter stays at the head and is re-checked on the next tick.
pub struct JobScheduler {
    queue: Mutex<VecDeque<JobId>>,
    signals: Mutex<HashMap<JobId, CancelSignal>>,
    active: AtomicUsize,
    store: Arc<JobStore>,
    events: JobEventBroadcaster,
    executor: Arc<PipelineExecutor>,
    limiter: Arc<RateLimiter>,
    settings: Arc<SettingsStore>,
    tick: Duration,
    wake: Notify,
    shutdown: AtomicBool,
}

impl JobScheduler {
    pub fn new(
        store: Arc<JobStore>,
        events: JobEventBroadcaster,
        executor: Arc<PipelineExecutor>,
        limiter: Arc<RateLimiter>,
        settings: Arc<SettingsStore>,
        tick: Duration,
    ) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            signals: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            store,
            events,
            executor,
            limiter,
            settings,
            tick,
            wake: Notify::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Tracks and enqueues `jobs` in order and returns their ids.
    pub fn submit(&self, jobs: Vec<Job>) -> Result<Vec<JobId>, SchedulerError> {
        if self.is_shut_down() {
            return Err(SchedulerError::ShutDown);
        }

        let mut ids = Vec::with_capacity(jobs.len());
        {
            let mut queue = lock(&self.queue, "queue");
            let mut signals = lock(&self.signals, "cancel signals");
            for job in jobs {
                let event = JobEvent::from(&job);
                let id = job.id.clone();
                if !self.store.insert(job) {
                    warn!("Job {} is already tracked, not enqueueing again", id);
                    continue;
                }
                signals.insert(id.clone(), CancelSignal::new());
                queue.push_back(id.clone());
                self.events.send(event);
                ids.push(id);
            }
        }

        if !ids.is_empty() {
            info!("Queued {} jobs", ids.len());
            self.wake.notify_one();
        }
        Ok(ids)
    }

    /// Spawns the admission loop on the current tokio runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            info!("Admission loop started with tick {:?}", this.tick);
            let mut ticker = tokio::time::interval(this.tick);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                if this.is_shut_down() {
                    break;
                }
                this.admit_ready();

                tokio::select! {
                    _ = ticker.tick() => {},
                    _ = this.wake.notified() => {},
                }
            }
            info!("Admission loop stopped");
        })
    }

    /// Admits queued jobs from the head while a slot and a rate allowance are
    /// free. Returns how many were admitted.
    pub fn admit_ready(self: &Arc<Self>) -> usize {
        let mut admitted = 0;
        let mut queue = lock(&self.queue, "queue");

        while let Some(head) = queue.front().cloned() {
            if self.is_shut_down() {
                break;
            }

            let Some(job) = self.store.get(&head).filter(|job| !job.is_terminal()) else {
                debug!("Dropping stale queue entry {}", head);
                queue.pop_front();
                lock(&self.signals, "cancel signals").remove(&head);
                continue;
            };

            let signal = lock(&self.signals, "cancel signals")
                .get(&head)
                .cloned()
                .unwrap_or_default();
            if signal.is_cancelled() {
                queue.pop_front();
                self.finish_cancelled(&head);
                continue;
            }

            let settings = self.settings.get();
            if self.active.load(Ordering::Acquire) >= settings.concurrent_jobs {
                break;
            }
            if !self.limiter.try_admit() {
                debug!(
                    "Rate limit of {} per hour reached, job {} waits",
                    self.limiter.max_per_hour(),
                    head
                );
                break;
            }

            queue.pop_front();
            self.active.fetch_add(1, Ordering::AcqRel);
            admitted += 1;
            BroadcastProgress::new(head.clone(), Arc::clone(&self.store), self.events.clone())
                .report(PipelineExecutor::admission_event());

            let publish_now = job.flags.publish_now.unwrap_or(settings.auto_publish);
            debug!("Admitting job {} (publish_now: {})", head, publish_now);
            self.spawn_pipeline(job, publish_now, signal);
        }

        admitted
    }

    fn spawn_pipeline(self: &Arc<Self>, job: Job, publish_now: bool, signal: CancelSignal) {
        let slot = ActiveSlot {
            scheduler: Arc::clone(self),
            job_id: job.id.clone(),
        };
        tokio::spawn(async move {
            let scheduler = Arc::clone(&slot.scheduler);
            let progress = BroadcastProgress::new(
                job.id.clone(),
                Arc::clone(&scheduler.store),
                scheduler.events.clone(),
            );
            let _ = scheduler
                .executor
                .run(&job, publish_now, &signal, &progress)
                .await;
            drop(slot);
        });
    }

    /// Cancels one job. The flag is recorded before the queue is touched, so
    /// a job admitted concurrently still observes it.
    pub fn cancel(&self, id: &JobId) -> Result<CancelOutcome, SchedulerError> {
        let job = self
            .store
            .get(id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.clone()))?;
        if job.is_terminal() {
            return Ok(CancelOutcome::AlreadyFinished);
        }

        if let Some(signal) = lock(&self.signals, "cancel signals").get(id) {
            signal.cancel();
        }

        let dequeued = {
            let mut queue = lock(&self.queue, "queue");
            match queue.iter().position(|queued| queued == id) {
                Some(pos) => {
                    queue.remove(pos);
                    true
                }
                None => false,
            }
        };

        if dequeued {
            self.finish_cancelled(id);
            info!("Cancelled queued job {}", id);
            Ok(CancelOutcome::Dequeued)
        } else {
            info!("Cancellation requested for running job {}", id);
            Ok(CancelOutcome::Signalled)
        }
    }

    /// Cancels every job not yet admitted.
    pub fn cancel_queued(&self) -> usize {
        let drained: Vec<JobId> = lock(&self.queue, "queue").drain(..).collect();
        for id in &drained {
            if let Some(signal) = lock(&self.signals, "cancel signals").get(id) {
                signal.cancel();
            }
            self.finish_cancelled(id);
        }
        if !drained.is_empty() {
            info!("Cancelled {} queued jobs", drained.len());
        }
        drained.len()
    }

    /// Stops admitting, cancels queued jobs and signals running ones.
    pub fn stop(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Stopping scheduler...");
        self.cancel_queued();
        for signal in lock(&self.signals, "cancel signals").values() {
            signal.cancel();
        }
        self.wake.notify_one();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn queued_ids(&self) -> Vec<JobId> {
        lock(&self.queue, "queue").iter().cloned().collect()
    }

    fn finish_cancelled(&self, id: &JobId) {
        lock(&self.signals, "cancel signals").remove(id);
        BroadcastProgress::new(id.clone(), Arc::clone(&self.store), self.events.clone()).report(
            ProgressEvent::Failed {
                failure: JobFailure::cancelled(Stage::Queue),
            },
        );
    }

    fn release_slot(&self, id: &JobId) {
        lock(&self.signals, "cancel signals").remove(id);
        self.limiter.release();
        self.active.fetch_sub(1, Ordering::AcqRel);
        self.wake.notify_one();
    }
}

impl QueueStats for JobScheduler {
    fn queue_length(&self) -> usize {
        lock(&self.queue, "queue").len()
    }

    fn active_jobs(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    fn concurrency_limit(&self) -> usize {
        self.settings.get().concurrent_jobs
    }

    fn load(&self) -> QueueLoad {
        // Admission moves a job from the queue to the active count under this lock.
        let queue = lock(&self.queue, "queue");
        QueueLoad {
            queued: queue.len(),
            active: self.active.load(Ordering::Acquire),
        }
    }
}

/// Returns the concurrency slot when a pipeline task ends, even by panic.
struct ActiveSlot {
    scheduler: Arc<JobScheduler>,
    job_id: JobId,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!("Pipeline for job {} panicked", self.job_id);
            BroadcastProgress::new(
                self.job_id.clone(),
                Arc::clone(&self.scheduler.store),
                self.scheduler.events.clone(),
            )
            .report(ProgressEvent::Failed {
                failure: JobFailure::new(
                    Stage::Queue,
                    ErrorClass::Permanent,
                    "pipeline task panicked",
                ),
            });
        }
        self.scheduler.release_slot(&self.job_id);
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Scheduler {} lock was poisoned, recovering", name);
            poisoned.into_inner()
        }
    }
}
