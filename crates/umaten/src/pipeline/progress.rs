use std::sync::Arc;

use crate::broadcast::{JobEvent, JobEventBroadcaster, JobStore};
use crate::job::{Job, JobId, JobResult, JobStatus};

use super::error::JobFailure;

/// Transitions emitted by the pipeline while it runs.
pub enum ProgressEvent {
    Stage {
        status: JobStatus,
        label: String,
        progress: u8,
    },
    Completed {
        status: JobStatus,
        result: JobResult,
    },
    Failed {
        failure: JobFailure,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Writes transitions into the job store and broadcasts the resulting snapshot.
///
/// Nothing is broadcast once the stored job is terminal, so observers never
/// see an event after a job finished.
pub struct BroadcastProgress {
    job_id: JobId,
    store: Arc<JobStore>,
    events: JobEventBroadcaster,
}

impl BroadcastProgress {
    pub fn new(job_id: JobId, store: Arc<JobStore>, events: JobEventBroadcaster) -> Self {
        Self {
            job_id,
            store,
            events,
        }
    }

    fn apply(&self, update: impl FnOnce(&mut Job)) -> Option<Job> {
        let snapshot = self.store.update_if_present(&self.job_id, update)?;
        self.events.send(JobEvent::from(&snapshot));
        Some(snapshot)
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Stage {
                status,
                label,
                progress,
            } => {
                let unchanged = self.store.get(&self.job_id).is_some_and(|job| {
                    job.status == status && job.stage == label && job.progress >= progress
                });
                if unchanged {
                    return;
                }
                self.apply(|job| {
                    job.status = status;
                    job.stage = label;
                    job.progress = progress;
                });
            }
            ProgressEvent::Completed { status, result } => {
                self.apply(|job| {
                    job.status = status;
                    job.stage = "Completed".to_string();
                    job.progress = 100;
                    job.result = Some(result);
                    job.error = None;
                });
            }
            ProgressEvent::Failed { failure } => {
                self.apply(|job| {
                    job.status = JobStatus::Error;
                    job.stage = "Failed".to_string();
                    job.error = Some(failure);
                    job.result = None;
                });
            }
        }
    }
}
