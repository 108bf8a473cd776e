//! Job update events for real-time status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::{Job, JobId, JobResult, JobStatus};
use crate::pipeline::JobFailure;

/// Snapshot of one job right after a transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: JobId,
    pub url: String,
    pub status: JobStatus,
    /// Human-readable label of the current step.
    pub stage: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub timestamp: DateTime<Utc>,
}

impl From<&Job> for JobEvent {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            url: job.url.clone(),
            status: job.status,
            stage: job.stage.clone(),
            progress: job.progress,
            result: job.result.clone(),
            error: job.error.clone(),
            timestamp: job.updated_at,
        }
    }
}

/// A batch item that produced no job, e.g. a list page without restaurants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemError {
    pub url: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ItemError {
    pub fn new(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcasts job events to every subscriber.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
    item_errors: Arc<broadcast::Sender<ItemError>>,
}

impl JobEventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let (item_errors, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
            item_errors: Arc::new(item_errors),
        }
    }

    pub fn send(&self, event: JobEvent) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribers only see events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn send_item_error(&self, error: ItemError) {
        let _ = self.item_errors.send(error);
    }

    pub fn subscribe_item_errors(&self) -> broadcast::Receiver<ItemError> {
        self.item_errors.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::CategoryDirective;
    use crate::job::JobFlags;

    fn job() -> Job {
        Job::new(
            "https://example.com/tokyo/A1/A2/3/",
            CategoryDirective::AutoDetect,
            JobFlags::default(),
        )
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let broadcaster = JobEventBroadcaster::new(16);
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();
        let job = job();

        broadcaster.send(JobEvent::from(&job));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.job_id, job.id);
        assert_eq!(e2.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_no_backlog() {
        let broadcaster = JobEventBroadcaster::new(16);
        let job = job();
        broadcaster.send(JobEvent::from(&job));

        let mut rx = broadcaster.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_without_receivers() {
        let broadcaster = JobEventBroadcaster::default();
        broadcaster.send(JobEvent::from(&job()));
        assert_eq!(broadcaster.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_item_errors_use_their_own_channel() {
        let broadcaster = JobEventBroadcaster::new(16);
        let mut jobs = broadcaster.subscribe();
        let mut errors = broadcaster.subscribe_item_errors();

        broadcaster.send_item_error(ItemError::new("https://e.com/rstLst/", "no restaurants"));

        let error = errors.recv().await.unwrap();
        assert_eq!(error.url, "https://e.com/rstLst/");
        assert_eq!(error.error, "no restaurants");
        assert!(jobs.try_recv().is_err());
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let value = serde_json::to_value(JobEvent::from(&job())).unwrap();
        assert!(value.get("jobId").is_some());
        assert_eq!(value["status"], "queued");
        assert!(value.get("result").is_none());
    }
}
