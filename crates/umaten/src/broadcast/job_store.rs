//! In-memory job store shared by the scheduler, pipelines and observers.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use crate::job::{Job, JobId};

#[derive(Default)]
struct JobMap {
    jobs: HashMap<JobId, Job>,
    /// Submission order, for listing.
    order: Vec<JobId>,
}

/// Owns every tracked job.
///
/// Callers only get clones; all mutation goes through [`JobStore::update_if_present`],
/// which applies a change under the write lock so readers never see a
/// half-updated record. Terminal jobs are frozen.
pub struct JobStore {
    inner: RwLock<JobMap>,
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(JobMap::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, JobMap> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, JobMap> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Tracks `job`. Refused when its id or URL is already tracked.
    pub fn insert(&self, job: Job) -> bool {
        let mut map = self.write();
        if map.jobs.contains_key(&job.id) || map.jobs.values().any(|j| j.url == job.url) {
            return false;
        }
        map.order.push(job.id.clone());
        map.jobs.insert(job.id.clone(), job);
        true
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.read().jobs.get(id).cloned()
    }

    /// All jobs in submission order.
    pub fn list(&self) -> Vec<Job> {
        let map = self.read();
        map.order
            .iter()
            .filter_map(|id| map.jobs.get(id))
            .cloned()
            .collect()
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.read().jobs.values().any(|job| job.url == url)
    }

    pub fn len(&self) -> usize {
        self.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies `update` to a non-terminal job and returns the new snapshot.
    ///
    /// Returns `None` when the job is unknown or already terminal. Progress
    /// never moves backwards and `updated_at` is refreshed.
    pub fn update_if_present(&self, id: &JobId, update: impl FnOnce(&mut Job)) -> Option<Job> {
        let mut map = self.write();
        let job = map.jobs.get_mut(id)?;
        if job.is_terminal() {
            log::debug!("Ignoring update for finished job {}", id);
            return None;
        }

        let previous_progress = job.progress;
        update(job);
        job.progress = job.progress.clamp(previous_progress, 100);
        job.updated_at = Utc::now();
        Some(job.clone())
    }

    pub fn remove(&self, id: &JobId) -> Option<Job> {
        let mut map = self.write();
        let job = map.jobs.remove(id)?;
        map.order.retain(|other| other != id);
        Some(job)
    }

    /// Removes every job matching `predicate`; returns how many were removed.
    pub fn remove_where(&self, predicate: impl Fn(&Job) -> bool) -> usize {
        let mut map = self.write();
        let before = map.jobs.len();
        map.jobs.retain(|_, job| !predicate(job));
        let JobMap { jobs, order } = &mut *map;
        order.retain(|id| jobs.contains_key(id));
        before - jobs.len()
    }

    /// Evicts terminal jobs.
    pub fn clear_finished(&self) -> usize {
        let removed = self.remove_where(Job::is_terminal);
        if removed > 0 {
            log::info!("Cleared {} finished jobs", removed);
        }
        removed
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}
