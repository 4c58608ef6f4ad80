//! In-memory job registry.
//!
//! The registry is the single shared store for job state. Every update is an
//! atomic read-modify-write critical section; callers never hold the lock
//! across an await point. Jobs in a terminal state are write-once: any
//! further update is rejected, so the orchestrator's terminal transition and
//! late progress callbacks cannot race.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::warn;

use vpress_models::{Job, JobId};

/// Concurrent job-id-keyed store of job snapshots.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created job.
    pub fn create(&self, job: Job) {
        let id = job.id.clone();
        if self.lock().insert(id.clone(), job).is_some() {
            // ids are uuid v4; a collision here means an intake bug
            warn!(job_id = %id, "job id reused in registry");
        }
    }

    /// Snapshot of a job, if known.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.lock().get(id).cloned()
    }

    /// Atomically mutate a job unless it has already reached a terminal
    /// state.
    ///
    /// Returns false for unknown ids and for terminal jobs; callers polling
    /// from a subprocess output stream use that as their early return.
    pub fn update<F>(&self, id: &JobId, f: F) -> bool
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.lock();
        match jobs.get_mut(id) {
            Some(job) if !job.is_terminal() => {
                f(job);
                true
            }
            _ => false,
        }
    }

    /// Remove a job entry, returning the removed snapshot.
    pub fn remove(&self, id: &JobId) -> Option<Job> {
        self.lock().remove(id)
    }

    /// Number of tracked jobs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no jobs are tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Ids of terminal jobs not updated since `cutoff`, for the sweeper.
    pub fn stale_terminal_ids(&self, cutoff: DateTime<Utc>) -> Vec<JobId> {
        self.lock()
            .values()
            .filter(|job| job.is_terminal() && job.updated_at < cutoff)
            .map(|job| job.id.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}
