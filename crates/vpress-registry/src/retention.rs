//! Deferred artifact deletion.
//!
//! One pending timer exists per file path. Arming a path that already has a
//! timer replaces it (last-write-wins); firing deletes the file (a file
//! that is already gone counts as deleted) and evicts the owning registry
//! entry, so job metadata and its artifact share a deletion trigger.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use vpress_media::remove_file_if_exists;
use vpress_models::JobId;

use crate::registry::JobRegistry;

#[derive(Debug)]
struct PendingDeletion {
    generation: u64,
    handle: JoinHandle<()>,
}

type TimerMap = HashMap<PathBuf, PendingDeletion>;

/// Schedules, replaces, and cancels deferred deletions of files.
pub struct RetentionScheduler {
    registry: Arc<JobRegistry>,
    timers: Arc<Mutex<TimerMap>>,
    next_generation: AtomicU64,
}

impl RetentionScheduler {
    /// Create a scheduler that evicts `registry` entries when their
    /// artifacts expire.
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self {
            registry,
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Number of pending deletions.
    pub fn pending_count(&self) -> usize {
        lock(&self.timers).len()
    }

    /// Schedule deletion of `path` after `delay`.
    ///
    /// A timer already pending for the same path is cancelled first, so at
    /// most one deletion per path is ever outstanding.
    pub fn arm(&self, path: impl Into<PathBuf>, delay: Duration, job_id: Option<JobId>) {
        let path = path.into();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // The lock is held across replace + spawn + insert, so the new task
        // cannot observe the map before its own entry exists.
        let mut timers = lock(&self.timers);

        if let Some(previous) = timers.remove(&path) {
            previous.handle.abort();
            debug!(path = %path.display(), "replaced pending deletion");
        }

        let registry = Arc::clone(&self.registry);
        let timer_map = Arc::clone(&self.timers);
        let task_path = path.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Claim our entry; a replace or cancel that happened while we
            // slept wins and this timer does nothing.
            let claimed = {
                let mut timers = lock(&timer_map);
                match timers.get(&task_path) {
                    Some(pending) if pending.generation == generation => {
                        timers.remove(&task_path);
                        true
                    }
                    _ => false,
                }
            };
            if !claimed {
                return;
            }

            match remove_file_if_exists(&task_path).await {
                Ok(()) => debug!(path = %task_path.display(), "retention timer removed file"),
                Err(e) => warn!(
                    path = %task_path.display(),
                    "retention deletion failed: {}", e
                ),
            }

            if let Some(id) = job_id {
                if registry.remove(&id).is_some() {
                    info!(job_id = %id, "evicted job with expired artifact");
                }
            }
        });

        timers.insert(path, PendingDeletion { generation, handle });
    }

    /// Cancel the pending deletion for `path`, if any.
    pub fn cancel(&self, path: &Path) -> bool {
        match lock(&self.timers).remove(path) {
            Some(pending) => {
                pending.handle.abort();
                debug!(path = %path.display(), "cancelled pending deletion");
                true
            }
            None => false,
        }
    }
}

fn lock(timers: &Mutex<TimerMap>) -> MutexGuard<'_, TimerMap> {
    timers.lock().unwrap_or_else(|e| e.into_inner())
}
