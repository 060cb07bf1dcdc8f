// Deferred task scheduler
//
// Runs a future after a delay, keyed by the id of the record that triggered
// it. Cancelling a key aborts its task so no callback outlives its record.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

struct Scheduled {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Clone, Default)]
pub struct DeferredScheduler {
    /// Pending tasks (key -> task handle)
    tasks: Arc<Mutex<HashMap<Uuid, Scheduled>>>,
    generation: Arc<AtomicU64>,
}

impl DeferredScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`. Returns true if a pending task for `key` was replaced.
    pub fn schedule<F>(&self, key: Uuid, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let tasks = self.tasks.clone();

        // Hold the lock until the handle is stored so the task's cleanup
        // cannot run before insertion
        let mut pending = self.tasks.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
            let mut pending = tasks.lock();
            if pending
                .get(&key)
                .is_some_and(|s| s.generation == generation)
            {
                pending.remove(&key);
            }
        });

        let replaced = pending.insert(key, Scheduled { generation, handle });
        if let Some(previous) = &replaced {
            previous.handle.abort();
            debug!(key = %key, "Replaced pending deferred task");
        }
        replaced.is_some()
    }

    /// Abort the pending task for `key`. Returns false if nothing was pending.
    pub fn cancel(&self, key: Uuid) -> bool {
        match self.tasks.lock().remove(&key) {
            Some(scheduled) => {
                scheduled.handle.abort();
                debug!(key = %key, "Cancelled deferred task");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: Uuid) -> bool {
        self.tasks.lock().contains_key(&key)
    }

    pub fn pending_keys(&self) -> Vec<Uuid> {
        self.tasks.lock().keys().copied().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Abort every pending task
    pub fn shutdown(&self) {
        for (key, scheduled) in self.tasks.lock().drain() {
            debug!(key = %key, "Aborting deferred task on shutdown");
            scheduled.handle.abort();
        }
    }
}
