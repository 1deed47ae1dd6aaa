use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::BatchKey;
use crate::context::WorkerId;

/// Errors returned when submitting work to a pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool for {0} is shut down")]
    Shutdown(BatchKey),

    #[error("worker pool for {0} has no free slot")]
    NoFreeSlot(BatchKey),
}

/// Fixed-size pool of worker slots dedicated to one batch.
///
/// A task holds a semaphore permit and a numbered slot for its whole
/// lifetime, so at most `size` tasks run at once and every running task has
/// a distinct [`WorkerId`].
pub struct WorkerPool {
    batch: BatchKey,
    size: usize,
    semaphore: Arc<Semaphore>,
    free_slots: Arc<Mutex<Vec<usize>>>,
    tasks: Mutex<JoinSet<()>>,
}

impl WorkerPool {
    pub fn new(batch: BatchKey, size: usize) -> Self {
        let size = size.max(1);
        debug!(batch = %batch, size, "creating worker pool");
        Self {
            batch,
            size,
            semaphore: Arc::new(Semaphore::new(size)),
            free_slots: Arc::new(Mutex::new((1..=size).rev().collect())),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn batch(&self) -> BatchKey {
        self.batch
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Waits for a free slot and starts `task` on it.
    ///
    /// Submission order is preserved: tasks start in the order `submit` is
    /// awaited.
    pub async fn submit<F, Fut>(&self, task: F) -> Result<WorkerId, PoolError>
    where
        F: FnOnce(WorkerId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Shutdown(self.batch))?;
        let slot = Slot::take(self.free_slots.clone()).ok_or(PoolError::NoFreeSlot(self.batch))?;
        let worker = WorkerId::new(self.batch, slot.index);

        let lease = Lease {
            _slot: slot,
            _permit: permit,
        };
        self.tasks().spawn(async move {
            let _lease = lease;
            task(worker).await;
        });
        Ok(worker)
    }

    /// Waits until every submitted task has finished.
    ///
    /// Returns the number of tasks that panicked.
    pub async fn join(&self) -> usize {
        let mut panicked = 0;
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks());
            if tasks.is_empty() {
                return panicked;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(err) = result {
                    if err.is_panic() {
                        panicked += 1;
                        warn!(batch = %self.batch, error = %err, "worker task panicked");
                    }
                }
            }
        }
    }

    /// Stops accepting work and aborts tasks still in flight.
    ///
    /// Returns the number of tasks that were aborted.
    pub fn shutdown_now(&self) -> usize {
        self.semaphore.close();
        let mut tasks = self.tasks();
        let in_flight = tasks.len();
        tasks.abort_all();
        tasks.detach_all();
        if in_flight > 0 {
            warn!(batch = %self.batch, in_flight, "worker pool shut down with tasks in flight");
        }
        in_flight
    }

    pub fn is_shutdown(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Number of slots not currently held by a task.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What a running task holds. The slot goes back to the free list before
/// the permit is released.
struct Lease {
    _slot: Slot,
    _permit: OwnedSemaphorePermit,
}

/// Slot number held by a running task, returned to the free list on drop.
struct Slot {
    index: usize,
    free_slots: Arc<Mutex<Vec<usize>>>,
}

impl Slot {
    fn take(free_slots: Arc<Mutex<Vec<usize>>>) -> Option<Self> {
        let index = free_slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()?;
        Some(Self { index, free_slots })
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.free_slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(self.index);
    }
}
