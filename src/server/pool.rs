use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::debug;

/// Where a submitted job ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Started right away on a core slot
    Core,
    /// Parked in the backlog until a core slot frees up
    Queued,
    /// Started on an overflow slot above the core size
    Extra,
    /// Everything was full; the submitter ran the job itself
    CallerRuns,
}

/// Bounded pool of connection workers.
///
/// Up to `core` jobs run at once, then up to `backlog` jobs wait for a core
/// slot, then up to `max - core` more run on overflow slots. Past that the
/// submitting task runs the job inline, which stops it from accepting more
/// work until the job is done.
#[derive(Clone)]
pub struct WorkerPool {
    core: Arc<Semaphore>,
    extra: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    core_size: usize,
    max_size: usize,
    backlog: usize,
}

impl WorkerPool {
    pub fn new(core_size: usize, max_size: usize, backlog: usize) -> Self {
        let max_size = max_size.max(core_size);
        Self {
            core: Arc::new(Semaphore::new(core_size)),
            extra: Arc::new(Semaphore::new(max_size - core_size)),
            queued: Arc::new(AtomicUsize::new(0)),
            core_size,
            max_size,
            backlog,
        }
    }

    pub async fn submit<F>(&self, job: F) -> Admission
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(permit) = self.core.clone().try_acquire_owned() {
            tokio::spawn(async move {
                job.await;
                drop(permit);
            });
            return Admission::Core;
        }

        let backlog = self.backlog;
        let reserved = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < backlog).then_some(n + 1))
            .is_ok();

        if reserved {
            let core = self.core.clone();
            let queued = self.queued.clone();
            tokio::spawn(async move {
                let permit = core.acquire_owned().await;
                queued.fetch_sub(1, Ordering::AcqRel);
                if let Ok(permit) = permit {
                    job.await;
                    drop(permit);
                }
            });
            return Admission::Queued;
        }

        if let Ok(permit) = self.extra.clone().try_acquire_owned() {
            tokio::spawn(async move {
                job.await;
                drop(permit);
            });
            return Admission::Extra;
        }

        debug!("worker pool saturated, running connection on the accept task");
        job.await;
        Admission::CallerRuns
    }

    /// Jobs currently holding a core or overflow slot.
    pub fn active(&self) -> usize {
        (self.core_size - self.core.available_permits())
            + (self.max_size - self.core_size - self.extra.available_permits())
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn core_size(&self) -> usize {
        self.core_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
