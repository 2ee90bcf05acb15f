//! Named worker pools
//!
//! Each pool owns a multi-thread tokio runtime. Work items are blocking
//! closures handed to `spawn_blocking`: at most `max_threads` run at once,
//! extra jobs wait in the runtime's queue, and job threads exit after
//! `keep_alive` of idleness. Bounded pools admit at most
//! `max_threads + queue_capacity` jobs at a time through a semaphore.

use crate::config::{PoolConfig, QueuePolicy};
use crate::error::SchedulerError;
use parking_lot::Mutex;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error};

/// A unit of work submitted to a pool
pub type Job = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// How long shutdown waits for jobs that are already running
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

thread_local! {
    /// Id of the pool whose runtime owns this thread (0 outside any pool)
    static CURRENT_POOL: Cell<u64> = Cell::new(0);
}

/// Pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs accepted but not started
    pub queued: usize,
    /// Jobs currently running
    pub running: usize,
    /// Jobs that ran to completion without error
    pub completed: u64,
    /// Jobs that returned an error or panicked
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicUsize,
    running: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Worker pool with independent sizing
pub struct WorkerPool {
    id: u64,
    name: String,
    runtime: Mutex<Option<Runtime>>,
    admission: Option<Arc<Semaphore>>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Build the pool runtime
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Result<Self, SchedulerError> {
        static NEXT_POOL: AtomicU64 = AtomicU64::new(1);

        let name = name.into();
        config
            .validate()
            .map_err(|e| SchedulerError::InvalidArgument(format!("pool '{}': {}", name, e)))?;

        let id = NEXT_POOL.fetch_add(1, Ordering::Relaxed);
        let thread_prefix = name.clone();
        let thread_seq = AtomicUsize::new(0);
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.min_threads.max(1))
            .max_blocking_threads(config.max_threads)
            .thread_keep_alive(config.keep_alive())
            .thread_name_fn(move || {
                format!("{}-{}", thread_prefix, thread_seq.fetch_add(1, Ordering::Relaxed))
            })
            .on_thread_start(move || CURRENT_POOL.with(|pool| pool.set(id)))
            .build()?;

        let admission = match config.queue_policy() {
            QueuePolicy::Bounded(capacity) => {
                Some(Arc::new(Semaphore::new(config.max_threads + capacity)))
            }
            QueuePolicy::Unbounded => None,
        };

        debug!(
            pool = %name,
            min_threads = config.min_threads,
            max_threads = config.max_threads,
            queue_capacity = ?config.queue_capacity,
            "Started worker pool"
        );

        Ok(Self {
            id,
            name,
            runtime: Mutex::new(Some(runtime)),
            admission,
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job for asynchronous execution
    pub fn execute(&self, job: Job) -> Result<(), SchedulerError> {
        let runtime = self.runtime.lock();
        let Some(runtime) = runtime.as_ref() else {
            return Err(SchedulerError::ShutDown);
        };

        let permit = self.admit()?;
        let counters = Arc::clone(&self.counters);
        let pool = self.name.clone();
        counters.queued.fetch_add(1, Ordering::Relaxed);
        runtime.spawn_blocking(move || {
            let _permit = permit;
            run_job(&pool, &counters, job);
        });
        Ok(())
    }

    fn admit(&self) -> Result<Option<OwnedSemaphorePermit>, SchedulerError> {
        let Some(admission) = &self.admission else {
            return Ok(None);
        };
        match Arc::clone(admission).try_acquire_owned() {
            Ok(permit) => Ok(Some(permit)),
            Err(TryAcquireError::NoPermits) => Err(SchedulerError::PoolSaturated(self.name.clone())),
            Err(TryAcquireError::Closed) => Err(SchedulerError::ShutDown),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let counters = &self.counters;
        PoolStats {
            queued: counters.queued.load(Ordering::Relaxed),
            running: counters.running.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting jobs and drop queued ones. Running jobs get a grace period.
    ///
    /// Called from one of the pool's own threads, the runtime is released
    /// without waiting.
    pub fn shutdown(&self) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };
        if let Some(admission) = &self.admission {
            admission.close();
        }

        if CURRENT_POOL.with(Cell::get) == self.id {
            runtime.shutdown_background();
        } else {
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
        }
        debug!(pool = %self.name, "Stopped worker pool");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(pool: &str, counters: &Counters, job: Job) {
    counters.queued.fetch_sub(1, Ordering::Relaxed);
    counters.running.fetch_add(1, Ordering::Relaxed);
    let outcome = catch_unwind(AssertUnwindSafe(job));
    counters.running.fetch_sub(1, Ordering::Relaxed);

    match outcome {
        Ok(Ok(())) => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(err)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(pool = %pool, error = %err, "Job failed");
        }
        Err(panic) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(pool = %pool, panic = %panic_message(&*panic), "Job panicked");
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
