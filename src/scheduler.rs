//! Task Scheduler
//!
//! Runs work items after an initial delay, optionally repeating at a fixed
//! interval. A single driver thread owns the ordered task queue and hands due
//! work to named worker pools; work never runs on the driver itself.
//!
//! Lock order: queue lock, then a pool lock. The queue lock is never held while
//! a work item runs, so work may freely take registry holder locks.

pub mod pool;
pub mod task;

pub use pool::{Job, PoolStats, WorkerPool};
pub use task::{TaskHandle, Work};

use crate::config::{PoolConfig, SchedulerConfig};
use crate::error::SchedulerError;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use task::{QueueKey, ScheduledTask};
use tracing::{debug, info, warn};

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Tasks waiting in the queue
    pub pending: usize,
    /// Work items handed to a pool
    pub dispatched: u64,
    /// Work items that returned an error or panicked
    pub failed: u64,
    /// Work items a pool refused (saturated or shut down)
    pub rejected: u64,
}

struct QueueState {
    queue: BTreeMap<QueueKey, ScheduledTask>,
    index: HashMap<TaskHandle, QueueKey>,
    shutdown: bool,
}

impl QueueState {
    fn insert(&mut self, task: ScheduledTask) {
        let key = task.key();
        self.index.insert(task.handle, key);
        self.queue.insert(key, task);
    }
}

struct SchedulerShared {
    state: Mutex<QueueState>,
    wake: Condvar,
    pools: HashMap<String, Arc<WorkerPool>>,
    default_pool: String,
    dispatched: AtomicU64,
    rejected: AtomicU64,
}

impl SchedulerShared {
    fn resolve_pool(&self, name: &str) -> Option<&Arc<WorkerPool>> {
        match self.pools.get(name) {
            Some(pool) => Some(pool),
            None => {
                warn!(
                    pool = %name,
                    default_pool = %self.default_pool,
                    "Unknown pool, dispatching to default pool"
                );
                self.pools.get(&self.default_pool)
            }
        }
    }

    fn dispatch(&self, task: &ScheduledTask) {
        let Some(pool) = self.resolve_pool(&task.pool) else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            let err = SchedulerError::UnknownPool(task.pool.clone());
            warn!(task_id = %task.handle, error = %err, "No pool available for task");
            return;
        };

        let work = Arc::clone(&task.work);
        match pool.execute(Box::new(move || (work)())) {
            Ok(()) => {
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                debug!(task_id = %task.handle, pool = %pool.name(), "Dispatched task");
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(task_id = %task.handle, pool = %pool.name(), error = %e, "Pool rejected task");
            }
        }
    }
}

/// Delayed and periodic task scheduler over named worker pools
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Build the configured pools and start the driver thread.
    ///
    /// The default pool is created with default sizing when the configuration omits it.
    pub fn new(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let mut pools = HashMap::new();
        for (name, pool_config) in &config.pools {
            let pool = WorkerPool::new(name.clone(), pool_config.clone())?;
            pools.insert(name.clone(), Arc::new(pool));
        }
        if !pools.contains_key(&config.default_pool) {
            let pool = WorkerPool::new(config.default_pool.clone(), PoolConfig::default())?;
            pools.insert(config.default_pool.clone(), Arc::new(pool));
        }

        let shared = Arc::new(SchedulerShared {
            state: Mutex::new(QueueState {
                queue: BTreeMap::new(),
                index: HashMap::new(),
                shutdown: false,
            }),
            wake: Condvar::new(),
            pools,
            default_pool: config.default_pool.clone(),
            dispatched: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        });

        let driver_shared = Arc::clone(&shared);
        let driver = thread::Builder::new()
            .name("contree-scheduler".to_string())
            .spawn(move || driver_loop(driver_shared))?;

        info!(pools = shared.pools.len(), "Started scheduler");

        Ok(Self {
            shared,
            driver: Mutex::new(Some(driver)),
        })
    }

    /// Schedule `work` on `pool` after `delay`, repeating every `interval` unless it is zero.
    pub fn schedule(
        &self,
        pool: &str,
        work: Work,
        delay: Duration,
        interval: Duration,
    ) -> Result<TaskHandle, SchedulerError> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(SchedulerError::ShutDown);
        }
        let task = ScheduledTask::new(pool.to_string(), work, delay, interval, Instant::now());
        let handle = task.handle;
        debug!(
            task_id = %handle,
            pool = %pool,
            delay_ms = delay.as_millis() as u64,
            interval_ms = interval.as_millis() as u64,
            "Scheduled task"
        );
        state.insert(task);
        drop(state);
        self.shared.wake.notify_one();
        Ok(handle)
    }

    /// Millisecond form of [`Scheduler::schedule`]; negative values are rejected.
    pub fn schedule_millis(
        &self,
        pool: &str,
        work: Work,
        delay_ms: i64,
        interval_ms: i64,
    ) -> Result<TaskHandle, SchedulerError> {
        if delay_ms < 0 {
            return Err(SchedulerError::InvalidArgument(format!(
                "delay must be >= 0, got {}ms",
                delay_ms
            )));
        }
        if interval_ms < 0 {
            return Err(SchedulerError::InvalidArgument(format!(
                "interval must be >= 0, got {}ms",
                interval_ms
            )));
        }
        self.schedule(
            pool,
            work,
            Duration::from_millis(delay_ms as u64),
            Duration::from_millis(interval_ms as u64),
        )
    }

    /// One-shot task after `delay`
    pub fn schedule_after(
        &self,
        pool: &str,
        delay: Duration,
        work: Work,
    ) -> Result<TaskHandle, SchedulerError> {
        self.schedule(pool, work, delay, Duration::ZERO)
    }

    /// Repeating task, first run after `delay`
    pub fn schedule_every(
        &self,
        pool: &str,
        delay: Duration,
        interval: Duration,
        work: Work,
    ) -> Result<TaskHandle, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidArgument(
                "repeating task needs a non-zero interval".to_string(),
            ));
        }
        self.schedule(pool, work, delay, interval)
    }

    /// Remove a queued task. Returns false if it already ran (one-shot) or was removed.
    ///
    /// A work item already handed to a pool still completes.
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        let mut state = self.shared.state.lock();
        let removed = match state.index.remove(&handle) {
            Some(key) => state.queue.remove(&key).is_some(),
            None => false,
        };
        drop(state);

        if removed {
            self.shared.wake.notify_one();
            debug!(task_id = %handle, "Cancelled task");
        } else {
            debug!(task_id = %handle, "Cancel ignored, task not queued");
        }
        removed
    }

    /// True while `handle` is waiting in the queue
    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.shared.state.lock().index.contains_key(&handle)
    }

    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.pools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn pool_stats(&self, name: &str) -> Option<PoolStats> {
        self.shared.pools.get(name).map(|pool| pool.stats())
    }

    pub fn stats(&self) -> SchedulerStats {
        let pending = self.shared.state.lock().queue.len();
        let failed = self.shared.pools.values().map(|p| p.stats().failed).sum();
        SchedulerStats {
            pending,
            dispatched: self.shared.dispatched.load(Ordering::Relaxed),
            failed,
            rejected: self.shared.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Stop the driver and all pools. Queued tasks are dropped. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            let dropped = state.queue.len();
            state.queue.clear();
            state.index.clear();
            if dropped > 0 {
                debug!(dropped, "Dropped queued tasks on shutdown");
            }
        }
        self.shared.wake.notify_all();

        if let Some(driver) = self.driver.lock().take() {
            let _ = driver.join();
        }
        for pool in self.shared.pools.values() {
            pool.shutdown();
        }
        info!("Stopped scheduler");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn driver_loop(shared: Arc<SchedulerShared>) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }

        let now = Instant::now();
        while let Some(entry) = state.queue.first_entry() {
            if entry.key().next_run > now {
                break;
            }
            let mut task = entry.remove();
            state.index.remove(&task.handle);
            shared.dispatch(&task);
            if task.is_repeating() {
                task.reschedule(now);
                state.insert(task);
            }
        }

        match state.queue.keys().next().map(|key| key.next_run) {
            Some(next_run) => {
                let timeout = next_run.saturating_duration_since(Instant::now());
                if !timeout.is_zero() {
                    shared.wake.wait_for(&mut state, timeout);
                }
            }
            None => shared.wake.wait(&mut state),
        }
    }
    debug!("Scheduler driver exited");
}
