//! Scheduled task records and their queue ordering.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Work run by the scheduler. Shared so repeating tasks can be dispatched many times.
pub type Work = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync + 'static>;

/// Longest span added to an `Instant`; larger delays and lifetimes are clamped to it
pub const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `start + span` without overflowing: spans beyond [`FAR_FUTURE`] are clamped
pub(crate) fn deadline(start: Instant, span: Duration) -> Instant {
    let span = span.min(FAR_FUTURE);
    start.checked_add(span).unwrap_or(start)
}

/// Identity of a scheduled task, usable for cancellation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

impl TaskHandle {
    /// Generate the next task identity
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        TaskHandle(COUNTER.fetch_add(1, AtomicOrdering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Queue key: due time first, task identity as the tie-break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueKey {
    pub next_run: Instant,
    pub handle: TaskHandle,
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.next_run
            .cmp(&other.next_run)
            .then_with(|| self.handle.cmp(&other.handle))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A queued unit of work
pub(crate) struct ScheduledTask {
    pub handle: TaskHandle,
    pub pool: String,
    pub work: Work,
    pub delay: Duration,
    /// Zero means one-shot
    pub interval: Duration,
    pub next_run: Instant,
}

impl ScheduledTask {
    pub fn new(pool: String, work: Work, delay: Duration, interval: Duration, now: Instant) -> Self {
        Self {
            handle: TaskHandle::next(),
            pool,
            work,
            delay,
            interval,
            next_run: deadline(now, delay),
        }
    }

    pub fn key(&self) -> QueueKey {
        QueueKey {
            next_run: self.next_run,
            handle: self.handle,
        }
    }

    pub fn is_repeating(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Move the next run one interval past `now`
    pub fn reschedule(&mut self, now: Instant) {
        self.next_run = deadline(now, self.interval);
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("handle", &self.handle)
            .field("pool", &self.pool)
            .field("delay", &self.delay)
            .field("interval", &self.interval)
            .field("next_run", &self.next_run)
            .finish()
    }
}
