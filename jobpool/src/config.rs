use std::time::Duration;

use crate::error::PoolError;

pub const DEFAULT_WORKER_COUNT: usize = 10;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "jobpool-worker";
pub const DEFAULT_FAILURE_CAPACITY: usize = 1024;

/// Determines how a worker waits when it finds the work queue empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IdleStrategy {
    /// Sleep for the configured backoff, then poll again.
    ///
    /// Dispatch latency is bounded by the backoff interval.
    #[default]
    Backoff,
    /// Block on a condition variable tied to the queue.
    ///
    /// `push` wakes one worker and shutdown wakes all of them. The backoff
    /// is still used as the wait timeout so a missed wake-up costs at most
    /// one interval.
    Notify,
}

/// Configuration for a [`Pool`](crate::scheduler::Pool).
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Number of worker threads spawned by `start`.
    pub worker_count: usize,

    /// Idle interval between polls of an empty queue.
    pub backoff: Duration,

    /// How workers idle when the queue is empty.
    pub idle_strategy: IdleStrategy,

    /// Worker threads are named `{prefix}-{id}`.
    pub thread_name_prefix: String,

    /// Unread failure reports kept before newer ones are dropped.
    pub failure_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            backoff: DEFAULT_BACKOFF,
            idle_strategy: IdleStrategy::default(),
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            failure_capacity: DEFAULT_FAILURE_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Default configuration with the given worker count.
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    /// One worker per logical CPU.
    pub fn per_core() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_idle_strategy(mut self, idle_strategy: IdleStrategy) -> Self {
        self.idle_strategy = idle_strategy;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_failure_capacity(mut self, capacity: usize) -> Self {
        self.failure_capacity = capacity;
        self
    }

    /// Reject configurations the pool cannot run with.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.worker_count == 0 {
            return Err(PoolError::InvalidConfig(
                "worker count must be positive".to_string(),
            ));
        }
        // A zero interval turns either idle strategy into a hot spin.
        if self.backoff.is_zero() {
            return Err(PoolError::InvalidConfig(
                "backoff interval must be non-zero".to_string(),
            ));
        }
        // A zero-capacity channel only hands off to a receiver already waiting.
        if self.failure_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "failure capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
