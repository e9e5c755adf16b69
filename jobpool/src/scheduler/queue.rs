use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::PoolError;
use crate::job::Job;

/// Pending jobs shared between producers and workers.
///
/// The queue is LIFO: `try_pop` returns the most recently pushed job. Newer
/// work is serviced first under load, at the price of possibly starving old
/// submissions while producers keep submitting.
///
/// # Capacity
/// The queue is unbounded. A producer that outpaces the workers grows it
/// without limit and can exhaust memory; there is no backpressure.
///
/// # Thread Safety
/// Every access to the job list happens under one mutex. The condition
/// variable is paired with that same mutex and is only waited on by workers
/// using [`IdleStrategy::Notify`](crate::config::IdleStrategy::Notify).
pub struct WorkQueue {
    jobs: Mutex<Vec<Job>>,
    available: Condvar,
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("len", &self.len())
            .finish()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            available: Condvar::new(),
        }
    }

    fn guard(&self) -> Result<MutexGuard<'_, Vec<Job>>, PoolError> {
        self.jobs.lock().map_err(|_| PoolError::QueuePoisoned)
    }

    /// Push a job and wake one waiting worker.
    pub fn push(&self, job: Job) -> Result<(), PoolError> {
        self.guard()?.push(job);
        self.available.notify_one();
        Ok(())
    }

    /// Pop the most recently pushed job, or `None` if the queue is empty.
    pub fn try_pop(&self) -> Result<Option<Job>, PoolError> {
        Ok(self.guard()?.pop())
    }

    /// Snapshot of the queue length.
    ///
    /// May be stale by the time the caller looks at it. A poisoned queue
    /// reports zero.
    pub fn len(&self) -> usize {
        self.jobs.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }

    /// Advisory emptiness check.
    ///
    /// Never act on this without popping under the lock afterwards; another
    /// thread may push or pop in between.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every pending job without running it.
    pub fn drain(&self) -> Result<Vec<Job>, PoolError> {
        Ok(std::mem::take(&mut *self.guard()?))
    }

    /// Block until the queue is non-empty, `timeout` elapses, or
    /// [`wake_all`](Self::wake_all) is called.
    ///
    /// Returns immediately if `running` is already false. The flag is read
    /// under the queue lock so a concurrent `wake_all` cannot be missed.
    /// Spurious wake-ups are possible; callers re-check with `try_pop`.
    pub fn wait_for_work(&self, timeout: Duration, running: &AtomicBool) -> Result<(), PoolError> {
        let jobs = self.guard()?;
        if !jobs.is_empty() || !running.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.available
            .wait_timeout(jobs, timeout)
            .map(|_| ())
            .map_err(|_| PoolError::QueuePoisoned)
    }

    /// Wake every worker blocked in `wait_for_work`.
    pub fn wake_all(&self) {
        // Taking the lock orders this notification after any worker that
        // already checked the queue and is about to wait.
        let _held = self.jobs.lock();
        self.available.notify_all();
    }

    /// Poison the job list by panicking while its lock is held.
    #[cfg(test)]
    pub(crate) fn poison(&self) {
        fn panic_holding(jobs: &Mutex<Vec<Job>>) {
            let _held = jobs.lock();
            panic!("job list poisoned");
        }
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            panic_holding(&self.jobs)
        }));
        assert!(outcome.is_err());
        assert!(self.jobs.is_poisoned());
    }
}
