//! # Worker Thread Implementation
//!
//! Each worker owns one OS thread and runs a poll/execute loop against the
//! shared [`WorkQueue`](super::queue::WorkQueue):
//!
//! 1. Read the pool's running flag; stop if it is false
//! 2. Try to pop a job
//! 3. Execute it, containing any error or panic, or idle if none was found
//! 4. Repeat
//!
//! The running flag is read without the queue lock. A late read costs at
//! most one extra poll or idle interval.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::{IdleStrategy, PoolConfig};
use crate::error::{JobError, PoolError};
use crate::job::Job;
use crate::logging;

use super::pool::{JobFailure, PoolShared};

/// Status codes for worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Spawned, loop not entered yet
    Idle = 0,

    /// Looking for work, or waiting for the next poll
    Polling = 1,

    /// Running a job
    Executing = 2,

    /// Loop exited; the thread is ready to be joined
    Stopped = 3,
}

impl WorkerStatus {
    pub(crate) fn load(status: &AtomicUsize) -> Self {
        match status.load(Ordering::Relaxed) {
            0 => WorkerStatus::Idle,
            1 => WorkerStatus::Polling,
            2 => WorkerStatus::Executing,
            _ => WorkerStatus::Stopped,
        }
    }
}

pub(crate) struct Worker {
    id: usize,
    shared: Arc<PoolShared>,
    status: Arc<AtomicUsize>,
    backoff: Duration,
    idle_strategy: IdleStrategy,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("status", &WorkerStatus::load(&self.status))
            .field("idle_strategy", &self.idle_strategy)
            .finish()
    }
}

impl Worker {
    pub(crate) fn new(id: usize, shared: Arc<PoolShared>, config: &PoolConfig) -> Self {
        Self {
            id,
            shared,
            status: Arc::new(AtomicUsize::new(WorkerStatus::Idle as usize)),
            backoff: config.backoff,
            idle_strategy: config.idle_strategy,
        }
    }

    pub(crate) fn status(&self) -> Arc<AtomicUsize> {
        self.status.clone()
    }

    /// Start the loop on a new named thread.
    ///
    /// The thread logs through the dispatcher current on the caller.
    pub(crate) fn spawn(self, thread_name: String) -> io::Result<JoinHandle<()>> {
        let dispatch = logging::current_subscriber();
        thread::Builder::new()
            .name(thread_name)
            .spawn(move || tracing::dispatcher::with_default(&dispatch, || self.run_loop()))
    }

    fn set_status(&self, status: WorkerStatus) {
        self.status.store(status as usize, Ordering::Relaxed);
    }

    fn run_loop(&self) {
        let span = crate::worker_span!(self.id);
        let _entered = span.enter();
        info!("worker started");

        while self.shared.running.load(Ordering::Relaxed) {
            self.set_status(WorkerStatus::Polling);

            let next = match self.shared.queue.try_pop() {
                Ok(next) => next,
                Err(e) => {
                    error!(error = %e, "work queue unusable, stopping worker");
                    break;
                }
            };

            match next {
                Some(job) => {
                    self.set_status(WorkerStatus::Executing);
                    self.execute(job);
                }
                None => {
                    if let Err(e) = self.idle() {
                        error!(error = %e, "work queue unusable, stopping worker");
                        break;
                    }
                }
            }
        }

        self.set_status(WorkerStatus::Stopped);
        info!("worker stopped");
    }

    fn idle(&self) -> Result<(), PoolError> {
        match self.idle_strategy {
            IdleStrategy::Backoff => {
                thread::sleep(self.backoff);
                Ok(())
            }
            IdleStrategy::Notify => self
                .shared
                .queue
                .wait_for_work(self.backoff, &self.shared.running),
        }
    }

    /// Run one job; errors and panics stop here.
    fn execute(&self, job: Job) {
        let job_id = job.id();
        let label = job.label().map(str::to_owned);
        let span = crate::job_span!(job_id, label = label.as_deref().unwrap_or("-"));
        let _entered = span.enter();
        debug!("executing job");

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| job.execute())) {
            Ok(result) => result,
            Err(payload) => Err(JobError::from_panic(payload)),
        };

        match outcome {
            Ok(()) => {
                self.shared.executed.fetch_add(1, Ordering::SeqCst);
                debug!("job completed");
            }
            Err(error) => {
                error!(worker = self.id, error = %error, "job failed");
                self.shared.report_failure(JobFailure {
                    job_id,
                    label,
                    worker_id: self.id,
                    error,
                });
                self.shared.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}
