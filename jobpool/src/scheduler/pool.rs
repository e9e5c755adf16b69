use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, warn};

use crate::config::PoolConfig;
use crate::error::{JobError, PoolError};
use crate::job::{Job, JobId};
use crate::output::OutputGuard;

use super::queue::WorkQueue;
use super::worker::{Worker, WorkerStatus};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Lifecycle of a [`Pool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Accepting jobs, workers not spawned yet
    Created = 0,

    /// Workers are running
    Running = 1,

    /// `shutdown` is joining the workers
    ShuttingDown = 2,

    /// All workers joined; terminal
    Shutdown = 3,
}

impl PoolStatus {
    fn from_usize(value: usize) -> Self {
        match value {
            0 => PoolStatus::Created,
            1 => PoolStatus::Running,
            2 => PoolStatus::ShuttingDown,
            _ => PoolStatus::Shutdown,
        }
    }
}

/// Snapshot of pool counters
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Number of worker threads the pool is configured with
    pub worker_count: usize,

    /// Jobs waiting in the queue
    pub queue_length: usize,

    /// Jobs accepted by `submit`
    pub submitted: u64,

    /// Jobs that ran to completion
    pub executed: u64,

    /// Jobs that returned an error or panicked
    pub failed: u64,

    /// Failure reports discarded because the failure channel was full
    pub failure_reports_dropped: u64,

    /// Current lifecycle status
    pub status: PoolStatus,
}

/// Outcome of [`Pool::shutdown`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Worker threads joined
    pub workers_joined: usize,

    /// Worker threads left running because `shutdown` was called from one
    /// of them; they exit after their current job
    pub workers_detached: usize,

    /// Jobs that ran to completion over the pool's lifetime
    pub executed: u64,

    /// Jobs that failed over the pool's lifetime
    pub failed: u64,

    /// Jobs still queued when the workers stopped; dropped unexecuted
    pub dropped: usize,

    /// Time spent stopping and joining the workers
    pub elapsed: Duration,
}

/// A job error reported by a worker.
///
/// Submission is fire-and-forget, so failures are published on the channel
/// returned by [`Pool::failures`] instead of being returned to the submitter.
#[derive(Debug)]
pub struct JobFailure {
    pub job_id: JobId,
    pub label: Option<String>,
    pub worker_id: usize,
    pub error: JobError,
}

/// State shared between the pool and its workers.
pub(crate) struct PoolShared {
    pub(crate) queue: WorkQueue,
    pub(crate) running: AtomicBool,
    pub(crate) submitted: AtomicU64,
    pub(crate) executed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) failure_reports_dropped: AtomicU64,
    failure_tx: flume::Sender<JobFailure>,
}

impl PoolShared {
    pub(crate) fn new(failure_tx: flume::Sender<JobFailure>) -> Self {
        Self {
            queue: WorkQueue::new(),
            running: AtomicBool::new(true),
            submitted: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            failure_reports_dropped: AtomicU64::new(0),
            failure_tx,
        }
    }

    /// Publish a failure without blocking the worker.
    ///
    /// Once the channel holds `failure_capacity` unread reports, newer ones
    /// are logged and counted, then discarded.
    pub(crate) fn report_failure(&self, failure: JobFailure) {
        match self.failure_tx.try_send(failure) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(failure)) => {
                self.failure_reports_dropped.fetch_add(1, Ordering::SeqCst);
                warn!(job = %failure.job_id, "failure channel full, dropping report");
            }
            Err(flume::TrySendError::Disconnected(failure)) => {
                self.failure_reports_dropped.fetch_add(1, Ordering::SeqCst);
                warn!(job = %failure.job_id, "failure channel closed, dropping report");
            }
        }
    }
}

struct WorkerHandle {
    id: usize,
    status: Arc<AtomicUsize>,
    thread: JoinHandle<()>,
}

/// Fixed-size pool of worker threads executing [`Job`]s.
///
/// `Pool` is `Send + Sync`; wrap it in an `Arc` to submit from several
/// threads.
///
/// # Lifecycle
/// `new` → `submit`* → `start` → `submit`* → `shutdown`. Jobs may be
/// submitted before `start`; they wait in the queue. `shutdown` stops the
/// workers after their current job and drops whatever is still queued. It
/// does not drain the queue first; call [`wait_idle`](Self::wait_idle)
/// beforehand if every submitted job must run.
///
/// # Misuse
/// - `start` twice returns [`PoolError::AlreadyStarted`]
/// - `submit` or `start` after shutdown began returns
///   [`PoolError::ShuttingDown`] or [`PoolError::ShutDown`]
/// - `shutdown` twice returns [`PoolError::AlreadyShutDown`]
///
/// # Resource Limits
/// The queue is unbounded. Sustained submission faster than the workers
/// drain it grows memory without limit.
pub struct Pool {
    config: PoolConfig,
    shared: Arc<PoolShared>,
    status: AtomicUsize,
    workers: Mutex<Vec<WorkerHandle>>,
    output: OutputGuard,
    failure_rx: flume::Receiver<JobFailure>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("queue_length", &self.shared.queue.len())
            .finish()
    }
}

impl Pool {
    /// Create a pool with `worker_count` workers and default settings.
    pub fn new(worker_count: usize) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig::new(worker_count))
    }

    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let (failure_tx, failure_rx) = flume::bounded(config.failure_capacity);

        Ok(Self {
            shared: Arc::new(PoolShared::new(failure_tx)),
            status: AtomicUsize::new(PoolStatus::Created as usize),
            workers: Mutex::new(Vec::with_capacity(config.worker_count)),
            output: OutputGuard::new(),
            failure_rx,
            config,
        })
    }

    fn workers(&self) -> MutexGuard<'_, Vec<WorkerHandle>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed_error(status: PoolStatus) -> PoolError {
        match status {
            PoolStatus::Shutdown => PoolError::ShutDown,
            _ => PoolError::ShuttingDown,
        }
    }

    /// Queue a job for execution.
    pub fn submit(&self, job: Job) -> Result<(), PoolError> {
        match self.status() {
            PoolStatus::Created | PoolStatus::Running => {}
            status => return Err(Self::closed_error(status)),
        }

        self.shared.submitted.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.shared.queue.push(job) {
            self.shared.submitted.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Spawn the worker threads.
    pub fn start(&self) -> Result<(), PoolError> {
        // Held for the whole spawn so a concurrent shutdown joins every worker.
        let mut workers = self.workers();

        if let Err(current) = self.status.compare_exchange(
            PoolStatus::Created as usize,
            PoolStatus::Running as usize,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(match PoolStatus::from_usize(current) {
                PoolStatus::Running => PoolError::AlreadyStarted,
                status => Self::closed_error(status),
            });
        }

        for id in 0..self.config.worker_count {
            let worker = Worker::new(id, self.shared.clone(), &self.config);
            let status = worker.status();
            let name = format!("{}-{}", self.config.thread_name_prefix, id);

            match worker.spawn(name) {
                Ok(thread) => workers.push(WorkerHandle { id, status, thread }),
                Err(e) => {
                    error!(worker = id, error = %e, "failed to spawn worker thread");
                    drop(workers);
                    if let Err(stop_err) = self.shutdown() {
                        error!(error = %stop_err, "failed to stop partially started pool");
                    }
                    return Err(PoolError::SpawnFailed(e.to_string()));
                }
            }
        }

        crate::log_pool!("start", "completed", workers = self.config.worker_count);
        Ok(())
    }

    /// Stop the workers and join their threads.
    ///
    /// Blocks until every worker finished its current job and exited. Jobs
    /// still queued afterwards are dropped and counted in the report.
    ///
    /// When called from a worker thread (for instance by dropping the last
    /// `Arc<Pool>` inside a job) that worker cannot join itself; it is
    /// detached and exits once the job returns.
    pub fn shutdown(&self) -> Result<ShutdownReport, PoolError> {
        self.begin_shutdown()?;
        crate::log_pool!("shutdown", "requested", queued = self.shared.queue.len());

        let started = Instant::now();
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.queue.wake_all();

        let handles = std::mem::take(&mut *self.workers());
        let current = thread::current().id();
        let mut workers_joined = 0;
        let mut workers_detached = 0;
        let mut first_error = None;
        for handle in handles {
            if handle.thread.thread().id() == current {
                warn!(worker = handle.id, "shutdown called from worker thread, detaching it");
                workers_detached += 1;
                continue;
            }
            workers_joined += 1;
            if handle.thread.join().is_err() {
                error!(worker = handle.id, "worker thread panicked");
                first_error.get_or_insert(PoolError::WorkerPanicked(handle.id));
            }
        }

        let dropped = match self.shared.queue.drain() {
            Ok(pending) => pending.len(),
            Err(e) => {
                error!(error = %e, "could not drain work queue");
                first_error.get_or_insert(e);
                0
            }
        };
        if dropped > 0 {
            warn!(dropped, "dropped jobs still queued at shutdown");
        }

        self.status
            .store(PoolStatus::Shutdown as usize, Ordering::SeqCst);

        let report = ShutdownReport {
            workers_joined,
            workers_detached,
            executed: self.shared.executed.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
            dropped,
            elapsed: started.elapsed(),
        };
        crate::log_pool!(
            "shutdown",
            "completed",
            executed = report.executed,
            failed = report.failed,
            dropped = report.dropped
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    fn begin_shutdown(&self) -> Result<(), PoolError> {
        let mut current = self.status.load(Ordering::SeqCst);
        loop {
            match PoolStatus::from_usize(current) {
                PoolStatus::Created | PoolStatus::Running => {}
                _ => return Err(PoolError::AlreadyShutDown),
            }
            match self.status.compare_exchange(
                current,
                PoolStatus::ShuttingDown as usize,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Wait until every accepted job has finished or `timeout` elapses.
    ///
    /// Returns `true` if the pool went idle. Jobs submitted concurrently
    /// with this call may or may not be waited for.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let finished = self.shared.executed.load(Ordering::SeqCst)
                + self.shared.failed.load(Ordering::SeqCst);
            if finished >= self.shared.submitted.load(Ordering::SeqCst) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus::from_usize(self.status.load(Ordering::SeqCst))
    }

    /// Whether workers are (or will be, once started) polling.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            worker_count: self.config.worker_count,
            queue_length: self.shared.queue.len(),
            submitted: self.shared.submitted.load(Ordering::SeqCst),
            executed: self.shared.executed.load(Ordering::SeqCst),
            failed: self.shared.failed.load(Ordering::SeqCst),
            failure_reports_dropped: self.shared.failure_reports_dropped.load(Ordering::SeqCst),
            status: self.status(),
        }
    }

    /// Status of each spawned worker, in id order.
    pub fn worker_statuses(&self) -> Vec<WorkerStatus> {
        self.workers()
            .iter()
            .map(|handle| WorkerStatus::load(&handle.status))
            .collect()
    }

    /// Handle to the pool's output lock, for use inside job actions.
    pub fn output_guard(&self) -> OutputGuard {
        self.output.clone()
    }

    /// Receiver for job failure reports.
    ///
    /// Holds at most `failure_capacity` unread reports; every clone drains
    /// the same channel.
    pub fn failures(&self) -> flume::Receiver<JobFailure> {
        self.failure_rx.clone()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        match self.status() {
            PoolStatus::Created | PoolStatus::Running => {
                if let Err(e) = self.shutdown() {
                    error!(error = %e, "shutdown on drop failed");
                }
            }
            _ => {}
        }
    }
}
