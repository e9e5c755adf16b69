use thiserror::Error;

/// Errors reported to callers of the pool API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Pool has already been started")]
    AlreadyStarted,
    #[error("Pool is shutting down")]
    ShuttingDown,
    #[error("Pool has been shut down")]
    ShutDown,
    #[error("Pool shutdown was already requested")]
    AlreadyShutDown,
    #[error("Work queue lock is poisoned")]
    QueuePoisoned,
    #[error("Failed to spawn worker thread: {0}")]
    SpawnFailed(String),
    #[error("Worker {0} panicked outside of job execution")]
    WorkerPanicked(usize),
}

/// Errors raised while executing a single job.
///
/// These never reach the submitter directly; workers log them and publish
/// them as [`JobFailure`](crate::scheduler::JobFailure) events.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job failed: {0}")]
    Failed(#[from] anyhow::Error),
    #[error("Job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Build a `Panicked` error from the payload returned by `catch_unwind`.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "non-string panic payload".to_string(),
            },
        };
        JobError::Panicked(message)
    }
}
