//! # Jobs
//!
//! A [`Job`] pairs an action with the payload it operates on. The payload is
//! moved into a boxed closure at construction time, so the queue and the
//! workers only ever see one erased type and no downcast is needed to get
//! the payload back.
//!
//! `execute` takes `self` by value: a job runs at most once, and its payload
//! is dropped when the call returns or unwinds.

use std::fmt;

use uuid::Uuid;

use crate::error::JobError;

/// Unique identifier of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

type JobAction = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// An owned, one-shot unit of work.
pub struct Job {
    id: JobId,
    label: Option<String>,
    action: JobAction,
}

impl Job {
    /// Create a job from an infallible action and an optional payload.
    ///
    /// The action receives `None` when no payload was supplied.
    ///
    /// ```
    /// use jobpool::Job;
    ///
    /// let job = Job::new(|name: Option<&String>| {
    ///     if let Some(name) = name {
    ///         println!("hello {name}");
    ///     }
    /// }, Some("world".to_string()));
    /// job.execute().unwrap();
    /// ```
    pub fn new<T, F>(action: F, payload: Option<T>) -> Self
    where
        T: Send + 'static,
        F: FnOnce(Option<&T>) + Send + 'static,
    {
        Self::from_action(Box::new(move || {
            action(payload.as_ref());
            Ok(())
        }))
    }

    /// Create a job whose action may fail.
    ///
    /// An `Err` is treated by workers the same way as a panic: it is logged,
    /// reported and the worker keeps running.
    pub fn try_new<T, F>(action: F, payload: Option<T>) -> Self
    where
        T: Send + 'static,
        F: FnOnce(Option<&T>) -> anyhow::Result<()> + Send + 'static,
    {
        Self::from_action(Box::new(move || action(payload.as_ref())))
    }

    /// Create a job from a closure that needs no payload.
    pub fn from_fn<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_action(Box::new(move || {
            action();
            Ok(())
        }))
    }

    fn from_action(action: JobAction) -> Self {
        Self {
            id: JobId::new(),
            label: None,
            action,
        }
    }

    /// Attach a label used in logs and failure reports.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Run the action, consuming the job.
    ///
    /// Panics raised by the action unwind out of this call; the payload is
    /// still dropped during unwinding.
    pub fn execute(self) -> Result<(), JobError> {
        (self.action)().map_err(JobError::Failed)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish()
    }
}
