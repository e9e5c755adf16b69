use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared lock that jobs take around externally visible side effects.
///
/// The guard is independent of the work queue lock and has no effect on
/// scheduling. Clones share the same underlying lock.
#[derive(Clone, Default)]
pub struct OutputGuard {
    lock: Arc<Mutex<()>>,
}

impl OutputGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the output lock.
    ///
    /// The lock is released on every exit path, including a panic inside
    /// `f`. Poisoning is ignored since the lock guards no data.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _held = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Write every line to stdout without interleaving with other holders.
    pub fn println_all<I, S>(&self, lines: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: fmt::Display,
    {
        self.with_lock(|| {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for line in lines {
                writeln!(out, "{}", line)?;
            }
            out.flush()
        })
    }
}

impl fmt::Debug for OutputGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputGuard")
            .field("handles", &Arc::strong_count(&self.lock))
            .finish()
    }
}
