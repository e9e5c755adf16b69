//! # jobpool
//!
//! A fixed set of worker threads executing type-erased jobs pulled from a
//! shared LIFO queue.
//!
//! ```
//! use std::time::Duration;
//! use jobpool::{Job, Pool, PoolConfig};
//!
//! let pool = Pool::with_config(
//!     PoolConfig::new(4).with_backoff(Duration::from_millis(10)),
//! ).unwrap();
//! pool.start().unwrap();
//!
//! let output = pool.output_guard();
//! for i in 0..8 {
//!     let output = output.clone();
//!     pool.submit(Job::new(
//!         move |message: Option<&String>| {
//!             output.with_lock(|| println!("{}", message.unwrap()));
//!         },
//!         Some(format!("Hello {i}")),
//!     )).unwrap();
//! }
//!
//! assert!(pool.wait_idle(Duration::from_secs(5)));
//! let report = pool.shutdown().unwrap();
//! assert_eq!(report.executed, 8);
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod output;
pub mod scheduler;

pub use config::{IdleStrategy, PoolConfig};
pub use error::{JobError, PoolError};
pub use job::{Job, JobId};
pub use output::OutputGuard;
pub use scheduler::{JobFailure, Pool, PoolMetrics, PoolStatus, ShutdownReport, WorkQueue, WorkerStatus};
