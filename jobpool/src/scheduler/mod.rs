//! # Scheduler Module
//!
//! Dispatch machinery of the job pool.
//!
//! ## Key Concepts
//! - [`WorkQueue`]: LIFO list of pending jobs behind one mutex
//! - Worker: one OS thread polling the queue and executing jobs
//! - [`Pool`]: owns the queue, the workers and the running flag
//!
//! ## Thread Safety
//! - The queue lock is the only lock needed for correctness
//! - The running flag is an `AtomicBool`, written once by `shutdown`
//! - Workers receive an `Arc` of the pool's shared state at spawn time;
//!   there is no global state

mod pool;
pub mod queue;
mod worker;

pub use pool::{JobFailure, Pool, PoolMetrics, PoolStatus, ShutdownReport};
pub use queue::WorkQueue;
pub use worker::WorkerStatus;
