//! In-process job queue.
//!
//! - `job`: job records, status and lifecycle events
//! - `local`: the bounded-concurrency FIFO scheduler

pub mod job;
pub mod local;

pub use job::{Job, JobEvent, JobStatus};
pub use local::{JobQueue, Processor};
