//! Allocation, queueing and progress-tracking engine.
//!
//! - [`Scheduler`]: job lifecycle controller, the entry point for every
//!   operation
//! - [`placement`]: whole-node placement under partition constraints
//! - [`queue`]: the two FCFS queues and the drain policy
//! - [`progress`]: elapsed time to consumed work
//! - [`forecast`]: completion estimates and timers

pub mod controller;
pub mod forecast;
pub mod job;
pub mod placement;
pub mod progress;
pub mod queue;

pub use controller::{Admission, Bucket, Scheduler};
pub use job::{Job, JobKey, JobStatus, Partition, PeSlot};
pub use queue::PartitionQueues;
