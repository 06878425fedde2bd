use thiserror::Error;

use crate::scheduler::JobKey;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("Job already tracked: {0}")]
    DuplicateJob(JobKey),

    #[error("Invalid job {key}: {reason}")]
    InvalidJob { key: JobKey, reason: String },

    #[error("Job {key} needs {required_nodes} whole nodes but its partition has {eligible_nodes}")]
    ExceedsCapacity {
        key: JobKey,
        required_nodes: usize,
        eligible_nodes: usize,
    },

    #[error("Scheduler service stopped")]
    ServiceStopped,
}

/// A broken bookkeeping invariant, found by
/// [`Scheduler::check_invariants`](crate::scheduler::Scheduler::check_invariants).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invariant violated: {0}")]
pub struct InvariantViolation(pub String);

impl InvariantViolation {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
