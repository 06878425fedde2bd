use serde::{Deserialize, Serialize};

/// Compound identity of a job. Job ids are only unique per owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub job_id: u64,
    pub user_id: u64,
}

impl JobKey {
    pub fn new(job_id: u64, user_id: u64) -> Self {
        Self { job_id, user_id }
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} (user {})", self.job_id, self.user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    InExec,
    Paused,
    Resumed,
    Canceled,
    Success,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Canceled | JobStatus::Success)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::InExec => write!(f, "InExec"),
            JobStatus::Paused => write!(f, "Paused"),
            JobStatus::Resumed => write!(f, "Resumed"),
            JobStatus::Canceled => write!(f, "Canceled"),
            JobStatus::Success => write!(f, "Success"),
        }
    }
}

/// Job class. Decides which nodes a job may occupy and which queue it
/// waits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    Medium,
    Long,
}

impl Partition {
    /// Whether a node may host jobs of this class. Medium jobs are confined
    /// to the first `medium_pool` nodes; Long jobs may run anywhere.
    pub fn admits(self, node: usize, medium_pool: usize) -> bool {
        match self {
            Partition::Medium => node < medium_pool,
            Partition::Long => true,
        }
    }

    /// Number of nodes eligible for this class on a resource of `nodes` nodes.
    pub fn eligible_nodes(self, nodes: usize, medium_pool: usize) -> usize {
        match self {
            Partition::Medium => medium_pool.min(nodes),
            Partition::Long => nodes,
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Partition::Medium => write!(f, "medium"),
            Partition::Long => write!(f, "long"),
        }
    }
}

impl std::str::FromStr for Partition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medium" => Ok(Partition::Medium),
            "long" => Ok(Partition::Long),
            other => Err(format!("unknown partition '{}'", other)),
        }
    }
}

/// One claimed processing element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeSlot {
    pub node: usize,
    pub pe: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub key: JobKey,
    /// Total work, in work units.
    pub length: f64,
    /// Work completed so far; never exceeds `length`.
    pub finished_so_far: f64,
    pub num_pe: usize,
    pub partition: Partition,
    pub status: JobStatus,
    pub submitted_at: f64,
    /// First time the job started executing.
    pub started_at: Option<f64>,
    /// Start of the current execution stint, while running.
    pub exec_since: Option<f64>,
    /// Accumulated execution time over all stints.
    pub wall_clock: f64,
    pub estimated_finish: Option<f64>,
    pub finished_at: Option<f64>,
    pub assignment: Vec<PeSlot>,
}

impl Job {
    pub fn new(key: JobKey, length: f64, num_pe: usize, partition: Partition) -> Self {
        Self {
            key,
            length,
            finished_so_far: 0.0,
            num_pe,
            partition,
            status: JobStatus::Queued,
            submitted_at: 0.0,
            started_at: None,
            exec_since: None,
            wall_clock: 0.0,
            estimated_finish: None,
            finished_at: None,
            assignment: Vec::new(),
        }
    }

    pub fn remaining(&self) -> f64 {
        (self.length - self.finished_so_far).max(0.0)
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0.0
    }

    /// Add completed work, clamped so the remaining length stays non-negative.
    pub fn add_progress(&mut self, work: f64) {
        if work <= 0.0 {
            return;
        }
        self.finished_so_far = (self.finished_so_far + work).min(self.length);
    }

    /// Time spent waiting before the first start, if it ever started.
    pub fn queue_time(&self) -> Option<f64> {
        self.started_at.map(|start| start - self.submitted_at)
    }

    pub(crate) fn begin_execution(&mut self, now: f64) {
        self.status = JobStatus::InExec;
        self.started_at.get_or_insert(now);
        self.exec_since = Some(now);
    }

    pub(crate) fn end_execution(&mut self, now: f64) {
        if let Some(since) = self.exec_since.take() {
            self.wall_clock += (now - since).max(0.0);
        }
        self.estimated_finish = None;
    }

    /// Settle the job into a terminal status.
    pub(crate) fn finalize(&mut self, status: JobStatus, now: f64) {
        self.end_execution(now);
        self.status = status;
        self.finished_at = Some(now);
    }
}
