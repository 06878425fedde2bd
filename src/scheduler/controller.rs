use std::collections::HashMap;

use crate::config::SchedulerConfig;
use crate::env::{AckKind, Environment, TimerKind, UtilizationSample};
use crate::error::{InvariantViolation, Result, SchedulerError};
use crate::inventory::{PeInventory, PeStatus};
use crate::scheduler::forecast::{self, CompletionForecaster};
use crate::scheduler::job::{Job, JobKey, JobStatus, Partition, PeSlot};
use crate::scheduler::placement::{self, PlacementEngine};
use crate::scheduler::progress::{self, ProgressTracker};
use crate::scheduler::queue::PartitionQueues;

/// Where a tracked job currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Running,
    Paused,
    Queued(Partition),
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Started,
    Queued,
}

#[derive(Debug)]
struct Tracked {
    job: Job,
    bucket: Bucket,
}

/// Job lifecycle controller.
///
/// Owns every non-terminal job and sequences reconciliation, placement,
/// forecasting and queue draining around each operation. All methods take
/// `&mut self`; callers that share a scheduler serialize access through
/// [`SchedulerService`](crate::service::SchedulerService).
///
/// # Invariants
///
/// - A tracked job is in exactly one bucket: the running set, the paused
///   set, or the queue of its partition. Terminal jobs are not tracked.
/// - The busy PEs of the inventory are exactly the PEs assigned to running
///   jobs. Every claim is released once.
/// - Medium jobs only occupy medium-pool nodes.
pub struct Scheduler<I, E> {
    config: SchedulerConfig,
    inventory: I,
    env: E,
    placement: PlacementEngine,
    progress: ProgressTracker,
    forecaster: CompletionForecaster,
    jobs: HashMap<JobKey, Tracked>,
    running: Vec<JobKey>,
    paused: Vec<JobKey>,
    queues: PartitionQueues,
    last_sample: Option<f64>,
}

impl<I: PeInventory, E: Environment> Scheduler<I, E> {
    pub fn new(config: SchedulerConfig, inventory: I, env: E) -> Self {
        let placement = PlacementEngine::new(config.medium_pool_nodes, inventory.node_count());
        let progress = ProgressTracker::new(env.now());
        let forecaster = CompletionForecaster::new(config.backstop_interval_secs);
        tracing::info!(
            nodes = inventory.node_count(),
            total_pes = inventory.total_pes(),
            medium_pool = placement.medium_pool(),
            "Scheduler initialized"
        );
        Self {
            config,
            inventory,
            env,
            placement,
            progress,
            forecaster,
            jobs: HashMap::new(),
            running: Vec::new(),
            paused: Vec::new(),
            queues: PartitionQueues::new(),
            last_sample: None,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn inventory(&self) -> &I {
        &self.inventory
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn medium_pool(&self) -> usize {
        self.placement.medium_pool()
    }

    // ------------------------------------------------------------------
    // Inbound operations
    // ------------------------------------------------------------------

    /// Admit a new job: start it right away if a placement exists, queue it
    /// otherwise. A job larger than its partition is queued too; it waits
    /// at its queue's head until it is cancelled or moved.
    pub fn submit(&mut self, mut job: Job, want_ack: bool) -> Result<Admission> {
        let key = job.key;
        if let Err(e) = self.validate(&job) {
            tracing::warn!(job_id = key.job_id, user_id = key.user_id, error = %e, "Job rejected");
            if want_ack {
                self.env.send_ack(AckKind::Submit, false, key);
            }
            self.maybe_sample();
            return Err(e);
        }

        self.reconcile();

        if let Err(e) = self.placement.check_fits(&self.inventory, &job) {
            tracing::warn!(job_id = key.job_id, user_id = key.user_id, error = %e, "Job can never be placed");
        }

        job.submitted_at = self.env.now();
        job.status = JobStatus::Queued;
        let partition = job.partition;
        self.jobs.insert(
            key,
            Tracked {
                job,
                bucket: Bucket::Queued(partition),
            },
        );
        let admission = self.admit(key);
        tracing::debug!(
            job_id = key.job_id,
            user_id = key.user_id,
            partition = %partition,
            admission = ?admission,
            "Job submitted"
        );

        if want_ack {
            self.env.send_ack(AckKind::Submit, true, key);
        }
        self.maybe_sample();
        Ok(admission)
    }

    /// Status of a tracked job, `None` if it is unknown or already terminal.
    pub fn status(&self, job_id: u64, user_id: u64) -> Option<JobStatus> {
        self.jobs
            .get(&JobKey::new(job_id, user_id))
            .map(|t| t.job.status)
    }

    pub fn job(&self, key: &JobKey) -> Option<&Job> {
        self.jobs.get(key).map(|t| &t.job)
    }

    pub fn bucket(&self, key: &JobKey) -> Option<Bucket> {
        self.jobs.get(key).map(|t| t.bucket)
    }

    /// Cancel a job wherever it is and hand it back to its owner. A running
    /// job that already consumed all its work comes back as `Success`.
    /// Returns the final status, or `None` if the job was not found.
    pub fn cancel(&mut self, job_id: u64, user_id: u64) -> Option<JobStatus> {
        let key = JobKey::new(job_id, user_id);
        let Some(mut job) = self.take(key) else {
            tracing::warn!(job_id, user_id, "Cannot cancel: job not found");
            self.env.send_cancel_result(None, key);
            self.maybe_sample();
            return None;
        };

        if job.status == JobStatus::Success {
            tracing::warn!(job_id, user_id, "Cannot cancel: job has already finished");
        } else {
            tracing::info!(job_id, user_id, "Job canceled");
        }
        job.finished_at = Some(self.env.now());
        let status = job.status;

        self.drain();
        self.env.send_cancel_result(Some(job), key);
        self.maybe_sample();
        Some(status)
    }

    /// Pause a running or queued job. A running job that has already
    /// finished is completed instead and the pause reports failure.
    pub fn pause(&mut self, job_id: u64, user_id: u64, want_ack: bool) -> bool {
        let key = JobKey::new(job_id, user_id);
        let success = match self.bucket(&key) {
            Some(Bucket::Running) => self.pause_running(key),
            Some(Bucket::Queued(_)) => self.pause_queued(key),
            Some(Bucket::Paused) | None => {
                tracing::warn!(job_id, user_id, "Cannot pause: job is neither running nor queued");
                false
            }
        };

        if want_ack {
            self.env.send_ack(AckKind::Pause, success, key);
        }
        self.maybe_sample();
        success
    }

    /// Resume a paused job: start it if possible, otherwise re-queue it at
    /// the tail of its partition's queue.
    pub fn resume(&mut self, job_id: u64, user_id: u64, want_ack: bool) -> bool {
        let key = JobKey::new(job_id, user_id);
        let success = match self.bucket(&key) {
            Some(Bucket::Paused) => self.resume_paused(key),
            _ => {
                tracing::warn!(job_id, user_id, "Cannot resume: job is not paused");
                false
            }
        };

        if want_ack {
            self.env.send_ack(AckKind::Resume, success, key);
        }
        self.maybe_sample();
        success
    }

    /// Take a job off this resource and forward it to `destination`.
    /// A job that already finished is completed here instead.
    pub fn move_job(&mut self, job_id: u64, user_id: u64, destination: u64, want_ack: bool) -> bool {
        let key = JobKey::new(job_id, user_id);
        let Some(mut job) = self.take(key) else {
            tracing::warn!(job_id, user_id, "Cannot move: job not found");
            if want_ack {
                self.env.send_ack(AckKind::Move, false, key);
            }
            self.maybe_sample();
            return false;
        };

        let moved = if job.status == JobStatus::Success {
            tracing::warn!(job_id, user_id, "Cannot move: job has already finished");
            if want_ack {
                self.env.send_ack(AckKind::Move, false, key);
            }
            job.finished_at = Some(self.env.now());
            self.env.send_finished(job);
            false
        } else {
            tracing::info!(job_id, user_id, destination, "Job migrated");
            self.env.migrate_job(job, destination, want_ack);
            true
        };

        self.drain();
        self.maybe_sample();
        moved
    }

    /// Periodic reconciliation: account progress, retire finished jobs and
    /// backfill the freed capacity.
    pub fn tick(&mut self) {
        self.reconcile();
        self.complete_finished();
        self.drain();
        if !self.running.is_empty() {
            self.forecaster.ensure_backstop(&mut self.env);
        }
        self.maybe_sample();
    }

    /// Delivery of a timer armed by the forecaster.
    pub fn on_timer(&mut self, kind: TimerKind) {
        if kind == TimerKind::Backstop {
            self.forecaster.backstop_fired();
        }

        self.reconcile();
        self.complete_finished();

        if let TimerKind::Forecast(key) = kind {
            self.rearm_if_due(key);
        }

        self.drain();
        if !self.running.is_empty() {
            self.forecaster.ensure_backstop(&mut self.env);
        }
        self.maybe_sample();
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Running jobs in the order they started.
    pub fn running_jobs(&self) -> impl Iterator<Item = &Job> {
        self.running.iter().filter_map(|k| self.job(k))
    }

    pub fn paused_jobs(&self) -> impl Iterator<Item = &Job> {
        self.paused.iter().filter_map(|k| self.job(k))
    }

    /// Queued jobs of one partition, head first.
    pub fn queued_jobs(&self, partition: Partition) -> impl Iterator<Item = &Job> {
        self.queues.keys(partition).filter_map(|k| self.job(k))
    }

    pub fn queue_len(&self, partition: Partition) -> usize {
        self.queues.len(partition)
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn tracked_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_idle(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn snapshot(&self) -> UtilizationSample {
        UtilizationSample {
            timestamp: self.env.now(),
            busy_pes: self.inventory.busy_pes(),
            running: self.running.len(),
            medium_queue: self.queues.len(Partition::Medium),
            long_queue: self.queues.len(Partition::Long),
            active_nodes: self.inventory.active_nodes(),
        }
    }

    /// Verify the bookkeeping invariants, reporting the first violation
    /// found.
    pub fn check_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        let listed = self.running.len() + self.paused.len() + self.queues.total();
        if listed != self.jobs.len() {
            return Err(InvariantViolation::new(format!(
                "{} jobs tracked but {} listed in buckets",
                self.jobs.len(),
                listed
            )));
        }

        let mut assigned: Vec<PeSlot> = Vec::new();
        for key in &self.running {
            let tracked = self.jobs.get(key).ok_or_else(|| InvariantViolation::new(format!("running {} untracked", key)))?;
            if tracked.bucket != Bucket::Running || tracked.job.status != JobStatus::InExec {
                return Err(InvariantViolation::new(format!("running {} tagged {:?}", key, tracked.bucket)));
            }
            if tracked.job.assignment.len() != tracked.job.num_pe {
                return Err(InvariantViolation::new(format!("running {} holds a partial assignment", key)));
            }
            if tracked.job.partition == Partition::Medium
                && tracked
                    .job
                    .assignment
                    .iter()
                    .any(|s| s.node >= self.placement.medium_pool())
            {
                return Err(InvariantViolation::new(format!("medium job {} outside the medium pool", key)));
            }
            assigned.extend(tracked.job.assignment.iter().copied());
        }
        for key in &self.paused {
            let tracked = self.jobs.get(key).ok_or_else(|| InvariantViolation::new(format!("paused {} untracked", key)))?;
            if tracked.bucket != Bucket::Paused || !tracked.job.assignment.is_empty() {
                return Err(InvariantViolation::new(format!("paused {} inconsistent", key)));
            }
        }
        for partition in [Partition::Medium, Partition::Long] {
            for key in self.queues.keys(partition) {
                let tracked = self.jobs.get(key).ok_or_else(|| InvariantViolation::new(format!("queued {} untracked", key)))?;
                if tracked.bucket != Bucket::Queued(partition)
                    || tracked.job.partition != partition
                    || tracked.job.status != JobStatus::Queued
                {
                    return Err(InvariantViolation::new(format!("queued {} inconsistent", key)));
                }
            }
        }
        for tracked in self.jobs.values() {
            let remaining = tracked.job.remaining();
            if !(0.0..=tracked.job.length).contains(&remaining) {
                return Err(InvariantViolation::new(format!("{} remaining {} out of range", tracked.job.key, remaining)));
            }
        }

        let mut busy: Vec<PeSlot> = Vec::new();
        for node in 0..self.inventory.node_count() {
            for pe in 0..self.inventory.pe_count(node) {
                if self.inventory.pe_status(node, pe) == Some(PeStatus::Busy) {
                    busy.push(PeSlot { node, pe });
                }
            }
        }
        let unique = {
            let mut sorted = assigned.clone();
            sorted.sort_by_key(|s| (s.node, s.pe));
            sorted.dedup();
            sorted
        };
        if unique.len() != assigned.len() {
            return Err(InvariantViolation::new("a PE is assigned to two running jobs"));
        }
        if unique != busy {
            return Err(InvariantViolation::new(format!(
                "{} PEs busy but {} assigned to running jobs",
                busy.len(),
                unique.len()
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn validate(&self, job: &Job) -> Result<()> {
        let key = job.key;
        if self.jobs.contains_key(&key) {
            return Err(SchedulerError::DuplicateJob(key));
        }
        if job.num_pe == 0 {
            return Err(SchedulerError::InvalidJob {
                key,
                reason: "requests zero PEs".to_string(),
            });
        }
        if !(job.length.is_finite() && job.length >= 0.0) {
            return Err(SchedulerError::InvalidJob {
                key,
                reason: format!("length {} is not a non-negative number", job.length),
            });
        }
        Ok(())
    }

    /// Rate at which `job` progresses.
    fn rate_of(config: &SchedulerConfig, inventory: &I, job: &Job) -> f64 {
        if config.honor_node_rating {
            if let Some(slot) = job.assignment.first() {
                let rating = inventory.pe_rating(slot.node);
                if rating > 0.0 {
                    return rating;
                }
            }
        }
        config.pe_rating
    }

    /// Bring every running job's progress up to the current time.
    fn reconcile(&mut self) {
        let now = self.env.now();
        let Some(elapsed) = self.progress.advance(now) else {
            return;
        };

        let total = self.inventory.total_pes();
        let load = if total == 0 {
            0.0
        } else {
            self.inventory.busy_pes() as f64 / total as f64
        };
        self.env.record_resource_load(load);

        if self.running.is_empty() {
            return;
        }
        let load_fraction = self.env.load_fraction();
        for key in &self.running {
            if let Some(tracked) = self.jobs.get_mut(key) {
                let rate = Self::rate_of(&self.config, &self.inventory, &tracked.job);
                tracked
                    .job
                    .add_progress(progress::work_done(elapsed, rate, load_fraction));
            }
        }
        tracing::trace!(now, elapsed, load_fraction, running = self.running.len(), "Progress reconciled");
    }

    /// Start a tracked job if the placement engine finds room. Does not
    /// touch the queues.
    fn try_start(&mut self, key: JobKey) -> bool {
        let now = self.env.now();
        let Some(tracked) = self.jobs.get_mut(&key) else {
            return false;
        };
        if !self.placement.try_place(&mut self.inventory, &mut tracked.job, now) {
            return false;
        }
        tracked.bucket = Bucket::Running;
        let rate = Self::rate_of(&self.config, &self.inventory, &tracked.job);
        self.forecaster.arm(&mut self.env, &mut tracked.job, rate);
        self.running.push(key);
        self.forecaster.ensure_backstop(&mut self.env);

        tracing::info!(
            job_id = key.job_id,
            user_id = key.user_id,
            num_pe = tracked.job.num_pe,
            partition = %tracked.job.partition,
            "Job started"
        );
        true
    }

    /// Start a job that is tracked as queued, or append it to its queue.
    fn admit(&mut self, key: JobKey) -> Admission {
        if self.try_start(key) {
            return Admission::Started;
        }
        if let Some(tracked) = self.jobs.get_mut(&key) {
            tracked.job.status = JobStatus::Queued;
            let partition = tracked.job.partition;
            tracked.bucket = Bucket::Queued(partition);
            self.queues.push(partition, key);
        }
        Admission::Queued
    }

    /// Fill freed capacity from the queues.
    fn drain(&mut self) {
        let mut queues = std::mem::take(&mut self.queues);
        let placed = queues.drain(|key| self.try_start(key));
        self.queues = queues;
        if placed > 0 {
            tracing::debug!(
                placed,
                medium_queue = self.queues.len(Partition::Medium),
                long_queue = self.queues.len(Partition::Long),
                "Queues drained"
            );
        }
    }

    /// Remove a job from the index and from its bucket's sequence. PEs are
    /// left untouched.
    fn detach(&mut self, key: JobKey) -> Option<Job> {
        let tracked = self.jobs.remove(&key)?;
        match tracked.bucket {
            Bucket::Running => self.running.retain(|k| *k != key),
            Bucket::Paused => self.paused.retain(|k| *k != key),
            Bucket::Queued(partition) => {
                self.queues.remove(partition, &key);
            }
        }
        Some(tracked.job)
    }

    fn pause_running(&mut self, key: JobKey) -> bool {
        self.reconcile();
        let now = self.env.now();
        let Some(mut job) = self.detach(key) else {
            return false;
        };
        self.release(&mut job);

        let paused = if job.is_complete() {
            tracing::warn!(
                job_id = key.job_id,
                user_id = key.user_id,
                "Cannot pause: job has already finished"
            );
            job.finalize(JobStatus::Success, now);
            self.env.send_finished(job);
            false
        } else {
            job.end_execution(now);
            job.status = JobStatus::Paused;
            self.park(job);
            tracing::info!(job_id = key.job_id, user_id = key.user_id, "Job paused");
            true
        };
        self.drain();
        paused
    }

    fn pause_queued(&mut self, key: JobKey) -> bool {
        let Some(mut job) = self.detach(key) else {
            return false;
        };
        job.status = JobStatus::Paused;
        self.park(job);
        tracing::info!(job_id = key.job_id, user_id = key.user_id, "Queued job paused");
        true
    }

    fn resume_paused(&mut self, key: JobKey) -> bool {
        let Some(mut job) = self.detach(key) else {
            return false;
        };
        job.status = JobStatus::Resumed;
        self.reconcile();

        let partition = job.partition;
        self.jobs.insert(
            key,
            Tracked {
                job,
                bucket: Bucket::Queued(partition),
            },
        );
        let admission = self.admit(key);
        tracing::info!(
            job_id = key.job_id,
            user_id = key.user_id,
            admission = ?admission,
            "Job resumed"
        );
        true
    }

    fn release(&mut self, job: &mut Job) {
        placement::release(&mut self.inventory, &job.assignment);
        job.assignment.clear();
    }

    fn park(&mut self, job: Job) {
        let key = job.key;
        self.jobs.insert(
            key,
            Tracked {
                job,
                bucket: Bucket::Paused,
            },
        );
        self.paused.push(key);
    }

    /// Detach a job from wherever it is for cancel or move. Running jobs
    /// are reconciled first and give their PEs back; the job comes out as
    /// `Success` if its work was already done, `Canceled` otherwise.
    fn take(&mut self, key: JobKey) -> Option<Job> {
        let bucket = self.bucket(&key)?;
        if bucket == Bucket::Running {
            self.reconcile();
        }
        let now = self.env.now();
        let mut job = self.detach(key)?;

        let status = if bucket == Bucket::Running {
            self.release(&mut job);
            if job.is_complete() {
                JobStatus::Success
            } else {
                JobStatus::Canceled
            }
        } else {
            JobStatus::Canceled
        };
        job.end_execution(now);
        job.status = status;
        Some(job)
    }

    /// Retire every running job whose work is done.
    fn complete_finished(&mut self) {
        let done = forecast::completed(
            self.running
                .iter()
                .filter_map(|k| self.jobs.get(k).map(|t| &t.job)),
        );
        if done.is_empty() {
            return;
        }
        let now = self.env.now();
        for key in done {
            let Some(mut job) = self.detach(key) else {
                continue;
            };
            self.release(&mut job);
            job.finalize(JobStatus::Success, now);
            tracing::info!(
                job_id = key.job_id,
                user_id = key.user_id,
                wall_clock = job.wall_clock,
                "Job completed"
            );
            self.env.send_finished(job);
        }
    }

    /// Re-arm the forecast of a job that outlived it, e.g. because
    /// background load slowed it down. Stale timers from an earlier stint
    /// are ignored.
    fn rearm_if_due(&mut self, key: JobKey) {
        let now = self.env.now();
        let Some(tracked) = self.jobs.get_mut(&key) else {
            return;
        };
        if tracked.bucket != Bucket::Running || tracked.job.is_complete() {
            return;
        }
        let due = tracked.job.estimated_finish.is_some_and(|t| t <= now);
        if due {
            let rate = Self::rate_of(&self.config, &self.inventory, &tracked.job);
            self.forecaster.arm(&mut self.env, &mut tracked.job, rate);
        }
    }

    fn maybe_sample(&mut self) {
        let now = self.env.now();
        let due = match self.last_sample {
            None => true,
            Some(last) => now - last >= self.config.sample_interval_secs,
        };
        if !due {
            return;
        }
        self.last_sample = Some(now);
        let sample = self.snapshot();
        tracing::debug!(
            timestamp = sample.timestamp,
            busy_pes = sample.busy_pes,
            running = sample.running,
            medium_queue = sample.medium_queue,
            long_queue = sample.long_queue,
            active_nodes = sample.active_nodes,
            "Utilization sample"
        );
        self.env.record_utilization(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Outbound, RecordingEnvironment};
    use crate::inventory::MachineList;

    fn scheduler(nodes: usize, pes: usize, pool: usize) -> Scheduler<MachineList, RecordingEnvironment> {
        let config = SchedulerConfig::default()
            .with_pe_rating(100.0)
            .with_medium_pool(pool);
        Scheduler::new(
            config,
            MachineList::homogeneous(nodes, pes, 100.0),
            RecordingEnvironment::new(),
        )
    }

    fn job(id: u64, num_pe: usize, length: f64, partition: Partition) -> Job {
        Job::new(JobKey::new(id, 1), length, num_pe, partition)
    }

    #[test]
    fn test_submit_starts_job_when_capacity_allows() {
        let mut s = scheduler(2, 2, 1);
        let admission = s.submit(job(1, 2, 400.0, Partition::Long), true).unwrap();

        assert_eq!(admission, Admission::Started);
        assert_eq!(s.status(1, 1), Some(JobStatus::InExec));
        assert_eq!(s.inventory().busy_pes(), 2);
        assert_eq!(s.env().acks(), vec![(AckKind::Submit, true, JobKey::new(1, 1))]);
        assert!(s.env().timers().contains(&(5.0, TimerKind::Forecast(JobKey::new(1, 1)))));
        assert!(s.env().timers().contains(&(3600.0, TimerKind::Backstop)));
        s.check_invariants().unwrap();
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let mut s = scheduler(2, 2, 1);
        s.submit(job(1, 1, 100.0, Partition::Long), false).unwrap();
        let err = s.submit(job(1, 1, 100.0, Partition::Long), true).unwrap_err();

        assert_eq!(err, SchedulerError::DuplicateJob(JobKey::new(1, 1)));
        assert_eq!(s.env().acks(), vec![(AckKind::Submit, false, JobKey::new(1, 1))]);
        assert_eq!(s.tracked_count(), 1);
    }

    #[test]
    fn test_same_job_id_from_another_user_is_distinct() {
        let mut s = scheduler(2, 2, 1);
        s.submit(job(1, 1, 100.0, Partition::Long), false).unwrap();
        s.submit(Job::new(JobKey::new(1, 2), 100.0, 1, Partition::Long), false)
            .unwrap();
        assert_eq!(s.running_count(), 2);
        assert_eq!(s.status(1, 2), Some(JobStatus::InExec));
    }

    #[test]
    fn test_medium_job_larger_than_pool_is_queued() {
        let mut s = scheduler(4, 2, 1);
        let admission = s.submit(job(1, 3, 100.0, Partition::Medium), true).unwrap();

        assert_eq!(admission, Admission::Queued);
        assert_eq!(s.status(1, 1), Some(JobStatus::Queued));
        assert_eq!(s.env().acks(), vec![(AckKind::Submit, true, JobKey::new(1, 1))]);
        assert_eq!(s.inventory().busy_pes(), 0);

        // It holds the Medium head but Long work still runs around it.
        s.submit(job(2, 2, 100.0, Partition::Long), false).unwrap();
        assert_eq!(s.status(2, 1), Some(JobStatus::InExec));
        s.check_invariants().unwrap();

        assert_eq!(s.cancel(1, 1), Some(JobStatus::Canceled));
        assert_eq!(s.tracked_count(), 1);
    }

    #[test]
    fn test_zero_pe_request_is_invalid() {
        let mut s = scheduler(1, 2, 1);
        let err = s.submit(job(1, 0, 100.0, Partition::Long), false).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidJob { .. }));
    }

    #[test]
    fn test_reconcile_is_idempotent_for_equal_timestamps() {
        let mut s = scheduler(1, 2, 1);
        s.submit(job(1, 1, 1000.0, Partition::Long), false).unwrap();
        s.env_mut().set_time(3.0);
        s.tick();
        s.tick();
        let key = JobKey::new(1, 1);
        assert_eq!(s.job(&key).unwrap().remaining(), 700.0);
    }

    #[test]
    fn test_background_load_slows_progress() {
        let mut s = scheduler(1, 2, 1);
        s.env_mut().load = 0.5;
        s.submit(job(1, 1, 1000.0, Partition::Long), false).unwrap();
        s.env_mut().set_time(4.0);
        s.tick();
        assert_eq!(s.job(&JobKey::new(1, 1)).unwrap().remaining(), 800.0);
    }

    #[test]
    fn test_forecast_fire_completes_job_and_drains() {
        let mut s = scheduler(1, 2, 1);
        s.submit(job(1, 2, 400.0, Partition::Long), false).unwrap();
        s.submit(job(2, 1, 100.0, Partition::Medium), false).unwrap();
        assert_eq!(s.queue_len(Partition::Medium), 1);

        s.env_mut().set_time(5.0);
        s.on_timer(TimerKind::Forecast(JobKey::new(1, 1)));

        assert_eq!(s.status(1, 1), None);
        assert_eq!(s.status(2, 1), Some(JobStatus::InExec));
        let finished = s.env().finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, JobStatus::Success);
        assert_eq!(finished[0].remaining(), 0.0);
        s.check_invariants().unwrap();
    }

    #[test]
    fn test_late_forecast_is_rearmed() {
        let mut s = scheduler(1, 1, 1);
        s.env_mut().load = 0.5;
        s.submit(job(1, 1, 400.0, Partition::Long), false).unwrap();
        s.env_mut().take();

        s.env_mut().set_time(5.0);
        s.on_timer(TimerKind::Forecast(JobKey::new(1, 1)));

        // 250 of 400 done; 150 left -> estimate 1.5s -> delay 3s.
        assert_eq!(s.status(1, 1), Some(JobStatus::InExec));
        assert_eq!(
            s.env().timers(),
            vec![(3.0, TimerKind::Forecast(JobKey::new(1, 1)))]
        );
    }

    #[test]
    fn test_backstop_rearms_only_while_jobs_run() {
        let mut s = scheduler(1, 1, 1);
        s.submit(job(1, 1, 100.0, Partition::Long), false).unwrap();
        s.env_mut().take();

        s.env_mut().set_time(3600.0);
        s.on_timer(TimerKind::Backstop);

        assert!(s.is_idle());
        assert!(s.env().timers().is_empty());
        assert!(matches!(s.env().events.first(), Some(Outbound::ResourceLoad(_))));
    }

    #[test]
    fn test_detach_keeps_running_order() {
        let mut s = scheduler(3, 1, 3);
        for id in 1..=3 {
            s.submit(job(id, 1, 100.0, Partition::Long), false).unwrap();
        }
        s.cancel(2, 1);
        let order: Vec<u64> = s.running_jobs().map(|j| j.key.job_id).collect();
        assert_eq!(order, vec![1, 3]);
        s.check_invariants().unwrap();
    }
}
