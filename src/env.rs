//! Boundary between the scheduler core and the world that drives it.
//!
//! The core never reads a wall clock, sleeps, or talks to job owners
//! directly. Everything it needs from outside (current time, background
//! load, timers, result delivery) goes through [`Environment`].

use serde::Serialize;

use crate::scheduler::{Job, JobKey};

/// Which controller operation an acknowledgment answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AckKind {
    Submit,
    Pause,
    Resume,
    Move,
}

/// Self-addressed timers the core asks the environment to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TimerKind {
    /// Forecast completion of one job.
    Forecast(JobKey),
    /// Coarse periodic completion sweep.
    Backstop,
}

/// Point-in-time occupancy of the resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UtilizationSample {
    pub timestamp: f64,
    pub busy_pes: usize,
    pub running: usize,
    pub medium_queue: usize,
    pub long_queue: usize,
    pub active_nodes: usize,
}

pub trait Environment {
    /// Current time in seconds.
    fn now(&self) -> f64;

    /// Fraction of capacity taken by background load, in `[0, 1)`.
    fn load_fraction(&self) -> f64;

    /// Deliver `kind` back to the scheduler after `delay` seconds.
    fn schedule_timer(&mut self, delay: f64, kind: TimerKind);

    fn send_ack(&mut self, kind: AckKind, success: bool, key: JobKey);

    /// Hand a cancelled job back to its owner. `None` if it was not found.
    fn send_cancel_result(&mut self, job: Option<Job>, key: JobKey);

    fn send_finished(&mut self, job: Job);

    /// Forward a job to another resource. The destination acknowledges.
    fn migrate_job(&mut self, job: Job, destination: u64, ack: bool);

    fn record_resource_load(&mut self, load: f64);

    fn record_utilization(&mut self, sample: UtilizationSample);
}

/// Everything the core emitted, as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Ack {
        kind: AckKind,
        success: bool,
        key: JobKey,
    },
    CancelResult {
        job: Option<Job>,
        key: JobKey,
    },
    Finished(Job),
    Migrated {
        job: Job,
        destination: u64,
        ack: bool,
    },
    Timer {
        delay: f64,
        kind: TimerKind,
    },
    ResourceLoad(f64),
    Utilization(UtilizationSample),
}

/// Environment with a hand-driven clock that records every outbound call.
#[derive(Debug, Default)]
pub struct RecordingEnvironment {
    pub time: f64,
    pub load: f64,
    pub events: Vec<Outbound>,
}

impl RecordingEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn advance(&mut self, secs: f64) {
        self.time += secs;
    }

    /// Drain recorded events.
    pub fn take(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.events)
    }

    pub fn acks(&self) -> Vec<(AckKind, bool, JobKey)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Outbound::Ack { kind, success, key } => Some((*kind, *success, *key)),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self) -> Vec<&Job> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Outbound::Finished(job) => Some(job),
                _ => None,
            })
            .collect()
    }

    pub fn timers(&self) -> Vec<(f64, TimerKind)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Outbound::Timer { delay, kind } => Some((*delay, *kind)),
                _ => None,
            })
            .collect()
    }
}

impl Environment for RecordingEnvironment {
    fn now(&self) -> f64 {
        self.time
    }

    fn load_fraction(&self) -> f64 {
        self.load
    }

    fn schedule_timer(&mut self, delay: f64, kind: TimerKind) {
        self.events.push(Outbound::Timer { delay, kind });
    }

    fn send_ack(&mut self, kind: AckKind, success: bool, key: JobKey) {
        self.events.push(Outbound::Ack { kind, success, key });
    }

    fn send_cancel_result(&mut self, job: Option<Job>, key: JobKey) {
        self.events.push(Outbound::CancelResult { job, key });
    }

    fn send_finished(&mut self, job: Job) {
        self.events.push(Outbound::Finished(job));
    }

    fn migrate_job(&mut self, job: Job, destination: u64, ack: bool) {
        self.events.push(Outbound::Migrated {
            job,
            destination,
            ack,
        });
    }

    fn record_resource_load(&mut self, load: f64) {
        self.events.push(Outbound::ResourceLoad(load));
    }

    fn record_utilization(&mut self, sample: UtilizationSample) {
        self.events.push(Outbound::Utilization(sample));
    }
}
