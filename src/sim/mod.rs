//! Discrete-event simulation of one resource.
//!
//! The kernel keeps a min-heap of timed events (job arrivals, timers armed
//! by the scheduler, periodic ticks) and advances a shared clock from one
//! event to the next. The scheduler itself runs behind a
//! [`SchedulerService`]; its outbound calls come back to the kernel over a
//! channel and are turned into new events or report entries.

pub mod report;
pub mod workload;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tokio::sync::{mpsc, watch};

use crate::calendar::LoadCalendar;
use crate::config::Config;
use crate::env::{AckKind, Environment, Outbound, TimerKind, UtilizationSample};
use crate::error::{Result, SchedulerError};
use crate::inventory::MachineList;
use crate::scheduler::placement::PlacementEngine;
use crate::scheduler::{Job, JobKey, Scheduler};
use crate::service::{SchedulerHandle, SchedulerService};

pub use report::{RejectedJob, ReportSummary, SimulationReport};
pub use workload::{TraceEntry, Workload, WorkloadError};

/// [`Environment`] backed by the simulation clock and load calendar.
/// Outbound calls are forwarded to the kernel unchanged.
#[derive(Debug)]
pub struct SimEnvironment {
    clock: watch::Receiver<f64>,
    calendar: LoadCalendar,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SimEnvironment {
    pub fn new(
        clock: watch::Receiver<f64>,
        calendar: LoadCalendar,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            clock,
            calendar,
            outbound,
        }
    }

    fn emit(&self, event: Outbound) {
        if self.outbound.send(event).is_err() {
            tracing::trace!("Simulation kernel gone, dropping outbound event");
        }
    }
}

impl Environment for SimEnvironment {
    fn now(&self) -> f64 {
        *self.clock.borrow()
    }

    fn load_fraction(&self) -> f64 {
        self.calendar.load_at(self.now())
    }

    fn schedule_timer(&mut self, delay: f64, kind: TimerKind) {
        self.emit(Outbound::Timer { delay, kind });
    }

    fn send_ack(&mut self, kind: AckKind, success: bool, key: JobKey) {
        self.emit(Outbound::Ack { kind, success, key });
    }

    fn send_cancel_result(&mut self, job: Option<Job>, key: JobKey) {
        self.emit(Outbound::CancelResult { job, key });
    }

    fn send_finished(&mut self, job: Job) {
        self.emit(Outbound::Finished(job));
    }

    fn migrate_job(&mut self, job: Job, destination: u64, ack: bool) {
        self.emit(Outbound::Migrated {
            job,
            destination,
            ack,
        });
    }

    fn record_resource_load(&mut self, load: f64) {
        self.emit(Outbound::ResourceLoad(load));
    }

    fn record_utilization(&mut self, sample: UtilizationSample) {
        self.emit(Outbound::Utilization(sample));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SimEvent {
    /// Index into the pending arrivals.
    Arrival(usize),
    Timer(TimerKind),
    Tick,
}

#[derive(Debug)]
struct Scheduled {
    time: f64,
    seq: u64,
    event: SimEvent,
}

// Reversed so that `BinaryHeap` pops the earliest event, ties broken by
// insertion order.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

#[derive(Debug, Default)]
struct EventQueue {
    heap: BinaryHeap<Scheduled>,
    seq: u64,
}

impl EventQueue {
    fn push(&mut self, time: f64, event: SimEvent) {
        self.seq += 1;
        self.heap.push(Scheduled {
            time,
            seq: self.seq,
            event,
        });
    }

    fn pop(&mut self) -> Option<Scheduled> {
        self.heap.pop()
    }
}

/// A workload replayed against one simulated resource.
pub struct Simulation {
    config: Config,
    workload: Workload,
}

impl Simulation {
    pub fn new(config: Config, workload: Workload) -> Self {
        Self { config, workload }
    }

    /// Replay the workload until no event is left.
    pub async fn run(self) -> Result<SimulationReport> {
        let cluster = &self.config.cluster;
        let origin = self.workload.origin();
        let calendar = LoadCalendar::new(self.config.calendar.clone(), origin);

        let (clock_tx, clock_rx) = watch::channel(0.0);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let env = SimEnvironment::new(clock_rx, calendar, outbound_tx);
        let inventory = MachineList::homogeneous(cluster.nodes, cluster.pes_per_node, cluster.rating);
        let placement = PlacementEngine::new(self.config.scheduler.medium_pool_nodes, cluster.nodes);

        // Jobs that cannot fit even on an idle resource would wait forever.
        let mut rejected = Vec::new();
        let jobs: Vec<(f64, Job)> = self
            .workload
            .jobs(self.config.simulation.user_id, cluster.rating)
            .into_iter()
            .filter(|(_, job)| match placement.check_fits(&inventory, job) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(job_id = job.key.job_id, error = %e, "Skipping job that can never fit");
                    rejected.push(RejectedJob {
                        key: job.key,
                        reason: e.to_string(),
                    });
                    false
                }
            })
            .collect();

        let scheduler = Scheduler::new(self.config.scheduler.clone(), inventory, env);
        let (handle, task) = SchedulerService::spawn(scheduler);

        tracing::info!(
            jobs = jobs.len(),
            skipped = rejected.len(),
            origin,
            nodes = cluster.nodes,
            pes_per_node = cluster.pes_per_node,
            "Simulation started"
        );

        let mut kernel = Kernel {
            handle,
            clock_tx,
            outbound_rx,
            events: EventQueue::default(),
            pending: Vec::with_capacity(jobs.len()),
            arrivals_left: jobs.len(),
            tick_interval: self.config.simulation.tick_interval_secs,
            report: SimulationReport {
                origin,
                rejected,
                ..SimulationReport::default()
            },
        };
        for (idx, (time, job)) in jobs.into_iter().enumerate() {
            kernel.events.push(time, SimEvent::Arrival(idx));
            kernel.pending.push(Some(job));
        }
        if kernel.tick_interval > 0.0 && kernel.arrivals_left > 0 {
            kernel.events.push(kernel.tick_interval, SimEvent::Tick);
        }

        kernel.run().await?;

        let Kernel { handle, mut report, .. } = kernel;
        drop(handle);
        let scheduler = task.await.map_err(|e| {
            tracing::error!(error = %e, "Scheduler task failed");
            SchedulerError::ServiceStopped
        })?;
        report.unfinished = scheduler.tracked_count();

        tracing::info!(
            end_time = report.end_time,
            finished = report.jobs.len(),
            rejected = report.rejected.len(),
            unfinished = report.unfinished,
            "Simulation finished"
        );
        Ok(report)
    }
}

struct Kernel {
    handle: SchedulerHandle,
    clock_tx: watch::Sender<f64>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    events: EventQueue,
    pending: Vec<Option<Job>>,
    arrivals_left: usize,
    tick_interval: f64,
    report: SimulationReport,
}

impl Kernel {
    async fn run(&mut self) -> Result<()> {
        while let Some(next) = self.events.pop() {
            let now = next.time;
            self.clock_tx.send_replace(now);
            self.report.end_time = now;

            match next.event {
                SimEvent::Arrival(idx) => self.arrive(idx).await?,
                SimEvent::Timer(kind) => self.handle.fire_timer(kind).await?,
                SimEvent::Tick => {
                    self.handle.tick().await?;
                    let snapshot = self.handle.snapshot().await?;
                    // Queued jobs only move when something running ends.
                    if self.arrivals_left > 0 || snapshot.utilization.running > 0 {
                        self.events.push(now + self.tick_interval, SimEvent::Tick);
                    }
                }
            }
            self.collect(now);
        }
        Ok(())
    }

    async fn arrive(&mut self, idx: usize) -> Result<()> {
        self.arrivals_left = self.arrivals_left.saturating_sub(1);
        let Some(job) = self.pending.get_mut(idx).and_then(Option::take) else {
            return Ok(());
        };
        let key = job.key;
        match self.handle.submit(job, false).await {
            Ok(_) => Ok(()),
            Err(SchedulerError::ServiceStopped) => Err(SchedulerError::ServiceStopped),
            Err(e) => {
                self.report.rejected.push(RejectedJob {
                    key,
                    reason: e.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Turn everything the scheduler emitted while handling the last event
    /// into timers and report entries.
    fn collect(&mut self, now: f64) {
        while let Ok(event) = self.outbound_rx.try_recv() {
            match event {
                Outbound::Timer { delay, kind } => {
                    self.events.push(now + delay, SimEvent::Timer(kind));
                }
                Outbound::Finished(job) => self.report.jobs.push(job),
                Outbound::CancelResult { job, .. } => {
                    if let Some(job) = job {
                        self.report.jobs.push(job);
                    }
                }
                Outbound::Migrated { job, .. } => self.report.jobs.push(job),
                Outbound::Utilization(sample) => self.report.utilization.push(sample),
                Outbound::ResourceLoad(load) => {
                    self.report.peak_resource_load = self.report.peak_resource_load.max(load);
                }
                Outbound::Ack { .. } => {}
            }
        }
    }
}
