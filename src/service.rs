//! Serialized access to a [`Scheduler`] from async code.
//!
//! The scheduler runs inside one task that owns it exclusively and handles
//! requests one at a time, so no operation ever observes another half-done.
//! Callers talk to it through a cloneable [`SchedulerHandle`].

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::env::{Environment, TimerKind, UtilizationSample};
use crate::error::{Result, SchedulerError};
use crate::inventory::PeInventory;
use crate::scheduler::{Admission, Job, JobStatus, Scheduler};

const REQUEST_CHANNEL_CAPACITY: usize = 100;

/// Requests handled by the scheduler task.
#[derive(Debug)]
pub enum SchedulerRequest {
    Submit {
        job: Job,
        want_ack: bool,
        response_tx: oneshot::Sender<Result<Admission>>,
    },
    Cancel {
        job_id: u64,
        user_id: u64,
        response_tx: oneshot::Sender<Option<JobStatus>>,
    },
    Pause {
        job_id: u64,
        user_id: u64,
        want_ack: bool,
        response_tx: oneshot::Sender<bool>,
    },
    Resume {
        job_id: u64,
        user_id: u64,
        want_ack: bool,
        response_tx: oneshot::Sender<bool>,
    },
    Move {
        job_id: u64,
        user_id: u64,
        destination: u64,
        want_ack: bool,
        response_tx: oneshot::Sender<bool>,
    },
    Status {
        job_id: u64,
        user_id: u64,
        response_tx: oneshot::Sender<Option<JobStatus>>,
    },
    /// Periodic reconciliation.
    Tick { response_tx: oneshot::Sender<()> },
    /// A timer armed by the scheduler came due.
    Timer {
        kind: TimerKind,
        response_tx: oneshot::Sender<()>,
    },
    Snapshot {
        response_tx: oneshot::Sender<SchedulerSnapshot>,
    },
}

/// Occupancy and bookkeeping counts at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerSnapshot {
    pub utilization: UtilizationSample,
    pub tracked: usize,
    pub paused: usize,
}

impl SchedulerSnapshot {
    /// True when no job is running, paused or queued.
    pub fn is_idle(&self) -> bool {
        self.tracked == 0
    }
}

/// Owns a scheduler and runs its request loop.
pub struct SchedulerService<I, E> {
    scheduler: Scheduler<I, E>,
    request_rx: mpsc::Receiver<SchedulerRequest>,
}

impl<I, E> SchedulerService<I, E>
where
    I: PeInventory,
    E: Environment,
{
    pub fn new(scheduler: Scheduler<I, E>) -> (Self, SchedulerHandle) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let service = Self {
            scheduler,
            request_rx,
        };
        (service, SchedulerHandle { request_tx })
    }

    /// Handle requests until every handle is dropped, then give the
    /// scheduler back.
    pub async fn run(mut self) -> Scheduler<I, E> {
        tracing::debug!("Scheduler service started");
        while let Some(request) = self.request_rx.recv().await {
            self.handle(request);
        }
        tracing::debug!(
            tracked = self.scheduler.tracked_count(),
            "Scheduler service stopped"
        );
        self.scheduler
    }

    fn handle(&mut self, request: SchedulerRequest) {
        let s = &mut self.scheduler;
        // A dropped response receiver only means the caller stopped waiting.
        match request {
            SchedulerRequest::Submit {
                job,
                want_ack,
                response_tx,
            } => {
                let _ = response_tx.send(s.submit(job, want_ack));
            }
            SchedulerRequest::Cancel {
                job_id,
                user_id,
                response_tx,
            } => {
                let _ = response_tx.send(s.cancel(job_id, user_id));
            }
            SchedulerRequest::Pause {
                job_id,
                user_id,
                want_ack,
                response_tx,
            } => {
                let _ = response_tx.send(s.pause(job_id, user_id, want_ack));
            }
            SchedulerRequest::Resume {
                job_id,
                user_id,
                want_ack,
                response_tx,
            } => {
                let _ = response_tx.send(s.resume(job_id, user_id, want_ack));
            }
            SchedulerRequest::Move {
                job_id,
                user_id,
                destination,
                want_ack,
                response_tx,
            } => {
                let _ = response_tx.send(s.move_job(job_id, user_id, destination, want_ack));
            }
            SchedulerRequest::Status {
                job_id,
                user_id,
                response_tx,
            } => {
                let _ = response_tx.send(s.status(job_id, user_id));
            }
            SchedulerRequest::Tick { response_tx } => {
                s.tick();
                let _ = response_tx.send(());
            }
            SchedulerRequest::Timer { kind, response_tx } => {
                s.on_timer(kind);
                let _ = response_tx.send(());
            }
            SchedulerRequest::Snapshot { response_tx } => {
                let _ = response_tx.send(SchedulerSnapshot {
                    utilization: s.snapshot(),
                    tracked: s.tracked_count(),
                    paused: s.paused_jobs().count(),
                });
            }
        }
    }
}

impl<I, E> SchedulerService<I, E>
where
    I: PeInventory + Send + 'static,
    E: Environment + Send + 'static,
{
    /// Run the service on the current runtime.
    pub fn spawn(scheduler: Scheduler<I, E>) -> (SchedulerHandle, JoinHandle<Scheduler<I, E>>) {
        let (service, handle) = Self::new(scheduler);
        (handle, tokio::spawn(service.run()))
    }
}

/// Cloneable client of a running [`SchedulerService`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    request_tx: mpsc::Sender<SchedulerRequest>,
}

impl SchedulerHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SchedulerRequest,
    ) -> Result<T> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(build(response_tx))
            .await
            .map_err(|_| SchedulerError::ServiceStopped)?;
        response_rx.await.map_err(|_| SchedulerError::ServiceStopped)
    }

    pub async fn submit(&self, job: Job, want_ack: bool) -> Result<Admission> {
        self.call(|response_tx| SchedulerRequest::Submit {
            job,
            want_ack,
            response_tx,
        })
        .await?
    }

    pub async fn cancel(&self, job_id: u64, user_id: u64) -> Result<Option<JobStatus>> {
        self.call(|response_tx| SchedulerRequest::Cancel {
            job_id,
            user_id,
            response_tx,
        })
        .await
    }

    pub async fn pause(&self, job_id: u64, user_id: u64, want_ack: bool) -> Result<bool> {
        self.call(|response_tx| SchedulerRequest::Pause {
            job_id,
            user_id,
            want_ack,
            response_tx,
        })
        .await
    }

    pub async fn resume(&self, job_id: u64, user_id: u64, want_ack: bool) -> Result<bool> {
        self.call(|response_tx| SchedulerRequest::Resume {
            job_id,
            user_id,
            want_ack,
            response_tx,
        })
        .await
    }

    pub async fn move_job(
        &self,
        job_id: u64,
        user_id: u64,
        destination: u64,
        want_ack: bool,
    ) -> Result<bool> {
        self.call(|response_tx| SchedulerRequest::Move {
            job_id,
            user_id,
            destination,
            want_ack,
            response_tx,
        })
        .await
    }

    pub async fn status(&self, job_id: u64, user_id: u64) -> Result<Option<JobStatus>> {
        self.call(|response_tx| SchedulerRequest::Status {
            job_id,
            user_id,
            response_tx,
        })
        .await
    }

    pub async fn tick(&self) -> Result<()> {
        self.call(|response_tx| SchedulerRequest::Tick { response_tx })
            .await
    }

    pub async fn fire_timer(&self, kind: TimerKind) -> Result<()> {
        self.call(|response_tx| SchedulerRequest::Timer { kind, response_tx })
            .await
    }

    pub async fn snapshot(&self) -> Result<SchedulerSnapshot> {
        self.call(|response_tx| SchedulerRequest::Snapshot { response_tx })
            .await
    }
}
