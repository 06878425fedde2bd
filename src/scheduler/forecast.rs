use crate::env::{Environment, TimerKind};
use crate::scheduler::job::{Job, JobKey};

/// Lower bound of a completion estimate, in seconds. Keeps residue near
/// exact completion from producing zero-delay timers.
pub const MIN_ESTIMATE_SECS: f64 = 1.0;

/// Seconds until `remaining` work is done at `rate`, at least
/// [`MIN_ESTIMATE_SECS`].
pub fn estimate(remaining: f64, rate: f64) -> f64 {
    let secs = remaining / rate;
    if secs >= MIN_ESTIMATE_SECS {
        secs
    } else {
        MIN_ESTIMATE_SECS
    }
}

/// Timer delay for an estimate: rounded up, plus one second of slack.
pub fn timer_delay(estimate: f64) -> f64 {
    estimate.ceil() + 1.0
}

/// Arms per-job completion timers and the coarse backstop sweep.
#[derive(Debug, Clone)]
pub struct CompletionForecaster {
    backstop_interval: f64,
    backstop_pending: bool,
}

impl CompletionForecaster {
    pub fn new(backstop_interval: f64) -> Self {
        Self {
            backstop_interval,
            backstop_pending: false,
        }
    }

    pub fn backstop_pending(&self) -> bool {
        self.backstop_pending
    }

    /// Schedule the completion check of `job` and record its estimated
    /// finish time. Returns the timer delay.
    pub fn arm<E: Environment>(&self, env: &mut E, job: &mut Job, rate: f64) -> f64 {
        let delay = timer_delay(estimate(job.remaining(), rate));
        job.estimated_finish = Some(env.now() + delay);
        env.schedule_timer(delay, TimerKind::Forecast(job.key));
        tracing::trace!(job_id = job.key.job_id, user_id = job.key.user_id, delay, "Forecast armed");
        delay
    }

    /// Schedule the backstop unless one is already on its way.
    pub fn ensure_backstop<E: Environment>(&mut self, env: &mut E) {
        if self.backstop_pending {
            return;
        }
        self.backstop_pending = true;
        env.schedule_timer(self.backstop_interval, TimerKind::Backstop);
    }

    /// The pending backstop has been delivered.
    pub fn backstop_fired(&mut self) {
        self.backstop_pending = false;
    }
}

/// Keys of finished jobs, in the order given. Collected before any removal
/// so callers can mutate the running set afterwards.
pub fn completed<'a, It>(jobs: It) -> Vec<JobKey>
where
    It: IntoIterator<Item = &'a Job>,
{
    jobs.into_iter()
        .filter(|job| job.is_complete())
        .map(|job| job.key)
        .collect()
}
