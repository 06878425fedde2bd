use std::io::{self, Write};

use serde::Serialize;

use crate::env::UtilizationSample;
use crate::scheduler::{Job, JobKey, JobStatus};

/// A submission the scheduler refused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedJob {
    pub key: JobKey,
    pub reason: String,
}

/// Everything a simulation run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    /// Epoch second of simulated time zero.
    pub origin: i64,
    /// Simulated time of the last processed event.
    pub end_time: f64,
    /// Jobs handed back by the scheduler, in delivery order.
    pub jobs: Vec<Job>,
    pub rejected: Vec<RejectedJob>,
    pub utilization: Vec<UtilizationSample>,
    /// Highest busy-PE fraction reported during the run.
    pub peak_resource_load: f64,
    /// Jobs still tracked when the run ended.
    pub unfinished: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub completed: usize,
    pub canceled: usize,
    pub rejected: usize,
    pub unfinished: usize,
    pub mean_queue_time: f64,
    pub mean_run_time: f64,
    /// Time from the first submission to the last completion.
    pub makespan: f64,
}

impl SimulationReport {
    pub fn summary(&self) -> ReportSummary {
        let completed: Vec<&Job> = self
            .jobs
            .iter()
            .filter(|j| j.status == JobStatus::Success)
            .collect();
        let mean = |values: Vec<f64>| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };

        ReportSummary {
            completed: completed.len(),
            canceled: self.jobs.len() - completed.len(),
            rejected: self.rejected.len(),
            unfinished: self.unfinished,
            mean_queue_time: mean(completed.iter().filter_map(|j| j.queue_time()).collect()),
            mean_run_time: mean(completed.iter().map(|j| j.wall_clock).collect()),
            makespan: completed
                .iter()
                .filter_map(|j| j.finished_at)
                .fold(0.0, f64::max),
        }
    }

    /// Per-job CSV: `job_id,submission_time,queue_time,run_time,state`.
    /// Submission times are epoch seconds.
    pub fn write_jobs_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "job_id,submission_time,queue_time,run_time,state")?;
        for job in &self.jobs {
            let queue_time = job
                .queue_time()
                .map(|t| format!("{:.0}", t))
                .unwrap_or_default();
            writeln!(
                out,
                "{},{:.0},{},{:.0},{}",
                job.key.job_id,
                self.origin as f64 + job.submitted_at,
                queue_time,
                job.wall_clock,
                job.status
            )?;
        }
        Ok(())
    }

    pub fn write_utilization_csv<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(
            out,
            "timestamp,busy_pes,running,medium_queue,long_queue,active_nodes"
        )?;
        for s in &self.utilization {
            writeln!(
                out,
                "{:.0},{},{},{},{},{}",
                self.origin as f64 + s.timestamp,
                s.busy_pes,
                s.running,
                s.medium_queue,
                s.long_queue,
                s.active_nodes
            )?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&serde_json::json!({
            "summary": self.summary(),
            "report": self,
        }))
    }
}
