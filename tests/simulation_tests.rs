use std::io::Write;

use pe_sched::config::{CalendarConfig, Config};
use pe_sched::scheduler::JobStatus;
use pe_sched::sim::{Simulation, Workload};
use tempfile::NamedTempFile;

fn small_cluster() -> Config {
    let mut config = Config::default();
    config.cluster.nodes = 2;
    config.cluster.pes_per_node = 2;
    config.cluster.rating = 100.0;
    config.scheduler.pe_rating = 100.0;
    config.scheduler.medium_pool_nodes = 1;
    config
}

fn trace_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const TRACE: &str = "\
# job_id submit_time run_time num_pe partition
1 1000 10 2 long
3 1002  4 4 long
4 1003  1 5 long
2 1005  5 1 medium
";

#[tokio::test]
async fn test_simulation_replays_trace() {
    let file = trace_file(TRACE);
    let workload = Workload::from_file(file.path()).unwrap();
    assert_eq!(workload.origin(), 1000);

    let report = Simulation::new(small_cluster(), workload).run().await.unwrap();

    let order: Vec<u64> = report.jobs.iter().map(|j| j.key.job_id).collect();
    assert_eq!(order, vec![1, 3, 2]);
    assert!(report.jobs.iter().all(|j| j.status == JobStatus::Success));

    let queue_times: Vec<f64> = report.jobs.iter().filter_map(|j| j.queue_time()).collect();
    assert_eq!(queue_times, vec![0.0, 9.0, 11.0]);

    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].key.job_id, 4);
    assert_eq!(report.unfinished, 0);
    assert_eq!(report.peak_resource_load, 1.0);
    assert_eq!(report.utilization.first().map(|s| s.timestamp), Some(0.0));

    let summary = report.summary();
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.makespan, 22.0);
}

#[tokio::test]
async fn test_background_load_stretches_run_time() {
    let mut config = small_cluster();
    config.calendar = CalendarConfig {
        peak_load: 0.5,
        off_peak_load: 0.5,
        holiday_load: 0.5,
        ..CalendarConfig::default()
    };
    let workload = Workload::parse("1 1000 10 2 long\n").unwrap();

    let report = Simulation::new(config, workload).run().await.unwrap();

    // Half speed: 20s instead of 10s, found by re-armed forecasts.
    assert_eq!(report.jobs.len(), 1);
    assert_eq!(report.jobs[0].wall_clock, 20.0);
    assert_eq!(report.jobs[0].finished_at, Some(20.0));
}

#[tokio::test]
async fn test_reports_are_written() {
    let file = trace_file(TRACE);
    let workload = Workload::from_file(file.path()).unwrap();
    let report = Simulation::new(small_cluster(), workload).run().await.unwrap();

    let jobs_csv = NamedTempFile::new().unwrap();
    report.write_jobs_csv(jobs_csv.reopen().unwrap()).unwrap();
    let text = std::fs::read_to_string(jobs_csv.path()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "job_id,submission_time,queue_time,run_time,state");
    assert_eq!(lines[1], "1,1000,0,11,Success");
    assert_eq!(lines.len(), 4);

    let util_csv = NamedTempFile::new().unwrap();
    report.write_utilization_csv(util_csv.reopen().unwrap()).unwrap();
    let text = std::fs::read_to_string(util_csv.path()).unwrap();
    assert!(text.starts_with("timestamp,busy_pes,running,medium_queue,long_queue,active_nodes\n1000,"));

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["summary"]["completed"], 3);
}

#[tokio::test]
async fn test_empty_trace_finishes_immediately() {
    let report = Simulation::new(small_cluster(), Workload::default())
        .run()
        .await
        .unwrap();
    assert!(report.jobs.is_empty());
    assert_eq!(report.end_time, 0.0);
}

#[tokio::test]
async fn test_job_larger_than_its_partition_does_not_stall_the_run() {
    // Medium pool is one node of 2 PEs, so job 1 can never start.
    let workload = Workload::parse("1 1000 10 3 medium\n2 1001 5 2 long\n").unwrap();

    let report = Simulation::new(small_cluster(), workload).run().await.unwrap();

    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].key.job_id, 1);
    assert!(report.rejected[0].reason.contains("whole nodes"));
    assert_eq!(report.jobs.len(), 1);
    assert_eq!(report.jobs[0].key.job_id, 2);
    assert_eq!(report.unfinished, 0);
}
