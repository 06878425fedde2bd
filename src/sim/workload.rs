//! Workload trace reader.
//!
//! One job per line, whitespace separated:
//!
//! ```text
//! # job_id submit_time run_time num_pe [partition]
//! 1 1700000000 3600 24 long
//! 2 1700000060  600 12 medium
//! ```
//!
//! Submit times are epoch seconds. Run times are seconds on an unloaded PE
//! of the trace's rating. A missing partition column means Long.

use std::path::Path;

use thiserror::Error;

use crate::scheduler::{Job, JobKey, Partition};

#[derive(Error, Debug)]
pub enum WorkloadError {
    #[error("Failed to read workload: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// One job as written in the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub job_id: u64,
    pub submit_time: i64,
    pub run_time: f64,
    pub num_pe: usize,
    pub partition: Partition,
}

/// A parsed trace, sorted by submit time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workload {
    entries: Vec<TraceEntry>,
}

impl Workload {
    pub fn from_entries(mut entries: Vec<TraceEntry>) -> Self {
        // Stable: equal submit times keep trace order.
        entries.sort_by_key(|e| e.submit_time);
        Self { entries }
    }

    pub fn parse(raw: &str) -> Result<Self, WorkloadError> {
        let mut lines = Vec::new();
        let mut entries = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let content = line.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }
            entries.push(parse_line(idx + 1, content)?);
            lines.push(idx + 1);
        }

        // Every offset from the earliest submission must be representable.
        if let Some(origin) = entries.iter().map(|e| e.submit_time).min() {
            for (entry, &line) in entries.iter().zip(&lines) {
                if entry.submit_time.checked_sub(origin).is_none() {
                    return Err(WorkloadError::Parse {
                        line,
                        reason: format!(
                            "submit_time {} is too far from the earliest submission {}",
                            entry.submit_time, origin
                        ),
                    });
                }
            }
        }
        Ok(Self::from_entries(entries))
    }

    pub fn from_file(path: &Path) -> Result<Self, WorkloadError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Epoch second of the earliest submission; simulated time zero.
    pub fn origin(&self) -> i64 {
        self.entries.first().map_or(0, |e| e.submit_time)
    }

    /// Jobs paired with their submit time relative to [`origin`](Self::origin).
    /// Lengths are `run_time * rating` work units.
    pub fn jobs(&self, user_id: u64, rating: f64) -> Vec<(f64, Job)> {
        let origin = self.origin();
        self.entries
            .iter()
            .map(|e| {
                let job = Job::new(
                    JobKey::new(e.job_id, user_id),
                    e.run_time * rating,
                    e.num_pe,
                    e.partition,
                );
                (e.submit_time.saturating_sub(origin) as f64, job)
            })
            .collect()
    }
}

fn parse_line(line: usize, content: &str) -> Result<TraceEntry, WorkloadError> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if !(4..=5).contains(&fields.len()) {
        return Err(WorkloadError::Parse {
            line,
            reason: format!("expected 4 or 5 fields, found {}", fields.len()),
        });
    }

    let parse_err = |name: &str, value: &str| WorkloadError::Parse {
        line,
        reason: format!("invalid {} '{}'", name, value),
    };

    let job_id = fields[0]
        .parse::<u64>()
        .map_err(|_| parse_err("job_id", fields[0]))?;
    let submit_time = fields[1]
        .parse::<i64>()
        .map_err(|_| parse_err("submit_time", fields[1]))?;
    let run_time = fields[2]
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite() && *t >= 0.0)
        .ok_or_else(|| parse_err("run_time", fields[2]))?;
    let num_pe = fields[3]
        .parse::<usize>()
        .map_err(|_| parse_err("num_pe", fields[3]))?;
    let partition = match fields.get(4) {
        Some(raw) => raw
            .parse::<Partition>()
            .map_err(|reason| WorkloadError::Parse { line, reason })?,
        None => Partition::Long,
    };

    Ok(TraceEntry {
        job_id,
        submit_time,
        run_time,
        num_pe,
        partition,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fields_and_comments() {
        let raw = "\
# header
1 1000 60 4 medium
2  990 30 2   # no partition

3 1000 10 1 LONG
";
        let workload = Workload::parse(raw).unwrap();
        assert_eq!(workload.len(), 3);
        assert_eq!(workload.origin(), 990);

        let ids: Vec<u64> = workload.entries().iter().map(|e| e.job_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(workload.entries()[0].partition, Partition::Long);
        assert_eq!(workload.entries()[1].partition, Partition::Medium);
    }

    #[test]
    fn test_jobs_are_relative_to_origin() {
        let workload = Workload::parse("7 500 2 3 medium\n8 530 1 1\n").unwrap();
        let jobs = workload.jobs(42, 100.0);
        assert_eq!(jobs[0].0, 0.0);
        assert_eq!(jobs[1].0, 30.0);
        assert_eq!(jobs[0].1.key, JobKey::new(7, 42));
        assert_eq!(jobs[0].1.length, 200.0);
        assert_eq!(jobs[0].1.num_pe, 3);
    }

    #[test]
    fn test_reports_bad_line_number() {
        let err = Workload::parse("1 0 10 1\n2 0 ten 1\n").unwrap_err();
        match err {
            WorkloadError::Parse { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("run_time"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_rejects_wrong_field_count_and_partition() {
        assert!(matches!(
            Workload::parse("1 0 10"),
            Err(WorkloadError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            Workload::parse("1 0 10 1 short"),
            Err(WorkloadError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_empty_trace_has_zero_origin() {
        let workload = Workload::parse("# nothing\n").unwrap();
        assert!(workload.is_empty());
        assert_eq!(workload.origin(), 0);
    }

    #[test]
    fn test_rejects_submit_times_too_far_apart() {
        let raw = format!("1 {} 10 1\n2 {} 10 1\n", i64::MIN, i64::MAX);
        match Workload::parse(&raw).unwrap_err() {
            WorkloadError::Parse { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("submit_time"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        // Negative epochs are fine while offsets stay in range.
        let workload = Workload::parse("1 -30 10 1\n2 0 10 1\n").unwrap();
        assert_eq!(workload.origin(), -30);
        assert_eq!(workload.jobs(1, 1.0)[1].0, 30.0);
    }

    #[test]
    fn test_entries_built_directly_do_not_overflow() {
        let workload = Workload::from_entries(vec![
            TraceEntry {
                job_id: 1,
                submit_time: i64::MIN,
                run_time: 1.0,
                num_pe: 1,
                partition: Partition::Long,
            },
            TraceEntry {
                job_id: 2,
                submit_time: i64::MAX,
                run_time: 1.0,
                num_pe: 1,
                partition: Partition::Long,
            },
        ]);
        assert_eq!(workload.jobs(1, 1.0)[1].0, i64::MAX as f64);
    }
}
