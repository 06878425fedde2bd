
use pe_sched::env::{AckKind, TimerKind};
use pe_sched::error::SchedulerError;
use pe_sched::inventory::PeInventory;
use pe_sched::scheduler::{Admission, JobStatus, Partition};
use test_harness::{assert_consistent, job, key, nodes_of, scheduler, USER};

/// 2 nodes x 2 PEs, medium pool = {node 0}. A Long job occupying the pool
/// node blocks a Medium job until it completes.
#[test]
fn test_medium_job_waits_for_pool_node() {
    let mut s = scheduler(2, 2, 1);

    s.submit(job(1, 2, 400.0, Partition::Long), false).unwrap();
    assert_eq!(nodes_of(&s, 1), vec![0]);

    let admission = s.submit(job(2, 1, 100.0, Partition::Medium), true).unwrap();
    assert_eq!(admission, Admission::Queued);
    assert_eq!(s.status(2, USER), Some(JobStatus::Queued));
    // Node 1 is free, but outside the pool.
    assert_eq!(s.inventory().busy_pe_count(1), 0);
    assert_eq!(s.env().acks(), vec![(AckKind::Submit, true, key(2))]);

    s.env_mut().set_time(5.0);
    s.on_timer(TimerKind::Forecast(key(1)));

    assert_eq!(s.status(1, USER), None);
    assert_eq!(s.status(2, USER), Some(JobStatus::InExec));
    assert_eq!(nodes_of(&s, 2), vec![0]);
    assert_consistent(&s);
}

/// Same resource with the Long job spanning both nodes.
#[test]
fn test_long_job_spanning_all_nodes_blocks_medium() {
    let mut s = scheduler(2, 2, 1);

    s.submit(job(1, 4, 400.0, Partition::Long), false).unwrap();
    assert_eq!(nodes_of(&s, 1), vec![0, 1]);
    assert_eq!(s.inventory().busy_pes(), 4);

    s.submit(job(2, 1, 100.0, Partition::Medium), false).unwrap();
    assert_eq!(s.queue_len(Partition::Medium), 1);

    s.env_mut().set_time(5.0);
    s.on_timer(TimerKind::Forecast(key(1)));

    let placed = s.job(&key(2)).unwrap();
    assert_eq!(placed.status, JobStatus::InExec);
    assert_eq!(placed.assignment.len(), 1);
    assert_eq!(placed.assignment[0].node, 0);
    assert_eq!(placed.assignment[0].pe, 0);
    assert_consistent(&s);
}

#[test]
fn test_long_jobs_use_nodes_outside_the_pool() {
    let mut s = scheduler(3, 2, 1);
    s.submit(job(1, 1, 1000.0, Partition::Medium), false).unwrap();
    s.submit(job(2, 2, 1000.0, Partition::Long), false).unwrap();
    s.submit(job(3, 2, 1000.0, Partition::Long), false).unwrap();

    assert_eq!(nodes_of(&s, 1), vec![0]);
    assert_eq!(nodes_of(&s, 2), vec![1]);
    assert_eq!(nodes_of(&s, 3), vec![2]);
    assert_consistent(&s);
}

#[test]
fn test_medium_jobs_never_leave_the_pool() {
    let mut s = scheduler(4, 2, 2);
    for id in 1..=4 {
        s.submit(job(id, 2, 1000.0, Partition::Medium), false).unwrap();
    }

    assert_eq!(s.running_count(), 2);
    assert_eq!(s.queue_len(Partition::Medium), 2);
    for j in s.running_jobs() {
        assert!(j.assignment.iter().all(|slot| slot.node < 2));
    }
    assert_eq!(s.inventory().busy_pe_count(2), 0);
    assert_eq!(s.inventory().busy_pe_count(3), 0);
    assert_consistent(&s);
}

#[test]
fn test_partially_busy_node_is_not_shared() {
    let mut s = scheduler(2, 4, 2);
    s.submit(job(1, 1, 1000.0, Partition::Long), false).unwrap();
    s.submit(job(2, 1, 1000.0, Partition::Long), false).unwrap();
    s.submit(job(3, 1, 1000.0, Partition::Long), false).unwrap();

    // One job per node even though node 0 has three idle PEs.
    assert_eq!(nodes_of(&s, 1), vec![0]);
    assert_eq!(nodes_of(&s, 2), vec![1]);
    assert_eq!(s.status(3, USER), Some(JobStatus::Queued));
    assert_eq!(s.inventory().busy_pes(), 2);
}

#[test]
fn test_multi_node_request_fills_nodes_in_order() {
    let mut s = scheduler(3, 4, 3);
    s.submit(job(1, 6, 1000.0, Partition::Long), false).unwrap();

    let slots: Vec<(usize, usize)> = s
        .job(&key(1))
        .unwrap()
        .assignment
        .iter()
        .map(|slot| (slot.node, slot.pe))
        .collect();
    assert_eq!(slots, vec![(0, 0), (0, 1), (0, 2), (0, 3), (1, 0), (1, 1)]);
    assert_eq!(s.inventory().busy_pe_count(2), 0);
}

#[test]
fn test_medium_pool_cap_is_clamped_to_node_count() {
    let mut s = scheduler(2, 2, 10);
    assert_eq!(s.medium_pool(), 2);
    s.submit(job(1, 4, 100.0, Partition::Medium), false).unwrap();
    assert_eq!(nodes_of(&s, 1), vec![0, 1]);
}

#[test]
fn test_oversized_requests_wait_in_queue() {
    let mut s = scheduler(2, 2, 1);

    assert_eq!(
        s.submit(job(1, 5, 100.0, Partition::Long), true),
        Ok(Admission::Queued)
    );
    assert_eq!(
        s.submit(job(2, 3, 100.0, Partition::Medium), true),
        Ok(Admission::Queued)
    );
    assert_eq!(s.status(1, USER), Some(JobStatus::Queued));
    assert_eq!(s.status(2, USER), Some(JobStatus::Queued));
    assert_eq!(
        s.env().acks(),
        vec![
            (AckKind::Submit, true, key(1)),
            (AckKind::Submit, true, key(2)),
        ]
    );
    assert_eq!(s.queue_len(Partition::Long), 1);
    assert_eq!(s.queue_len(Partition::Medium), 1);
    assert_eq!(s.inventory().busy_pes(), 0);
    assert_consistent(&s);

    // Only invalid requests are turned away.
    let err = s.submit(job(3, 0, 100.0, Partition::Long), true).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidJob { .. }));
    assert_eq!(s.env().acks().last(), Some(&(AckKind::Submit, false, key(3))));
}
