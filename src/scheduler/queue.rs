use std::collections::VecDeque;

use crate::scheduler::job::{JobKey, Partition};

/// The two FCFS wait queues, one per partition.
///
/// Queues hold keys only; the jobs themselves live in the controller's
/// index.
#[derive(Debug, Default, Clone)]
pub struct PartitionQueues {
    medium: VecDeque<JobKey>,
    long: VecDeque<JobKey>,
}

impl PartitionQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, partition: Partition) -> &VecDeque<JobKey> {
        match partition {
            Partition::Medium => &self.medium,
            Partition::Long => &self.long,
        }
    }

    fn queue_mut(&mut self, partition: Partition) -> &mut VecDeque<JobKey> {
        match partition {
            Partition::Medium => &mut self.medium,
            Partition::Long => &mut self.long,
        }
    }

    /// Append a job at the tail of its partition's queue.
    pub fn push(&mut self, partition: Partition, key: JobKey) {
        self.queue_mut(partition).push_back(key);
    }

    pub fn front(&self, partition: Partition) -> Option<JobKey> {
        self.queue(partition).front().copied()
    }

    /// Remove a job from anywhere in its queue. Returns false if absent.
    pub fn remove(&mut self, partition: Partition, key: &JobKey) -> bool {
        let queue = self.queue_mut(partition);
        match queue.iter().position(|k| k == key) {
            Some(idx) => {
                queue.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, partition: Partition, key: &JobKey) -> bool {
        self.queue(partition).contains(key)
    }

    pub fn len(&self, partition: Partition) -> usize {
        self.queue(partition).len()
    }

    pub fn total(&self) -> usize {
        self.medium.len() + self.long.len()
    }

    pub fn is_empty(&self) -> bool {
        self.medium.is_empty() && self.long.is_empty()
    }

    /// Keys of one queue, head first.
    pub fn keys(&self, partition: Partition) -> impl Iterator<Item = &JobKey> {
        self.queue(partition).iter()
    }

    /// Move queued jobs into execution while capacity allows.
    ///
    /// Each pass places Long heads until one fails or the Long queue is
    /// empty, then tries a single Medium head. Passes repeat until one
    /// places nothing. `place` returns true when it started the job; the job
    /// is then dropped from its queue. Returns the number of jobs placed.
    pub fn drain<F>(&mut self, mut place: F) -> usize
    where
        F: FnMut(JobKey) -> bool,
    {
        let mut placed = 0;
        loop {
            let mut progress = false;

            while let Some(key) = self.front(Partition::Long) {
                if !place(key) {
                    break;
                }
                self.long.pop_front();
                placed += 1;
                progress = true;
            }

            if let Some(key) = self.front(Partition::Medium) {
                if place(key) {
                    self.medium.pop_front();
                    placed += 1;
                    progress = true;
                }
            }

            if !progress {
                break;
            }
        }
        placed
    }
}
