use crate::error::{Result, SchedulerError};
use crate::inventory::{PeInventory, PeStatus};
use crate::scheduler::job::{Job, Partition, PeSlot};

/// Whole-node placement under partition constraints.
///
/// Nodes are claimed as units: a job only lands on nodes with zero busy
/// PEs, and fills them in node order. Nodes are assumed homogeneous in PE
/// count, so the PE count of node 0 sizes every request.
#[derive(Debug, Clone)]
pub struct PlacementEngine {
    medium_pool: usize,
}

impl PlacementEngine {
    /// `medium_pool_cap` is clamped to the number of nodes.
    pub fn new(medium_pool_cap: usize, nodes: usize) -> Self {
        Self {
            medium_pool: medium_pool_cap.min(nodes),
        }
    }

    /// Number of leading nodes Medium jobs may use.
    pub fn medium_pool(&self) -> usize {
        self.medium_pool
    }

    /// Whole nodes needed for `num_pe` PEs, or `None` if nodes have no PEs.
    pub fn required_nodes<I: PeInventory>(&self, inventory: &I, num_pe: usize) -> Option<usize> {
        let per_node = pes_per_node(inventory);
        if per_node == 0 {
            return None;
        }
        Some(num_pe.div_ceil(per_node))
    }

    /// Nodes of the resource a job of `partition` could ever use.
    pub fn eligible_nodes<I: PeInventory>(&self, inventory: &I, partition: Partition) -> usize {
        partition.eligible_nodes(inventory.node_count(), self.medium_pool)
    }

    /// Whether `job` could be placed on an otherwise idle resource.
    pub fn check_fits<I: PeInventory>(&self, inventory: &I, job: &Job) -> Result<()> {
        let eligible = self.eligible_nodes(inventory, job.partition);
        let required = self
            .required_nodes(inventory, job.num_pe)
            .unwrap_or(usize::MAX);
        if required > eligible || job.num_pe > inventory.total_pes() {
            return Err(SchedulerError::ExceedsCapacity {
                key: job.key,
                required_nodes: required,
                eligible_nodes: eligible,
            });
        }
        Ok(())
    }

    /// Pick PEs for a request without claiming them.
    pub fn find<I: PeInventory>(
        &self,
        inventory: &I,
        num_pe: usize,
        partition: Partition,
    ) -> Option<Vec<PeSlot>> {
        if num_pe == 0 || num_pe > inventory.total_pes() {
            return None;
        }
        let required = self.required_nodes(inventory, num_pe)?;

        let free: Vec<usize> = (0..inventory.node_count())
            .filter(|&node| inventory.busy_pe_count(node) == 0)
            .filter(|&node| partition.admits(node, self.medium_pool))
            .take(required)
            .collect();
        if free.len() < required {
            return None;
        }

        let mut slots = Vec::with_capacity(num_pe);
        'nodes: for node in free {
            for pe in 0..inventory.pe_count(node) {
                if slots.len() == num_pe {
                    break 'nodes;
                }
                slots.push(PeSlot { node, pe });
            }
        }
        if slots.len() < num_pe {
            return None;
        }
        Some(slots)
    }

    /// Place `job` if capacity allows: claims its PEs, records them on the
    /// job and marks it executing. Returns false and leaves everything
    /// untouched otherwise.
    pub fn try_place<I: PeInventory>(&self, inventory: &mut I, job: &mut Job, now: f64) -> bool {
        let Some(slots) = self.find(inventory, job.num_pe, job.partition) else {
            return false;
        };
        claim(inventory, &slots);
        job.assignment = slots;
        job.begin_execution(now);
        true
    }
}

fn pes_per_node<I: PeInventory>(inventory: &I) -> usize {
    if inventory.node_count() == 0 {
        0
    } else {
        inventory.pe_count(0)
    }
}

/// Mark every slot busy.
pub fn claim<I: PeInventory>(inventory: &mut I, slots: &[PeSlot]) {
    for slot in slots {
        if inventory.pe_status(slot.node, slot.pe) == Some(PeStatus::Busy) {
            tracing::warn!(node = slot.node, pe = slot.pe, "Claiming a PE that is already busy");
        }
        inventory.set_pe_status(slot.node, slot.pe, PeStatus::Busy);
    }
}

/// Mark every slot free again.
pub fn release<I: PeInventory>(inventory: &mut I, slots: &[PeSlot]) {
    for slot in slots {
        if inventory.pe_status(slot.node, slot.pe) != Some(PeStatus::Busy) {
            tracing::warn!(node = slot.node, pe = slot.pe, "Releasing a PE that is not busy");
        }
        inventory.set_pe_status(slot.node, slot.pe, PeStatus::Free);
    }
}
