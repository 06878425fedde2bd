//! Node and PE inventory.
//!
//! The scheduler never owns the physical resource. It reads node shapes and
//! toggles PE status through [`PeInventory`]; [`MachineList`] is the
//! in-memory implementation used by the simulator and tests.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PeStatus {
    Free,
    Busy,
}

impl std::fmt::Display for PeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeStatus::Free => write!(f, "free"),
            PeStatus::Busy => write!(f, "busy"),
        }
    }
}

/// Access to the node/PE inventory of one resource.
pub trait PeInventory {
    fn node_count(&self) -> usize;

    fn pe_count(&self, node: usize) -> usize;

    /// Processing rate of one PE on `node`.
    fn pe_rating(&self, node: usize) -> f64;

    fn busy_pe_count(&self, node: usize) -> usize;

    fn pe_status(&self, node: usize, pe: usize) -> Option<PeStatus>;

    /// Set the status of one PE. Returns false if the PE does not exist.
    fn set_pe_status(&mut self, node: usize, pe: usize, status: PeStatus) -> bool;

    fn total_pes(&self) -> usize {
        (0..self.node_count()).map(|n| self.pe_count(n)).sum()
    }

    fn busy_pes(&self) -> usize {
        (0..self.node_count()).map(|n| self.busy_pe_count(n)).sum()
    }

    /// Nodes with at least one busy PE.
    fn active_nodes(&self) -> usize {
        (0..self.node_count())
            .filter(|&n| self.busy_pe_count(n) > 0)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    pub id: usize,
    pub rating: f64,
    pes: Vec<PeStatus>,
}

impl Machine {
    pub fn new(id: usize, pe_count: usize, rating: f64) -> Self {
        Self {
            id,
            rating,
            pes: vec![PeStatus::Free; pe_count],
        }
    }

    pub fn pe_count(&self) -> usize {
        self.pes.len()
    }

    pub fn busy_count(&self) -> usize {
        self.pes.iter().filter(|s| **s == PeStatus::Busy).count()
    }

    pub fn is_idle(&self) -> bool {
        self.busy_count() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineList {
    machines: Vec<Machine>,
}

impl MachineList {
    pub fn new() -> Self {
        Self::default()
    }

    /// `nodes` identical machines of `pes_per_node` PEs each.
    pub fn homogeneous(nodes: usize, pes_per_node: usize, rating: f64) -> Self {
        Self {
            machines: (0..nodes)
                .map(|id| Machine::new(id, pes_per_node, rating))
                .collect(),
        }
    }

    /// Append a machine; its id is its position in the list.
    pub fn push(&mut self, pe_count: usize, rating: f64) -> usize {
        let id = self.machines.len();
        self.machines.push(Machine::new(id, pe_count, rating));
        id
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }
}

impl PeInventory for MachineList {
    fn node_count(&self) -> usize {
        self.machines.len()
    }

    fn pe_count(&self, node: usize) -> usize {
        self.machines.get(node).map_or(0, Machine::pe_count)
    }

    fn pe_rating(&self, node: usize) -> f64 {
        self.machines.get(node).map_or(0.0, |m| m.rating)
    }

    fn busy_pe_count(&self, node: usize) -> usize {
        self.machines.get(node).map_or(0, Machine::busy_count)
    }

    fn pe_status(&self, node: usize, pe: usize) -> Option<PeStatus> {
        self.machines.get(node)?.pes.get(pe).copied()
    }

    fn set_pe_status(&mut self, node: usize, pe: usize, status: PeStatus) -> bool {
        match self.machines.get_mut(node).and_then(|m| m.pes.get_mut(pe)) {
            Some(slot) => {
                *slot = status;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_homogeneous_list_starts_free() {
        let list = MachineList::homogeneous(3, 4, 100.0);
        assert_eq!(list.node_count(), 3);
        assert_eq!(list.total_pes(), 12);
        assert_eq!(list.busy_pes(), 0);
        assert_eq!(list.active_nodes(), 0);
        assert!(list.machines().iter().all(Machine::is_idle));
    }

    #[test]
    fn test_set_status_updates_counts() {
        let mut list = MachineList::homogeneous(2, 2, 100.0);
        assert!(list.set_pe_status(1, 0, PeStatus::Busy));
        assert_eq!(list.busy_pe_count(1), 1);
        assert_eq!(list.busy_pes(), 1);
        assert_eq!(list.active_nodes(), 1);
        assert_eq!(list.pe_status(1, 0), Some(PeStatus::Busy));

        assert!(list.set_pe_status(1, 0, PeStatus::Free));
        assert_eq!(list.busy_pes(), 0);
    }

    #[test]
    fn test_out_of_range_pe_is_rejected() {
        let mut list = MachineList::homogeneous(1, 2, 100.0);
        assert!(!list.set_pe_status(0, 2, PeStatus::Busy));
        assert!(!list.set_pe_status(5, 0, PeStatus::Busy));
        assert_eq!(list.pe_status(5, 0), None);
        assert_eq!(list.pe_count(5), 0);
    }

    #[test]
    fn test_push_assigns_sequential_ids() {
        let mut list = MachineList::new();
        assert_eq!(list.push(2, 50.0), 0);
        assert_eq!(list.push(4, 80.0), 1);
        assert_eq!(list.pe_rating(1), 80.0);
        assert_eq!(list.total_pes(), 6);
    }
}
