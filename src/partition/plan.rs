//! Precomputed ghost-exchange routing, built once per partition.
//!
//! The plan records, per neighbor rank, which local ghost slots are fed by
//! that owner and which locally owned entries that neighbor reads as ghosts.
//! Both exchange directions reuse it on every call, so the communication
//! pattern is never recomputed.

use serde::{Deserialize, Serialize};

/// Routing entry for one neighbor rank.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborLinks {
    /// The neighbor's rank.
    pub rank: usize,
    /// Local ghost slots (in `[0, n_ghosts)`) whose owner is this neighbor.
    /// Receive targets for ghost updates, send sources for compress-add.
    pub ghost_slots: Vec<usize>,
    /// Locally owned indices (in `[0, local_size)`) this neighbor ghosts.
    /// Send sources for ghost updates, accumulate targets for compress-add.
    pub export_locals: Vec<usize>,
}

impl NeighborLinks {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ghost_slots.is_empty() && self.export_locals.is_empty()
    }
}

/// The full routing table, sorted by neighbor rank for deterministic
/// iteration order across all participants.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePlan {
    links: Vec<NeighborLinks>,
}

impl ExchangePlan {
    /// Empty plan for single-rank partitions.
    pub fn serial() -> Self {
        Self::default()
    }

    /// Build from per-neighbor links; entries are sorted by rank and empty
    /// ones dropped.
    pub fn from_links(mut links: Vec<NeighborLinks>) -> Self {
        links.retain(|l| !l.is_empty());
        links.sort_by_key(|l| l.rank);
        Self { links }
    }

    /// Per-neighbor routing entries in ascending rank order.
    #[inline]
    pub fn links(&self) -> &[NeighborLinks] {
        &self.links
    }

    /// Ranks this rank exchanges with.
    pub fn neighbors(&self) -> impl Iterator<Item = usize> + '_ {
        self.links.iter().map(|l| l.rank)
    }

    /// Total number of ghost slots routed through the plan.
    pub fn n_ghost_targets(&self) -> usize {
        self.links.iter().map(|l| l.ghost_slots.len()).sum()
    }

    /// Total number of owned entries exported to some neighbor.
    pub fn n_export_sources(&self) -> usize {
        self.links.iter().map(|l| l.export_locals.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_links_are_dropped_and_sorted() {
        let plan = ExchangePlan::from_links(vec![
            NeighborLinks {
                rank: 3,
                ghost_slots: vec![0],
                export_locals: vec![],
            },
            NeighborLinks::default(),
            NeighborLinks {
                rank: 1,
                ghost_slots: vec![],
                export_locals: vec![4, 5],
            },
        ]);
        assert_eq!(plan.neighbors().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(plan.n_ghost_targets(), 1);
        assert_eq!(plan.n_export_sources(), 2);
    }
}
