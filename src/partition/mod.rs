//! Partition: immutable ownership and ghost description for one
//! discretization.
//!
//! A partition records which contiguous global index range this rank owns and
//! which foreign indices it reads as ghosts, plus the routing table for ghost
//! exchange. It is built once from the mesh/DoF distribution, then shared
//! read-only (via `Arc`) by every vector over the same discretization.

pub mod plan;

use std::collections::BTreeMap;
use std::ops::Range;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::comm::collective::all_gather_ranges;
use crate::comm::wire::{cast_slice, cast_slice_from, WireCount, WireIndex};
use crate::comm::{tags, CommTag, Communicator, Wait};
use crate::error::ParVecError;
use plan::{ExchangePlan, NeighborLinks};

/// Immutable ownership + ghost map shared by all vectors over one
/// discretization.
///
/// # Invariants
///
/// - The union of all ranks' `local_range`s tiles `[0, global_size)` exactly
///   (validated during [`assemble`](Self::assemble)).
/// - `ghost_indices` is sorted, duplicate-free, disjoint from `local_range`,
///   and every entry is owned by exactly one other rank.
/// - The exchange plan is derived data owned by the partition; its lifetime
///   is the partition's lifetime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Partition {
    global_size: u64,
    local_range: Range<u64>,
    ghost_indices: Vec<u64>,
    /// Owning rank per ghost slot, parallel to `ghost_indices`.
    ghost_owners: Vec<usize>,
    rank: usize,
    n_ranks: usize,
    plan: ExchangePlan,
}

impl Partition {
    /// Collective constructor over the process group sharing the
    /// discretization. Every rank must call it with the same `global_size`
    /// and `n_ranks`.
    ///
    /// All-gathers the per-rank owned ranges, validates the tiling, resolves
    /// each ghost index to its owner, and exchanges ghost-request lists so
    /// each rank also learns which of its owned entries the neighbors read.
    ///
    /// # Errors
    /// - [`ParVecError::PartitionTiling`] if the gathered ranges leave gaps
    ///   or overlap.
    /// - [`ParVecError::DuplicateGhost`] / [`ParVecError::GhostInLocalRange`]
    ///   / [`ParVecError::GhostNotOwned`] for invalid ghost requests.
    /// - [`ParVecError::CommError`] on transport failure (fatal, no retry).
    pub fn assemble<C: Communicator>(
        global_size: u64,
        local_range: Range<u64>,
        mut ghost_indices: Vec<u64>,
        comm: &C,
        rank: usize,
        n_ranks: usize,
    ) -> Result<Self, ParVecError> {
        ghost_indices.sort_unstable();
        if let Some(w) = ghost_indices.windows(2).find(|w| w[0] == w[1]) {
            return Err(ParVecError::DuplicateGhost(w[0]));
        }
        if let Some(&g) = ghost_indices
            .iter()
            .find(|&&g| local_range.contains(&g))
        {
            return Err(ParVecError::GhostInLocalRange(g));
        }

        let ranges =
            all_gather_ranges(local_range.clone(), comm, rank, n_ranks, tags::RANGE_GATHER)?;
        validate_tiling(&ranges, global_size)?;

        let ghost_owners = resolve_owners(&ghost_indices, &ranges)?;

        let plan = exchange_requests(
            &local_range,
            &ghost_indices,
            &ghost_owners,
            comm,
            rank,
            n_ranks,
            tags::GHOST_REQUESTS,
        )?;
        debug!(
            "partition assembled on rank {rank}: {} owned, {} ghosts, {} neighbors",
            local_range.end - local_range.start,
            ghost_indices.len(),
            plan.links().len()
        );

        Ok(Self {
            global_size,
            local_range,
            ghost_indices,
            ghost_owners,
            rank,
            n_ranks,
            plan,
        })
    }

    /// Single-rank partition owning `[0, n)` with no ghosts.
    pub fn serial(n: u64) -> Self {
        Self {
            global_size: n,
            local_range: 0..n,
            ghost_indices: Vec::new(),
            ghost_owners: Vec::new(),
            rank: 0,
            n_ranks: 1,
            plan: ExchangePlan::serial(),
        }
    }

    #[inline]
    pub fn global_size(&self) -> u64 {
        self.global_size
    }

    #[inline]
    pub fn local_range(&self) -> Range<u64> {
        self.local_range.clone()
    }

    /// Number of locally owned entries.
    #[inline]
    pub fn local_size(&self) -> usize {
        (self.local_range.end - self.local_range.start) as usize
    }

    #[inline]
    pub fn n_ghosts(&self) -> usize {
        self.ghost_indices.len()
    }

    /// Owned plus ghost entries; the length of any storage over this
    /// partition.
    #[inline]
    pub fn locally_stored_size(&self) -> usize {
        self.local_size() + self.n_ghosts()
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    /// Sorted ghost indices; slot `s` caches global index
    /// `ghost_indices()[s]`.
    #[inline]
    pub fn ghost_indices(&self) -> &[u64] {
        &self.ghost_indices
    }

    /// Owning rank of the ghost cached in `slot`.
    #[inline]
    pub fn ghost_owner(&self, slot: usize) -> usize {
        self.ghost_owners[slot]
    }

    #[inline]
    pub fn is_locally_owned(&self, g: u64) -> bool {
        self.local_range.contains(&g)
    }

    #[inline]
    pub fn is_ghost(&self, g: u64) -> bool {
        self.ghost_indices.binary_search(&g).is_ok()
    }

    /// Compact ghost slot of `g`, if `g` is ghosted here.
    #[inline]
    pub fn ghost_slot(&self, g: u64) -> Option<usize> {
        self.ghost_indices.binary_search(&g).ok()
    }

    /// Map a global index to its local storage slot: owned entries land in
    /// `[0, local_size)`, ghosts in `[local_size, local_size + n_ghosts)`.
    pub fn global_to_local(&self, g: u64) -> Option<usize> {
        if self.local_range.contains(&g) {
            Some((g - self.local_range.start) as usize)
        } else {
            self.ghost_slot(g).map(|s| self.local_size() + s)
        }
    }

    /// Inverse of [`global_to_local`](Self::global_to_local).
    pub fn local_to_global(&self, l: usize) -> Option<u64> {
        if l < self.local_size() {
            Some(self.local_range.start + l as u64)
        } else {
            self.ghost_indices.get(l - self.local_size()).copied()
        }
    }

    /// The precomputed ghost-exchange routing table.
    #[inline]
    pub fn plan(&self) -> &ExchangePlan {
        &self.plan
    }

    /// Whether two partitions describe the same global index space.
    #[inline]
    pub fn compatible(&self, other: &Self) -> bool {
        self.global_size == other.global_size
    }

    /// Fail with [`ParVecError::PartitionMismatch`] unless compatible.
    /// Binary vector operations call this eagerly before touching data.
    pub fn ensure_compatible(&self, other: &Self) -> Result<(), ParVecError> {
        if self.compatible(other) {
            Ok(())
        } else {
            Err(ParVecError::PartitionMismatch(
                self.global_size,
                other.global_size,
            ))
        }
    }
}

/// Owned ranges must tile `[0, global_size)` contiguously in rank order.
fn validate_tiling(ranges: &[Range<u64>], global_size: u64) -> Result<(), ParVecError> {
    let mut expected = 0u64;
    for (rank, r) in ranges.iter().enumerate() {
        if r.start != expected || r.end < r.start {
            return Err(ParVecError::PartitionTiling {
                rank,
                begin: r.start,
                end: r.end,
                expected,
                global_size,
            });
        }
        expected = r.end;
    }
    if expected != global_size {
        return Err(ParVecError::PartitionTiling {
            rank: ranges.len().saturating_sub(1),
            begin: ranges.last().map_or(0, |r| r.start),
            end: expected,
            expected: global_size,
            global_size,
        });
    }
    Ok(())
}

/// Resolve the owning rank of each ghost by binary search over the tiling.
fn resolve_owners(ghosts: &[u64], ranges: &[Range<u64>]) -> Result<Vec<usize>, ParVecError> {
    let starts: Vec<u64> = ranges.iter().map(|r| r.start).collect();
    ghosts
        .iter()
        .map(|&g| {
            let idx = match starts.binary_search(&g) {
                Ok(i) => i,
                Err(0) => return Err(ParVecError::GhostNotOwned(g)),
                Err(i) => i - 1,
            };
            if ranges[idx].contains(&g) {
                Ok(idx)
            } else {
                Err(ParVecError::GhostNotOwned(g))
            }
        })
        .collect()
}

/// Symmetric request exchange: each rank tells every owner which of its
/// indices it ghosts, and learns in return which of its own indices are
/// ghosted elsewhere. Counts travel first, then the index lists.
fn exchange_requests<C: Communicator>(
    local_range: &Range<u64>,
    ghosts: &[u64],
    owners: &[usize],
    comm: &C,
    rank: usize,
    n_ranks: usize,
    tag: CommTag,
) -> Result<ExchangePlan, ParVecError> {
    // Group ghost slots by owning rank; ghosts are sorted so each group's
    // slot list is ascending.
    let mut requests: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (slot, &owner) in owners.iter().enumerate() {
        requests.entry(owner).or_default().push(slot);
    }

    // Phase 1: counts with every other rank (symmetric; most are zero).
    let count_tag = tag;
    let mut count_recvs = Vec::with_capacity(n_ranks.saturating_sub(1));
    for peer in (0..n_ranks).filter(|&p| p != rank) {
        let mut buf = [0u8; std::mem::size_of::<WireCount>()];
        let h = comm.irecv(peer, count_tag.base(), &mut buf);
        count_recvs.push((peer, h, buf));
    }
    let mut count_sends = Vec::with_capacity(n_ranks.saturating_sub(1));
    let mut count_bufs = Vec::with_capacity(n_ranks.saturating_sub(1));
    for peer in (0..n_ranks).filter(|&p| p != rank) {
        let n = requests.get(&peer).map_or(0, Vec::len);
        let cnt = WireCount::new(n);
        count_sends.push(comm.isend(peer, count_tag.base(), cast_slice(std::slice::from_ref(&cnt))));
        count_bufs.push(cnt);
    }

    let mut incoming: BTreeMap<usize, usize> = BTreeMap::new();
    let mut maybe_err = None;
    for (peer, h, _buf) in count_recvs {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                let cnt: &[WireCount] = cast_slice_from(&data);
                if cnt[0].get() > 0 {
                    incoming.insert(peer, cnt[0].get());
                }
            }
            _ => {
                if maybe_err.is_none() {
                    maybe_err = Some(ParVecError::comm(
                        peer,
                        format!("failed to receive ghost-request count from rank {peer}"),
                    ));
                }
            }
        }
    }
    for s in count_sends {
        let _ = s.wait();
    }
    if let Some(err) = maybe_err {
        return Err(err);
    }

    // Phase 2: index lists, only with actual neighbors.
    let list_tag = tag.offset(1);
    let mut list_recvs = Vec::with_capacity(incoming.len());
    for (&peer, &n) in &incoming {
        let mut buf = vec![0u8; n * std::mem::size_of::<WireIndex>()];
        let h = comm.irecv(peer, list_tag.base(), &mut buf);
        list_recvs.push((peer, n, h, buf));
    }
    let mut list_sends = Vec::with_capacity(requests.len());
    let mut list_bufs = Vec::with_capacity(requests.len());
    for (&owner, slots) in &requests {
        let wire: Vec<WireIndex> = slots.iter().map(|&s| WireIndex::of(ghosts[s])).collect();
        list_sends.push(comm.isend(owner, list_tag.base(), cast_slice(&wire)));
        list_bufs.push(wire);
    }

    let mut exports: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (peer, n, h, _buf) in list_recvs {
        match h.wait() {
            Some(data) if data.len() == n * std::mem::size_of::<WireIndex>() => {
                if maybe_err.is_some() {
                    continue;
                }
                let wire: &[WireIndex] = cast_slice_from(&data);
                let mut locals = Vec::with_capacity(n);
                for w in wire {
                    let g = w.get();
                    if !local_range.contains(&g) {
                        maybe_err = Some(ParVecError::comm(
                            peer,
                            format!("rank {peer} requested index {g} outside our owned range"),
                        ));
                        break;
                    }
                    locals.push((g - local_range.start) as usize);
                }
                exports.insert(peer, locals);
            }
            _ => {
                if maybe_err.is_none() {
                    maybe_err = Some(ParVecError::comm(
                        peer,
                        format!("failed to receive ghost-request list from rank {peer}"),
                    ));
                }
            }
        }
    }
    for s in list_sends {
        let _ = s.wait();
    }
    if let Some(err) = maybe_err {
        return Err(err);
    }

    // Merge both directions into per-neighbor links.
    let mut peers: Vec<usize> = requests.keys().chain(exports.keys()).copied().collect();
    peers.sort_unstable();
    peers.dedup();
    let links = peers
        .into_iter()
        .map(|peer| NeighborLinks {
            rank: peer,
            ghost_slots: requests.get(&peer).cloned().unwrap_or_default(),
            export_locals: exports.get(&peer).cloned().unwrap_or_default(),
        })
        .collect();
    Ok(ExchangePlan::from_links(links))
}
