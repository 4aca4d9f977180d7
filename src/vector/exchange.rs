//! Ghost exchange engine: owner-to-ghost updates and ghost-to-owner
//! accumulation, driven by the partition's precomputed routing table.
//!
//! Both directions are split into a non-blocking start and a blocking
//! finish. The start call returns a guard that mutably borrows the vector,
//! so no read or write to the same storage can happen between start and
//! finish; `finish` consumes the guard. Collective: every rank sharing the
//! partition must make the same calls in the same relative order.

use log::{trace, warn};

use crate::comm::wire::{cast_slice, cast_slice_from};
use crate::comm::{tags, CommTag, Communicator, Wait};
use crate::error::ParVecError;
use crate::storage::VectorStorage;
use crate::vector::state::CompressMode;
use crate::vector::{Scalar, Vector};

enum Direction {
    /// Owner values broadcast into ghost slots.
    GhostUpdate,
    /// Ghost contributions summed into owners, ghosts zeroed after.
    CompressAdd,
    /// Nothing pending; finish only updates the state.
    Noop,
}

/// In-flight exchange on one vector. Holds the mutable borrow until
/// [`finish`](Self::finish) runs, so the start/finish window cannot touch
/// the storage.
pub struct ExchangeGuard<'a, T, S, C>
where
    T: Scalar,
    S: VectorStorage<T>,
    C: Communicator,
{
    vec: &'a mut Vector<T, S>,
    direction: Direction,
    /// (plan link index, handle, expected element count, landing buffer)
    /// per posted receive; buffers stay alive until the handle is waited.
    recvs: Vec<(usize, C::RecvHandle, usize, Vec<u8>)>,
    sends: Vec<C::SendHandle>,
    /// Pre-exchange ghost region, kept to diagnose diverging insert writes.
    verify_snapshot: Option<Vec<T>>,
}

impl<T, S, C> ExchangeGuard<'_, T, S, C>
where
    T: Scalar,
    S: VectorStorage<T>,
    C: Communicator,
{
    /// Block until the exchange completes and fold the received values into
    /// the vector. Must run before any further exchange on the same vector.
    pub fn finish(self) -> Result<(), ParVecError> {
        let ExchangeGuard {
            vec,
            direction,
            recvs,
            sends,
            verify_snapshot,
        } = self;

        let mut incoming: Vec<(usize, Vec<T>)> = Vec::with_capacity(recvs.len());
        let mut maybe_err = None;
        for (link_idx, h, n_elems, _buf) in recvs {
            let peer = vec.partition.plan().links()[link_idx].rank;
            match h.wait() {
                Some(data) if data.len() == n_elems * std::mem::size_of::<T>() => {
                    if maybe_err.is_none() {
                        incoming.push((link_idx, cast_slice_from::<T>(&data).to_vec()));
                    }
                }
                Some(data) => {
                    if maybe_err.is_none() {
                        maybe_err = Some(ParVecError::comm(
                            peer,
                            format!(
                                "expected {} bytes of vector data, got {}",
                                n_elems * std::mem::size_of::<T>(),
                                data.len()
                            ),
                        ));
                    }
                }
                None => {
                    if maybe_err.is_none() {
                        maybe_err = Some(ParVecError::comm(
                            peer,
                            format!("failed to receive vector data from rank {peer}"),
                        ));
                    }
                }
            }
        }
        for s in sends {
            let _ = s.wait();
        }
        if let Some(err) = maybe_err {
            return Err(err);
        }

        let local_size = vec.partition.local_size();
        let n_ghosts = vec.partition.n_ghosts();
        let partition = vec.partition.clone();
        match direction {
            Direction::GhostUpdate => {
                vec.storage.with_slice_mut(|buf| {
                    for (link_idx, vals) in &incoming {
                        let link = &partition.plan().links()[*link_idx];
                        for (&slot, &v) in link.ghost_slots.iter().zip(vals) {
                            buf[local_size + slot] = v;
                        }
                    }
                })?;
                if let Some(before) = verify_snapshot {
                    let after = vec.storage.read_slice(local_size, n_ghosts)?;
                    for &slot in &vec.touched_set_ghosts {
                        if before[slot] != after[slot] {
                            warn!(
                                "insert write to global index {} diverged from owner value; owner wins",
                                vec.partition.ghost_indices()[slot]
                            );
                        }
                    }
                }
            }
            Direction::CompressAdd => {
                vec.storage.with_slice_mut(|buf| {
                    for (link_idx, vals) in &incoming {
                        let link = &partition.plan().links()[*link_idx];
                        for (&l, &v) in link.export_locals.iter().zip(vals) {
                            buf[l] += v;
                        }
                    }
                    // Fold-in complete; ghosts would double-count on the
                    // next update if left in place.
                    buf[local_size..].fill(T::zero());
                })?;
            }
            Direction::Noop => {}
        }
        vec.touched_set_ghosts.clear();
        vec.state.mark_compressed();
        Ok(())
    }
}

impl<T, S> Vector<T, S>
where
    T: Scalar,
    S: VectorStorage<T>,
{
    /// Non-blocking start of an owner-to-ghost update; pair with
    /// [`ExchangeGuard::finish`]. Collective.
    ///
    /// # Errors
    /// [`ParVecError::CompressModeMismatch`] if accumulate writes are
    /// pending (they must be compressed first), [`ParVecError::CommError`]
    /// on transport failure.
    pub fn update_ghost_values_start<'a, C: Communicator>(
        &'a mut self,
        comm: &C,
    ) -> Result<ExchangeGuard<'a, T, S, C>, ParVecError> {
        self.state.check_compress(CompressMode::Insert)?;
        let snapshot = self.insert_divergence_snapshot()?;
        let mut guard = start_exchange(self, comm, tags::GHOST_UPDATE, Direction::GhostUpdate)?;
        guard.verify_snapshot = snapshot;
        Ok(guard)
    }

    /// Owner-to-ghost update: after this call every ghost slot holds the
    /// value its owner had at call time (a snapshot; no ordering guarantee
    /// relative to later writes on other ranks). Collective.
    pub fn update_ghost_values<C: Communicator>(&mut self, comm: &C) -> Result<(), ParVecError> {
        self.update_ghost_values_start(comm)?.finish()
    }

    /// Non-blocking start of a compress; pair with [`ExchangeGuard::finish`].
    /// Collective.
    pub fn compress_start<'a, C: Communicator>(
        &'a mut self,
        mode: CompressMode,
        comm: &C,
    ) -> Result<ExchangeGuard<'a, T, S, C>, ParVecError> {
        self.state.check_compress(mode)?;
        // Collective no-op only when the routing table itself is empty; the
        // local state never decides whether to exchange, since neighbors may
        // hold contributions for this rank regardless of what it wrote.
        if self.partition.plan().links().is_empty() {
            trace!("compress({mode:?}) with no neighbors; state update only");
            return Ok(ExchangeGuard {
                vec: self,
                direction: Direction::Noop,
                recvs: Vec::new(),
                sends: Vec::new(),
                verify_snapshot: None,
            });
        }
        match mode {
            CompressMode::Insert => {
                let snapshot = self.insert_divergence_snapshot()?;
                let mut guard =
                    start_exchange(self, comm, tags::GHOST_UPDATE, Direction::GhostUpdate)?;
                guard.verify_snapshot = snapshot;
                Ok(guard)
            }
            CompressMode::Add => {
                start_exchange(self, comm, tags::COMPRESS_ADD, Direction::CompressAdd)
            }
        }
    }

    /// Reconcile ghost/owner inconsistency introduced by writes. Collective.
    ///
    /// `Add` sums ghost contributions into the owners and zeroes every ghost
    /// slot (call [`update_ghost_values`](Self::update_ghost_values) to read
    /// ghosts afterwards). `Insert` redistributes the authoritative owner
    /// values to all ghost copies (owner-wins; a diverging local insert
    /// write is logged at `warn` level in debug builds).
    pub fn compress<C: Communicator>(
        &mut self,
        mode: CompressMode,
        comm: &C,
    ) -> Result<(), ParVecError> {
        self.compress_start(mode, comm)?.finish()
    }

    /// Ghost-region snapshot for owner-wins divergence warnings; only taken
    /// when insert writes are pending and checking is enabled.
    fn insert_divergence_snapshot(&self) -> Result<Option<Vec<T>>, ParVecError> {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if !self.touched_set_ghosts.is_empty() {
            let local_size = self.partition.local_size();
            return Ok(Some(
                self.storage
                    .read_slice(local_size, self.partition.n_ghosts())?,
            ));
        }
        Ok(None)
    }
}

/// Post all receives, then all sends, per the partition's routing table.
fn start_exchange<'a, T, S, C>(
    vec: &'a mut Vector<T, S>,
    comm: &C,
    tag: CommTag,
    direction: Direction,
) -> Result<ExchangeGuard<'a, T, S, C>, ParVecError>
where
    T: Scalar,
    S: VectorStorage<T>,
    C: Communicator,
{
    let plan = vec.partition.plan();
    let local_size = vec.partition.local_size();

    // Receive counts and send sources swap between the two directions.
    let (recv_len, send_src): (Vec<usize>, Vec<Vec<usize>>) = match direction {
        Direction::GhostUpdate => (
            plan.links().iter().map(|l| l.ghost_slots.len()).collect(),
            plan.links().iter().map(|l| l.export_locals.clone()).collect(),
        ),
        Direction::CompressAdd => (
            plan.links().iter().map(|l| l.export_locals.len()).collect(),
            plan.links()
                .iter()
                .map(|l| l.ghost_slots.iter().map(|&s| local_size + s).collect())
                .collect(),
        ),
        Direction::Noop => (Vec::new(), Vec::new()),
    };

    let mut recvs = Vec::new();
    for (link_idx, (&n, link)) in recv_len.iter().zip(plan.links()).enumerate() {
        if n == 0 {
            continue;
        }
        let mut buf = vec![0u8; n * std::mem::size_of::<T>()];
        let h = comm.irecv(link.rank, tag.base(), &mut buf);
        recvs.push((link_idx, h, n, buf));
    }

    // A rank without live accumulate writes still participates in the
    // add-exchange, but contributes zeros: its ghost slots may hold snapshot
    // copies from an earlier update, and adding those would double-count.
    let live = match direction {
        Direction::CompressAdd => vec.state.has_pending_adds(),
        _ => true,
    };
    let packed: Vec<(usize, Vec<T>)> = vec.storage.with_slice(|buf| {
        send_src
            .iter()
            .enumerate()
            .filter(|(_, src)| !src.is_empty())
            .map(|(link_idx, src)| {
                let vals = src
                    .iter()
                    .map(|&i| if live { buf[i] } else { T::zero() })
                    .collect();
                (link_idx, vals)
            })
            .collect()
    })?;
    let mut sends = Vec::with_capacity(packed.len());
    for (link_idx, vals) in &packed {
        let peer = plan.links()[*link_idx].rank;
        trace!("sending {} vector entries to rank {peer}", vals.len());
        sends.push(comm.isend(peer, tag.base(), cast_slice(vals)));
    }

    Ok(ExchangeGuard {
        vec,
        direction,
        recvs,
        sends,
        verify_snapshot: None,
    })
}
