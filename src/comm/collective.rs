//! Small collectives built from symmetric point-to-point exchange.
//!
//! Every rank posts all receives first, then all sends, then waits. All send
//! handles are drained before returning, even when a receive failed, so no
//! handle outlives its buffer.

use std::ops::Range;

use crate::comm::wire::{cast_slice, cast_slice_from, WireRange};
use crate::comm::{CommTag, Communicator, Wait};
use crate::error::ParVecError;

/// All-gather of per-rank owned ranges, used during partition assembly.
///
/// Returns `n_ranks` ranges indexed by rank; the caller's own entry is filled
/// locally without touching the transport.
pub fn all_gather_ranges<C: Communicator>(
    local: Range<u64>,
    comm: &C,
    rank: usize,
    n_ranks: usize,
    tag: CommTag,
) -> Result<Vec<Range<u64>>, ParVecError> {
    let mut ranges = vec![0..0u64; n_ranks];
    ranges[rank] = local.clone();
    if n_ranks == 1 {
        return Ok(ranges);
    }

    let mut recvs = Vec::with_capacity(n_ranks - 1);
    for peer in (0..n_ranks).filter(|&p| p != rank) {
        let mut buf = [0u8; std::mem::size_of::<WireRange>()];
        let h = comm.irecv(peer, tag.base(), &mut buf);
        recvs.push((peer, h, buf));
    }

    let wire = WireRange::of(local.start, local.end);
    let mut sends = Vec::with_capacity(n_ranks - 1);
    for peer in (0..n_ranks).filter(|&p| p != rank) {
        sends.push(comm.isend(peer, tag.base(), cast_slice(std::slice::from_ref(&wire))));
    }

    let mut maybe_err = None;
    for (peer, h, _buf) in recvs {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<WireRange>() => {
                let r: &[WireRange] = cast_slice_from(&data);
                ranges[peer] = r[0].begin()..r[0].end();
            }
            Some(data) => {
                if maybe_err.is_none() {
                    maybe_err = Some(ParVecError::comm(
                        peer,
                        format!(
                            "expected {} bytes for owned range, got {}",
                            std::mem::size_of::<WireRange>(),
                            data.len()
                        ),
                    ));
                }
            }
            None => {
                if maybe_err.is_none() {
                    maybe_err = Some(ParVecError::comm(
                        peer,
                        format!("failed to receive owned range from rank {peer}"),
                    ));
                }
            }
        }
    }
    for s in sends {
        let _ = s.wait();
    }
    match maybe_err {
        Some(err) => Err(err),
        None => Ok(ranges),
    }
}

/// All-reduce of a single Pod partial by summation.
///
/// Collective: every rank contributes its partial and receives the full sum.
pub fn all_reduce_sum<T, C>(
    partial: T,
    comm: &C,
    rank: usize,
    n_ranks: usize,
    tag: CommTag,
) -> Result<T, ParVecError>
where
    T: bytemuck::Pod + Copy + std::ops::AddAssign,
    C: Communicator,
{
    let mut sum = partial;
    if n_ranks == 1 {
        return Ok(sum);
    }

    let mut recvs = Vec::with_capacity(n_ranks - 1);
    for peer in (0..n_ranks).filter(|&p| p != rank) {
        let mut buf = vec![0u8; std::mem::size_of::<T>()];
        let h = comm.irecv(peer, tag.base(), &mut buf);
        recvs.push((peer, h, buf));
    }

    let mut sends = Vec::with_capacity(n_ranks - 1);
    for peer in (0..n_ranks).filter(|&p| p != rank) {
        sends.push(comm.isend(peer, tag.base(), cast_slice(std::slice::from_ref(&partial))));
    }

    let mut maybe_err = None;
    for (peer, h, _buf) in recvs {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<T>() => {
                let vals: &[T] = cast_slice_from(&data);
                sum += vals[0];
            }
            Some(data) => {
                if maybe_err.is_none() {
                    maybe_err = Some(ParVecError::comm(
                        peer,
                        format!(
                            "expected {} bytes for reduction partial, got {}",
                            std::mem::size_of::<T>(),
                            data.len()
                        ),
                    ));
                }
            }
            None => {
                if maybe_err.is_none() {
                    maybe_err = Some(ParVecError::comm(
                        peer,
                        format!("failed to receive reduction partial from rank {peer}"),
                    ));
                }
            }
        }
    }
    for s in sends {
        let _ = s.wait();
    }
    match maybe_err {
        Some(err) => Err(err),
        None => Ok(sum),
    }
}

/// All-reduce by maximum, used for the infinity norm.
pub fn all_reduce_max<T, C>(
    partial: T,
    comm: &C,
    rank: usize,
    n_ranks: usize,
    tag: CommTag,
) -> Result<T, ParVecError>
where
    T: bytemuck::Pod + Copy + PartialOrd,
    C: Communicator,
{
    let mut best = partial;
    if n_ranks == 1 {
        return Ok(best);
    }

    let mut recvs = Vec::with_capacity(n_ranks - 1);
    for peer in (0..n_ranks).filter(|&p| p != rank) {
        let mut buf = vec![0u8; std::mem::size_of::<T>()];
        let h = comm.irecv(peer, tag.base(), &mut buf);
        recvs.push((peer, h, buf));
    }
    let mut sends = Vec::with_capacity(n_ranks - 1);
    for peer in (0..n_ranks).filter(|&p| p != rank) {
        sends.push(comm.isend(peer, tag.base(), cast_slice(std::slice::from_ref(&partial))));
    }

    let mut maybe_err = None;
    for (peer, h, _buf) in recvs {
        match h.wait() {
            Some(data) if data.len() == std::mem::size_of::<T>() => {
                let vals: &[T] = cast_slice_from(&data);
                if vals[0] > best {
                    best = vals[0];
                }
            }
            _ => {
                if maybe_err.is_none() {
                    maybe_err = Some(ParVecError::comm(
                        peer,
                        format!("failed to receive reduction partial from rank {peer}"),
                    ));
                }
            }
        }
    }
    for s in sends {
        let _ = s.wait();
    }
    match maybe_err {
        Some(err) => Err(err),
        None => Ok(best),
    }
}
