//! Shared helpers for multi-rank integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use parvec::prelude::*;

/// Run `f` once per rank, each on its own thread with an in-process
/// communicator over a two-rank group. A panic in either rank fails the
/// test.
pub fn run_two_ranks<F>(f: F)
where
    F: Fn(usize, ThreadComm) + Send + Sync + Copy + 'static,
{
    let _ = env_logger::builder().is_test(true).try_init();
    let handles: Vec<_> = (0..2usize)
        .map(|rank| std::thread::spawn(move || f(rank, ThreadComm::new(rank, 2))))
        .collect();
    for h in handles {
        h.join().expect("rank panicked");
    }
}

/// Two-rank layout used across the exchange tests: rank 0 owns `[0, 5)` and
/// ghosts global index 5, rank 1 owns `[5, 10)` and ghosts global index 4.
pub fn two_rank_partition(rank: usize, comm: &ThreadComm) -> Arc<Partition> {
    let (range, ghosts) = if rank == 0 {
        (0..5, vec![5])
    } else {
        (5..10, vec![4])
    };
    Arc::new(Partition::assemble(10, range, ghosts, comm, rank, 2).unwrap())
}
