mod util;

use parvec::prelude::*;
use serial_test::serial;
use util::{run_two_ranks, two_rank_partition};

#[test]
#[serial]
fn import_carries_values_ghosts_and_state() {
    run_two_ranks(|rank, comm| {
        let p = two_rank_partition(rank, &comm);
        let mut src = Vector::<f64>::new(p.clone()).unwrap();
        let range = src.partition().local_range();
        for g in range {
            src.set(g, g as f64).unwrap();
        }
        src.update_ghost_values(&comm).unwrap();

        let mut dst = Vector::<f64>::new(p).unwrap();
        dst.import_elements(&src).unwrap();
        assert_eq!(dst.as_slice(), src.as_slice());
        assert_eq!(dst.state(), src.state());
    });
}

#[test]
#[serial]
fn import_and_compress_reconciles_pending_ghost_writes() {
    run_two_ranks(|rank, comm| {
        let p = two_rank_partition(rank, &comm);
        let mut src = Vector::<f64>::new(p.clone()).unwrap();
        let ghost = if rank == 0 { 5 } else { 4 };
        src.add(ghost, 1.5).unwrap();

        let mut dst = Vector::<f64>::new(p).unwrap();
        dst.import_elements_and_compress(&src, CompressMode::Add, &comm)
            .unwrap();
        let owned_target = if rank == 0 { 4 } else { 5 };
        assert_eq!(dst.get(owned_target).unwrap(), 1.5);
        assert_eq!(dst.get(ghost).unwrap(), 0.0);
    });
}
