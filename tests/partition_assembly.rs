mod util;

use parvec::prelude::*;
use proptest::prelude::*;
use serial_test::serial;
use util::{run_two_ranks, two_rank_partition};

#[test]
#[serial]
fn two_rank_assembly_builds_symmetric_plan() {
    run_two_ranks(|rank, comm| {
        let p = two_rank_partition(rank, &comm);
        assert_eq!(p.global_size(), 10);
        assert_eq!(p.local_size(), 5);
        assert_eq!(p.n_ghosts(), 1);
        assert_eq!(p.locally_stored_size(), 6);

        let ghost = if rank == 0 { 5 } else { 4 };
        assert!(p.is_ghost(ghost));
        assert!(!p.is_locally_owned(ghost));
        assert_eq!(p.ghost_slot(ghost), Some(0));

        let links = p.plan().links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].rank, 1 - rank);
        assert_eq!(links[0].ghost_slots, vec![0]);
        if rank == 0 {
            assert_eq!(p.ghost_indices(), &[5]);
            assert_eq!(p.ghost_owner(0), 1);
            // rank 1 reads our index 4
            assert_eq!(links[0].export_locals, vec![4]);
            assert_eq!(p.global_to_local(5), Some(5));
            assert_eq!(p.local_to_global(5), Some(5));
        } else {
            assert_eq!(p.ghost_indices(), &[4]);
            assert_eq!(p.ghost_owner(0), 0);
            // rank 0 reads our index 5, local slot 0
            assert_eq!(links[0].export_locals, vec![0]);
            assert_eq!(p.global_to_local(4), Some(5));
            assert_eq!(p.global_to_local(5), Some(0));
        }
    });
}

#[test]
#[serial]
fn one_sided_ghosting_still_links_both_ranks() {
    run_two_ranks(|rank, comm| {
        let (range, ghosts) = if rank == 0 {
            (0..5, vec![7])
        } else {
            (5..10, vec![])
        };
        let p = Partition::assemble(10, range, ghosts, &comm, rank, 2).unwrap();
        let links = p.plan().links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].rank, 1 - rank);
        if rank == 0 {
            assert_eq!(links[0].ghost_slots, vec![0]);
            assert!(links[0].export_locals.is_empty());
        } else {
            assert!(links[0].ghost_slots.is_empty());
            assert_eq!(links[0].export_locals, vec![2]);
        }
    });
}

#[test]
#[serial]
fn tiling_gap_fails_on_every_rank() {
    run_two_ranks(|rank, comm| {
        let range = if rank == 0 { 0..4 } else { 5..10 };
        let err = Partition::assemble(10, range, vec![], &comm, rank, 2).unwrap_err();
        assert!(matches!(err, ParVecError::PartitionTiling { .. }));
    });
}

proptest! {
    #[test]
    fn serial_index_mapping_round_trips(n in 1u64..10_000, g in 0u64..10_000) {
        let p = Partition::serial(n);
        if g < n {
            let l = p.global_to_local(g).unwrap();
            prop_assert_eq!(p.local_to_global(l), Some(g));
            prop_assert!(p.is_locally_owned(g));
        } else {
            prop_assert!(p.global_to_local(g).is_none());
        }
    }
}
