#![cfg_attr(docsrs, feature(doc_cfg))]
//! # parvec
//!
//! parvec provides distributed vectors for finite-element and other PDE
//! codes: each rank owns a contiguous slice of a global index space and
//! caches read-mostly copies (ghosts) of a few foreign entries. The crate
//! covers partition construction, owner/ghost exchange with explicit
//! insert/add compress semantics, the usual vector arithmetic and global
//! reductions, and pluggable per-memory-space storage.
//!
//! ## Features
//! - [`Partition`](partition::Partition): collective construction of the
//!   ownership map and the ghost-exchange routing table
//! - [`Vector`](vector::Vector): flat owned-then-ghost storage, a compress
//!   state machine that catches illegal insert/add mixing, and split
//!   start/finish exchange for communication/computation overlap
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!   behind one small [`Communicator`](comm::Communicator) trait
//! - Host storage by default; a wgpu-backed device storage behind the
//!   `wgpu` feature
//!
//! ## Usage
//! Add `parvec` as a dependency in your `Cargo.toml` and enable features as
//! needed:
//!
//! ```toml
//! [dependencies]
//! parvec = "0.1"
//! # Optional features:
//! # features = ["mpi-support", "wgpu", "check-invariants"]
//! ```
//!
//! A typical assembly loop on each rank:
//!
//! ```ignore
//! let partition = Arc::new(Partition::assemble(n, my_range, my_ghosts, &comm, rank, n_ranks)?);
//! let mut v = Vector::<f64>::new(partition)?;
//! v.scatter(&cell_contributions, WriteMode::Add)?;
//! v.compress(CompressMode::Add, &comm)?;
//! v.update_ghost_values(&comm)?;
//! ```

pub mod comm;
pub mod error;
pub mod partition;
pub mod storage;
pub mod vector;

pub use error::ParVecError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::comm::{CommTag, Communicator, NoComm, ThreadComm, Wait};
    pub use crate::error::ParVecError;
    pub use crate::partition::plan::{ExchangePlan, NeighborLinks};
    pub use crate::partition::Partition;
    pub use crate::storage::{transfer, AllocStorage, HostStorage, VectorStorage};
    pub use crate::vector::state::{CompressMode, CompressState, WriteMode};
    pub use crate::vector::{Scalar, Vector};

    #[cfg(feature = "mpi-support")]
    #[cfg_attr(docsrs, doc(cfg(feature = "mpi-support")))]
    pub use crate::comm::MpiComm;

    #[cfg(feature = "wgpu")]
    #[cfg_attr(docsrs, doc(cfg(feature = "wgpu")))]
    pub use crate::storage::device::DeviceStorage;
}
