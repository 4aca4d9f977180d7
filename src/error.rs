//! ParVecError: unified error type for parvec public APIs.
//!
//! Every fallible operation in the crate reports through this enum so that
//! callers get robust, non-panicking error handling across partition
//! construction, ghost exchange, and vector arithmetic.

use thiserror::Error;

/// Unified error type for parvec operations.
#[derive(Debug, Error)]
pub enum ParVecError {
    /// The union of all ranks' owned ranges does not tile `[0, global_size)`.
    #[error(
        "owned ranges do not tile [0, {global_size}): rank {rank} owns [{begin}, {end}) but expected begin {expected}"
    )]
    PartitionTiling {
        rank: usize,
        begin: u64,
        end: u64,
        expected: u64,
        global_size: u64,
    },
    /// A requested ghost index is not owned by any rank.
    #[error("ghost index {0} is owned by no rank")]
    GhostNotOwned(u64),
    /// A requested ghost index falls inside this rank's own range.
    #[error("ghost index {0} lies in the locally owned range")]
    GhostInLocalRange(u64),
    /// Ghost index list contains a duplicate.
    #[error("ghost index {0} requested more than once")]
    DuplicateGhost(u64),
    /// Two vectors expected to share a partition do not.
    #[error("partition mismatch: global sizes {0} vs {1}")]
    PartitionMismatch(u64, u64),
    /// Ghost writes mixed insert and add without an intervening compress.
    #[error("mixed insert/add ghost writes without an intervening compress")]
    MixedWriteMode,
    /// `compress` called with a mode incompatible with the pending writes.
    #[error("compress({requested:?}) while pending ghost writes require {pending:?}")]
    CompressModeMismatch {
        requested: crate::vector::state::CompressMode,
        pending: crate::vector::state::CompressMode,
    },
    /// Ghost value read before the pending writes were compressed.
    #[error("ghost read at global index {0} before compress; value would be stale")]
    StaleGhostRead(u64),
    /// Operation on a vector that has not been given a partition yet.
    #[error("vector is uninitialized; call reinit first")]
    Uninitialized,
    /// Global index neither owned by nor ghosted on this rank.
    #[error("global index {0} is neither owned nor ghosted on rank {1}")]
    IndexNotLocal(u64, usize),
    /// Slice access outside the storage bounds.
    #[error("slice [{offset}, {offset}+{len}) out of bounds for storage of length {total}")]
    SliceBounds {
        offset: usize,
        len: usize,
        total: usize,
    },
    /// Storage allocation failed in the requested memory space.
    #[error("failed to allocate {elems} elements in {space} memory")]
    StorageAlloc { space: &'static str, elems: usize },
    /// Two storages involved in a transfer have different lengths.
    #[error("storage length mismatch: {0} vs {1}")]
    StorageLenMismatch(usize, usize),
    /// Transport failure while exchanging with a neighbor. Always fatal to
    /// the collective operation; retry policy belongs to the transport.
    #[error("communication with rank {neighbor} failed: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Mapping a device buffer for host access failed.
    #[cfg(feature = "wgpu")]
    #[error("failed to map device buffer for host access")]
    GpuMappingFailed,
}

impl ParVecError {
    /// Shorthand for a [`ParVecError::CommError`] with a string payload.
    pub fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        ParVecError::CommError {
            neighbor,
            source: msg.into().into(),
        }
    }
}
