//! Compress state machine: tracks ghost/owner consistency and enforces
//! legal insert/add transitions.
//!
//! Owned data is always immediately visible locally; only ghost consistency
//! is tracked. The states follow the write history since the last compress:
//! `Writable` (owned writes only), `AddMode`/`SetMode` (uncompressed ghost
//! writes of one flavor), `Compressed` (ghosts consistent with owners).

use serde::{Deserialize, Serialize};

use crate::error::ParVecError;

/// How a write into a ghost slot combines with the owner's value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum WriteMode {
    /// Overwrite; reconciled by `compress(Insert)`.
    Insert,
    /// Accumulate; reconciled by `compress(Add)`.
    Add,
}

/// Reconciliation policy requested from `compress`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CompressMode {
    /// Redistribute authoritative owner values to all ghost copies.
    Insert,
    /// Sum ghost contributions into the owners, then zero the ghosts.
    Add,
}

/// Consistency state of one vector instance.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum CompressState {
    /// No partition attached yet; every operation except `reinit` fails.
    #[default]
    Uninitialized,
    /// Only owned entries written since the last compress.
    Writable,
    /// Ghost slots hold uncompressed accumulate contributions.
    AddMode,
    /// Ghost slots hold uncompressed overwrite values.
    SetMode,
    /// Ghost slots are a consistent snapshot of their owners.
    Compressed,
}

impl CompressState {
    /// Record a write to an owned entry. Owned writes are always legal on an
    /// initialized vector; a `Compressed` vector degrades to `Writable`
    /// because its ghosts may now disagree with the rewritten owner value.
    pub fn record_owned_write(&mut self) -> Result<(), ParVecError> {
        match *self {
            CompressState::Uninitialized => Err(ParVecError::Uninitialized),
            CompressState::Compressed => {
                *self = CompressState::Writable;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Record a write to a ghost slot. Mixing insert and add without an
    /// intervening compress is a usage error.
    pub fn record_ghost_write(&mut self, mode: WriteMode) -> Result<(), ParVecError> {
        let target = match mode {
            WriteMode::Insert => CompressState::SetMode,
            WriteMode::Add => CompressState::AddMode,
        };
        match *self {
            CompressState::Uninitialized => Err(ParVecError::Uninitialized),
            CompressState::Writable => {
                *self = target;
                Ok(())
            }
            CompressState::Compressed => {
                #[cfg(any(debug_assertions, feature = "check-invariants"))]
                if mode == WriteMode::Add {
                    log::warn!(
                        "accumulating into ghost slots that may still hold owner \
                         snapshots; call zero_out_ghost_values before assembly"
                    );
                }
                *self = target;
                Ok(())
            }
            s if s == target => Ok(()),
            _ => Err(ParVecError::MixedWriteMode),
        }
    }

    /// Check that `compress(mode)` is legal from the current state.
    pub fn check_compress(&self, mode: CompressMode) -> Result<(), ParVecError> {
        match (*self, mode) {
            (CompressState::Uninitialized, _) => Err(ParVecError::Uninitialized),
            (CompressState::AddMode, CompressMode::Insert) => {
                Err(ParVecError::CompressModeMismatch {
                    requested: CompressMode::Insert,
                    pending: CompressMode::Add,
                })
            }
            (CompressState::SetMode, CompressMode::Add) => {
                Err(ParVecError::CompressModeMismatch {
                    requested: CompressMode::Add,
                    pending: CompressMode::Insert,
                })
            }
            _ => Ok(()),
        }
    }

    /// Whether ghost slots hold live accumulate contributions.
    ///
    /// Compress is collective, so a rank in `Writable` still runs the
    /// add-exchange (its neighbors may have contributions for it); when this
    /// returns false it contributes zeros, so snapshot ghosts left by an
    /// earlier update are never double-counted.
    #[inline]
    pub fn has_pending_adds(&self) -> bool {
        *self == CompressState::AddMode
    }

    /// Whether reading a ghost slot now returns a pre-exchange value.
    #[inline]
    pub fn ghost_read_is_stale(&self) -> bool {
        matches!(*self, CompressState::AddMode | CompressState::SetMode)
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        *self != CompressState::Uninitialized
    }

    /// Transition after a completed compress or ghost update.
    pub fn mark_compressed(&mut self) {
        *self = CompressState::Compressed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_writes_keep_writable() {
        let mut s = CompressState::Writable;
        s.record_owned_write().unwrap();
        assert_eq!(s, CompressState::Writable);
        let mut s = CompressState::Compressed;
        s.record_owned_write().unwrap();
        assert_eq!(s, CompressState::Writable);
    }

    #[test]
    fn ghost_writes_set_the_mode() {
        let mut s = CompressState::Writable;
        s.record_ghost_write(WriteMode::Add).unwrap();
        assert_eq!(s, CompressState::AddMode);
        s.record_ghost_write(WriteMode::Add).unwrap();
        assert_eq!(s, CompressState::AddMode);
    }

    #[test]
    fn compressed_ghost_writes_still_transition() {
        let mut s = CompressState::Compressed;
        s.record_ghost_write(WriteMode::Add).unwrap();
        assert_eq!(s, CompressState::AddMode);
        let mut s = CompressState::Compressed;
        s.record_ghost_write(WriteMode::Insert).unwrap();
        assert_eq!(s, CompressState::SetMode);
    }

    #[test]
    fn mixing_modes_is_an_error() {
        let mut s = CompressState::Writable;
        s.record_ghost_write(WriteMode::Insert).unwrap();
        assert!(matches!(
            s.record_ghost_write(WriteMode::Add),
            Err(ParVecError::MixedWriteMode)
        ));
    }

    #[test]
    fn compress_mode_mismatch() {
        let mut s = CompressState::Writable;
        s.record_ghost_write(WriteMode::Add).unwrap();
        assert!(matches!(
            s.check_compress(CompressMode::Insert),
            Err(ParVecError::CompressModeMismatch { .. })
        ));
        assert!(s.check_compress(CompressMode::Add).is_ok());
    }

    #[test]
    fn pending_adds_only_in_add_mode() {
        assert!(CompressState::AddMode.has_pending_adds());
        assert!(!CompressState::Writable.has_pending_adds());
        assert!(!CompressState::SetMode.has_pending_adds());
        assert!(!CompressState::Compressed.has_pending_adds());
    }

    #[test]
    fn uninitialized_rejects_everything() {
        let mut s = CompressState::Uninitialized;
        assert!(matches!(
            s.record_owned_write(),
            Err(ParVecError::Uninitialized)
        ));
        assert!(matches!(
            s.check_compress(CompressMode::Add),
            Err(ParVecError::Uninitialized)
        ));
    }

    #[test]
    fn staleness_tracking() {
        assert!(CompressState::AddMode.ghost_read_is_stale());
        assert!(CompressState::SetMode.ghost_read_is_stale());
        assert!(!CompressState::Compressed.ghost_read_is_stale());
        assert!(!CompressState::Writable.ghost_read_is_stale());
    }
}
