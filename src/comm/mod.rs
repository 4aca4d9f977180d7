//! Thin facade over the message-passing transport the vector core consumes.
//!
//! Messages are contiguous byte slices; all handles are waitable but
//! non-blocking. The exchange engine calls `.wait()` before it trusts that a
//! buffer is ready. The core never selects or configures a transport — it
//! only calls these primitives.

pub mod collective;
pub mod wire;

use bytes::Bytes;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Non-blocking communication interface (minimal by design).
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

/// Typed communication tag with deterministic per-phase offsets.
///
/// Each collective phase of the crate uses its own tag so that overlapping
/// exchanges on the same communicator never cross-match.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CommTag(pub u16);

impl CommTag {
    #[inline]
    pub const fn new(base: u16) -> Self {
        Self(base)
    }
    #[inline]
    pub const fn base(self) -> u16 {
        self.0
    }
    #[inline]
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

/// Tags reserved by partition assembly and the exchange engine.
pub mod tags {
    use super::CommTag;

    /// All-gather of owned ranges during partition assembly.
    pub const RANGE_GATHER: CommTag = CommTag::new(0x5100);
    /// Ghost request counts, then request index lists.
    pub const GHOST_REQUESTS: CommTag = CommTag::new(0x5110);
    /// Owner-to-ghost value broadcast.
    pub const GHOST_UPDATE: CommTag = CommTag::new(0x5120);
    /// Ghost-to-owner accumulation.
    pub const COMPRESS_ADD: CommTag = CommTag::new(0x5130);
    /// Scalar reductions (dot, norms).
    pub const REDUCE: CommTag = CommTag::new(0x5140);
}

/// Compile-time no-op comm for pure serial use.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
}

// --- ThreadComm: intra-process rank simulation over a shared mailbox ---

type Key = (usize, usize, u16); // (src, dst, tag)

// FIFO per (src, dst, tag) so repeated messages on one tag keep their order.
static MAILBOX: Lazy<DashMap<Key, VecDeque<Bytes>>> = Lazy::new(DashMap::new);

pub struct LocalHandle {
    buf: Arc<Mutex<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<()>>,
}

impl Wait for LocalHandle {
    fn wait(mut self) -> Option<Vec<u8>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let mut guard = self.buf.lock().unwrap();
        guard.take()
    }
}

/// In-process communicator: each "rank" is a thread sharing one mailbox.
///
/// Used by multi-rank unit tests and single-machine runs without MPI.
#[derive(Clone, Debug)]
pub struct ThreadComm {
    rank: usize,
    n_ranks: usize,
}

impl ThreadComm {
    pub fn new(rank: usize, n_ranks: usize) -> Self {
        Self { rank, n_ranks }
    }
    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }
    #[inline]
    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        MAILBOX
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> LocalHandle {
        let key = (peer, self.rank, tag);
        let slot = Arc::new(Mutex::new(None));
        let slot_clone = Arc::clone(&slot);
        let want = buf.len();
        let handle = std::thread::spawn(move || loop {
            let msg = MAILBOX.get_mut(&key).and_then(|mut q| q.pop_front());
            if let Some(bytes) = msg {
                let n = want.min(bytes.len());
                *slot_clone.lock().unwrap() = Some(bytes[..n].to_vec());
                break;
            }
            std::thread::yield_now();
        });
        LocalHandle {
            buf: slot,
            handle: Some(handle),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---

#[cfg(feature = "mpi-support")]
mod mpi_backend {
    // `Wait` only; mpi::traits also exports a `Communicator`.
    use super::Wait;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// MPI-backed communicator over `MPI_COMM_WORLD`.
    ///
    /// `isend` performs a standard-mode send eagerly; `irecv` is lazy and the
    /// matching blocking receive runs inside `wait`. The exchange engine
    /// always posts every receive before waiting on any of them, which keeps
    /// the symmetric phases deadlock-free for eager-protocol message sizes.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        n_ranks: usize,
    }

    impl MpiComm {
        /// Wrap an already-initialized MPI world.
        pub fn from_world(world: SimpleCommunicator) -> Self {
            let rank = world.rank() as usize;
            let n_ranks = world.size() as usize;
            Self {
                world,
                rank,
                n_ranks,
            }
        }
        #[inline]
        pub fn rank(&self) -> usize {
            self.rank
        }
        #[inline]
        pub fn n_ranks(&self) -> usize {
            self.n_ranks
        }
    }

    pub struct MpiRecvHandle {
        world: SimpleCommunicator,
        peer: usize,
        tag: u16,
        len: usize,
    }

    impl Wait for MpiRecvHandle {
        fn wait(self) -> Option<Vec<u8>> {
            let mut buf = vec![0u8; self.len];
            let _status = self
                .world
                .process_at_rank(self.peer as i32)
                .receive_into_with_tag(&mut buf[..], self.tag as i32);
            Some(buf)
        }
    }

    impl super::Communicator for MpiComm {
        type SendHandle = ();
        type RecvHandle = MpiRecvHandle;

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiRecvHandle {
            MpiRecvHandle {
                world: self.world.duplicate(),
                peer,
                tag,
                len: buf.len(),
            }
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
