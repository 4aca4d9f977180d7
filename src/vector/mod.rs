//! Vector facade: distributed field data over a shared partition.
//!
//! A `Vector<T, S>` stores its rank's owned entries followed by its ghost
//! entries in one flat storage buffer, tracks ghost/owner consistency with a
//! [`CompressState`], and exposes the arithmetic that assembly and solver
//! code consume. The memory space is the static storage parameter `S`;
//! crossing spaces goes through [`import_elements`](Vector::import_elements).

pub mod exchange;
pub mod state;

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use num_traits::{Float, NumCast, One, Zero};

use crate::comm::collective::{all_reduce_max, all_reduce_sum};
use crate::comm::{tags, Communicator};
use crate::error::ParVecError;
use crate::partition::Partition;
use crate::storage::{transfer, AllocStorage, HostStorage, VectorStorage};
use state::{CompressMode, CompressState, WriteMode};

/// Scalar element of a distributed vector.
///
/// Real and complex floating-point types at any precision fit this trait;
/// the choice is made at instantiation time, never by a runtime tag. `conj`
/// and `abs_sq` are threaded through inner products and norms so a complex
/// implementation needs no changes elsewhere.
pub trait Scalar:
    Copy
    + Default
    + PartialEq
    + Debug
    + bytemuck::Pod
    + num_traits::NumAssign
    + Send
    + Sync
    + 'static
{
    /// Underlying real type (`Self` for real scalars). `NumAssign` is
    /// required so real partials can feed the reduction collectives.
    type Real: Float + num_traits::NumAssign + bytemuck::Pod + Debug + Send + Sync + 'static;

    /// Complex conjugate; identity for real scalars.
    fn conj(self) -> Self;
    /// Squared modulus, as a real number.
    fn abs_sq(self) -> Self::Real;
    /// Modulus, as a real number.
    fn modulus(self) -> Self::Real;
    /// Embed a real number.
    fn from_real(r: Self::Real) -> Self;
}

impl Scalar for f32 {
    type Real = f32;
    #[inline]
    fn conj(self) -> Self {
        self
    }
    #[inline]
    fn abs_sq(self) -> f32 {
        self * self
    }
    #[inline]
    fn modulus(self) -> f32 {
        self.abs()
    }
    #[inline]
    fn from_real(r: f32) -> Self {
        r
    }
}

impl Scalar for f64 {
    type Real = f64;
    #[inline]
    fn conj(self) -> Self {
        self
    }
    #[inline]
    fn abs_sq(self) -> f64 {
        self * self
    }
    #[inline]
    fn modulus(self) -> f64 {
        self.abs()
    }
    #[inline]
    fn from_real(r: f64) -> Self {
        r
    }
}

/// Distributed vector over a shared [`Partition`].
///
/// Owned entries occupy local slots `[0, local_size)`, ghost entries
/// `[local_size, local_size + n_ghosts)` in the partition's ghost order.
/// One vector instance belongs to one caller thread; the partition is the
/// only piece shared between vectors.
#[derive(Debug)]
pub struct Vector<T: Scalar, S: VectorStorage<T> = HostStorage<T>> {
    partition: Arc<Partition>,
    storage: S,
    state: CompressState,
    /// Ghost slots written in insert mode since the last compress; used for
    /// owner-wins divergence warnings.
    touched_set_ghosts: Vec<usize>,
    _pd: PhantomData<T>,
}

impl<T: Scalar, S: VectorStorage<T> + AllocStorage<T>> Vector<T, S> {
    /// Create a zeroed vector over `partition`.
    pub fn new(partition: Arc<Partition>) -> Result<Self, ParVecError> {
        let storage = S::allocate(partition.locally_stored_size())?;
        Ok(Self {
            partition,
            storage,
            state: CompressState::Writable,
            touched_set_ghosts: Vec::new(),
            _pd: PhantomData,
        })
    }

    /// An unattached vector; every operation except
    /// [`reinit`](Self::reinit) fails with [`ParVecError::Uninitialized`].
    pub fn unattached() -> Result<Self, ParVecError> {
        Ok(Self {
            partition: Arc::new(Partition::serial(0)),
            storage: S::allocate(0)?,
            state: CompressState::Uninitialized,
            touched_set_ghosts: Vec::new(),
            _pd: PhantomData,
        })
    }

    /// Replace the active partition, reallocating and zeroing the buffer.
    /// The vector no longer aliases any data of its previous partition.
    pub fn reinit(&mut self, partition: Arc<Partition>) -> Result<(), ParVecError> {
        self.storage = S::allocate(partition.locally_stored_size())?;
        self.partition = partition;
        self.state = CompressState::Writable;
        self.touched_set_ghosts.clear();
        Ok(())
    }

    /// Re-attach to a partition with the same owned range but a different
    /// ghost set: owned values survive, the ghost region is resized, zeroed,
    /// and must be re-fetched via ghost exchange.
    pub fn reinit_keep_owned(&mut self, partition: Arc<Partition>) -> Result<(), ParVecError> {
        if partition.local_range() != self.partition.local_range()
            || partition.global_size() != self.partition.global_size()
        {
            return Err(ParVecError::PartitionMismatch(
                self.partition.global_size(),
                partition.global_size(),
            ));
        }
        self.storage.resize(partition.locally_stored_size())?;
        let local_size = partition.local_size();
        if partition.n_ghosts() > 0 {
            self.storage
                .write_slice(local_size, &vec![T::zero(); partition.n_ghosts()])?;
        }
        self.partition = partition;
        self.state = CompressState::Writable;
        self.touched_set_ghosts.clear();
        Ok(())
    }
}

impl<T: Scalar> Vector<T, HostStorage<T>> {
    /// Single-rank convenience constructor: owns `[0, n)`, no ghosts.
    pub fn serial(n: u64) -> Result<Self, ParVecError> {
        Self::new(Arc::new(Partition::serial(n)))
    }

    /// Direct read-only view of the full host buffer (owned then ghosts).
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        self.storage.as_slice()
    }

    /// Direct mutable view of the full host buffer. Writes through this
    /// view bypass compress-state tracking; callers own the consistency.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.storage.as_mut_slice()
    }
}

impl<T: Scalar, S: VectorStorage<T>> Vector<T, S> {
    /// Wrap an existing storage (e.g. a device buffer) over `partition`.
    pub fn from_storage(partition: Arc<Partition>, storage: S) -> Result<Self, ParVecError> {
        if storage.total_len() != partition.locally_stored_size() {
            return Err(ParVecError::StorageLenMismatch(
                storage.total_len(),
                partition.locally_stored_size(),
            ));
        }
        Ok(Self {
            partition,
            storage,
            state: CompressState::Writable,
            touched_set_ghosts: Vec::new(),
            _pd: PhantomData,
        })
    }

    #[inline]
    pub fn partition(&self) -> &Arc<Partition> {
        &self.partition
    }

    #[inline]
    pub fn local_size(&self) -> usize {
        self.partition.local_size()
    }

    #[inline]
    pub fn global_size(&self) -> u64 {
        self.partition.global_size()
    }

    #[inline]
    pub fn has_ghost_elements(&self) -> bool {
        self.partition.n_ghosts() > 0
    }

    #[inline]
    pub fn state(&self) -> CompressState {
        self.state
    }

    /// Value at global index `g` (owned or ghost).
    ///
    /// Reading a ghost while an uncompressed insert/add write is pending
    /// fails with [`ParVecError::StaleGhostRead`] in debug builds (or with
    /// the `check-invariants` feature); release builds return the
    /// pre-exchange value.
    pub fn get(&self, g: u64) -> Result<T, ParVecError> {
        if !self.state.is_initialized() {
            return Err(ParVecError::Uninitialized);
        }
        let l = self
            .partition
            .global_to_local(g)
            .ok_or(ParVecError::IndexNotLocal(g, self.partition.rank()))?;
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if l >= self.local_size() && self.state.ghost_read_is_stale() {
            return Err(ParVecError::StaleGhostRead(g));
        }
        Ok(self.storage.read_slice(l, 1)?[0])
    }

    /// Overwrite the entry at global index `g` (owned or ghost).
    /// Ghost writes must be reconciled with `compress(Insert)`.
    pub fn set(&mut self, g: u64, v: T) -> Result<(), ParVecError> {
        self.write(g, v, WriteMode::Insert)
    }

    /// Accumulate into the entry at global index `g` (owned or ghost).
    /// Ghost writes must be reconciled with `compress(Add)`.
    pub fn add(&mut self, g: u64, v: T) -> Result<(), ParVecError> {
        self.write(g, v, WriteMode::Add)
    }

    /// Scatter per-cell contributions into global slots, owned or ghost,
    /// in one write mode. This is the assembly entry point.
    pub fn scatter(&mut self, contributions: &[(u64, T)], mode: WriteMode) -> Result<(), ParVecError> {
        for &(g, v) in contributions {
            self.write(g, v, mode)?;
        }
        Ok(())
    }

    fn write(&mut self, g: u64, v: T, mode: WriteMode) -> Result<(), ParVecError> {
        if !self.state.is_initialized() {
            return Err(ParVecError::Uninitialized);
        }
        let l = self
            .partition
            .global_to_local(g)
            .ok_or(ParVecError::IndexNotLocal(g, self.partition.rank()))?;
        if l < self.local_size() {
            self.state.record_owned_write()?;
        } else {
            self.state.record_ghost_write(mode)?;
            if mode == WriteMode::Insert {
                self.touched_set_ghosts.push(l - self.local_size());
            }
        }
        match mode {
            WriteMode::Insert => self.storage.write_slice(l, std::slice::from_ref(&v)),
            WriteMode::Add => {
                let old = self.storage.read_slice(l, 1)?[0];
                let new = old + v;
                self.storage.write_slice(l, std::slice::from_ref(&new))
            }
        }
    }

    /// Value at local slot `l` (owned entries first, then ghosts).
    pub fn local_element(&self, l: usize) -> Result<T, ParVecError> {
        Ok(self.storage.read_slice(l, 1)?[0])
    }

    /// Overwrite local slot `l`. Ghost slots go through the same insert
    /// tracking as [`set`](Self::set), so a pending accumulate is not
    /// silently mixed with an overwrite.
    pub fn set_local_element(&mut self, l: usize, v: T) -> Result<(), ParVecError> {
        if l < self.local_size() {
            self.state.record_owned_write()?;
        } else {
            self.state.record_ghost_write(WriteMode::Insert)?;
            self.touched_set_ghosts.push(l - self.local_size());
        }
        self.storage.write_slice(l, std::slice::from_ref(&v))
    }

    /// Set every entry (owned and ghost) to `v`.
    pub fn set_all(&mut self, v: T) -> Result<(), ParVecError> {
        if !self.state.is_initialized() {
            return Err(ParVecError::Uninitialized);
        }
        self.storage.fill(v)?;
        self.state = CompressState::Writable;
        self.touched_set_ghosts.clear();
        Ok(())
    }

    /// Zero the ghost region. Ghosts are stale afterwards until the next
    /// ghost update, so the vector drops back to `Writable`.
    pub fn zero_out_ghost_values(&mut self) -> Result<(), ParVecError> {
        let local_size = self.local_size();
        let n_ghosts = self.partition.n_ghosts();
        if n_ghosts > 0 {
            self.storage
                .write_slice(local_size, &vec![T::zero(); n_ghosts])?;
        }
        self.state = CompressState::Writable;
        self.touched_set_ghosts.clear();
        Ok(())
    }

    /// `self *= a`, element-wise over owned and ghost regions alike.
    pub fn scale(&mut self, a: T) -> Result<(), ParVecError> {
        if !self.state.is_initialized() {
            return Err(ParVecError::Uninitialized);
        }
        self.storage.with_slice_mut(|s| {
            for x in s.iter_mut() {
                *x *= a;
            }
        })
    }

    /// `self += a * x`, element-wise over owned and ghost regions alike, so
    /// assembly code can combine vectors without losing ghost contributions.
    pub fn add_scaled<S2: VectorStorage<T>>(
        &mut self,
        a: T,
        x: &Vector<T, S2>,
    ) -> Result<(), ParVecError> {
        self.partition.ensure_compatible(&x.partition)?;
        let xs = x.storage.read_slice(0, x.storage.total_len())?;
        self.storage.with_slice_mut(|s| {
            for (si, xi) in s.iter_mut().zip(&xs) {
                *si += a * *xi;
            }
        })
    }

    /// `self = s * self + a * x`.
    pub fn sadd<S2: VectorStorage<T>>(
        &mut self,
        s: T,
        a: T,
        x: &Vector<T, S2>,
    ) -> Result<(), ParVecError> {
        self.partition.ensure_compatible(&x.partition)?;
        let xs = x.storage.read_slice(0, x.storage.total_len())?;
        self.storage.with_slice_mut(|buf| {
            for (si, xi) in buf.iter_mut().zip(&xs) {
                *si = s * *si + a * *xi;
            }
        })
    }

    /// `self = a * x`.
    pub fn equ<S2: VectorStorage<T>>(&mut self, a: T, x: &Vector<T, S2>) -> Result<(), ParVecError> {
        self.partition.ensure_compatible(&x.partition)?;
        let xs = x.storage.read_slice(0, x.storage.total_len())?;
        self.storage.with_slice_mut(|buf| {
            for (si, xi) in buf.iter_mut().zip(&xs) {
                *si = a * *xi;
            }
        })?;
        self.state = x.state;
        self.touched_set_ghosts = x.touched_set_ghosts.clone();
        Ok(())
    }

    /// Inner product `conj(self) · other`. Collective; only owned entries
    /// contribute, so ghost copies are never double-counted.
    pub fn dot<S2: VectorStorage<T>, C: Communicator>(
        &self,
        other: &Vector<T, S2>,
        comm: &C,
    ) -> Result<T, ParVecError> {
        self.partition.ensure_compatible(&other.partition)?;
        let n = self.local_size();
        let mine = self.storage.read_slice(0, n)?;
        let theirs = other.storage.read_slice(0, n)?;
        let mut partial = T::zero();
        for (a, b) in mine.iter().zip(&theirs) {
            partial += a.conj() * *b;
        }
        all_reduce_sum(
            partial,
            comm,
            self.partition.rank(),
            self.partition.n_ranks(),
            tags::REDUCE,
        )
    }

    /// Squared l2 norm over owned entries. Collective.
    pub fn norm_sqr<C: Communicator>(&self, comm: &C) -> Result<T::Real, ParVecError> {
        let n = self.local_size();
        let mine = self.storage.read_slice(0, n)?;
        let mut partial = <T::Real as Zero>::zero();
        for a in &mine {
            partial = partial + a.abs_sq();
        }
        all_reduce_sum(
            partial,
            comm,
            self.partition.rank(),
            self.partition.n_ranks(),
            tags::REDUCE,
        )
    }

    /// l2 norm over owned entries. Collective.
    pub fn l2_norm<C: Communicator>(&self, comm: &C) -> Result<T::Real, ParVecError> {
        Ok(self.norm_sqr(comm)?.sqrt())
    }

    /// l1 norm over owned entries. Collective.
    pub fn l1_norm<C: Communicator>(&self, comm: &C) -> Result<T::Real, ParVecError> {
        let n = self.local_size();
        let mine = self.storage.read_slice(0, n)?;
        let mut partial = <T::Real as Zero>::zero();
        for a in &mine {
            partial = partial + a.modulus();
        }
        all_reduce_sum(
            partial,
            comm,
            self.partition.rank(),
            self.partition.n_ranks(),
            tags::REDUCE,
        )
    }

    /// Infinity norm over owned entries. Collective.
    pub fn linfty_norm<C: Communicator>(&self, comm: &C) -> Result<T::Real, ParVecError> {
        let n = self.local_size();
        let mine = self.storage.read_slice(0, n)?;
        let mut partial = <T::Real as Zero>::zero();
        for a in &mine {
            let m = a.modulus();
            if m > partial {
                partial = m;
            }
        }
        all_reduce_max(
            partial,
            comm,
            self.partition.rank(),
            self.partition.n_ranks(),
            tags::REDUCE,
        )
    }

    /// Mean of all owned entries across all ranks. Collective.
    pub fn mean_value<C: Communicator>(&self, comm: &C) -> Result<T, ParVecError> {
        let n = self.local_size();
        let mine = self.storage.read_slice(0, n)?;
        let mut partial = T::zero();
        for a in &mine {
            partial += *a;
        }
        let sum = all_reduce_sum(
            partial,
            comm,
            self.partition.rank(),
            self.partition.n_ranks(),
            tags::REDUCE,
        )?;
        let count = T::from_real(
            <T::Real as NumCast>::from(self.partition.global_size() as f64)
                .unwrap_or_else(<T::Real as One>::one),
        );
        Ok(sum / count)
    }

    /// Copy all values (owned and ghost) from a vector in another memory
    /// space sharing the *same* partition object. Consistency state carries
    /// over; values never change, only their location.
    pub fn import_elements<S2: VectorStorage<T>>(
        &mut self,
        other: &Vector<T, S2>,
    ) -> Result<(), ParVecError> {
        if !Arc::ptr_eq(&self.partition, &other.partition) {
            return Err(ParVecError::PartitionMismatch(
                self.partition.global_size(),
                other.partition.global_size(),
            ));
        }
        transfer(&other.storage, &mut self.storage)?;
        self.state = other.state;
        self.touched_set_ghosts = other.touched_set_ghosts.clone();
        Ok(())
    }

    /// [`import_elements`](Self::import_elements) followed by a compress on
    /// the destination. Collective.
    pub fn import_elements_and_compress<S2: VectorStorage<T>, C: Communicator>(
        &mut self,
        other: &Vector<T, S2>,
        mode: CompressMode,
        comm: &C,
    ) -> Result<(), ParVecError> {
        self.import_elements(other)?;
        self.compress(mode, comm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;

    #[test]
    fn serial_vector_basics() {
        let mut v = Vector::<f64>::serial(4).unwrap();
        v.set(1, 2.5).unwrap();
        v.add(1, 0.5).unwrap();
        assert_eq!(v.get(1).unwrap(), 3.0);
        assert_eq!(v.get(0).unwrap(), 0.0);
        assert!(matches!(
            v.get(9),
            Err(ParVecError::IndexNotLocal(9, 0))
        ));
    }

    #[test]
    fn axpy_family() {
        let mut x = Vector::<f64>::serial(3).unwrap();
        let mut y = Vector::<f64>::serial(3).unwrap();
        for g in 0..3 {
            x.set(g, (g + 1) as f64).unwrap();
            y.set(g, 10.0).unwrap();
        }
        y.add_scaled(2.0, &x).unwrap(); // y = 10 + 2*(g+1)
        assert_eq!(y.as_slice(), &[12.0, 14.0, 16.0]);
        y.sadd(0.5, 1.0, &x).unwrap(); // y = y/2 + x
        assert_eq!(y.as_slice(), &[7.0, 9.0, 11.0]);
        let mut z = Vector::<f64>::serial(3).unwrap();
        z.equ(-1.0, &y).unwrap();
        assert_eq!(z.as_slice(), &[-7.0, -9.0, -11.0]);
        z.scale(2.0).unwrap();
        assert_eq!(z.as_slice(), &[-14.0, -18.0, -22.0]);
    }

    #[test]
    fn serial_reductions() {
        let mut v = Vector::<f64>::serial(4).unwrap();
        for g in 0..4 {
            v.set(g, if g % 2 == 0 { 1.0 } else { -2.0 }).unwrap();
        }
        assert_eq!(v.l1_norm(&NoComm).unwrap(), 6.0);
        assert_eq!(v.norm_sqr(&NoComm).unwrap(), 10.0);
        assert_eq!(v.linfty_norm(&NoComm).unwrap(), 2.0);
        assert_eq!(v.dot(&v, &NoComm).unwrap(), 10.0);
        assert_eq!(v.mean_value(&NoComm).unwrap(), -0.5);
    }

    #[test]
    fn reductions_work_for_f32() {
        let mut v = Vector::<f32>::serial(3).unwrap();
        for g in 0..3 {
            v.set(g, -(g as f32)).unwrap();
        }
        assert_eq!(v.l1_norm(&NoComm).unwrap(), 3.0);
        assert_eq!(v.norm_sqr(&NoComm).unwrap(), 5.0);
        assert_eq!(v.l2_norm(&NoComm).unwrap(), 5.0f32.sqrt());
        assert_eq!(v.linfty_norm(&NoComm).unwrap(), 2.0);
        assert_eq!(v.mean_value(&NoComm).unwrap(), -1.0);
    }

    #[test]
    fn unattached_vector_requires_reinit() {
        let mut v = Vector::<f64>::unattached().unwrap();
        assert_eq!(v.state(), CompressState::Uninitialized);
        assert!(matches!(v.set(0, 1.0), Err(ParVecError::Uninitialized)));
        assert!(matches!(v.get(0), Err(ParVecError::Uninitialized)));
        assert!(matches!(v.set_all(1.0), Err(ParVecError::Uninitialized)));
        v.reinit(Arc::new(Partition::serial(2))).unwrap();
        v.set(1, 4.0).unwrap();
        assert_eq!(v.get(1).unwrap(), 4.0);
    }

    #[test]
    fn partition_mismatch_is_eager() {
        let mut a = Vector::<f64>::serial(3).unwrap();
        let b = Vector::<f64>::serial(4).unwrap();
        assert!(matches!(
            a.add_scaled(1.0, &b),
            Err(ParVecError::PartitionMismatch(3, 4))
        ));
        assert!(matches!(
            a.dot(&b, &NoComm),
            Err(ParVecError::PartitionMismatch(3, 4))
        ));
    }

    #[test]
    fn import_requires_shared_partition_object() {
        let p = Arc::new(Partition::serial(3));
        let mut a = Vector::<f64>::new(p.clone()).unwrap();
        let b = Vector::<f64>::new(p).unwrap();
        assert!(a.import_elements(&b).is_ok());

        let c = Vector::<f64>::serial(3).unwrap();
        assert!(matches!(
            a.import_elements(&c),
            Err(ParVecError::PartitionMismatch(3, 3))
        ));
    }

    #[test]
    fn import_copies_bit_for_bit() {
        let p = Arc::new(Partition::serial(4));
        let mut a = Vector::<f64>::new(p.clone()).unwrap();
        let mut b = Vector::<f64>::new(p).unwrap();
        for g in 0..4 {
            b.set(g, 0.1 * (g as f64) - 7.25).unwrap();
        }
        a.import_elements(&b).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn reinit_resets_state_and_values() {
        let mut v = Vector::<f64>::serial(3).unwrap();
        v.set(0, 5.0).unwrap();
        v.reinit(Arc::new(Partition::serial(5))).unwrap();
        assert_eq!(v.global_size(), 5);
        assert_eq!(v.as_slice(), &[0.0; 5]);
        assert_eq!(v.state(), CompressState::Writable);
    }
}
