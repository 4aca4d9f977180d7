//! Pluggable per-memory-space storage for vector buffers.
//!
//! A storage is a flat buffer of `local_size + n_ghosts` scalars living in
//! one address space. `HostStorage` is the Vec-backed default; a wgpu-backed
//! `DeviceStorage` lives behind the `wgpu` feature. Crossing spaces goes
//! through [`transfer`], the sole legal way to move data between them.

#[cfg(feature = "wgpu")]
pub mod device;

use core::fmt::{self, Debug};

use crate::error::ParVecError;

/// Contiguous, indexable storage of `T` in one memory space.
///
/// The memory space is a static parameter of the vector type: no virtual
/// dispatch on the hot path, and no implicit cross-space traffic.
pub trait VectorStorage<T: bytemuck::Pod>: Debug + Send {
    /// Human-readable space name, used in errors and logs.
    fn space() -> &'static str;

    /// Current length in elements.
    fn total_len(&self) -> usize;

    /// Resize to `new_len`, preserving the prefix `[0, min(old, new))` and
    /// zero-filling any growth.
    fn resize(&mut self, new_len: usize) -> Result<(), ParVecError>;

    /// Read `[offset, offset + len)` into a host `Vec`.
    fn read_slice(&self, offset: usize, len: usize) -> Result<Vec<T>, ParVecError>;

    /// Write `src` into `[offset, offset + src.len())`.
    fn write_slice(&mut self, offset: usize, src: &[T]) -> Result<(), ParVecError>;

    /// Run `f` over the full buffer. Zero-copy on the host space, staged
    /// through a host copy on device spaces.
    fn with_slice<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R, ParVecError>;

    /// Run `f` over the full buffer mutably; device spaces write the staged
    /// copy back afterwards.
    fn with_slice_mut<R>(&mut self, f: impl FnOnce(&mut [T]) -> R) -> Result<R, ParVecError>;

    /// Set every element to `value`.
    fn fill(&mut self, value: T) -> Result<(), ParVecError> {
        self.with_slice_mut(|s| s.fill(value))
    }
}

/// Storage that can be allocated from a length alone (no device handles).
pub trait AllocStorage<T: bytemuck::Pod>: VectorStorage<T> + Sized {
    /// Allocate `len` zeroed elements. Allocation failure is fatal and
    /// surfaced immediately; there is no fallback to another space.
    fn allocate(len: usize) -> Result<Self, ParVecError>;
}

/// `Vec`-backed host storage (the default space).
#[derive(Clone)]
pub struct HostStorage<T>(Vec<T>);

impl<T> Debug for HostStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostStorage")
            .field("len", &self.0.len())
            .finish()
    }
}

impl<T: bytemuck::Pod> HostStorage<T> {
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.0
    }

    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

impl<T: bytemuck::Pod + Send> VectorStorage<T> for HostStorage<T> {
    fn space() -> &'static str {
        "host"
    }

    fn total_len(&self) -> usize {
        self.0.len()
    }

    fn resize(&mut self, new_len: usize) -> Result<(), ParVecError> {
        if new_len > self.0.len() {
            self.0
                .try_reserve(new_len - self.0.len())
                .map_err(|_| ParVecError::StorageAlloc {
                    space: Self::space(),
                    elems: new_len,
                })?;
        }
        self.0.resize(new_len, T::zeroed());
        Ok(())
    }

    fn read_slice(&self, offset: usize, len: usize) -> Result<Vec<T>, ParVecError> {
        let end = checked_end(offset, len, self.0.len())?;
        Ok(self.0[offset..end].to_vec())
    }

    fn write_slice(&mut self, offset: usize, src: &[T]) -> Result<(), ParVecError> {
        let end = checked_end(offset, src.len(), self.0.len())?;
        self.0[offset..end].copy_from_slice(src);
        Ok(())
    }

    fn with_slice<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R, ParVecError> {
        Ok(f(&self.0))
    }

    fn with_slice_mut<R>(&mut self, f: impl FnOnce(&mut [T]) -> R) -> Result<R, ParVecError> {
        Ok(f(&mut self.0))
    }
}

impl<T: bytemuck::Pod + Send> AllocStorage<T> for HostStorage<T> {
    fn allocate(len: usize) -> Result<Self, ParVecError> {
        let mut v = Vec::new();
        v.try_reserve_exact(len)
            .map_err(|_| ParVecError::StorageAlloc {
                space: Self::space(),
                elems: len,
            })?;
        v.resize(len, T::zeroed());
        Ok(Self(v))
    }
}

impl<T> From<Vec<T>> for HostStorage<T> {
    fn from(v: Vec<T>) -> Self {
        Self(v)
    }
}

/// Copy the full buffer of `src` into `dst`, possibly across memory spaces.
///
/// Values are never changed, only their location; both buffers must have the
/// same length. Staged through a host copy, which makes the host↔device and
/// same-space cases one code path.
pub fn transfer<T, A, B>(src: &A, dst: &mut B) -> Result<(), ParVecError>
where
    T: bytemuck::Pod,
    A: VectorStorage<T>,
    B: VectorStorage<T>,
{
    if src.total_len() != dst.total_len() {
        return Err(ParVecError::StorageLenMismatch(
            src.total_len(),
            dst.total_len(),
        ));
    }
    let staged = src.read_slice(0, src.total_len())?;
    dst.write_slice(0, &staged)
}

#[inline]
fn checked_end(offset: usize, len: usize, total: usize) -> Result<usize, ParVecError> {
    let end = offset
        .checked_add(len)
        .ok_or(ParVecError::SliceBounds { offset, len, total })?;
    if end > total {
        return Err(ParVecError::SliceBounds { offset, len, total });
    }
    Ok(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_is_zeroed() {
        let s = HostStorage::<f64>::allocate(4).unwrap();
        assert_eq!(s.as_slice(), &[0.0; 4]);
    }

    #[test]
    fn resize_preserves_prefix() {
        let mut s = HostStorage::from(vec![1.0f64, 2.0, 3.0]);
        s.resize(5).unwrap();
        assert_eq!(s.as_slice(), &[1.0, 2.0, 3.0, 0.0, 0.0]);
        s.resize(2).unwrap();
        assert_eq!(s.as_slice(), &[1.0, 2.0]);
    }

    #[test]
    fn out_of_bounds_reads_are_errors() {
        let s = HostStorage::from(vec![1.0f64; 3]);
        assert!(matches!(
            s.read_slice(2, 2),
            Err(ParVecError::SliceBounds { .. })
        ));
    }

    #[test]
    fn transfer_same_space_roundtrip() {
        let a = HostStorage::from(vec![1.5f32, -2.5, 0.0]);
        let mut b = HostStorage::<f32>::allocate(3).unwrap();
        transfer(&a, &mut b).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn transfer_length_mismatch_is_error() {
        let a = HostStorage::from(vec![1.0f64; 3]);
        let mut b = HostStorage::<f64>::allocate(4).unwrap();
        assert!(matches!(
            transfer(&a, &mut b),
            Err(ParVecError::StorageLenMismatch(3, 4))
        ));
    }
}
