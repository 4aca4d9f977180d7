//! Fixed, little-endian wire records for the exchange paths.
//!
//! All multi-byte integers are stored pre-LE with `.to_le()` and decoded with
//! `from_le`, so the same bytes mean the same thing on every participating
//! rank regardless of endianness.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_from<T: Pod>(v: &[u8]) -> &[T] {
    bytemuck::cast_slice(v)
}

/// Count header preceding variable-length index lists.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireCount {
    n_le: u32,
}

impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

/// A global vector index carried on the wire.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireIndex {
    id_le: u64,
}

impl WireIndex {
    pub fn of(id: u64) -> Self {
        Self { id_le: id.to_le() }
    }
    pub fn get(&self) -> u64 {
        u64::from_le(self.id_le)
    }
}

/// A `[begin, end)` owned range carried during partition assembly.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireRange {
    begin_le: u64,
    end_le: u64,
}

impl WireRange {
    pub fn of(begin: u64, end: u64) -> Self {
        Self {
            begin_le: begin.to_le(),
            end_le: end.to_le(),
        }
    }
    pub fn begin(&self) -> u64 {
        u64::from_le(self.begin_le)
    }
    pub fn end(&self) -> u64 {
        u64::from_le(self.end_le)
    }
}

const_assert_eq!(std::mem::size_of::<WireCount>(), 4);
const_assert_eq!(std::mem::size_of::<WireIndex>(), 8);
const_assert_eq!(std::mem::size_of::<WireRange>(), 16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_index_list() {
        let v = vec![WireIndex::of(3), WireIndex::of(u64::MAX)];
        let bytes: Vec<u8> = cast_slice(&v).to_vec();
        let out: &[WireIndex] = cast_slice_from(&bytes);
        assert_eq!(out[0].get(), 3);
        assert_eq!(out[1].get(), u64::MAX);
    }

    #[test]
    fn roundtrip_range() {
        let r = WireRange::of(5, 10);
        let bytes: Vec<u8> = cast_slice(std::slice::from_ref(&r)).to_vec();
        let out: &[WireRange] = cast_slice_from(&bytes);
        assert_eq!((out[0].begin(), out[0].end()), (5, 10));
    }

    #[test]
    fn count_header() {
        assert_eq!(WireCount::new(17).get(), 17);
    }
}
