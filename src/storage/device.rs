//! wgpu-backed device storage: the accelerator memory space.
//!
//! Holds the buffer on the device and transfers it; arithmetic kernels are
//! out of scope, so whole-buffer access stages through host memory. Reads go
//! through a mapped staging buffer, writes through `Queue::write_buffer`.

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::ParVecError;
use crate::storage::VectorStorage;

/// GPU-resident storage for vector buffers.
pub struct DeviceStorage<T> {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffer: wgpu::Buffer,
    len: usize,
    _pd: PhantomData<T>,
}

impl<T> Debug for DeviceStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceStorage")
            .field("len", &self.len)
            .finish()
    }
}

impl<T: bytemuck::Pod> DeviceStorage<T> {
    /// Allocate `len` zeroed elements on `device`.
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        len: usize,
    ) -> Result<Self, ParVecError> {
        let buffer = Self::make_buffer(&device, len)?;
        if len > 0 {
            let zeros = vec![T::zeroed(); len];
            queue.write_buffer(&buffer, 0, bytemuck::cast_slice(&zeros));
        }
        Ok(Self {
            device,
            queue,
            buffer,
            len,
            _pd: PhantomData,
        })
    }

    #[inline]
    fn elem_size() -> usize {
        std::mem::size_of::<T>()
    }

    fn make_buffer(device: &wgpu::Device, len: usize) -> Result<wgpu::Buffer, ParVecError> {
        let byte_len = len
            .checked_mul(Self::elem_size())
            .ok_or(ParVecError::StorageAlloc {
                space: "device",
                elems: len,
            })? as u64;
        Ok(device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("parvec/DeviceStorage"),
            size: byte_len,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    fn bounds(&self, offset: usize, len: usize) -> Result<(u64, u64), ParVecError> {
        let end = offset
            .checked_add(len)
            .ok_or(ParVecError::SliceBounds {
                offset,
                len,
                total: self.len,
            })?;
        if end > self.len {
            return Err(ParVecError::SliceBounds {
                offset,
                len,
                total: self.len,
            });
        }
        let b = Self::elem_size();
        Ok(((offset * b) as u64, (len * b) as u64))
    }
}

impl<T: bytemuck::Pod + Send + Sync> VectorStorage<T> for DeviceStorage<T> {
    fn space() -> &'static str {
        "device"
    }

    fn total_len(&self) -> usize {
        self.len
    }

    fn resize(&mut self, new_len: usize) -> Result<(), ParVecError> {
        if new_len == self.len {
            return Ok(());
        }
        let new_buf = Self::make_buffer(&self.device, new_len)?;
        let keep = self.len.min(new_len);
        if keep > 0 {
            let (_, size_b) = self.bounds(0, keep)?;
            let mut enc = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("DeviceStorage::resize"),
                });
            enc.copy_buffer_to_buffer(&self.buffer, 0, &new_buf, 0, size_b);
            self.queue.submit(Some(enc.finish()));
        }
        if new_len > keep {
            let zeros = vec![T::zeroed(); new_len - keep];
            self.queue.write_buffer(
                &new_buf,
                (keep * Self::elem_size()) as u64,
                bytemuck::cast_slice(&zeros),
            );
        }
        self.buffer = new_buf;
        self.len = new_len;
        Ok(())
    }

    fn read_slice(&self, offset: usize, len: usize) -> Result<Vec<T>, ParVecError> {
        let (src_b, size_b) = self.bounds(offset, len)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("DeviceStorage[read] staging"),
            size: size_b,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut enc = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("DeviceStorage::read_slice"),
            });
        enc.copy_buffer_to_buffer(&self.buffer, src_b, &staging, 0, size_b);
        self.queue.submit(Some(enc.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            sender.send(res).ok();
        });
        self.device.poll(wgpu::Maintain::Wait);
        let res = pollster::block_on(receiver.receive());
        res.ok_or(ParVecError::GpuMappingFailed)?
            .map_err(|_| ParVecError::GpuMappingFailed)?;
        let data = slice.get_mapped_range();
        let mut out = vec![T::zeroed(); len];
        out.copy_from_slice(bytemuck::cast_slice(&data));
        drop(data);
        staging.unmap();
        Ok(out)
    }

    fn write_slice(&mut self, offset: usize, src: &[T]) -> Result<(), ParVecError> {
        let (dst_b, _) = self.bounds(offset, src.len())?;
        if !src.is_empty() {
            self.queue
                .write_buffer(&self.buffer, dst_b, bytemuck::cast_slice(src));
        }
        Ok(())
    }

    fn with_slice<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R, ParVecError> {
        let staged = self.read_slice(0, self.len)?;
        Ok(f(&staged))
    }

    fn with_slice_mut<R>(&mut self, f: impl FnOnce(&mut [T]) -> R) -> Result<R, ParVecError> {
        let mut staged = self.read_slice(0, self.len)?;
        let r = f(&mut staged);
        self.write_slice(0, &staged)?;
        Ok(r)
    }
}
