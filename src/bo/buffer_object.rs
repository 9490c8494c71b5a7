// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Buffer object: one device allocation plus its mapping and layout state.
//!
//! A `BufferObject` is exclusively owned by whoever holds it, either a cache
//! bucket or a caller. Operations on an owned buffer go straight to the
//! device without taking the cache lock.

use std::mem::ManuallyDrop;
use std::sync::Weak;

use crate::device::{
    retry_interrupted, BoDevice, Domain, GemHandle, Madvise, Mapping, SwizzleMode, TilingMode,
    TilingState,
};
use crate::error::BoError;

/// Records of buffers dropped without being released, waiting for their
/// manager to destroy them.
pub(crate) type OrphanQueue = parking_lot::Mutex<Vec<Box<BoRecord>>>;

/// Host-side metadata for a device buffer. Recycled through the record pool.
#[derive(Debug, Default)]
pub(crate) struct BoRecord {
    pub(crate) handle: GemHandle,
    pub(crate) size: u64,
    pub(crate) name: u32,
    pub(crate) tiling: TilingState,
    pub(crate) mapping: Option<Mapping>,
    pub(crate) gpu_pending: bool,
    /// Where the record goes if its buffer is dropped unreleased.
    pub(crate) orphans: Option<Weak<OrphanQueue>>,
}

/// An owned device buffer.
///
/// Hand it back with [`CacheManager::release`](crate::CacheManager::release)
/// when done. A buffer dropped without release is queued on its manager and
/// destroyed at the manager's next acquire, release or teardown; once the
/// manager is gone the handle can no longer be reclaimed.
#[derive(Debug)]
#[must_use = "buffer objects must be released to their cache manager"]
pub struct BufferObject {
    record: ManuallyDrop<Box<BoRecord>>,
}

impl BufferObject {
    pub(crate) fn from_record(record: Box<BoRecord>) -> Self {
        Self {
            record: ManuallyDrop::new(record),
        }
    }

    pub(crate) fn into_record(self) -> Box<BoRecord> {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the record is taken only here.
        unsafe { ManuallyDrop::take(&mut this.record) }
    }

    pub fn handle(&self) -> GemHandle {
        self.record.handle
    }

    /// Size in bytes. For cached size classes this is the rounded class size.
    pub fn size(&self) -> u64 {
        self.record.size
    }

    /// Export name, or 0 if the buffer was never shared.
    pub fn name(&self) -> u32 {
        self.record.name
    }

    pub fn tiling(&self) -> TilingState {
        self.record.tiling
    }

    pub fn tiling_mode(&self) -> TilingMode {
        self.record.tiling.mode
    }

    pub fn stride(&self) -> u32 {
        self.record.tiling.stride
    }

    pub fn swizzle(&self) -> SwizzleMode {
        self.record.tiling.swizzle
    }

    pub fn is_mapped(&self) -> bool {
        self.record.mapping.is_some()
    }

    pub fn is_gpu_pending(&self) -> bool {
        self.record.gpu_pending
    }

    /// Mark the buffer as referenced by a batch that has not completed.
    pub fn mark_gpu_pending(&mut self) {
        self.record.gpu_pending = true;
    }

    pub fn clear_gpu_pending(&mut self) {
        self.record.gpu_pending = false;
    }

    /// View of the current CPU mapping, if any.
    pub fn mapped_bytes(&mut self) -> Option<&mut [u8]> {
        let mapping = self.record.mapping.as_ref()?;
        // SAFETY: the mapping covers `len` bytes and stays valid until
        // `unmap`, which needs `&mut self` and so cannot overlap this borrow.
        Some(unsafe { std::slice::from_raw_parts_mut(mapping.as_ptr(), mapping.len()) })
    }

    /// Map the buffer for CPU access.
    ///
    /// Tiled buffers go through the aperture, untiled ones through the CPU
    /// domain. The buffer is then moved into the matching coherency domain;
    /// if that fails the mapping is dropped again.
    pub fn map<D: BoDevice + ?Sized>(&mut self, device: &D) -> Result<&mut [u8], BoError> {
        if self.record.mapping.is_some() {
            return Err(BoError::AlreadyMapped(self.record.handle));
        }
        let handle = self.record.handle;
        let size = self.record.size;

        let (mapping, domain) = if self.record.tiling.mode != TilingMode::None {
            let offset = retry_interrupted(|| device.map_gtt(handle))?;
            (device.mmap(offset, size)?, Domain::Gtt)
        } else {
            (retry_interrupted(|| device.map_linear(handle, size))?, Domain::Cpu)
        };

        if let Err(err) = retry_interrupted(|| device.set_domain(handle, domain, Some(domain))) {
            tracing::debug!(%handle, error = %err, "domain change after map failed");
            device.unmap(mapping);
            return Err(err.into());
        }

        self.record.mapping = Some(mapping);
        Ok(self.mapped_bytes().unwrap_or_default())
    }

    /// Release the CPU mapping. A no-op if the buffer is not mapped.
    pub fn unmap<D: BoDevice + ?Sized>(&mut self, device: &D) {
        if let Some(mapping) = self.record.mapping.take() {
            device.unmap(mapping);
        }
    }

    /// Change the GPU layout.
    ///
    /// Equal requests are a no-op; for `TilingMode::None` the stride is
    /// ignored. The device may choose a different stride or swizzle, and its
    /// answer is what gets recorded.
    pub fn set_tiling<D: BoDevice + ?Sized>(
        &mut self,
        device: &D,
        mode: TilingMode,
        stride: u32,
    ) -> Result<(), BoError> {
        let current = self.record.tiling;
        if current.mode == mode && (mode == TilingMode::None || current.stride == stride) {
            return Ok(());
        }
        if self.record.gpu_pending {
            return Err(BoError::GpuBusy(self.record.handle));
        }

        self.unmap(device);

        let handle = self.record.handle;
        let applied = retry_interrupted(|| device.set_tiling(handle, mode, stride))?;
        if applied.mode != mode || applied.stride != stride {
            tracing::trace!(%handle, ?applied, requested_stride = stride, "device adjusted tiling");
        }
        self.record.tiling = applied;
        Ok(())
    }

    /// Whether the GPU has finished all work touching this buffer.
    pub fn is_inactive<D: BoDevice + ?Sized>(&self, device: &D) -> bool {
        !device.is_busy(self.record.handle)
    }

    /// Advise the device about the contents. Returns whether they are retained.
    pub fn madvise<D: BoDevice + ?Sized>(&self, device: &D, advice: Madvise) -> bool {
        device.madvise(self.record.handle, advice)
    }

    /// Block until the GPU has finished writing the buffer.
    pub fn wait<D: BoDevice + ?Sized>(&self, device: &D) -> Result<(), BoError> {
        let handle = self.record.handle;
        retry_interrupted(|| device.set_domain(handle, Domain::Gtt, None))?;
        Ok(())
    }

    /// Upload `data` at `offset` without mapping.
    pub fn write<D: BoDevice + ?Sized>(
        &self,
        device: &D,
        offset: u64,
        data: &[u8],
    ) -> Result<(), BoError> {
        let handle = self.record.handle;
        retry_interrupted(|| device.pwrite(handle, offset, data))?;
        Ok(())
    }

    /// Read back into `out` from `offset` without mapping.
    pub fn read<D: BoDevice + ?Sized>(
        &self,
        device: &D,
        offset: u64,
        out: &mut [u8],
    ) -> Result<(), BoError> {
        let handle = self.record.handle;
        retry_interrupted(|| device.pread(handle, offset, out))?;
        Ok(())
    }

    /// Export under a global name. The buffer will never be cached again.
    pub fn flink<D: BoDevice + ?Sized>(&mut self, device: &D) -> Result<u32, BoError> {
        if self.record.name == 0 {
            self.record.name = device.flink(self.record.handle)?;
        }
        Ok(self.record.name)
    }
}

impl Drop for BufferObject {
    fn drop(&mut self) {
        // SAFETY: `record` is not touched again after drop.
        let record = unsafe { ManuallyDrop::take(&mut self.record) };
        if !record.handle.is_valid() {
            return;
        }
        let queue = record.orphans.as_ref().and_then(Weak::upgrade);
        match queue {
            Some(queue) => {
                tracing::warn!(handle = %record.handle, "buffer object dropped without release");
                queue.lock().push(record);
            }
            None => {
                tracing::warn!(handle = %record.handle, "buffer object dropped with no manager, handle leaked");
            }
        }
    }
}

#[cfg(test)]
#[path = "buffer_object_tests.rs"]
mod tests;
