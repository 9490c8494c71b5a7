// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! The device trait consumed by the buffer-object cache.
//!
//! Implementations wrap a kernel driver (or a simulation of one). Calls may
//! block the calling thread but never suspend. Any call may report
//! [`DeviceError::Interrupted`]; callers wrap them in
//! [`retry_interrupted`](super::retry_interrupted).

use super::types::{
    ApertureInfo, DeviceError, Domain, GemHandle, Madvise, Mapping, TilingMode, TilingState,
};

/// Primitive operations on device buffers.
pub trait BoDevice: Send + Sync {
    /// Query aperture sizes; used once at cache initialisation.
    fn aperture(&self) -> Result<ApertureInfo, DeviceError>;

    /// Create a new buffer of `size` bytes.
    fn create(&self, size: u64) -> Result<GemHandle, DeviceError>;

    /// Release a buffer. Must be called exactly once per handle.
    fn destroy(&self, handle: GemHandle);

    /// Open a buffer exported by another client. Returns the handle and size.
    fn open_for_name(&self, name: u32) -> Result<(GemHandle, u64), DeviceError>;

    /// Export a buffer under a global name.
    fn flink(&self, handle: GemHandle) -> Result<u32, DeviceError>;

    /// Read back the current layout of a buffer.
    fn get_tiling(&self, handle: GemHandle) -> Result<TilingState, DeviceError>;

    /// Obtain the fake offset used to mmap a buffer through the aperture.
    fn map_gtt(&self, handle: GemHandle) -> Result<u64, DeviceError>;

    /// Map `size` bytes at a fake offset obtained from [`BoDevice::map_gtt`].
    fn mmap(&self, fake_offset: u64, size: u64) -> Result<Mapping, DeviceError>;

    /// Map an untiled buffer directly through the CPU domain.
    fn map_linear(&self, handle: GemHandle, size: u64) -> Result<Mapping, DeviceError>;

    /// Move a buffer into the given read domain, and write domain if any.
    fn set_domain(
        &self,
        handle: GemHandle,
        read: Domain,
        write: Option<Domain>,
    ) -> Result<(), DeviceError>;

    fn unmap(&self, mapping: Mapping);

    /// Whether the GPU still has outstanding work touching the buffer.
    fn is_busy(&self, handle: GemHandle) -> bool;

    /// Advise the device about the buffer's contents. Returns whether the
    /// backing memory is still retained.
    fn madvise(&self, handle: GemHandle, advice: Madvise) -> bool;

    /// Change the buffer layout. The device reports the layout it chose.
    fn set_tiling(
        &self,
        handle: GemHandle,
        mode: TilingMode,
        stride: u32,
    ) -> Result<TilingState, DeviceError>;

    /// Copy `data` into the buffer at `offset`.
    fn pwrite(&self, handle: GemHandle, offset: u64, data: &[u8]) -> Result<(), DeviceError>;

    /// Copy buffer contents at `offset` into `out`.
    fn pread(&self, handle: GemHandle, offset: u64, out: &mut [u8]) -> Result<(), DeviceError>;
}
