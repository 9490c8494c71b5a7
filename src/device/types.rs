// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Value types shared by every device implementation.

use std::fmt;
use std::ptr::NonNull;

/// Opaque device-level buffer identifier. Zero is never a valid handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GemHandle(pub u32);

impl GemHandle {
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for GemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gem#{}", self.0)
    }
}

/// GPU memory layout of a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TilingMode {
    /// Linear layout, mapped through the CPU domain.
    #[default]
    None,
    /// X-major tiles.
    X,
    /// Y-major tiles.
    Y,
}

/// Address bit swizzling the device applies to tiled buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SwizzleMode {
    #[default]
    None,
    Bit9,
    Bit9And10,
}

/// Layout as reported back by the device, which may differ from the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TilingState {
    pub mode: TilingMode,
    pub stride: u32,
    pub swizzle: SwizzleMode,
}

/// Cache-coherency domain for CPU or GPU access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// CPU caches hold the authoritative copy.
    Cpu,
    /// Access goes through the GPU aperture.
    Gtt,
}

/// Advisory hint about whether buffer contents are still needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Madvise {
    WillNeed,
    DontNeed,
}

/// Aperture sizes reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApertureInfo {
    /// Total mappable aperture in bytes.
    pub total: u64,
    /// Bytes not pinned by other clients.
    pub available: u64,
}

/// CPU-visible view of a buffer returned by the device.
///
/// The pointer stays valid until the mapping is handed back to
/// [`BoDevice::unmap`](super::BoDevice::unmap).
#[derive(Debug, PartialEq, Eq)]
pub struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: a mapping is plain device memory owned by exactly one buffer
// object; moving it between threads moves that exclusive ownership.
unsafe impl Send for Mapping {}
// SAFETY: shared access only exposes the address and length.
unsafe impl Sync for Mapping {}

impl Mapping {
    /// # Safety
    /// `ptr` must address `len` bytes that remain valid until the mapping is
    /// released through the device that produced it.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Errors reported by device calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("device call interrupted")]
    Interrupted,

    #[error("{op} failed with errno {errno}")]
    Ioctl { op: &'static str, errno: i32 },

    #[error("invalid handle {0}")]
    InvalidHandle(u32),

    #[error("no buffer exported under name {0}")]
    NoSuchName(u32),

    #[error("device out of memory allocating {size} bytes")]
    OutOfMemory { size: u64 },
}
