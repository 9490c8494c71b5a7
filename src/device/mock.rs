// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! In-process simulated device.
//!
//! Backs every buffer with lazily allocated host memory and records every
//! call so that tests can assert on handle lifetimes. Failure injection
//! covers the paths the cache has to survive: refused creates, interrupted
//! calls, failing domain/tiling changes and reclaim of purgeable memory.

use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;

use parking_lot::Mutex;

use super::backend::BoDevice;
use super::types::{
    ApertureInfo, DeviceError, Domain, GemHandle, Madvise, Mapping, SwizzleMode, TilingMode,
    TilingState,
};

const EINVAL: i32 = 22;
const ENODEV: i32 = 19;
const ENOMEM: i32 = 12;

/// Default simulated aperture: 256 MiB.
pub const DEFAULT_MOCK_APERTURE: u64 = 256 * 1024 * 1024;

/// Per-operation call counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MockCallCounts {
    pub creates: u64,
    pub destroys: u64,
    pub madvise: u64,
    pub busy_queries: u64,
    pub set_tiling: u64,
    pub maps: u64,
    pub unmaps: u64,
    pub set_domain: u64,
    pub interrupts: u64,
}

#[derive(Debug)]
struct MockBuffer {
    size: u64,
    tiling: TilingState,
    purgeable: bool,
    purged: bool,
    /// Live mappings into `storage`.
    mapped: u32,
    storage: Option<Box<[u8]>>,
}

impl MockBuffer {
    fn new(size: u64) -> Self {
        Self {
            size,
            tiling: TilingState::default(),
            purgeable: false,
            purged: false,
            mapped: 0,
            storage: None,
        }
    }

    fn storage_mut(&mut self) -> Result<&mut [u8], DeviceError> {
        if self.storage.is_none() {
            let len = usize::try_from(self.size)
                .map_err(|_| DeviceError::Ioctl { op: "mmap", errno: ENOMEM })?;
            self.storage = Some(vec![0u8; len].into_boxed_slice());
        }
        match self.storage.as_deref_mut() {
            Some(bytes) => Ok(bytes),
            None => Err(DeviceError::Ioctl { op: "mmap", errno: ENOMEM }),
        }
    }

    /// Mapped pages are pinned, so a mapped buffer is never reclaimed.
    fn reclaim(&mut self) {
        if self.purgeable && self.mapped == 0 {
            self.purged = true;
            self.storage = None;
        }
    }
}

#[derive(Debug)]
struct MockState {
    aperture: ApertureInfo,
    next_handle: u32,
    next_name: u32,
    next_fake_offset: u64,
    buffers: HashMap<GemHandle, MockBuffer>,
    names: HashMap<u32, GemHandle>,
    fake_offsets: HashMap<u64, GemHandle>,
    /// Mapping address to the buffer it points into.
    mapped_at: HashMap<usize, GemHandle>,
    /// Storage of destroyed buffers that are still mapped, with the number
    /// of mappings left.
    detached: HashMap<usize, (Box<[u8]>, u32)>,
    destroy_counts: HashMap<GemHandle, u32>,
    created: u64,
    busy: HashSet<GemHandle>,
    reclaim_on_dontneed: bool,
    failing_creates: u32,
    fail_all_creates: bool,
    pending_interrupts: u32,
    fail_set_domain: bool,
    fail_set_tiling: bool,
    fail_aperture: bool,
    calls: MockCallCounts,
}

impl MockState {
    fn take_interrupt(&mut self) -> bool {
        if self.pending_interrupts > 0 {
            self.pending_interrupts -= 1;
            self.calls.interrupts += 1;
            true
        } else {
            false
        }
    }

    fn buffer_mut(&mut self, handle: GemHandle) -> Result<&mut MockBuffer, DeviceError> {
        self.buffers
            .get_mut(&handle)
            .ok_or(DeviceError::InvalidHandle(handle.0))
    }

    fn map_buffer(&mut self, handle: GemHandle, size: u64) -> Result<Mapping, DeviceError> {
        let buffer = self.buffer_mut(handle)?;
        if size > buffer.size {
            return Err(DeviceError::Ioctl { op: "mmap", errno: EINVAL });
        }
        let mapping = mapping_for(buffer.storage_mut()?);
        buffer.mapped += 1;
        self.mapped_at.insert(mapping.as_ptr() as usize, handle);
        Ok(mapping)
    }

    fn insert_buffer(&mut self, buffer: MockBuffer) -> GemHandle {
        let handle = GemHandle(self.next_handle);
        self.next_handle += 1;
        self.created += 1;
        self.buffers.insert(handle, buffer);
        handle
    }
}

/// Simulated device implementing [`BoDevice`].
#[derive(Debug)]
pub struct MockDevice {
    state: Mutex<MockState>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new(DEFAULT_MOCK_APERTURE)
    }
}

impl MockDevice {
    /// Create a device with an aperture of `aperture_bytes`.
    pub fn new(aperture_bytes: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                aperture: ApertureInfo {
                    total: aperture_bytes,
                    available: aperture_bytes - (aperture_bytes >> 5),
                },
                next_handle: 1,
                next_name: 1,
                next_fake_offset: 1 << 32,
                buffers: HashMap::new(),
                names: HashMap::new(),
                fake_offsets: HashMap::new(),
                mapped_at: HashMap::new(),
                detached: HashMap::new(),
                destroy_counts: HashMap::new(),
                created: 0,
                busy: HashSet::new(),
                reclaim_on_dontneed: false,
                failing_creates: 0,
                fail_all_creates: false,
                pending_interrupts: 0,
                fail_set_domain: false,
                fail_set_tiling: false,
                fail_aperture: false,
                calls: MockCallCounts::default(),
            }),
        }
    }

    /// Reclaim memory as soon as it is advised `DontNeed`.
    pub fn set_reclaim_on_dontneed(&self, enabled: bool) {
        self.state.lock().reclaim_on_dontneed = enabled;
    }

    /// Refuse the next `count` create calls.
    pub fn fail_next_creates(&self, count: u32) {
        self.state.lock().failing_creates = count;
    }

    pub fn set_fail_all_creates(&self, enabled: bool) {
        self.state.lock().fail_all_creates = enabled;
    }

    /// Interrupt the next `count` retryable calls.
    pub fn inject_interrupts(&self, count: u32) {
        self.state.lock().pending_interrupts = count;
    }

    pub fn set_fail_set_domain(&self, enabled: bool) {
        self.state.lock().fail_set_domain = enabled;
    }

    pub fn set_fail_set_tiling(&self, enabled: bool) {
        self.state.lock().fail_set_tiling = enabled;
    }

    pub fn set_fail_aperture(&self, enabled: bool) {
        self.state.lock().fail_aperture = enabled;
    }

    /// Mark a buffer as still referenced (or no longer) by GPU work.
    pub fn set_busy(&self, handle: GemHandle, busy: bool) {
        let mut state = self.state.lock();
        if busy {
            state.busy.insert(handle);
        } else {
            state.busy.remove(&handle);
        }
    }

    /// Drop the backing memory of `handle` if it is currently purgeable.
    pub fn reclaim(&self, handle: GemHandle) {
        if let Some(buffer) = self.state.lock().buffers.get_mut(&handle) {
            buffer.reclaim();
        }
    }

    /// Drop the backing memory of every purgeable buffer.
    pub fn reclaim_all(&self) {
        for buffer in self.state.lock().buffers.values_mut() {
            buffer.reclaim();
        }
    }

    pub fn is_purgeable(&self, handle: GemHandle) -> bool {
        self.state
            .lock()
            .buffers
            .get(&handle)
            .map_or(false, |b| b.purgeable)
    }

    /// Handles created and not yet destroyed, in ascending order.
    pub fn live_handles(&self) -> Vec<GemHandle> {
        let state = self.state.lock();
        let mut handles: Vec<_> = state.buffers.keys().copied().collect();
        handles.sort();
        handles
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Total handles ever handed out by `create` or `open_for_name`.
    pub fn created_count(&self) -> u64 {
        self.state.lock().created
    }

    pub fn destroy_count(&self, handle: GemHandle) -> u32 {
        self.state
            .lock()
            .destroy_counts
            .get(&handle)
            .copied()
            .unwrap_or(0)
    }

    /// Handles that were destroyed more than once.
    pub fn double_destroys(&self) -> Vec<GemHandle> {
        let state = self.state.lock();
        let mut handles: Vec<_> = state
            .destroy_counts
            .iter()
            .filter(|(_, &count)| count > 1)
            .map(|(&handle, _)| handle)
            .collect();
        handles.sort();
        handles
    }

    pub fn call_counts(&self) -> MockCallCounts {
        self.state.lock().calls.clone()
    }

    /// Live mappings of `handle`, including those of a destroyed buffer.
    pub fn mapping_count(&self, handle: GemHandle) -> u32 {
        let state = self.state.lock();
        if let Some(buffer) = state.buffers.get(&handle) {
            return buffer.mapped;
        }
        state
            .mapped_at
            .iter()
            .filter(|(_, &h)| h == handle)
            .filter_map(|(addr, _)| state.detached.get(addr))
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn tiling_of(&self, handle: GemHandle) -> Option<TilingState> {
        self.state.lock().buffers.get(&handle).map(|b| b.tiling)
    }
}

fn adjusted_tiling(mode: TilingMode, stride: u32) -> Result<TilingState, DeviceError> {
    let (align, swizzle) = match mode {
        TilingMode::None => return Ok(TilingState::default()),
        TilingMode::X => (512u32, SwizzleMode::Bit9And10),
        TilingMode::Y => (128u32, SwizzleMode::Bit9),
    };
    if stride == 0 {
        return Err(DeviceError::Ioctl { op: "set_tiling", errno: EINVAL });
    }
    let stride = stride
        .checked_next_multiple_of(align)
        .ok_or(DeviceError::Ioctl { op: "set_tiling", errno: EINVAL })?;
    Ok(TilingState { mode, stride, swizzle })
}

fn mapping_for(bytes: &mut [u8]) -> Mapping {
    let ptr = NonNull::new(bytes.as_mut_ptr()).unwrap_or(NonNull::dangling());
    // SAFETY: the storage is boxed and outlives every mapping into it:
    // reclaim skips mapped buffers and destroy parks mapped storage in
    // `detached` until the last `unmap`.
    unsafe { Mapping::from_raw_parts(ptr, bytes.len()) }
}

fn checked_range(offset: u64, len: usize, size: u64) -> Result<std::ops::Range<usize>, DeviceError> {
    let end = offset
        .checked_add(len as u64)
        .filter(|&end| end <= size)
        .ok_or(DeviceError::Ioctl { op: "pwrite", errno: EINVAL })?;
    Ok(offset as usize..end as usize)
}

impl BoDevice for MockDevice {
    fn aperture(&self) -> Result<ApertureInfo, DeviceError> {
        let state = self.state.lock();
        if state.fail_aperture {
            return Err(DeviceError::Ioctl { op: "get_aperture", errno: ENODEV });
        }
        Ok(state.aperture)
    }

    fn create(&self, size: u64) -> Result<GemHandle, DeviceError> {
        let mut state = self.state.lock();
        state.calls.creates += 1;
        if state.fail_all_creates {
            return Err(DeviceError::OutOfMemory { size });
        }
        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(DeviceError::OutOfMemory { size });
        }
        Ok(state.insert_buffer(MockBuffer::new(size)))
    }

    fn destroy(&self, handle: GemHandle) {
        let mut state = self.state.lock();
        state.calls.destroys += 1;
        *state.destroy_counts.entry(handle).or_insert(0) += 1;
        if let Some(buffer) = state.buffers.remove(&handle) {
            if buffer.mapped > 0 {
                if let Some(storage) = buffer.storage {
                    let addr = storage.as_ptr() as usize;
                    state.detached.insert(addr, (storage, buffer.mapped));
                }
            }
        }
        state.busy.remove(&handle);
        state.fake_offsets.retain(|_, h| *h != handle);
    }

    fn open_for_name(&self, name: u32) -> Result<(GemHandle, u64), DeviceError> {
        let mut state = self.state.lock();
        let source = *state.names.get(&name).ok_or(DeviceError::NoSuchName(name))?;
        let (size, tiling) = {
            let buffer = state.buffer_mut(source)?;
            (buffer.size, buffer.tiling)
        };
        let mut buffer = MockBuffer::new(size);
        buffer.tiling = tiling;
        Ok((state.insert_buffer(buffer), size))
    }

    fn flink(&self, handle: GemHandle) -> Result<u32, DeviceError> {
        let mut state = self.state.lock();
        state.buffer_mut(handle)?;
        let name = state.next_name;
        state.next_name += 1;
        state.names.insert(name, handle);
        Ok(name)
    }

    fn get_tiling(&self, handle: GemHandle) -> Result<TilingState, DeviceError> {
        let mut state = self.state.lock();
        Ok(state.buffer_mut(handle)?.tiling)
    }

    fn map_gtt(&self, handle: GemHandle) -> Result<u64, DeviceError> {
        let mut state = self.state.lock();
        if state.take_interrupt() {
            return Err(DeviceError::Interrupted);
        }
        state.buffer_mut(handle)?;
        let offset = state.next_fake_offset;
        state.next_fake_offset += 1 << 20;
        state.fake_offsets.insert(offset, handle);
        Ok(offset)
    }

    fn mmap(&self, fake_offset: u64, size: u64) -> Result<Mapping, DeviceError> {
        let mut state = self.state.lock();
        let handle = state
            .fake_offsets
            .remove(&fake_offset)
            .ok_or(DeviceError::Ioctl { op: "mmap", errno: EINVAL })?;
        state.calls.maps += 1;
        state.map_buffer(handle, size)
    }

    fn map_linear(&self, handle: GemHandle, size: u64) -> Result<Mapping, DeviceError> {
        let mut state = self.state.lock();
        if state.take_interrupt() {
            return Err(DeviceError::Interrupted);
        }
        state.calls.maps += 1;
        state.map_buffer(handle, size)
    }

    fn set_domain(
        &self,
        handle: GemHandle,
        _read: Domain,
        _write: Option<Domain>,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.take_interrupt() {
            return Err(DeviceError::Interrupted);
        }
        state.calls.set_domain += 1;
        if state.fail_set_domain {
            return Err(DeviceError::Ioctl { op: "set_domain", errno: EINVAL });
        }
        state.buffer_mut(handle)?;
        // Moving into a domain waits for the GPU.
        state.busy.remove(&handle);
        Ok(())
    }

    fn unmap(&self, mapping: Mapping) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.calls.unmaps += 1;
        let addr = mapping.as_ptr() as usize;
        let Some(&handle) = state.mapped_at.get(&addr) else {
            return;
        };
        let remaining = match state.buffers.get_mut(&handle) {
            Some(buffer) => {
                buffer.mapped = buffer.mapped.saturating_sub(1);
                buffer.mapped
            }
            None => match state.detached.get_mut(&addr) {
                Some((_, count)) => {
                    *count = count.saturating_sub(1);
                    *count
                }
                None => 0,
            },
        };
        if remaining == 0 {
            state.mapped_at.remove(&addr);
            state.detached.remove(&addr);
        }
    }

    fn is_busy(&self, handle: GemHandle) -> bool {
        let mut state = self.state.lock();
        state.calls.busy_queries += 1;
        state.busy.contains(&handle)
    }

    fn madvise(&self, handle: GemHandle, advice: Madvise) -> bool {
        let mut state = self.state.lock();
        state.calls.madvise += 1;
        let reclaim = state.reclaim_on_dontneed;
        let Some(buffer) = state.buffers.get_mut(&handle) else {
            return false;
        };
        match advice {
            Madvise::WillNeed => buffer.purgeable = false,
            Madvise::DontNeed => {
                buffer.purgeable = true;
                if reclaim {
                    buffer.reclaim();
                }
            }
        }
        !buffer.purged
    }

    fn set_tiling(
        &self,
        handle: GemHandle,
        mode: TilingMode,
        stride: u32,
    ) -> Result<TilingState, DeviceError> {
        let mut state = self.state.lock();
        if state.take_interrupt() {
            return Err(DeviceError::Interrupted);
        }
        state.calls.set_tiling += 1;
        if state.fail_set_tiling {
            return Err(DeviceError::Ioctl { op: "set_tiling", errno: EINVAL });
        }
        let tiling = adjusted_tiling(mode, stride)?;
        state.buffer_mut(handle)?.tiling = tiling;
        Ok(tiling)
    }

    fn pwrite(&self, handle: GemHandle, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.take_interrupt() {
            return Err(DeviceError::Interrupted);
        }
        let buffer = state.buffer_mut(handle)?;
        let range = checked_range(offset, data.len(), buffer.size)?;
        buffer.storage_mut()?[range].copy_from_slice(data);
        Ok(())
    }

    fn pread(&self, handle: GemHandle, offset: u64, out: &mut [u8]) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        if state.take_interrupt() {
            return Err(DeviceError::Interrupted);
        }
        let buffer = state.buffer_mut(handle)?;
        let range = checked_range(offset, out.len(), buffer.size)?;
        out.copy_from_slice(&buffer.storage_mut()?[range]);
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
