// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Reuse strategies, purge/trim eviction and queries for the cache manager.
//!
//! Everything here runs with the cache mutex held; callers pass the guarded
//! state in.

use std::sync::Arc;

use super::bucket::BucketGeometry;
use super::cache_types::{
    lock_or_recover, CacheStats, METRIC_ORPHAN, METRIC_PURGE, METRIC_RECLAIMABLE, METRIC_STALE,
    METRIC_TRIM_EVICT,
};
use super::manager::{CacheManager, CacheState};
use crate::bo::BufferObject;
use crate::device::{BoDevice, GemHandle, Madvise};
use crate::error::BoError;
use crate::pool::PoolStats;

impl<D: BoDevice + ?Sized> CacheManager<D> {
    /// Newest-first scan of the target bucket, then of each larger bucket.
    /// Any retained buffer is good enough for the GPU to overwrite.
    pub(super) fn reuse_for_gpu(&self, state: &mut CacheState, first: usize) -> Option<BufferObject> {
        for index in first..state.buckets.len() {
            while let Some(bo) = state.remove_newest(index) {
                if bo.madvise(&*self.device, Madvise::WillNeed) {
                    return Some(bo);
                }
                self.discard_stale(state, bo);
            }
        }
        None
    }

    /// Only the newest entry of the exact bucket, and only if the GPU is done
    /// with it. A busy candidate stays cached.
    pub(super) fn reuse_for_cpu(&self, state: &mut CacheState, index: usize) -> Option<BufferObject> {
        loop {
            let candidate = state.buckets[index].peek_newest()?;
            if !candidate.is_inactive(&*self.device) {
                return None;
            }
            let bo = state.remove_newest(index)?;
            if bo.madvise(&*self.device, Madvise::WillNeed) {
                return Some(bo);
            }
            self.discard_stale(state, bo);
        }
    }

    fn discard_stale(&self, state: &mut CacheState, bo: BufferObject) {
        tracing::trace!(handle = %bo.handle(), "cached buffer was reclaimed by the device");
        state.stats.stale_discards += 1;
        metrics::counter!(METRIC_STALE).increment(1);
        self.destroy(state, bo);
    }

    /// Close the device handle and recycle the record.
    pub(super) fn destroy(&self, state: &mut CacheState, mut bo: BufferObject) {
        bo.unmap(&*self.device);
        self.device.destroy(bo.handle());
        state.pool.free(bo.into_record());
    }

    /// Destroy buffers that were dropped instead of released.
    pub(super) fn reap_orphans(&self, state: &mut CacheState) {
        let orphans = std::mem::take(&mut *self.orphans.lock());
        if orphans.is_empty() {
            return;
        }
        let reaped = orphans.len() as u64;
        for mut record in orphans {
            record.orphans = None;
            self.destroy(state, BufferObject::from_record(record));
        }
        state.stats.orphans_reaped += reaped;
        metrics::counter!(METRIC_ORPHAN).increment(reaped);
        tracing::debug!(reaped, "destroyed buffers dropped without release");
    }

    /// Advise every cached buffer `DontNeed` and destroy those the device
    /// has already reclaimed. Ignores retention floors.
    pub(super) fn purge(&self, state: &mut CacheState) {
        let before = state.reclaimable_bytes;
        let mut purged = 0u64;
        for index in 0..state.buckets.len() {
            let mut pos = 0;
            while let Some(handle) = state.buckets[index].handle_at(pos) {
                if self.device.madvise(handle, Madvise::DontNeed) {
                    pos += 1;
                    continue;
                }
                match state.remove_at(index, pos) {
                    Some(bo) => {
                        self.destroy(state, bo);
                        purged += 1;
                    }
                    None => break,
                }
            }
        }
        state.stats.purge_passes += 1;
        state.stats.purged += purged;
        metrics::counter!(METRIC_PURGE).increment(1);
        tracing::debug!(
            purged,
            before,
            after = state.reclaimable_bytes,
            high_watermark = self.high_watermark,
            "purge pass"
        );
        self.publish_reclaimable(state);
    }

    /// Evict the newest entry of every bucket above its floor, largest
    /// bucket first, until reclaimable bytes drop to the low watermark.
    /// The watermark is checked before each eviction, so the last pass may
    /// stop part way down the buckets.
    pub(super) fn trim(&self, state: &mut CacheState) {
        let mut evicted = 0u64;
        while state.reclaimable_bytes > self.low_watermark {
            let mut progressed = false;
            for index in (0..state.buckets.len()).rev() {
                if state.reclaimable_bytes <= self.low_watermark {
                    break;
                }
                if !state.buckets[index].is_reclaimable() {
                    continue;
                }
                if let Some(bo) = state.remove_newest(index) {
                    self.destroy(state, bo);
                    evicted += 1;
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        state.stats.trim_evictions += evicted;
        metrics::counter!(METRIC_TRIM_EVICT).increment(evicted);
        tracing::debug!(
            evicted,
            after = state.reclaimable_bytes,
            low_watermark = self.low_watermark,
            "trim pass"
        );
        self.publish_reclaimable(state);
    }

    pub(super) fn allocate_fresh(
        &self,
        state: &mut CacheState,
        size: u64,
    ) -> Result<BufferObject, BoError> {
        let mut record = state.pool.alloc().map_err(|err| {
            tracing::debug!(error = %err, size, "record pool refused allocation");
            state.stats.allocation_failures += 1;
            BoError::OutOfMemory { size }
        })?;

        match self.device.create(size) {
            Ok(handle) => {
                record.handle = handle;
                record.size = size;
                record.orphans = Some(Arc::downgrade(&self.orphans));
                state.stats.fresh_allocations += 1;
                tracing::debug!(%handle, size, "allocated fresh buffer");
                Ok(BufferObject::from_record(record))
            }
            Err(err) => {
                state.pool.free(record);
                state.stats.allocation_failures += 1;
                tracing::debug!(error = %err, size, "device refused allocation");
                Err(BoError::OutOfMemory { size })
            }
        }
    }

    pub(super) fn publish_reclaimable(&self, state: &CacheState) {
        metrics::gauge!(METRIC_RECLAIMABLE).set(state.reclaimable_bytes as f64);
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    pub fn geometry(&self) -> BucketGeometry {
        self.geometry
    }

    /// `(high, low)` watermarks in bytes.
    pub fn watermarks(&self) -> (u64, u64) {
        (self.high_watermark, self.low_watermark)
    }

    pub fn bucket_count(&self) -> usize {
        self.geometry.bucket_count()
    }

    pub fn bucket_size(&self, index: usize) -> u64 {
        self.geometry.bucket_size(index)
    }

    pub fn min_entries(&self, index: usize) -> usize {
        lock_or_recover(&self.state)
            .buckets
            .get(index)
            .map_or(0, |b| b.min_entries())
    }

    pub fn bucket_len(&self, index: usize) -> usize {
        lock_or_recover(&self.state)
            .buckets
            .get(index)
            .map_or(0, |b| b.len())
    }

    /// Cached handles in bucket `index`, oldest first.
    pub fn bucket_handles(&self, index: usize) -> Vec<GemHandle> {
        lock_or_recover(&self.state)
            .buckets
            .get(index)
            .map(|b| b.handles())
            .unwrap_or_default()
    }

    /// Cached bytes above the retention floors; the figure compared against
    /// the watermarks.
    pub fn total_cached_bytes(&self) -> u64 {
        lock_or_recover(&self.state).reclaimable_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let state = lock_or_recover(&self.state);
        let mut stats = state.stats.clone();
        stats.cached_count = state.buckets.iter().map(|b| b.len()).sum();
        stats.cached_bytes = state
            .buckets
            .iter()
            .map(|b| b.size() * b.len() as u64)
            .sum();
        stats.reclaimable_bytes = state.reclaimable_bytes;
        stats.live_records = state.pool.outstanding();
        stats
    }

    pub fn pool_stats(&self) -> PoolStats {
        lock_or_recover(&self.state).pool.stats()
    }
}
