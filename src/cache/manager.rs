// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Buffer-object cache manager: acquire, release, import and teardown.
//!
//! One manager exists per device. A single mutex guards the buckets, the
//! reclaimable-byte total and the record pool; it is held for the whole of
//! each `acquire`/`release`, including the advisory device calls made while
//! a buffer is still cache-owned.

use std::sync::{Arc, Mutex};

use super::bucket::{min_entries_for, Bucket, BucketGeometry};
use super::cache_types::{
    lock_or_recover, CacheStats, Target, METRIC_HIT, METRIC_MISS, METRIC_RELEASE_CACHED,
    METRIC_RELEASE_DESTROYED,
};
use crate::bo::{BoRecord, BufferObject, OrphanQueue};
use crate::config::CacheConfig;
use crate::device::{BoDevice, Madvise};
use crate::error::BoError;
use crate::pool::RecordPool;

/// State guarded by the cache mutex.
#[derive(Debug)]
pub(super) struct CacheState {
    pub(super) buckets: Vec<Bucket>,
    /// Bytes cached above the bucket floors.
    pub(super) reclaimable_bytes: u64,
    pub(super) pool: RecordPool<BoRecord>,
    pub(super) stats: CacheStats,
    pub(super) shut_down: bool,
}

impl CacheState {
    pub(super) fn insert(&mut self, index: usize, bo: BufferObject) {
        self.reclaimable_bytes += self.buckets[index].insert(bo);
    }

    pub(super) fn remove_at(&mut self, index: usize, pos: usize) -> Option<BufferObject> {
        let (bo, bytes) = self.buckets[index].commit_removal(pos)?;
        self.reclaimable_bytes -= bytes;
        Some(bo)
    }

    pub(super) fn remove_newest(&mut self, index: usize) -> Option<BufferObject> {
        let (bo, bytes) = self.buckets[index].commit_newest()?;
        self.reclaimable_bytes -= bytes;
        Some(bo)
    }
}

/// Size-bucketed cache of device buffers.
pub struct CacheManager<D: BoDevice + ?Sized> {
    pub(super) device: Arc<D>,
    pub(super) geometry: BucketGeometry,
    pub(super) high_watermark: u64,
    pub(super) low_watermark: u64,
    pub(super) state: Mutex<CacheState>,
    /// Buffers dropped unreleased. Locked on its own, never with `state`
    /// held by the dropping thread.
    pub(super) orphans: Arc<OrphanQueue>,
}

impl<D: BoDevice + ?Sized> CacheManager<D> {
    /// Initialise the cache for `device`.
    ///
    /// Queries the aperture to derive default watermarks.
    pub fn new(device: Arc<D>, config: CacheConfig) -> Result<Self, BoError> {
        config.validate()?;
        let aperture = device.aperture()?;
        let (high_watermark, low_watermark) = config.watermarks(aperture.total);
        let geometry = BucketGeometry::new(config.page_size, config.bucket_count);

        let buckets = (0..config.bucket_count)
            .map(|i| Bucket::new(geometry.bucket_size(i), min_entries_for(config.retention_floor, i)))
            .collect();
        let pool = RecordPool::new(config.max_free_records).with_limit(config.max_records);

        tracing::info!(
            aperture = aperture.total,
            buckets = config.bucket_count,
            high_watermark,
            low_watermark,
            "buffer cache initialised"
        );

        Ok(Self {
            device,
            geometry,
            high_watermark,
            low_watermark,
            state: Mutex::new(CacheState {
                buckets,
                reclaimable_bytes: 0,
                pool,
                stats: CacheStats::default(),
                shut_down: false,
            }),
            orphans: Arc::default(),
        })
    }

    /// Get a buffer of at least `size` bytes.
    ///
    /// Reuses a cached buffer when the access pattern allows it; otherwise
    /// purges and trims if the cache is over budget, then allocates fresh.
    /// Fails with [`BoError::OutOfMemory`] only if the fresh allocation fails.
    pub fn acquire(&self, size: u64, target: Target) -> Result<BufferObject, BoError> {
        let class = self.geometry.classify(size);
        let mut state = lock_or_recover(&self.state);
        self.reap_orphans(&mut state);

        if let Some(index) = class.bucket {
            let reused = match target {
                Target::Gpu => self.reuse_for_gpu(&mut state, index),
                Target::Cpu => self.reuse_for_cpu(&mut state, index),
            };
            if let Some(bo) = reused {
                state.stats.hits += 1;
                metrics::counter!(METRIC_HIT).increment(1);
                tracing::trace!(handle = %bo.handle(), size = bo.size(), ?target, "cache hit");
                return Ok(bo);
            }
        }

        state.stats.misses += 1;
        metrics::counter!(METRIC_MISS).increment(1);
        tracing::trace!(size = class.size, bucket = ?class.bucket, ?target, "cache miss");

        if state.reclaimable_bytes > self.high_watermark {
            self.purge(&mut state);
            if state.reclaimable_bytes > self.low_watermark {
                self.trim(&mut state);
            }
        }

        self.allocate_fresh(&mut state, class.size)
    }

    /// Hand a buffer back.
    ///
    /// Exported buffers, buffers outside every size class and buffers whose
    /// memory the device already reclaimed are destroyed; the rest become the
    /// newest entry of their bucket.
    pub fn release(&self, mut bo: BufferObject) {
        if bo.is_mapped() {
            tracing::warn!(handle = %bo.handle(), "released while mapped, unmapping");
            bo.unmap(&*self.device);
        }
        let bucket = self.geometry.release_bucket(bo.size());

        let mut state = lock_or_recover(&self.state);
        self.reap_orphans(&mut state);
        let cacheable = match bucket {
            Some(index)
                if bo.name() == 0
                    && !state.shut_down
                    && bo.madvise(&*self.device, Madvise::DontNeed) =>
            {
                Some(index)
            }
            _ => None,
        };

        match cacheable {
            Some(index) => {
                state.insert(index, bo);
                state.stats.released_to_cache += 1;
                metrics::counter!(METRIC_RELEASE_CACHED).increment(1);
                self.publish_reclaimable(&state);
            }
            None => {
                tracing::trace!(handle = %bo.handle(), name = bo.name(), "destroying on release");
                self.destroy(&mut state, bo);
                state.stats.released_destroyed += 1;
                metrics::counter!(METRIC_RELEASE_DESTROYED).increment(1);
            }
        }
    }

    /// Open a buffer exported by another client under `name`.
    ///
    /// The result is never cached; releasing it destroys the handle.
    pub fn create_for_name(&self, name: u32) -> Result<BufferObject, BoError> {
        let mut record = lock_or_recover(&self.state)
            .pool
            .alloc()
            .map_err(|err| {
                tracing::debug!(error = %err, "record pool refused import");
                BoError::OutOfMemory {
                    size: std::mem::size_of::<BoRecord>() as u64,
                }
            })?;

        let opened = self.device.open_for_name(name).and_then(|(handle, size)| {
            match self.device.get_tiling(handle) {
                Ok(tiling) => Ok((handle, size, tiling)),
                Err(err) => {
                    self.device.destroy(handle);
                    Err(err)
                }
            }
        });

        let mut state = lock_or_recover(&self.state);
        match opened {
            Ok((handle, size, tiling)) => {
                record.handle = handle;
                record.size = size;
                record.name = name;
                record.tiling = tiling;
                record.orphans = Some(Arc::downgrade(&self.orphans));
                state.stats.imported += 1;
                Ok(BufferObject::from_record(record))
            }
            Err(err) => {
                state.pool.free(record);
                Err(err.into())
            }
        }
    }

    /// Destroy every cached buffer and release the record freelist.
    ///
    /// Buffers released afterwards are destroyed immediately.
    pub fn shutdown(&self) {
        let mut state = lock_or_recover(&self.state);
        self.teardown(&mut state);
    }

    fn teardown(&self, state: &mut CacheState) {
        self.reap_orphans(state);
        let mut destroyed = 0usize;
        for index in 0..state.buckets.len() {
            let drained: Vec<BufferObject> = state.buckets[index].drain().collect();
            for bo in drained {
                self.destroy(state, bo);
                destroyed += 1;
            }
        }
        state.reclaimable_bytes = 0;
        state.pool.drain();
        let outstanding = state.pool.outstanding();
        if !state.shut_down {
            tracing::info!(destroyed, outstanding, "buffer cache torn down");
        }
        if outstanding > 0 {
            tracing::warn!(outstanding, "buffer objects still held at teardown");
        }
        state.shut_down = true;
        self.publish_reclaimable(state);
    }
}

impl<D: BoDevice + ?Sized> Drop for CacheManager<D> {
    fn drop(&mut self) {
        let mut state = lock_or_recover(&self.state);
        self.teardown(&mut state);
    }
}
