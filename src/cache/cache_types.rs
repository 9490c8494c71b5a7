// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Cache statistics, acquire hints and lock helpers.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

pub(crate) const METRIC_HIT: &str = "bocache.acquire.hit";
pub(crate) const METRIC_MISS: &str = "bocache.acquire.miss";
pub(crate) const METRIC_STALE: &str = "bocache.stale_discard";
pub(crate) const METRIC_RELEASE_CACHED: &str = "bocache.release.cached";
pub(crate) const METRIC_RELEASE_DESTROYED: &str = "bocache.release.destroyed";
pub(crate) const METRIC_PURGE: &str = "bocache.purge";
pub(crate) const METRIC_TRIM_EVICT: &str = "bocache.trim.evict";
pub(crate) const METRIC_ORPHAN: &str = "bocache.orphan_reaped";
pub(crate) const METRIC_RECLAIMABLE: &str = "bocache.reclaimable_bytes";

/// Acquire a mutex lock, recovering from poison if a thread panicked.
#[inline]
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("buffer cache mutex poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Who writes the buffer next. Decides how the cache looks for a reusable
/// buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// CPU uploads. Only an idle buffer of the exact size class is reused.
    Cpu,
    /// GPU render targets. Any retained buffer of the size class or larger
    /// is acceptable.
    Gpu,
}

/// Snapshot of cache activity.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fresh_allocations: u64,
    pub allocation_failures: u64,
    /// Cached buffers found reclaimed by the device when reused.
    pub stale_discards: u64,
    pub purge_passes: u64,
    /// Buffers destroyed by purge passes.
    pub purged: u64,
    pub trim_evictions: u64,
    pub released_to_cache: u64,
    pub released_destroyed: u64,
    pub imported: u64,
    /// Buffers dropped without release and destroyed by the manager.
    pub orphans_reaped: u64,
    /// Buffers currently sitting in buckets.
    pub cached_count: usize,
    /// Full footprint of cached buffers.
    pub cached_bytes: u64,
    /// Cached bytes above the per-bucket retention floors.
    pub reclaimable_bytes: u64,
    /// Buffer-object records alive, cached or held by callers.
    pub live_records: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}
