// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Size classes and per-class free lists.
//!
//! Bucket `i` serves buffers of exactly `page_size << i` bytes. Entries are
//! ordered oldest (front) to newest (back). Only entries above a bucket's
//! retention floor count as reclaimable bytes.

use std::collections::VecDeque;

use crate::bo::BufferObject;
use crate::device::GemHandle;

/// Result of rounding a request to a size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClass {
    /// Bytes to allocate: the class size, or the raw request if uncached.
    pub size: u64,
    /// Bucket index, or `None` when the request is too large to cache.
    pub bucket: Option<usize>,
}

/// Size-class arithmetic for a page size and bucket count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketGeometry {
    page_shift: u32,
    bucket_count: usize,
}

impl BucketGeometry {
    /// `page_size` must be a power of two.
    pub fn new(page_size: u64, bucket_count: usize) -> Self {
        debug_assert!(page_size.is_power_of_two());
        Self {
            page_shift: page_size.trailing_zeros(),
            bucket_count,
        }
    }

    pub fn page_size(&self) -> u64 {
        1 << self.page_shift
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn bucket_size(&self, index: usize) -> u64 {
        self.page_size() << index
    }

    /// Round a request up to a power-of-two number of pages.
    ///
    /// Zero-byte requests land in bucket 0.
    pub fn classify(&self, size: u64) -> SizeClass {
        let pages = size.max(1).div_ceil(self.page_size());
        if let Some(rounded) = pages.checked_next_power_of_two() {
            let index = rounded.trailing_zeros() as usize;
            if index < self.bucket_count {
                return SizeClass {
                    size: rounded << self.page_shift,
                    bucket: Some(index),
                };
            }
        }
        SizeClass { size, bucket: None }
    }

    /// Bucket for a buffer coming back to the cache. Only sizes that are an
    /// exact power-of-two number of pages qualify.
    pub fn release_bucket(&self, size: u64) -> Option<usize> {
        if size == 0 || size & (self.page_size() - 1) != 0 {
            return None;
        }
        let pages = size >> self.page_shift;
        if !pages.is_power_of_two() {
            return None;
        }
        let index = pages.trailing_zeros() as usize;
        (index < self.bucket_count).then_some(index)
    }
}

/// Retention floor for bucket `index`: `floor` halved per bucket.
pub fn min_entries_for(floor: usize, index: usize) -> usize {
    u32::try_from(index)
        .ok()
        .and_then(|shift| floor.checked_shr(shift))
        .unwrap_or(0)
}

/// Free list for one size class.
#[derive(Debug)]
pub(crate) struct Bucket {
    size: u64,
    min_entries: usize,
    entries: VecDeque<BufferObject>,
}

impl Bucket {
    pub(crate) fn new(size: u64, min_entries: usize) -> Self {
        Self {
            size,
            min_entries,
            entries: VecDeque::new(),
        }
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn min_entries(&self) -> usize {
        self.min_entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bucket holds entries above its floor.
    pub(crate) fn is_reclaimable(&self) -> bool {
        self.entries.len() > self.min_entries
    }

    /// Append as newest. Returns the bytes that became reclaimable.
    pub(crate) fn insert(&mut self, bo: BufferObject) -> u64 {
        debug_assert_eq!(bo.size(), self.size);
        self.entries.push_back(bo);
        if self.entries.len() > self.min_entries {
            self.size
        } else {
            0
        }
    }

    pub(crate) fn peek_newest(&self) -> Option<&BufferObject> {
        self.entries.back()
    }

    pub(crate) fn handle_at(&self, pos: usize) -> Option<GemHandle> {
        self.entries.get(pos).map(BufferObject::handle)
    }

    /// Take the entry at `pos` out of the list. Returns it with the bytes
    /// that stopped being reclaimable: the entry counted if the list was
    /// above its floor before the removal.
    pub(crate) fn commit_removal(&mut self, pos: usize) -> Option<(BufferObject, u64)> {
        let counted = self.entries.len() > self.min_entries;
        let bo = self.entries.remove(pos)?;
        Some((bo, if counted { self.size } else { 0 }))
    }

    pub(crate) fn commit_newest(&mut self) -> Option<(BufferObject, u64)> {
        let last = self.entries.len().checked_sub(1)?;
        self.commit_removal(last)
    }

    /// Handles from oldest to newest.
    pub(crate) fn handles(&self) -> Vec<GemHandle> {
        self.entries.iter().map(BufferObject::handle).collect()
    }

    /// Remove every entry, oldest first.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = BufferObject> + '_ {
        self.entries.drain(..)
    }
}

#[cfg(test)]
#[path = "bucket_tests.rs"]
mod tests;
