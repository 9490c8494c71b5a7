// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Fixed-size record freelist.
//!
//! Buffer-object records are allocated and freed at a high rate with a
//! uniform size. The pool keeps released boxes on a freelist and hands them
//! out again instead of going back to the global allocator.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("record pool exhausted: {limit} records outstanding")]
    Exhausted { limit: usize, record_size: usize },
}

/// Counters describing pool activity.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Records currently handed out.
    pub outstanding: usize,
    /// Records waiting on the freelist.
    pub free: usize,
    /// Allocations served by growing the pool.
    pub grown: u64,
    /// Allocations served from the freelist.
    pub recycled: u64,
}

/// Freelist of boxed `T` records.
#[derive(Debug)]
pub struct RecordPool<T: Default> {
    free: Vec<Box<T>>,
    outstanding: usize,
    max_outstanding: Option<usize>,
    max_free: usize,
    grown: u64,
    recycled: u64,
}

impl<T: Default> RecordPool<T> {
    /// Create a pool retaining at most `max_free` released records.
    pub fn new(max_free: usize) -> Self {
        Self {
            free: Vec::new(),
            outstanding: 0,
            max_outstanding: None,
            max_free,
            grown: 0,
            recycled: 0,
        }
    }

    /// Cap the number of records that may be outstanding at once.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.max_outstanding = limit;
        self
    }

    /// Pop a record from the freelist, or grow the pool. The record is reset
    /// to `T::default()` either way.
    pub fn alloc(&mut self) -> Result<Box<T>, PoolError> {
        if let Some(limit) = self.max_outstanding {
            if self.outstanding >= limit {
                return Err(PoolError::Exhausted {
                    limit,
                    record_size: std::mem::size_of::<T>(),
                });
            }
        }
        let record = match self.free.pop() {
            Some(mut record) => {
                *record = T::default();
                self.recycled += 1;
                record
            }
            None => {
                self.grown += 1;
                Box::default()
            }
        };
        self.outstanding += 1;
        Ok(record)
    }

    /// Return a record to the freelist.
    pub fn free(&mut self, record: Box<T>) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.free.len() < self.max_free {
            self.free.push(record);
        }
    }

    /// Release all freelist storage.
    pub fn drain(&mut self) {
        self.free.clear();
        self.free.shrink_to_fit();
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            outstanding: self.outstanding,
            free: self.free.len(),
            grown: self.grown,
            recycled: self.recycled,
        }
    }
}

#[cfg(test)]
#[path = "record_pool_tests.rs"]
mod tests;
