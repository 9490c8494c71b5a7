// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Size-bucketed buffer-object cache.

pub mod bucket;
pub mod cache_types;
pub mod manager;
mod manager_ops;

pub use bucket::{min_entries_for, BucketGeometry, SizeClass};
pub use cache_types::{CacheStats, Target};
pub use manager::CacheManager;

#[cfg(test)]
#[path = "manager_tests.rs"]
mod manager_tests;
