// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Size-bucketed cache and allocator for GPU buffer objects.
//!
//! Buffer objects are rounded up to power-of-two page multiples and, when
//! released, parked in per-size buckets instead of being freed. Cached
//! buffers are advised purgeable so the device may reclaim their memory
//! under pressure; the cache discards such buffers when it next touches
//! them. Two watermarks over the reclaimable bytes bound the cache size.
//!
//! ```no_run
//! use std::sync::Arc;
//! use bocache::{CacheConfig, CacheManager, MockDevice, Target};
//!
//! # fn main() -> Result<(), bocache::BoError> {
//! let device = Arc::new(MockDevice::default());
//! let cache = CacheManager::new(device, CacheConfig::default())?;
//! let bo = cache.acquire(64 * 1024, Target::Gpu)?;
//! cache.release(bo);
//! # Ok(())
//! # }
//! ```

pub mod bo;
pub mod cache;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod pool;

pub use bo::{BufferObject, SharedBo};
pub use cache::{BucketGeometry, CacheManager, CacheStats, SizeClass, Target};
pub use config::{CacheConfig, ConfigError};
pub use device::{
    BoDevice, DeviceError, GemHandle, Madvise, MockDevice, SwizzleMode, TilingMode, TilingState,
};
pub use error::BoError;
