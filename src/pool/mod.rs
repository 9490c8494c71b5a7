// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Host-side record storage for buffer-object metadata.

pub mod record_pool;

pub use record_pool::{PoolError, PoolStats, RecordPool};
