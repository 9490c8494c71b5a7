// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Error type surfaced by cache and buffer-object operations.

use thiserror::Error;

use crate::config::ConfigError;
use crate::device::{DeviceError, GemHandle};

#[derive(Error, Debug)]
pub enum BoError {
    /// Neither the cache nor the device could supply a buffer.
    #[error("out of memory allocating {size} bytes")]
    OutOfMemory { size: u64 },

    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    #[error("buffer {0} is already mapped")]
    AlreadyMapped(GemHandle),

    #[error("buffer {0} is referenced by pending GPU work")]
    GpuBusy(GemHandle),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
