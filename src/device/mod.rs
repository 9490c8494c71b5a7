// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Device abstraction consumed by the buffer-object cache.

pub mod backend;
pub mod mock;
pub mod retry;
pub mod types;

pub use backend::BoDevice;
pub use mock::{MockCallCounts, MockDevice, DEFAULT_MOCK_APERTURE};
pub use retry::retry_interrupted;
pub use types::{
    ApertureInfo, DeviceError, Domain, GemHandle, Madvise, Mapping, SwizzleMode, TilingMode,
    TilingState,
};
