// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Buffer objects and shared handles to them.

pub mod buffer_object;
pub mod shared;

pub(crate) use buffer_object::{BoRecord, OrphanQueue};
pub use buffer_object::BufferObject;
pub use shared::SharedBo;
