// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Interrupt retry for device calls.

use super::types::DeviceError;

/// Run `op` until it completes with anything other than
/// [`DeviceError::Interrupted`].
#[inline]
pub fn retry_interrupted<T, F>(mut op: F) -> Result<T, DeviceError>
where
    F: FnMut() -> Result<T, DeviceError>,
{
    loop {
        match op() {
            Err(DeviceError::Interrupted) => {
                tracing::trace!("device call interrupted, retrying");
            }
            other => return other,
        }
    }
}
