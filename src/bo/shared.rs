// Copyright 2024-2026 bocache Contributors
// Licensed under the Apache License, Version 2.0

//! Reference-counted buffer handles.
//!
//! Several owners (a surface and the batch that renders into it, say) can
//! hold the same buffer. The last handle dropped releases the buffer back to
//! its cache manager.

use std::fmt;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::BufferObject;
use crate::cache::{CacheManager, Target};
use crate::device::{BoDevice, GemHandle};
use crate::error::BoError;

struct SharedInner<D: BoDevice + ?Sized> {
    manager: Arc<CacheManager<D>>,
    bo: ManuallyDrop<Mutex<BufferObject>>,
}

impl<D: BoDevice + ?Sized> Drop for SharedInner<D> {
    fn drop(&mut self) {
        // SAFETY: `bo` is taken exactly once, here, and never touched again.
        let bo = unsafe { ManuallyDrop::take(&mut self.bo) }.into_inner();
        self.manager.release(bo);
    }
}

/// Shared ownership of a [`BufferObject`].
pub struct SharedBo<D: BoDevice + ?Sized> {
    inner: Arc<SharedInner<D>>,
}

impl<D: BoDevice + ?Sized> SharedBo<D> {
    pub fn new(manager: Arc<CacheManager<D>>, bo: BufferObject) -> Self {
        Self {
            inner: Arc::new(SharedInner {
                manager,
                bo: ManuallyDrop::new(Mutex::new(bo)),
            }),
        }
    }

    /// Acquire from `manager` and wrap the result.
    pub fn acquire(
        manager: &Arc<CacheManager<D>>,
        size: u64,
        target: Target,
    ) -> Result<Self, BoError> {
        let bo = manager.acquire(size, target)?;
        Ok(Self::new(Arc::clone(manager), bo))
    }

    /// Number of live handles to this buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn manager(&self) -> &Arc<CacheManager<D>> {
        &self.inner.manager
    }

    pub fn handle(&self) -> GemHandle {
        self.inner.bo.lock().handle()
    }

    pub fn size(&self) -> u64 {
        self.inner.bo.lock().size()
    }

    /// Lock the buffer for exclusive use.
    pub fn lock(&self) -> MutexGuard<'_, BufferObject> {
        self.inner.bo.lock()
    }

    /// Run `f` with the buffer and the device it lives on.
    pub fn with<R>(&self, f: impl FnOnce(&mut BufferObject, &D) -> R) -> R {
        let mut bo = self.inner.bo.lock();
        f(&mut *bo, &**self.inner.manager.device())
    }

    /// Whether both handles refer to the same buffer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<D: BoDevice + ?Sized> Clone for SharedBo<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: BoDevice + ?Sized> fmt::Debug for SharedBo<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBo")
            .field("handle", &self.handle())
            .field("refs", &self.ref_count())
            .finish()
    }
}
