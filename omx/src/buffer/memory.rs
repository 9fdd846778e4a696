// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Backing memory of a buffer and who is responsible for releasing it.

use std::{
    alloc::{self, Layout},
    ptr::NonNull,
};

use crate::{Error, Result};

/// Zero-initialised heap memory with a caller-chosen alignment.
///
/// Released with the same layout it was allocated with when dropped.
pub struct AlignedMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}

// Safety: the region is uniquely owned; access is coordinated by the pool
// that holds it.
unsafe impl Send for AlignedMemory {}
unsafe impl Sync for AlignedMemory {}

impl AlignedMemory {
    /// Allocates `size` bytes aligned to `alignment`.
    ///
    /// An alignment of `0` means "no requirement" and is treated as `1`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if the alignment is not a power of
    /// two or the allocator has no memory left.
    pub fn new(size: usize, alignment: usize) -> Result<Self> {
        let layout = Layout::from_size_align(size.max(1), alignment.max(1)).map_err(|err| {
            Error::AllocationFailed(format!(
                "invalid layout (size {size}, alignment {alignment}): {err}"
            ))
        })?;
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            Error::AllocationFailed(format!("out of memory allocating {size} bytes"))
        })?;
        Ok(Self { ptr, layout })
    }

    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }
}

impl Drop for AlignedMemory {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with exactly this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl std::fmt::Debug for AlignedMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedMemory")
            .field("ptr", &self.ptr)
            .field("len", &self.len())
            .field("alignment", &self.alignment())
            .finish()
    }
}

/// The backing store of one pool slot.
///
/// Driver memory is reclaimed by the driver when the header is freed; caller
/// memory is released here, after the header is gone.
#[derive(Debug)]
pub enum Memory {
    Driver,
    Caller(AlignedMemory),
}
