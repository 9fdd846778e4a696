// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Buffer descriptors handed to the application.

use std::{fmt, ptr::NonNull, sync::Arc};

use omx_sys::BufferHeader;

use crate::{Error, Result, buffer::BufferPool};

/// Pointer to a driver buffer header.
///
/// The header itself lives in driver memory for as long as the buffer is
/// allocated; this type only carries the address across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeaderPtr(NonNull<BufferHeader>);

// Safety: ownership of the header is handed over explicitly (application,
// pool, driver); the pointer is never dereferenced by two owners at once.
unsafe impl Send for HeaderPtr {}
unsafe impl Sync for HeaderPtr {}

impl HeaderPtr {
    pub fn new(ptr: NonNull<BufferHeader>) -> Self {
        Self(ptr)
    }

    pub fn from_raw(ptr: *mut BufferHeader) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut BufferHeader {
        self.0.as_ptr()
    }

    /// The pool slot index stored in `pAppPrivate` at allocation time.
    pub(crate) fn slot_index(self) -> usize {
        // SAFETY: headers stay valid until freed and this field is written
        // once, before the header is first handed to the driver.
        unsafe { (*self.0.as_ptr()).pAppPrivate as usize }
    }
}

/// Flags carried in a buffer header.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const END_OF_STREAM: BufferFlags = BufferFlags(omx_sys::OMX_BUFFERFLAG_EOS);
    pub const START_TIME: BufferFlags = BufferFlags(omx_sys::OMX_BUFFERFLAG_STARTTIME);
    pub const DECODE_ONLY: BufferFlags = BufferFlags(omx_sys::OMX_BUFFERFLAG_DECODEONLY);
    pub const DATA_CORRUPT: BufferFlags = BufferFlags(omx_sys::OMX_BUFFERFLAG_DATACORRUPT);
    pub const END_OF_FRAME: BufferFlags = BufferFlags(omx_sys::OMX_BUFFERFLAG_ENDOFFRAME);
    pub const SYNC_FRAME: BufferFlags = BufferFlags(omx_sys::OMX_BUFFERFLAG_SYNCFRAME);
    pub const EXTRA_DATA: BufferFlags = BufferFlags(omx_sys::OMX_BUFFERFLAG_EXTRADATA);
    pub const CODEC_CONFIG: BufferFlags = BufferFlags(omx_sys::OMX_BUFFERFLAG_CODECCONFIG);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: BufferFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: BufferFlags) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = BufferFlags;

    fn bitor(self, rhs: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for BufferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferFlags(0x{:x})", self.0)
    }
}

/// Who allocated the memory behind a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Driver,
    Caller,
}

/// A buffer descriptor held by the application.
///
/// Obtained from [`crate::Component::acquire_input_buffer`] or
/// [`crate::Component::acquire_output_buffer`]. Passing it to
/// [`crate::Component::submit_filled`] or [`crate::Component::request_fill`]
/// transfers it to the driver until the completion callback returns it to
/// the pool.
///
/// A descriptor that is dropped without being submitted goes straight back
/// to the availability queue of its pool.
///
/// # Examples
///
/// ```no_run
/// # use omx::{BufferFlags, Component};
/// # use std::time::Duration;
/// # fn example(encoder: &Component, frame: &[u8]) -> Result<(), omx::Error> {
/// if let Some(mut buffer) = encoder.acquire_input_buffer(Duration::from_millis(200)) {
///     buffer.write(frame)?;
///     buffer.set_flags(BufferFlags::END_OF_FRAME);
///     encoder.submit_filled(buffer)?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Buffer {
    header: HeaderPtr,
    index: usize,
    generation: u64,
    port: u32,
    ownership: Ownership,
    pool: Arc<BufferPool>,
    /// Cleared once ownership moves to the driver, so drop does not requeue.
    held: bool,
}

impl Buffer {
    pub(crate) fn new(
        pool: Arc<BufferPool>,
        header: HeaderPtr,
        index: usize,
        generation: u64,
        port: u32,
        ownership: Ownership,
    ) -> Self {
        Self {
            header,
            index,
            generation,
            port,
            ownership,
            pool,
            held: true,
        }
    }

    fn header(&self) -> &BufferHeader {
        // SAFETY: the application holds the descriptor, so the driver does
        // not touch the header until it is submitted, and the pool refuses
        // to free headers while descriptors are held.
        unsafe { &*self.header.as_ptr() }
    }

    fn header_mut(&mut self) -> &mut BufferHeader {
        // SAFETY: as above; `&mut self` makes the access exclusive.
        unsafe { &mut *self.header.as_ptr() }
    }

    /// Position of the buffer within its pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The port the buffer was allocated on.
    pub fn port(&self) -> u32 {
        self.port
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn header_ptr(&self) -> HeaderPtr {
        self.header
    }

    /// Size of the memory region in bytes.
    pub fn capacity(&self) -> usize {
        self.header().nAllocLen as usize
    }

    pub fn filled_len(&self) -> usize {
        self.header().nFilledLen as usize
    }

    pub fn offset(&self) -> usize {
        self.header().nOffset as usize
    }

    /// Sets the valid region to `offset..offset + len`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] if the region does not fit the buffer.
    pub fn set_filled(&mut self, offset: usize, len: usize) -> Result<()> {
        let capacity = self.capacity();
        if offset.checked_add(len).is_none_or(|end| end > capacity) {
            return Err(Error::Other(format!(
                "region {offset}+{len} exceeds buffer capacity {capacity}"
            )));
        }
        let header = self.header_mut();
        header.nOffset = offset as u32;
        header.nFilledLen = len as u32;
        Ok(())
    }

    /// The valid payload (`offset..offset + filled_len`).
    pub fn data(&self) -> &[u8] {
        let header = self.header();
        if header.pBuffer.is_null() {
            return &[];
        }
        let start = (header.nOffset as usize).min(header.nAllocLen as usize);
        let end = start
            .saturating_add(header.nFilledLen as usize)
            .min(header.nAllocLen as usize);
        // SAFETY: pBuffer points to nAllocLen bytes owned by this descriptor.
        unsafe { std::slice::from_raw_parts(header.pBuffer.add(start), end - start) }
    }

    /// The whole memory region, regardless of the filled length.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let header = self.header_mut();
        if header.pBuffer.is_null() {
            return &mut [];
        }
        // SAFETY: as in `data`, with exclusive access through `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(header.pBuffer, header.nAllocLen as usize) }
    }

    /// Copies `payload` to the start of the buffer and marks it as the
    /// valid region.
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        self.set_filled(0, payload.len())?;
        self.data_mut()[..payload.len()].copy_from_slice(payload);
        Ok(())
    }

    pub fn flags(&self) -> BufferFlags {
        BufferFlags::from_bits(self.header().nFlags)
    }

    pub fn set_flags(&mut self, flags: BufferFlags) {
        self.header_mut().nFlags = flags.bits();
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags().contains(BufferFlags::END_OF_STREAM)
    }

    /// Keyframe marker used by consumers to split output into segments.
    pub fn is_sync_frame(&self) -> bool {
        self.flags().contains(BufferFlags::SYNC_FRAME)
    }

    /// Presentation timestamp in microseconds.
    pub fn timestamp(&self) -> i64 {
        self.header().nTimeStamp.to_micros()
    }

    pub fn set_timestamp(&mut self, micros: i64) {
        self.header_mut().nTimeStamp = omx_sys::Ticks::from_micros(micros);
    }

    /// Clears the payload metadata before the buffer is reused for filling.
    pub fn reset(&mut self) {
        let header = self.header_mut();
        header.nFilledLen = 0;
        header.nOffset = 0;
        header.nFlags = 0;
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn belongs_to(&self, pool: &BufferPool) -> bool {
        std::ptr::eq(Arc::as_ptr(&self.pool), pool)
    }

    /// Gives up the application's claim without requeueing.
    pub(crate) fn into_submitted(mut self) -> (HeaderPtr, usize) {
        self.held = false;
        (self.header, self.index)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("index", &self.index)
            .field("port", &self.port)
            .field("ownership", &self.ownership)
            .field("filled_len", &self.filled_len())
            .field("flags", &self.flags())
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if self.held {
            self.pool.restore(self.index, self.generation);
        }
    }
}
