// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Buffers exchanged between the application and the driver.
//!
//! Every port with application-visible buffers owns one [`BufferPool`]. The
//! pool hands out [`Buffer`] descriptors; a descriptor is either queued in
//! the pool, held by the application, or owned by the driver between
//! submission and the completion callback.
//!
//! # Key Types
//!
//! - [`Buffer`]: RAII descriptor of one buffer, returned to its pool on drop
//!   unless it was submitted
//! - [`BufferPool`]: per-port slots plus the availability queue
//! - [`AlignedMemory`]: caller-owned backing store for externally allocated
//!   buffers

pub mod descriptor;
pub mod memory;
pub mod pool;

pub use descriptor::{Buffer, BufferFlags, HeaderPtr, Ownership};
pub use memory::{AlignedMemory, Memory};
pub use pool::{BufferPool, PoolStats};
