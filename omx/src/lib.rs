// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! # OMX - hardware component and tunnel core
//!
//! Safe, idiomatic Rust control of OpenMAX IL hardware units (camera, video
//! encoder, clock, ...) as found on the Broadcom VideoCore, built on the raw
//! ABI in [`omx_sys`].
//!
//! ## Overview
//!
//! A media pipeline is a chain of independently clocked hardware
//! components. Each component runs an asynchronous command protocol: the
//! application issues a command and the driver confirms it later from its
//! own callback thread. This crate turns that protocol into blocking,
//! timeout-bounded calls and manages the buffers the application exchanges
//! with the hardware.
//!
//! ### Key Concepts
//!
//! - **Component**: one hardware unit with a state machine and ports ([`Component`])
//! - **Port**: an input or output endpoint, numbered by the driver
//! - **Buffer**: a memory region exchanged with the driver ([`Buffer`], [`BufferPool`])
//! - **Event log**: the notifications the driver posts asynchronously ([`EventLog`])
//! - **Tunnel**: a driver-level binding of an output port to an input port ([`Tunnel`])
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  commands   ┌────────────┐
//! │ Component├────────────►│   Driver   │ (IlDriver or a test double)
//! │          │◄────────────┤  callbacks │
//! └────┬─────┘  events,    └────────────┘
//!      │        buffer returns
//!      ├─► EventLog          (command completions, errors)
//!      ├─► BufferPool input  (application fills, driver empties)
//!      └─► BufferPool output (driver fills, application drains)
//!
//! Tunnel: Component (output port) ══► Component (input port)
//! ```
//!
//! ## Examples
//!
//! ### Tunnelling a camera into an encoder and draining the output
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use omx::{Component, ComponentConfig, IlDriver, Tunnel, config, load_api};
//!
//! # fn main() -> Result<(), omx::Error> {
//! let api = load_api(config::library_path(), Some(config::host_library_path().as_path()))?;
//! let driver = Arc::new(IlDriver::new(api));
//!
//! let camera = Component::open(driver.clone(), "OMX.broadcom.camera", ComponentConfig::default())?;
//! let encoder =
//!     Component::open(driver, "OMX.broadcom.video_encode", ComponentConfig::default())?;
//!
//! // Tunnels first, then buffers on the remaining ports
//! let mut tunnel = Tunnel::bind(&camera, 71, &encoder, encoder.input_port());
//! tunnel.establish(false)?;
//! encoder.allocate_output_buffers(false)?;
//!
//! encoder.run()?;
//! camera.run()?;
//!
//! for _ in 0..100 {
//!     let Some(buffer) = encoder.acquire_output_buffer(Duration::from_millis(200)) else {
//!         continue; // no data yet
//!     };
//!     encoder.request_fill(buffer)?;
//!     if let Some(filled) = encoder.acquire_output_buffer(Duration::from_millis(200)) {
//!         println!("{} bytes, keyframe: {}", filled.data().len(), filled.is_sync_frame());
//!         encoder.request_fill(filled)?;
//!     }
//! }
//!
//! tunnel.deestablish(false)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Timeouts
//!
//! Every wait is bounded ([`Timeouts`]): 2000 ms for command completion,
//! 300 ms for plain events and 200 ms by default for buffer acquisition. A
//! buffer acquisition that times out returns `None`, which is the normal
//! "no data yet" outcome rather than a failure.
//!
//! ## Thread Safety
//!
//! - [`Component`] is `Send + Sync`; the feeding and draining threads can
//!   share it by reference
//! - Driver callbacks only record events and return buffers to pools; they
//!   never call into application code
//! - [`Buffer`] is `Send`, so a descriptor can be handed to another thread
//!   before it is submitted

mod api;
mod component;
mod error;
mod tunnel;

pub mod buffer;
pub mod config;
pub mod driver;
pub mod event;

pub use api::{IlApi, IlApiHandle, load_api};
pub use buffer::{Buffer, BufferFlags, BufferPool, Ownership, PoolStats};
pub use component::Component;
pub use config::{ComponentConfig, PortLayout, PortLayouts, Timeouts};
pub use driver::{
    CallbackSink, Command, CommandKind, Direction, Driver, Handle, PortDomain, PortRange,
    PortRequirements, State, il::IlDriver,
};
pub use error::{Error, ErrorCode, Result};
pub use event::{Event, EventKind, EventLog};
pub use omx_sys as sys;
pub use tunnel::Tunnel;
