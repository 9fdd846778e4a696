// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! The boundary between the core and the hardware driver.
//!
//! [`Driver`] is the set of calls the core makes into the IL implementation;
//! [`CallbackSink`] is the inbox the driver's callback context posts into.
//! The production implementation lives in [`il`]; tests substitute a
//! simulated driver.

pub mod il;

use std::{fmt, ptr::NonNull, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{Result, buffer::HeaderPtr, event::Event};

/// Opaque driver handle of one component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

impl Handle {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> usize {
        self.0
    }
}

/// Component states, mirrored from the driver.
///
/// The driver's `Invalid` state and a component without a handle both read
/// as [`State::Unloaded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Unloaded,
    Loaded,
    Idle,
    Executing,
    Pause,
    WaitForResources,
}

impl State {
    pub fn from_raw(raw: omx_sys::StateType) -> Self {
        match raw {
            omx_sys::OMX_StateLoaded => State::Loaded,
            omx_sys::OMX_StateIdle => State::Idle,
            omx_sys::OMX_StateExecuting => State::Executing,
            omx_sys::OMX_StatePause => State::Pause,
            omx_sys::OMX_StateWaitForResources => State::WaitForResources,
            _ => State::Unloaded,
        }
    }

    pub fn as_raw(self) -> omx_sys::StateType {
        match self {
            State::Unloaded => omx_sys::OMX_StateInvalid,
            State::Loaded => omx_sys::OMX_StateLoaded,
            State::Idle => omx_sys::OMX_StateIdle,
            State::Executing => omx_sys::OMX_StateExecuting,
            State::Pause => omx_sys::OMX_StatePause,
            State::WaitForResources => omx_sys::OMX_StateWaitForResources,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The kind of a command, as reported in the first data word of a
/// command-completion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    StateSet,
    Flush,
    PortDisable,
    PortEnable,
}

impl CommandKind {
    pub fn as_raw(self) -> omx_sys::CommandType {
        match self {
            CommandKind::StateSet => omx_sys::OMX_CommandStateSet,
            CommandKind::Flush => omx_sys::OMX_CommandFlush,
            CommandKind::PortDisable => omx_sys::OMX_CommandPortDisable,
            CommandKind::PortEnable => omx_sys::OMX_CommandPortEnable,
        }
    }
}

/// An asynchronous command with its parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    StateSet(State),
    Flush(u32),
    PortDisable(u32),
    PortEnable(u32),
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::StateSet(_) => CommandKind::StateSet,
            Command::Flush(_) => CommandKind::Flush,
            Command::PortDisable(_) => CommandKind::PortDisable,
            Command::PortEnable(_) => CommandKind::PortEnable,
        }
    }

    /// The second word of the command, and of its completion event.
    pub fn param(&self) -> u32 {
        match *self {
            Command::StateSet(state) => state.as_raw(),
            Command::Flush(port) | Command::PortDisable(port) | Command::PortEnable(port) => port,
        }
    }
}

/// The four port domains a unit declares its ports in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDomain {
    Audio,
    Image,
    Video,
    Other,
}

impl PortDomain {
    pub const ALL: [PortDomain; 4] = [
        PortDomain::Audio,
        PortDomain::Image,
        PortDomain::Video,
        PortDomain::Other,
    ];

    /// Parameter index answering the port range of this domain.
    pub fn param_index(self) -> omx_sys::IndexType {
        match self {
            PortDomain::Audio => omx_sys::OMX_IndexParamAudioInit,
            PortDomain::Image => omx_sys::OMX_IndexParamImageInit,
            PortDomain::Video => omx_sys::OMX_IndexParamVideoInit,
            PortDomain::Other => omx_sys::OMX_IndexParamOtherInit,
        }
    }
}

/// Contiguous port numbers a unit declares in one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortRange {
    pub start: u32,
    pub count: u32,
}

impl PortRange {
    pub fn ports(&self) -> std::ops::Range<u32> {
        self.start..self.start + self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Buffer requirements the driver declares for a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortRequirements {
    pub count: u32,
    pub size: u32,
    pub alignment: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// Calls the core makes into the IL implementation.
///
/// All methods may be called from any control thread. Implementations
/// deliver completions asynchronously through the [`CallbackSink`] given to
/// [`Driver::get_handle`]; they must not hold internal locks while doing so.
pub trait Driver: Send + Sync {
    /// Instantiates the named unit and registers `sink` for its callbacks.
    fn get_handle(&self, name: &str, sink: Arc<dyn CallbackSink>) -> Result<Handle>;

    /// Releases a handle. No callback reaches the sink afterwards.
    fn free_handle(&self, handle: Handle) -> Result<()>;

    fn send_command(&self, handle: Handle, command: Command) -> Result<()>;

    fn get_state(&self, handle: Handle) -> Result<State>;

    fn port_range(&self, handle: Handle, domain: PortDomain) -> Result<PortRange>;

    fn port_requirements(&self, handle: Handle, port: u32) -> Result<PortRequirements>;

    /// Reads an indexed parameter. `payload` is a complete IL structure
    /// including its size/version header.
    fn get_parameter(&self, handle: Handle, index: u32, payload: &mut [u8]) -> Result<()>;

    fn set_parameter(&self, handle: Handle, index: u32, payload: &[u8]) -> Result<()>;

    fn get_config(&self, handle: Handle, index: u32, payload: &mut [u8]) -> Result<()>;

    fn set_config(&self, handle: Handle, index: u32, payload: &[u8]) -> Result<()>;

    /// Requests a driver-owned buffer. `app_private` is stored in the
    /// header and returned untouched with every completion.
    fn allocate_buffer(
        &self,
        handle: Handle,
        port: u32,
        size: u32,
        app_private: usize,
    ) -> Result<HeaderPtr>;

    /// Wraps caller memory in a buffer header.
    ///
    /// # Safety
    ///
    /// `data` must point to `size` writable bytes that stay valid until the
    /// header is passed to [`Driver::free_buffer`].
    unsafe fn use_buffer(
        &self,
        handle: Handle,
        port: u32,
        app_private: usize,
        data: NonNull<u8>,
        size: u32,
    ) -> Result<HeaderPtr>;

    fn free_buffer(&self, handle: Handle, port: u32, header: HeaderPtr) -> Result<()>;

    /// Hands a filled input buffer to the driver.
    fn empty_this_buffer(&self, handle: Handle, header: HeaderPtr) -> Result<()>;

    /// Hands an output buffer to the driver for filling.
    fn fill_this_buffer(&self, handle: Handle, header: HeaderPtr) -> Result<()>;

    /// Binds `output`'s port to `input`'s port, or unbinds `output`'s port
    /// when `input` is `None`.
    fn setup_tunnel(
        &self,
        output: Handle,
        output_port: u32,
        input: Option<(Handle, u32)>,
    ) -> Result<()>;
}

/// Inbox for notifications raised in the driver's callback context.
///
/// Implementations only record the notification and wake waiters; they
/// never call back into the driver or into caller logic.
pub trait CallbackSink: Send + Sync {
    fn event(&self, event: Event);

    /// An input buffer has been consumed.
    fn empty_buffer_done(&self, header: HeaderPtr);

    /// An output buffer has been filled.
    fn fill_buffer_done(&self, header: HeaderPtr);
}
