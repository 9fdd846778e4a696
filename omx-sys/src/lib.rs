// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! # omx-sys: Raw definitions of the OpenMAX IL ABI
//!
//! This crate provides low-level, unsafe Rust definitions for the OpenMAX IL
//! 1.1.2 interface as shipped by the Broadcom VideoCore userland
//! (`libopenmaxil.so`), together with the host support library
//! (`libbcm_host.so`) that must be initialised before any IL call.
//!
//! ## Overview
//!
//! `omx-sys` exposes:
//! - Raw C types ([`BufferHeader`], [`PortDefinition`], [`ComponentType`], etc.)
//! - Constants for status codes, events, commands, states and parameter indices
//! - Dynamically loaded function tables ([`LibOpenMaxIl`], [`LibBcmHost`])
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe `omx` crate
//! instead, which provides:
//! - A component state machine with timeout-bounded command completion
//! - Buffer pools with ownership tracking between application and driver
//! - The tunnel establishment handshake
//!
//! ## Safety
//!
//! All functions in this crate are `unsafe` and require the caller to uphold
//! the IL invariants:
//! - `OMX_Init` must succeed before any handle is requested
//! - Every structure passed to the driver must carry a valid `nSize`/`nVersion`
//!   header (see [`init_structure`])
//! - Buffer headers belong to the driver between submission and the matching
//!   completion callback
//!
//! ## ABI notes
//!
//! The VideoCore build is compiled with `OMX_SKIP64BIT`, so timestamps are
//! carried as two 32-bit words ([`Ticks`]).

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]

extern crate libloading;

use std::ffi::{c_char, c_void};

pub type Handle = *mut c_void;
pub type ErrorType = u32;
pub type EventType = u32;
pub type CommandType = u32;
pub type StateType = u32;
pub type IndexType = u32;
pub type Bool = u32;

pub const OMX_FALSE: Bool = 0;
pub const OMX_TRUE: Bool = 1;

pub const OMX_VERSION_MAJOR: u8 = 1;
pub const OMX_VERSION_MINOR: u8 = 1;
pub const OMX_VERSION_REVISION: u8 = 2;
pub const OMX_VERSION_STEP: u8 = 0;

pub const OMX_ALL: u32 = 0xFFFF_FFFF;

// OMX_ERRORTYPE
pub const OMX_ErrorNone: ErrorType = 0;
pub const OMX_ErrorInsufficientResources: ErrorType = 0x8000_1000;
pub const OMX_ErrorUndefined: ErrorType = 0x8000_1001;
pub const OMX_ErrorInvalidComponentName: ErrorType = 0x8000_1002;
pub const OMX_ErrorComponentNotFound: ErrorType = 0x8000_1003;
pub const OMX_ErrorInvalidComponent: ErrorType = 0x8000_1004;
pub const OMX_ErrorBadParameter: ErrorType = 0x8000_1005;
pub const OMX_ErrorNotImplemented: ErrorType = 0x8000_1006;
pub const OMX_ErrorUnderflow: ErrorType = 0x8000_1007;
pub const OMX_ErrorOverflow: ErrorType = 0x8000_1008;
pub const OMX_ErrorHardware: ErrorType = 0x8000_1009;
pub const OMX_ErrorInvalidState: ErrorType = 0x8000_100A;
pub const OMX_ErrorStreamCorrupt: ErrorType = 0x8000_100B;
pub const OMX_ErrorPortsNotCompatible: ErrorType = 0x8000_100C;
pub const OMX_ErrorResourcesLost: ErrorType = 0x8000_100D;
pub const OMX_ErrorNoMore: ErrorType = 0x8000_100E;
pub const OMX_ErrorVersionMismatch: ErrorType = 0x8000_100F;
pub const OMX_ErrorNotReady: ErrorType = 0x8000_1010;
pub const OMX_ErrorTimeout: ErrorType = 0x8000_1011;
pub const OMX_ErrorSameState: ErrorType = 0x8000_1012;
pub const OMX_ErrorResourcesPreempted: ErrorType = 0x8000_1013;
pub const OMX_ErrorPortUnresponsiveDuringAllocation: ErrorType = 0x8000_1014;
pub const OMX_ErrorPortUnresponsiveDuringDeallocation: ErrorType = 0x8000_1015;
pub const OMX_ErrorPortUnresponsiveDuringStop: ErrorType = 0x8000_1016;
pub const OMX_ErrorIncorrectStateTransition: ErrorType = 0x8000_1017;
pub const OMX_ErrorIncorrectStateOperation: ErrorType = 0x8000_1018;
pub const OMX_ErrorUnsupportedSetting: ErrorType = 0x8000_1019;
pub const OMX_ErrorUnsupportedIndex: ErrorType = 0x8000_101A;
pub const OMX_ErrorBadPortIndex: ErrorType = 0x8000_101B;
pub const OMX_ErrorPortUnpopulated: ErrorType = 0x8000_101C;
pub const OMX_ErrorComponentSuspended: ErrorType = 0x8000_101D;
pub const OMX_ErrorDynamicResourcesUnavailable: ErrorType = 0x8000_101E;
pub const OMX_ErrorMbErrorsInFrame: ErrorType = 0x8000_101F;
pub const OMX_ErrorFormatNotDetected: ErrorType = 0x8000_1020;
pub const OMX_ErrorTunnelingUnsupported: ErrorType = 0x8000_1024;

// OMX_EVENTTYPE
pub const OMX_EventCmdComplete: EventType = 0;
pub const OMX_EventError: EventType = 1;
pub const OMX_EventMark: EventType = 2;
pub const OMX_EventPortSettingsChanged: EventType = 3;
pub const OMX_EventBufferFlag: EventType = 4;
pub const OMX_EventResourcesAcquired: EventType = 5;
pub const OMX_EventComponentResumed: EventType = 6;
pub const OMX_EventDynamicResourcesAvailable: EventType = 7;
pub const OMX_EventPortFormatDetected: EventType = 8;

// OMX_COMMANDTYPE
pub const OMX_CommandStateSet: CommandType = 0;
pub const OMX_CommandFlush: CommandType = 1;
pub const OMX_CommandPortDisable: CommandType = 2;
pub const OMX_CommandPortEnable: CommandType = 3;
pub const OMX_CommandMarkBuffer: CommandType = 4;

// OMX_STATETYPE
pub const OMX_StateInvalid: StateType = 0;
pub const OMX_StateLoaded: StateType = 1;
pub const OMX_StateIdle: StateType = 2;
pub const OMX_StateExecuting: StateType = 3;
pub const OMX_StatePause: StateType = 4;
pub const OMX_StateWaitForResources: StateType = 5;

// OMX_INDEXTYPE (subset used by the core)
pub const OMX_IndexParamPriorityMgmt: IndexType = 0x0100_0001;
pub const OMX_IndexParamAudioInit: IndexType = 0x0100_0002;
pub const OMX_IndexParamImageInit: IndexType = 0x0100_0003;
pub const OMX_IndexParamVideoInit: IndexType = 0x0100_0004;
pub const OMX_IndexParamOtherInit: IndexType = 0x0100_0005;
pub const OMX_IndexParamPortDefinition: IndexType = 0x0200_0001;

// OMX_DIRTYPE
pub const OMX_DirInput: u32 = 0;
pub const OMX_DirOutput: u32 = 1;

// Buffer header flags
pub const OMX_BUFFERFLAG_EOS: u32 = 0x0000_0001;
pub const OMX_BUFFERFLAG_STARTTIME: u32 = 0x0000_0002;
pub const OMX_BUFFERFLAG_DECODEONLY: u32 = 0x0000_0004;
pub const OMX_BUFFERFLAG_DATACORRUPT: u32 = 0x0000_0008;
pub const OMX_BUFFERFLAG_ENDOFFRAME: u32 = 0x0000_0010;
pub const OMX_BUFFERFLAG_SYNCFRAME: u32 = 0x0000_0020;
pub const OMX_BUFFERFLAG_EXTRADATA: u32 = 0x0000_0040;
pub const OMX_BUFFERFLAG_CODECCONFIG: u32 = 0x0000_0080;

/// `OMX_VERSIONTYPE` viewed through its `s` member.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VersionType {
    pub nVersionMajor: u8,
    pub nVersionMinor: u8,
    pub nRevision: u8,
    pub nStep: u8,
}

impl VersionType {
    /// The IL version this ABI was written against.
    pub const CURRENT: VersionType = VersionType {
        nVersionMajor: OMX_VERSION_MAJOR,
        nVersionMinor: OMX_VERSION_MINOR,
        nRevision: OMX_VERSION_REVISION,
        nStep: OMX_VERSION_STEP,
    };
}

/// `OMX_TICKS` as compiled with `OMX_SKIP64BIT`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Ticks {
    pub nLowPart: u32,
    pub nHighPart: u32,
}

impl Ticks {
    pub fn from_micros(value: i64) -> Self {
        Self {
            nLowPart: value as u32,
            nHighPart: (value >> 32) as u32,
        }
    }

    pub fn to_micros(self) -> i64 {
        (self.nLowPart as u64 | ((self.nHighPart as u64) << 32)) as i64
    }
}

/// `OMX_BUFFERHEADERTYPE`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BufferHeader {
    pub nSize: u32,
    pub nVersion: VersionType,
    pub pBuffer: *mut u8,
    pub nAllocLen: u32,
    pub nFilledLen: u32,
    pub nOffset: u32,
    pub pAppPrivate: *mut c_void,
    pub pPlatformPrivate: *mut c_void,
    pub pInputPortPrivate: *mut c_void,
    pub pOutputPortPrivate: *mut c_void,
    pub hMarkTargetComponent: Handle,
    pub pMarkData: *mut c_void,
    pub nTickCount: u32,
    pub nTimeStamp: Ticks,
    pub nFlags: u32,
    pub nOutputPortIndex: u32,
    pub nInputPortIndex: u32,
}

impl Default for BufferHeader {
    fn default() -> Self {
        // SAFETY: plain C data, all-zero is the driver's own initial value.
        let mut header: Self = unsafe { std::mem::zeroed() };
        header.nSize = std::mem::size_of::<Self>() as u32;
        header.nVersion = VersionType::CURRENT;
        header
    }
}

/// `OMX_PORT_PARAM_TYPE`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct PortParam {
    pub nSize: u32,
    pub nVersion: VersionType,
    pub nPorts: u32,
    pub nStartPortNumber: u32,
}

/// `OMX_VIDEO_PORTDEFINITIONTYPE`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VideoPortDefinition {
    pub cMIMEType: *mut c_char,
    pub pNativeRender: *mut c_void,
    pub nFrameWidth: u32,
    pub nFrameHeight: u32,
    pub nStride: i32,
    pub nSliceHeight: u32,
    pub nBitrate: u32,
    pub xFramerate: u32,
    pub bFlagErrorConcealment: Bool,
    pub eCompressionFormat: u32,
    pub eColorFormat: u32,
    pub pNativeWindow: *mut c_void,
}

/// The `format` union of `OMX_PARAM_PORTDEFINITIONTYPE`.
///
/// Only the video member is spelled out; the raw words cover the size of
/// the largest member so the surrounding layout is preserved.
#[repr(C)]
#[derive(Clone, Copy)]
pub union PortFormat {
    pub video: VideoPortDefinition,
    pub raw: [u32; 16],
}

impl std::fmt::Debug for PortFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortFormat").finish_non_exhaustive()
    }
}

/// `OMX_PARAM_PORTDEFINITIONTYPE`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PortDefinition {
    pub nSize: u32,
    pub nVersion: VersionType,
    pub nPortIndex: u32,
    pub eDir: u32,
    pub nBufferCountActual: u32,
    pub nBufferCountMin: u32,
    pub nBufferSize: u32,
    pub bEnabled: Bool,
    pub bPopulated: Bool,
    pub eDomain: u32,
    pub format: PortFormat,
    pub bBuffersContiguous: Bool,
    pub nBufferAlignment: u32,
}

impl Default for PortDefinition {
    fn default() -> Self {
        // SAFETY: plain C data, all-zero is valid for every member.
        unsafe { std::mem::zeroed() }
    }
}

pub type EventHandlerFn = unsafe extern "C" fn(
    hComponent: Handle,
    pAppData: *mut c_void,
    eEvent: EventType,
    nData1: u32,
    nData2: u32,
    pEventData: *mut c_void,
) -> ErrorType;

pub type BufferDoneFn = unsafe extern "C" fn(
    hComponent: Handle,
    pAppData: *mut c_void,
    pBuffer: *mut BufferHeader,
) -> ErrorType;

/// Signature shared by `GetParameter`, `SetParameter`, `GetConfig` and
/// `SetConfig`.
pub type IndexedFn =
    unsafe extern "C" fn(hComponent: Handle, nIndex: IndexType, pStruct: *mut c_void) -> ErrorType;

/// `OMX_CALLBACKTYPE`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct CallbackType {
    pub EventHandler: Option<EventHandlerFn>,
    pub EmptyBufferDone: Option<BufferDoneFn>,
    pub FillBufferDone: Option<BufferDoneFn>,
}

/// `OMX_COMPONENTTYPE`: the per-handle vtable the IL macros dispatch through.
///
/// Entries the core never calls are kept as untyped pointers to preserve
/// the layout.
#[repr(C)]
pub struct ComponentType {
    pub nSize: u32,
    pub nVersion: VersionType,
    pub pComponentPrivate: *mut c_void,
    pub pApplicationPrivate: *mut c_void,
    pub GetComponentVersion: *mut c_void,
    pub SendCommand: Option<
        unsafe extern "C" fn(
            hComponent: Handle,
            Cmd: CommandType,
            nParam1: u32,
            pCmdData: *mut c_void,
        ) -> ErrorType,
    >,
    pub GetParameter: Option<IndexedFn>,
    pub SetParameter: Option<IndexedFn>,
    pub GetConfig: Option<IndexedFn>,
    pub SetConfig: Option<IndexedFn>,
    pub GetExtensionIndex: *mut c_void,
    pub GetState:
        Option<unsafe extern "C" fn(hComponent: Handle, pState: *mut StateType) -> ErrorType>,
    pub ComponentTunnelRequest: *mut c_void,
    pub UseBuffer: Option<
        unsafe extern "C" fn(
            hComponent: Handle,
            ppBufferHdr: *mut *mut BufferHeader,
            nPortIndex: u32,
            pAppPrivate: *mut c_void,
            nSizeBytes: u32,
            pBuffer: *mut u8,
        ) -> ErrorType,
    >,
    pub AllocateBuffer: Option<
        unsafe extern "C" fn(
            hComponent: Handle,
            ppBuffer: *mut *mut BufferHeader,
            nPortIndex: u32,
            pAppPrivate: *mut c_void,
            nSizeBytes: u32,
        ) -> ErrorType,
    >,
    pub FreeBuffer: Option<
        unsafe extern "C" fn(
            hComponent: Handle,
            nPortIndex: u32,
            pBuffer: *mut BufferHeader,
        ) -> ErrorType,
    >,
    pub EmptyThisBuffer:
        Option<unsafe extern "C" fn(hComponent: Handle, pBuffer: *mut BufferHeader) -> ErrorType>,
    pub FillThisBuffer:
        Option<unsafe extern "C" fn(hComponent: Handle, pBuffer: *mut BufferHeader) -> ErrorType>,
    pub SetCallbacks: *mut c_void,
    pub ComponentDeInit: *mut c_void,
    pub UseEGLImage: *mut c_void,
    pub ComponentRoleEnum: *mut c_void,
}

/// Marker for IL structures that start with the `nSize`/`nVersion` header.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` and begin with a `u32` size followed by
/// a [`VersionType`].
pub unsafe trait Structure: Copy {}

unsafe impl Structure for PortParam {}
unsafe impl Structure for PortDefinition {}
unsafe impl Structure for BufferHeader {}

/// Rust counterpart of the `OMX_INIT_STRUCTURE` macro.
pub fn init_structure<T: Structure + Default>() -> T {
    let mut value = T::default();
    // SAFETY: `Structure` guarantees the header layout.
    unsafe {
        let header = &mut value as *mut T as *mut u32;
        header.write(std::mem::size_of::<T>() as u32);
        (header.add(1) as *mut VersionType).write(VersionType::CURRENT);
    }
    value
}

/// Function table of `libopenmaxil.so`.
///
/// Only the core entry points are exported by the library; everything else
/// is reached through the [`ComponentType`] vtable of a handle.
pub struct LibOpenMaxIl {
    __library: ::libloading::Library,
    pub OMX_Init: unsafe extern "C" fn() -> ErrorType,
    pub OMX_Deinit: unsafe extern "C" fn() -> ErrorType,
    pub OMX_GetHandle: unsafe extern "C" fn(
        pHandle: *mut Handle,
        cComponentName: *mut c_char,
        pAppData: *mut c_void,
        pCallBacks: *mut CallbackType,
    ) -> ErrorType,
    pub OMX_FreeHandle: unsafe extern "C" fn(hComponent: Handle) -> ErrorType,
    pub OMX_SetupTunnel: unsafe extern "C" fn(
        hOutput: Handle,
        nPortOutput: u32,
        hInput: Handle,
        nPortInput: u32,
    ) -> ErrorType,
}

impl LibOpenMaxIl {
    pub unsafe fn new<P>(path: P) -> Result<Self, ::libloading::Error>
    where
        P: AsRef<::std::ffi::OsStr>,
    {
        let library = ::libloading::Library::new(path)?;
        Self::from_library(library)
    }

    pub unsafe fn from_library<L>(library: L) -> Result<Self, ::libloading::Error>
    where
        L: Into<::libloading::Library>,
    {
        let __library = library.into();
        let OMX_Init = __library.get(b"OMX_Init\0").map(|sym| *sym)?;
        let OMX_Deinit = __library.get(b"OMX_Deinit\0").map(|sym| *sym)?;
        let OMX_GetHandle = __library.get(b"OMX_GetHandle\0").map(|sym| *sym)?;
        let OMX_FreeHandle = __library.get(b"OMX_FreeHandle\0").map(|sym| *sym)?;
        let OMX_SetupTunnel = __library.get(b"OMX_SetupTunnel\0").map(|sym| *sym)?;
        Ok(LibOpenMaxIl {
            __library,
            OMX_Init,
            OMX_Deinit,
            OMX_GetHandle,
            OMX_FreeHandle,
            OMX_SetupTunnel,
        })
    }

    pub unsafe fn init(&self) -> ErrorType {
        (self.OMX_Init)()
    }

    pub unsafe fn deinit(&self) -> ErrorType {
        (self.OMX_Deinit)()
    }

    pub unsafe fn get_handle(
        &self,
        pHandle: *mut Handle,
        cComponentName: *mut c_char,
        pAppData: *mut c_void,
        pCallBacks: *mut CallbackType,
    ) -> ErrorType {
        (self.OMX_GetHandle)(pHandle, cComponentName, pAppData, pCallBacks)
    }

    pub unsafe fn free_handle(&self, hComponent: Handle) -> ErrorType {
        (self.OMX_FreeHandle)(hComponent)
    }

    pub unsafe fn setup_tunnel(
        &self,
        hOutput: Handle,
        nPortOutput: u32,
        hInput: Handle,
        nPortInput: u32,
    ) -> ErrorType {
        (self.OMX_SetupTunnel)(hOutput, nPortOutput, hInput, nPortInput)
    }
}

/// Function table of `libbcm_host.so`.
pub struct LibBcmHost {
    __library: ::libloading::Library,
    pub bcm_host_init: unsafe extern "C" fn(),
    pub bcm_host_deinit: unsafe extern "C" fn(),
}

impl LibBcmHost {
    pub unsafe fn new<P>(path: P) -> Result<Self, ::libloading::Error>
    where
        P: AsRef<::std::ffi::OsStr>,
    {
        let __library = ::libloading::Library::new(path)?;
        let bcm_host_init = __library.get(b"bcm_host_init\0").map(|sym| *sym)?;
        let bcm_host_deinit = __library.get(b"bcm_host_deinit\0").map(|sym| *sym)?;
        Ok(LibBcmHost {
            __library,
            bcm_host_init,
            bcm_host_deinit,
        })
    }

    pub unsafe fn init(&self) {
        (self.bcm_host_init)()
    }

    pub unsafe fn deinit(&self) {
        (self.bcm_host_deinit)()
    }
}
