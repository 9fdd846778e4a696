// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for component and tunnel operations.
//!
//! This module maps the raw IL status words returned by the driver (and
//! carried inside error events) to a small Rust error enum, and expresses in
//! one place which driver responses are benign.

use std::fmt;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// A raw OpenMAX IL status word.
///
/// Codes are kept as-is rather than mapped to an exhaustive enum, since
/// vendor builds add their own values in the `0x9000_0000` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const NONE: ErrorCode = ErrorCode(omx_sys::OMX_ErrorNone);
    pub const INSUFFICIENT_RESOURCES: ErrorCode =
        ErrorCode(omx_sys::OMX_ErrorInsufficientResources);
    pub const UNDEFINED: ErrorCode = ErrorCode(omx_sys::OMX_ErrorUndefined);
    pub const COMPONENT_NOT_FOUND: ErrorCode = ErrorCode(omx_sys::OMX_ErrorComponentNotFound);
    pub const BAD_PARAMETER: ErrorCode = ErrorCode(omx_sys::OMX_ErrorBadParameter);
    pub const NOT_IMPLEMENTED: ErrorCode = ErrorCode(omx_sys::OMX_ErrorNotImplemented);
    pub const HARDWARE: ErrorCode = ErrorCode(omx_sys::OMX_ErrorHardware);
    pub const INVALID_STATE: ErrorCode = ErrorCode(omx_sys::OMX_ErrorInvalidState);
    pub const PORTS_NOT_COMPATIBLE: ErrorCode = ErrorCode(omx_sys::OMX_ErrorPortsNotCompatible);
    pub const NOT_READY: ErrorCode = ErrorCode(omx_sys::OMX_ErrorNotReady);
    pub const TIMEOUT: ErrorCode = ErrorCode(omx_sys::OMX_ErrorTimeout);
    pub const SAME_STATE: ErrorCode = ErrorCode(omx_sys::OMX_ErrorSameState);
    pub const INCORRECT_STATE_TRANSITION: ErrorCode =
        ErrorCode(omx_sys::OMX_ErrorIncorrectStateTransition);
    pub const INCORRECT_STATE_OPERATION: ErrorCode =
        ErrorCode(omx_sys::OMX_ErrorIncorrectStateOperation);
    pub const UNSUPPORTED_SETTING: ErrorCode = ErrorCode(omx_sys::OMX_ErrorUnsupportedSetting);
    pub const UNSUPPORTED_INDEX: ErrorCode = ErrorCode(omx_sys::OMX_ErrorUnsupportedIndex);
    pub const BAD_PORT_INDEX: ErrorCode = ErrorCode(omx_sys::OMX_ErrorBadPortIndex);
    pub const PORT_UNPOPULATED: ErrorCode = ErrorCode(omx_sys::OMX_ErrorPortUnpopulated);
    pub const TUNNELING_UNSUPPORTED: ErrorCode =
        ErrorCode(omx_sys::OMX_ErrorTunnelingUnsupported);

    fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::NONE => "None",
            Self::INSUFFICIENT_RESOURCES => "InsufficientResources",
            Self::UNDEFINED => "Undefined",
            Self::COMPONENT_NOT_FOUND => "ComponentNotFound",
            Self::BAD_PARAMETER => "BadParameter",
            Self::NOT_IMPLEMENTED => "NotImplemented",
            Self::HARDWARE => "Hardware",
            Self::INVALID_STATE => "InvalidState",
            Self::PORTS_NOT_COMPATIBLE => "PortsNotCompatible",
            Self::NOT_READY => "NotReady",
            Self::TIMEOUT => "Timeout",
            Self::SAME_STATE => "SameState",
            Self::INCORRECT_STATE_TRANSITION => "IncorrectStateTransition",
            Self::INCORRECT_STATE_OPERATION => "IncorrectStateOperation",
            Self::UNSUPPORTED_SETTING => "UnsupportedSetting",
            Self::UNSUPPORTED_INDEX => "UnsupportedIndex",
            Self::BAD_PORT_INDEX => "BadPortIndex",
            Self::PORT_UNPOPULATED => "PortUnpopulated",
            Self::TUNNELING_UNSUPPORTED => "TunnelingUnsupported",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08x})", self.0),
            None => write!(f, "0x{:08x}", self.0),
        }
    }
}

/// Errors that can occur when driving components and tunnels.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation was attempted on an uninitialised component, an unbound
    /// tunnel, or a port/pool in the wrong condition.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An event, command or buffer wait exceeded its bound.
    #[error("Timeout")]
    Timeout,

    /// The driver returned (or reported through an error event) a status
    /// other than success.
    #[error("Driver rejected the request: {0}")]
    DriverRejected(ErrorCode),

    /// A buffer or memory request failed.
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    /// A generic error for Rust-level failures not directly mapped to IL errors.
    #[error("Other error: {0}")]
    Other(String),

    /// Failed to convert a Rust string to a C-compatible null-terminated string.
    #[error("Null string: {0}")]
    NulString(#[from] std::ffi::NulError),

    /// Failed to load or interact with the IL dynamic libraries.
    #[error("Loading library: {0}")]
    LibLoading(#[from] libloading::Error),
}

impl Error {
    /// Converts a raw IL status word to a Rust [`Result`].
    ///
    /// # Arguments
    ///
    /// * `code` - The raw status returned by an IL entry point or carried in
    ///   the first data word of an error event
    ///
    /// # Returns
    ///
    /// - `Ok(())` if `code` is `OMX_ErrorNone`
    /// - `Err(Error::Timeout)` for `OMX_ErrorTimeout`
    /// - `Err(Error::AllocationFailed(..))` for `OMX_ErrorInsufficientResources`
    /// - `Err(Error::DriverRejected(code))` for everything else
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let status = unsafe { (vtable.SendCommand)(handle, cmd, param, null_mut()) };
    /// Error::from_code(status)?;
    /// ```
    pub fn from_code(code: u32) -> Result<()> {
        match ErrorCode(code) {
            ErrorCode::NONE => Ok(()),
            ErrorCode::TIMEOUT => Err(Error::Timeout),
            ErrorCode::INSUFFICIENT_RESOURCES => Err(Error::AllocationFailed(
                "driver reported insufficient resources".to_string(),
            )),
            other => Err(Error::DriverRejected(other)),
        }
    }

    /// Like [`Error::from_code`], but always produces an error.
    ///
    /// Used for error events, whose code is never expected to be `None`.
    pub(crate) fn from_event_code(code: u32) -> Error {
        match Error::from_code(code) {
            Err(error) => error,
            Ok(()) => Error::DriverRejected(ErrorCode(code)),
        }
    }

    /// The driver answered that the object is already in the requested state.
    pub fn is_same_state(&self) -> bool {
        matches!(self, Error::DriverRejected(ErrorCode::SAME_STATE))
    }

    /// The driver refused the operation in its current state.
    ///
    /// Treated as benign when unbinding a tunnel from an already-stopped
    /// component.
    pub fn is_incorrect_state_operation(&self) -> bool {
        matches!(
            self,
            Error::DriverRejected(ErrorCode::INCORRECT_STATE_OPERATION)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}
