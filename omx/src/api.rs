// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Loading and initialising the IL libraries.

use std::{ffi::OsStr, path::Path, sync::Arc};

use tracing::{debug, error};

use crate::{Error, Result};

/// The loaded IL core, initialised for the lifetime of this value.
///
/// `OMX_Deinit` (and `bcm_host_deinit`, if the host library was loaded) run
/// when the last [`IlApiHandle`] is dropped.
pub struct IlApi {
    il: omx_sys::LibOpenMaxIl,
    host: Option<omx_sys::LibBcmHost>,
    initialised: bool,
}

/// Shared handle to the loaded libraries.
pub type IlApiHandle = Arc<IlApi>;

impl IlApi {
    pub(crate) fn il(&self) -> &omx_sys::LibOpenMaxIl {
        &self.il
    }
}

impl Drop for IlApi {
    fn drop(&mut self) {
        if self.initialised
            && let Err(err) = Error::from_code(unsafe { self.il.deinit() })
        {
            error!("OMX_Deinit failed: {err}");
        }
        if let Some(host) = &self.host {
            unsafe { host.deinit() };
        }
    }
}

/// Loads the IL core and, optionally, the VideoCore host library, and
/// initialises both.
///
/// # Arguments
///
/// * `il_path` - Path or library name of `libopenmaxil.so`
/// * `host_path` - Path of `libbcm_host.so`; pass `None` on platforms whose
///   IL core needs no host setup
///
/// # Errors
///
/// - [`Error::LibLoading`] if a library or one of its symbols is missing
/// - The status of `OMX_Init` if the core refuses to start
///
/// # Examples
///
/// ```no_run
/// use omx::{config, load_api};
///
/// # fn main() -> Result<(), omx::Error> {
/// let api = load_api(config::library_path(), Some(config::host_library_path().as_path()))?;
/// # Ok(())
/// # }
/// ```
pub fn load_api(il_path: impl AsRef<OsStr>, host_path: Option<&Path>) -> Result<IlApiHandle> {
    let host = match host_path {
        Some(path) => {
            let host = unsafe { omx_sys::LibBcmHost::new(path)? };
            unsafe { host.init() };
            debug!(path = %path.display(), "host library initialised");
            Some(host)
        }
        None => None,
    };

    let il = unsafe { omx_sys::LibOpenMaxIl::new(il_path.as_ref())? };
    let mut api = IlApi {
        il,
        host,
        initialised: false,
    };
    Error::from_code(unsafe { api.il.init() })?;
    api.initialised = true;
    debug!(path = ?il_path.as_ref(), "IL core initialised");
    Ok(Arc::new(api))
}
