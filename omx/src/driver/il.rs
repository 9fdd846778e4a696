// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! [`Driver`] implementation over the loaded IL core.
//!
//! Component entry points are reached through the `OMX_COMPONENTTYPE` vtable
//! behind each handle, the way the IL header macros do it. The three C
//! callbacks are routed to the [`CallbackSink`] registered for the handle.

use std::{
    collections::HashMap,
    ffi::{CString, c_void},
    ptr::{NonNull, null_mut},
    sync::{Arc, Mutex, MutexGuard},
};

use omx_sys::{BufferHeader, ComponentType, ErrorType, EventType};
use tracing::{debug, warn};

use crate::{
    Error, ErrorCode, Result,
    api::IlApiHandle,
    buffer::HeaderPtr,
    driver::{CallbackSink, Command, Driver, Handle, PortDomain, PortRange, PortRequirements, State},
    event::{Event, EventKind},
};

/// What `pAppData` points to for every handle this driver created.
struct Registration {
    callbacks: omx_sys::CallbackType,
    sink: Arc<dyn CallbackSink>,
}

unsafe extern "C" fn on_event(
    _component: omx_sys::Handle,
    app_data: *mut c_void,
    event: EventType,
    data1: u32,
    data2: u32,
    _event_data: *mut c_void,
) -> ErrorType {
    // SAFETY: `app_data` is the registration boxed in `get_handle`, alive
    // until after `OMX_FreeHandle` returns.
    if let Some(registration) = unsafe { (app_data as *const Registration).as_ref() } {
        registration
            .sink
            .event(Event::new(EventKind::from_raw(event), data1, data2));
    }
    omx_sys::OMX_ErrorNone
}

unsafe extern "C" fn on_empty_buffer_done(
    _component: omx_sys::Handle,
    app_data: *mut c_void,
    header: *mut BufferHeader,
) -> ErrorType {
    // SAFETY: see `on_event`.
    let registration = unsafe { (app_data as *const Registration).as_ref() };
    if let (Some(registration), Some(header)) = (registration, HeaderPtr::from_raw(header)) {
        registration.sink.empty_buffer_done(header);
    }
    omx_sys::OMX_ErrorNone
}

unsafe extern "C" fn on_fill_buffer_done(
    _component: omx_sys::Handle,
    app_data: *mut c_void,
    header: *mut BufferHeader,
) -> ErrorType {
    // SAFETY: see `on_event`.
    let registration = unsafe { (app_data as *const Registration).as_ref() };
    if let (Some(registration), Some(header)) = (registration, HeaderPtr::from_raw(header)) {
        registration.sink.fill_buffer_done(header);
    }
    omx_sys::OMX_ErrorNone
}

fn raw(handle: Handle) -> omx_sys::Handle {
    handle.as_raw() as omx_sys::Handle
}

fn vtable<'h>(handle: Handle) -> Result<&'h ComponentType> {
    // SAFETY: handles come from `OMX_GetHandle` and stay valid until
    // `OMX_FreeHandle`; the core only calls us in between.
    unsafe { (raw(handle) as *const ComponentType).as_ref() }
        .ok_or_else(|| Error::InvalidState("null component handle".to_string()))
}

fn entry<F>(function: Option<F>) -> Result<F> {
    function.ok_or(Error::DriverRejected(ErrorCode::NOT_IMPLEMENTED))
}

/// Callback registrations keyed by handle.
///
/// A registration is the `pAppData` of its handle, so it must outlive every
/// callback the core may still deliver: it is dropped only once the core
/// has confirmed the handle is freed.
#[derive(Default)]
struct Registry {
    entries: Mutex<HashMap<usize, Box<Registration>>>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<usize, Box<Registration>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert(&self, handle: Handle, registration: Box<Registration>) {
        self.lock().insert(handle.as_raw(), registration);
    }

    /// Settles the registration of `handle` after `OMX_FreeHandle` answered
    /// `result`, which is passed through.
    fn release(&self, handle: Handle, result: Result<()>) -> Result<()> {
        match &result {
            Ok(()) => {
                if self.lock().remove(&handle.as_raw()).is_none() {
                    warn!(?handle, "freed a handle this driver did not create");
                }
            }
            Err(err) => {
                warn!(?handle, "handle not freed, keeping its callbacks: {err}");
            }
        }
        result
    }

    fn contains(&self, handle: Handle) -> bool {
        self.lock().contains_key(&handle.as_raw())
    }
}

/// The production driver: the Broadcom IL core loaded by
/// [`crate::load_api`].
pub struct IlDriver {
    api: IlApiHandle,
    registry: Registry,
}

impl IlDriver {
    pub fn new(api: IlApiHandle) -> Self {
        Self {
            api,
            registry: Registry::default(),
        }
    }

    /// Whether callbacks for `handle` are still routed by this driver.
    pub fn is_registered(&self, handle: Handle) -> bool {
        self.registry.contains(handle)
    }

    fn indexed(
        &self,
        handle: Handle,
        function: Option<omx_sys::IndexedFn>,
        index: u32,
        payload: *mut c_void,
    ) -> Result<()> {
        let function = entry(function)?;
        Error::from_code(unsafe { function(raw(handle), index, payload) })
    }
}

impl Driver for IlDriver {
    fn get_handle(&self, name: &str, sink: Arc<dyn CallbackSink>) -> Result<Handle> {
        let name = CString::new(name)?;
        let mut registration = Box::new(Registration {
            callbacks: omx_sys::CallbackType {
                EventHandler: Some(on_event),
                EmptyBufferDone: Some(on_empty_buffer_done),
                FillBufferDone: Some(on_fill_buffer_done),
            },
            sink,
        });
        let callbacks: *mut omx_sys::CallbackType = &mut registration.callbacks;
        let app_data = &*registration as *const Registration as *mut c_void;

        let mut component: omx_sys::Handle = null_mut();
        unsafe {
            Error::from_code(self.api.il().get_handle(
                &mut component,
                name.as_ptr() as *mut _,
                app_data,
                callbacks,
            ))?;
        }
        if component.is_null() {
            return Err(Error::Other(format!(
                "OMX_GetHandle returned no handle for {name:?}"
            )));
        }
        let handle = Handle::from_raw(component as usize);
        self.registry.insert(handle, registration);
        debug!(?name, ?handle, "component handle created");
        Ok(handle)
    }

    fn free_handle(&self, handle: Handle) -> Result<()> {
        let result = Error::from_code(unsafe { self.api.il().free_handle(raw(handle)) });
        self.registry.release(handle, result)
    }

    fn send_command(&self, handle: Handle, command: Command) -> Result<()> {
        let send = entry(vtable(handle)?.SendCommand)?;
        Error::from_code(unsafe {
            send(
                raw(handle),
                command.kind().as_raw(),
                command.param(),
                null_mut(),
            )
        })
    }

    fn get_state(&self, handle: Handle) -> Result<State> {
        let get_state = entry(vtable(handle)?.GetState)?;
        let mut state = omx_sys::OMX_StateInvalid;
        Error::from_code(unsafe { get_state(raw(handle), &mut state) })?;
        Ok(State::from_raw(state))
    }

    fn port_range(&self, handle: Handle, domain: PortDomain) -> Result<PortRange> {
        let mut param: omx_sys::PortParam = omx_sys::init_structure();
        self.indexed(
            handle,
            vtable(handle)?.GetParameter,
            domain.param_index(),
            &mut param as *mut _ as *mut c_void,
        )?;
        Ok(PortRange {
            start: param.nStartPortNumber,
            count: param.nPorts,
        })
    }

    fn port_requirements(&self, handle: Handle, port: u32) -> Result<PortRequirements> {
        let mut definition: omx_sys::PortDefinition = omx_sys::init_structure();
        definition.nPortIndex = port;
        self.indexed(
            handle,
            vtable(handle)?.GetParameter,
            omx_sys::OMX_IndexParamPortDefinition,
            &mut definition as *mut _ as *mut c_void,
        )?;
        Ok(PortRequirements {
            count: definition.nBufferCountActual,
            size: definition.nBufferSize,
            alignment: definition.nBufferAlignment,
        })
    }

    fn get_parameter(&self, handle: Handle, index: u32, payload: &mut [u8]) -> Result<()> {
        let function = vtable(handle)?.GetParameter;
        self.indexed(handle, function, index, payload.as_mut_ptr().cast())
    }

    fn set_parameter(&self, handle: Handle, index: u32, payload: &[u8]) -> Result<()> {
        // The IL signature is non-const, but setters do not write through it.
        let function = vtable(handle)?.SetParameter;
        self.indexed(handle, function, index, payload.as_ptr() as *mut c_void)
    }

    fn get_config(&self, handle: Handle, index: u32, payload: &mut [u8]) -> Result<()> {
        let function = vtable(handle)?.GetConfig;
        self.indexed(handle, function, index, payload.as_mut_ptr().cast())
    }

    fn set_config(&self, handle: Handle, index: u32, payload: &[u8]) -> Result<()> {
        let function = vtable(handle)?.SetConfig;
        self.indexed(handle, function, index, payload.as_ptr() as *mut c_void)
    }

    fn allocate_buffer(
        &self,
        handle: Handle,
        port: u32,
        size: u32,
        app_private: usize,
    ) -> Result<HeaderPtr> {
        let allocate = entry(vtable(handle)?.AllocateBuffer)?;
        let mut header: *mut BufferHeader = null_mut();
        Error::from_code(unsafe {
            allocate(
                raw(handle),
                &mut header,
                port,
                app_private as *mut c_void,
                size,
            )
        })?;
        HeaderPtr::from_raw(header)
            .ok_or_else(|| Error::AllocationFailed(format!("no header for port {port}")))
    }

    unsafe fn use_buffer(
        &self,
        handle: Handle,
        port: u32,
        app_private: usize,
        data: NonNull<u8>,
        size: u32,
    ) -> Result<HeaderPtr> {
        let use_buffer = entry(vtable(handle)?.UseBuffer)?;
        let mut header: *mut BufferHeader = null_mut();
        Error::from_code(unsafe {
            use_buffer(
                raw(handle),
                &mut header,
                port,
                app_private as *mut c_void,
                size,
                data.as_ptr(),
            )
        })?;
        HeaderPtr::from_raw(header)
            .ok_or_else(|| Error::AllocationFailed(format!("no header for port {port}")))
    }

    fn free_buffer(&self, handle: Handle, port: u32, header: HeaderPtr) -> Result<()> {
        let free = entry(vtable(handle)?.FreeBuffer)?;
        Error::from_code(unsafe { free(raw(handle), port, header.as_ptr()) })
    }

    fn empty_this_buffer(&self, handle: Handle, header: HeaderPtr) -> Result<()> {
        let empty = entry(vtable(handle)?.EmptyThisBuffer)?;
        Error::from_code(unsafe { empty(raw(handle), header.as_ptr()) })
    }

    fn fill_this_buffer(&self, handle: Handle, header: HeaderPtr) -> Result<()> {
        let fill = entry(vtable(handle)?.FillThisBuffer)?;
        Error::from_code(unsafe { fill(raw(handle), header.as_ptr()) })
    }

    fn setup_tunnel(
        &self,
        output: Handle,
        output_port: u32,
        input: Option<(Handle, u32)>,
    ) -> Result<()> {
        let (input, input_port) = match input {
            Some((handle, port)) => (raw(handle), port),
            None => (null_mut(), 0),
        };
        Error::from_code(unsafe {
            self.api
                .il()
                .setup_tunnel(raw(output), output_port, input, input_port)
        })
    }
}
