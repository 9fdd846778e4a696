// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Shared test tooling: logging setup and a simulated IL driver.
//!
//! The simulated driver keeps a small model of every unit: its state, its
//! enabled ports, the buffers allocated on it and the buffers it currently
//! holds. Commands complete immediately by posting the same events a real
//! unit would; buffer completions are triggered explicitly by the test.
//! Notifications are always delivered after the model lock is released,
//! the way a real callback thread runs independently of the caller.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    ptr::NonNull,
    sync::{Arc, Mutex, MutexGuard},
};

use omx::{
    CallbackSink, Command, CommandKind, Driver, Error, ErrorCode, Event, Handle, PortDomain,
    PortRange, PortRequirements, Result, State,
    buffer::{BufferFlags, HeaderPtr},
    sys,
};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

/// Initializes tracing for tests, respecting `RUST_LOG`.
pub fn setup_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .init();
    });
}

/// Short bounds so failing waits do not stall the suite.
pub fn test_config() -> omx::ComponentConfig {
    omx::ComponentConfig {
        timeouts: omx::Timeouts {
            command: std::time::Duration::from_millis(500),
            event: std::time::Duration::from_millis(100),
            buffer: std::time::Duration::from_millis(50),
        },
        ..omx::ComponentConfig::default()
    }
}

/// A simulated driver plus a component opened on `unit`.
pub fn open(unit: &str) -> (Arc<SimulatedDriver>, omx::Component) {
    setup_logging();
    let driver = Arc::new(SimulatedDriver::new());
    let component = omx::Component::open(driver.clone(), unit, test_config())
        .expect("simulated unit opens");
    (driver, component)
}

/// Hands every available output buffer to the driver for filling.
pub fn queue_all_fills(component: &omx::Component) -> usize {
    let mut queued = 0;
    while let Some(buffer) = component.acquire_output_buffer(std::time::Duration::ZERO) {
        component.request_fill(buffer).expect("fill request accepted");
        queued += 1;
    }
    queued
}

pub const ENCODER: &str = "OMX.test.video_encode";
pub const DECODER: &str = "OMX.test.video_decode";
pub const CAMERA: &str = "OMX.broadcom.camera";
pub const RENDER: &str = "OMX.test.video_render";
/// Declares video ports first and a clock port in the other domain.
pub const SCHEDULER: &str = "OMX.test.video_scheduler";

/// Static description of a unit the simulated driver can instantiate.
#[derive(Debug, Clone)]
pub struct UnitSpec {
    /// Declared ports per domain; domains not listed have none.
    pub ports: Vec<(PortDomain, PortRange)>,
    pub requirements: PortRequirements,
}

impl UnitSpec {
    fn range(&self, domain: PortDomain) -> PortRange {
        self.ports
            .iter()
            .find(|(declared, _)| *declared == domain)
            .map(|(_, range)| *range)
            .unwrap_or_default()
    }

    fn all_ports(&self) -> impl Iterator<Item = u32> + '_ {
        self.ports.iter().flat_map(|(_, range)| range.ports())
    }
}

/// A buffer header allocated by the simulated driver.
struct SimBuffer {
    header: Box<sys::BufferHeader>,
    port: u32,
    /// Driver-owned storage; `None` for caller memory.
    storage: Option<Vec<u8>>,
}

// Safety: the header and storage are only touched under the model lock or
// by whoever currently owns the buffer.
unsafe impl Send for SimBuffer {}

impl SimBuffer {
    fn ptr(&mut self) -> HeaderPtr {
        HeaderPtr::new(NonNull::from(&mut *self.header))
    }
}

struct SimComponent {
    name: String,
    spec: UnitSpec,
    sink: Arc<dyn CallbackSink>,
    state: State,
    enabled: BTreeSet<u32>,
    buffers: HashMap<usize, SimBuffer>,
    pending_fills: VecDeque<HeaderPtr>,
    pending_empties: VecDeque<HeaderPtr>,
    params: HashMap<u32, Vec<u8>>,
    commands: Vec<Command>,
}

#[derive(Debug, Default, Clone)]
pub struct Faults {
    /// Answer every unbind with this error.
    pub unbind: Option<ErrorCode>,
    /// Refuse `FillThisBuffer`/`EmptyThisBuffer` with this error.
    pub submit: Option<ErrorCode>,
    /// Refuse buffer allocation after this many buffers.
    pub allocation_limit: Option<usize>,
    /// Accept commands of this kind but never complete them.
    pub stall: Option<CommandKind>,
}

#[derive(Default)]
struct Model {
    units: BTreeMap<String, UnitSpec>,
    next_handle: usize,
    components: HashMap<Handle, SimComponent>,
    /// Output end to input end.
    tunnels: BTreeMap<(Handle, u32), (Handle, u32)>,
    unbinds: Vec<(Handle, u32)>,
    faults: Faults,
}

enum Notification {
    Event(Event),
    EmptyDone(HeaderPtr),
    FillDone(HeaderPtr),
}

/// Thread-safe stand-in for the IL core.
pub struct SimulatedDriver {
    model: Mutex<Model>,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDriver {
    /// A driver that knows an encoder, a decoder, a camera, a renderer and
    /// a scheduler.
    pub fn new() -> Self {
        let driver = Self {
            model: Mutex::new(Model {
                next_handle: 0x1000,
                ..Model::default()
            }),
        };
        let requirements = |buffers| PortRequirements {
            count: buffers,
            size: 1024,
            alignment: 16,
        };
        let video = |start, count, buffers| UnitSpec {
            ports: vec![(PortDomain::Video, PortRange { start, count })],
            requirements: requirements(buffers),
        };
        driver.add_unit(ENCODER, video(200, 2, 4));
        driver.add_unit(DECODER, video(130, 2, 3));
        driver.add_unit(CAMERA, video(70, 4, 2));
        driver.add_unit(RENDER, video(90, 1, 2));
        driver.add_unit(
            SCHEDULER,
            UnitSpec {
                ports: vec![
                    (PortDomain::Video, PortRange { start: 10, count: 2 }),
                    (PortDomain::Other, PortRange { start: 12, count: 1 }),
                ],
                requirements: requirements(2),
            },
        );
        driver
    }

    fn lock(&self) -> MutexGuard<'_, Model> {
        self.model.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add_unit(&self, name: &str, spec: UnitSpec) {
        self.lock().units.insert(name.to_string(), spec);
    }

    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    fn deliver(sink: &Arc<dyn CallbackSink>, notifications: Vec<Notification>) {
        for notification in notifications {
            match notification {
                Notification::Event(event) => sink.event(event),
                Notification::EmptyDone(header) => sink.empty_buffer_done(header),
                Notification::FillDone(header) => sink.fill_buffer_done(header),
            }
        }
    }

    /// Runs `f` on the unit behind `handle` and delivers what it produced
    /// once the model lock is released.
    fn with_component<T>(
        &self,
        handle: Handle,
        f: impl FnOnce(&mut SimComponent, &mut Faults, &mut Vec<Notification>) -> Result<T>,
    ) -> Result<T> {
        let mut notifications = Vec::new();
        let (result, sink) = {
            let mut model = self.lock();
            let Model {
                components, faults, ..
            } = &mut *model;
            let component = components
                .get_mut(&handle)
                .ok_or(Error::DriverRejected(ErrorCode::BAD_PARAMETER))?;
            (
                f(component, faults, &mut notifications),
                component.sink.clone(),
            )
        };
        Self::deliver(&sink, notifications);
        result
    }

    // Inspection

    pub fn state_of(&self, handle: Handle) -> Option<State> {
        self.lock().components.get(&handle).map(|c| c.state)
    }

    pub fn commands(&self, handle: Handle) -> Vec<Command> {
        self.lock()
            .components
            .get(&handle)
            .map(|c| c.commands.clone())
            .unwrap_or_default()
    }

    pub fn command_count(&self, handle: Handle) -> usize {
        self.commands(handle).len()
    }

    pub fn total_commands(&self) -> usize {
        self.lock()
            .components
            .values()
            .map(|c| c.commands.len())
            .sum()
    }

    pub fn port_enabled(&self, handle: Handle, port: u32) -> bool {
        self.lock()
            .components
            .get(&handle)
            .is_some_and(|c| c.enabled.contains(&port))
    }

    pub fn tunnel_from(&self, handle: Handle, port: u32) -> Option<(Handle, u32)> {
        self.lock().tunnels.get(&(handle, port)).copied()
    }

    pub fn unbinds(&self) -> Vec<(Handle, u32)> {
        self.lock().unbinds.clone()
    }

    pub fn live_handles(&self) -> usize {
        self.lock().components.len()
    }

    pub fn allocated_buffers(&self, handle: Handle) -> usize {
        self.lock()
            .components
            .get(&handle)
            .map_or(0, |c| c.buffers.len())
    }

    pub fn pending_fills(&self, handle: Handle) -> usize {
        self.lock()
            .components
            .get(&handle)
            .map_or(0, |c| c.pending_fills.len())
    }

    pub fn pending_empties(&self, handle: Handle) -> usize {
        self.lock()
            .components
            .get(&handle)
            .map_or(0, |c| c.pending_empties.len())
    }

    // Simulated hardware activity

    /// Posts an arbitrary event from the "callback thread".
    pub fn post_event(&self, handle: Handle, event: Event) {
        self.with_component(handle, |_, _, out| {
            out.push(Notification::Event(event));
            Ok(())
        })
        .expect("unknown handle");
    }

    /// Fills the oldest buffer queued with `FillThisBuffer` and returns it.
    ///
    /// Returns `false` if no buffer was queued.
    pub fn complete_fill(&self, handle: Handle, payload: &[u8], flags: BufferFlags) -> bool {
        self.with_component(handle, |component, _, out| {
            let Some(header) = component.pending_fills.pop_front() else {
                return Ok(false);
            };
            // SAFETY: the driver owns queued buffers.
            let header_ref = unsafe { &mut *header.as_ptr() };
            let len = payload.len().min(header_ref.nAllocLen as usize);
            unsafe { std::ptr::copy_nonoverlapping(payload.as_ptr(), header_ref.pBuffer, len) };
            header_ref.nOffset = 0;
            header_ref.nFilledLen = len as u32;
            header_ref.nFlags = flags.bits();
            if flags.contains(BufferFlags::END_OF_STREAM) {
                out.push(Notification::Event(Event::new(
                    omx::EventKind::BufferFlag,
                    component.spec.ports[0].1.start + 1,
                    flags.bits(),
                )));
            }
            out.push(Notification::FillDone(header));
            Ok(true)
        })
        .unwrap_or(false)
    }

    /// Consumes the oldest buffer queued with `EmptyThisBuffer`.
    pub fn complete_empty(&self, handle: Handle) -> bool {
        self.with_component(handle, |component, _, out| {
            let Some(header) = component.pending_empties.pop_front() else {
                return Ok(false);
            };
            out.push(Notification::EmptyDone(header));
            Ok(true)
        })
        .unwrap_or(false)
    }

    fn declared(component: &SimComponent, port: u32) -> Result<()> {
        if port == sys::OMX_ALL || component.spec.all_ports().any(|declared| declared == port) {
            Ok(())
        } else {
            Err(Error::DriverRejected(ErrorCode::BAD_PORT_INDEX))
        }
    }
}

fn transition_allowed(from: State, to: State) -> bool {
    use State::*;
    matches!(
        (from, to),
        (Loaded, Idle)
            | (Loaded, WaitForResources)
            | (WaitForResources, Loaded)
            | (Idle, Loaded)
            | (Idle, Executing)
            | (Idle, Pause)
            | (Executing, Idle)
            | (Executing, Pause)
            | (Pause, Idle)
            | (Pause, Executing)
    )
}

impl Driver for SimulatedDriver {
    fn get_handle(&self, name: &str, sink: Arc<dyn CallbackSink>) -> Result<Handle> {
        let mut model = self.lock();
        let spec = model
            .units
            .get(name)
            .cloned()
            .ok_or(Error::DriverRejected(ErrorCode::COMPONENT_NOT_FOUND))?;
        let handle = Handle::from_raw(model.next_handle);
        model.next_handle += 0x100;
        let enabled = spec.all_ports().collect();
        model.components.insert(
            handle,
            SimComponent {
                name: name.to_string(),
                spec,
                sink,
                state: State::Loaded,
                enabled,
                buffers: HashMap::new(),
                pending_fills: VecDeque::new(),
                pending_empties: VecDeque::new(),
                params: HashMap::new(),
                commands: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn free_handle(&self, handle: Handle) -> Result<()> {
        let mut model = self.lock();
        model
            .components
            .remove(&handle)
            .ok_or(Error::DriverRejected(ErrorCode::BAD_PARAMETER))?;
        model
            .tunnels
            .retain(|output, input| output.0 != handle && input.0 != handle);
        Ok(())
    }

    fn send_command(&self, handle: Handle, command: Command) -> Result<()> {
        self.with_component(handle, |component, faults, out| {
            if let Command::PortEnable(port) | Command::PortDisable(port) | Command::Flush(port) =
                command
            {
                Self::declared(component, port)?;
            }
            component.commands.push(command);
            let stalled = faults.stall == Some(command.kind());

            match command {
                Command::StateSet(target) => {
                    if target == component.state {
                        out.push(Notification::Event(Event::error(ErrorCode::SAME_STATE, 0)));
                        return Ok(());
                    }
                    if !transition_allowed(component.state, target) {
                        out.push(Notification::Event(Event::error(
                            ErrorCode::INCORRECT_STATE_TRANSITION,
                            0,
                        )));
                        return Ok(());
                    }
                    if stalled {
                        return Ok(());
                    }
                    if target == State::Idle && component.state != State::Loaded {
                        // Buffers held by the unit go back on the way down.
                        out.extend(component.pending_fills.drain(..).map(Notification::FillDone));
                        out.extend(
                            component
                                .pending_empties
                                .drain(..)
                                .map(Notification::EmptyDone),
                        );
                    }
                    component.state = target;
                }
                Command::PortEnable(port) => {
                    component.enabled.insert(port);
                }
                Command::PortDisable(port) => {
                    component.enabled.remove(&port);
                }
                Command::Flush(_) => {
                    out.extend(component.pending_fills.drain(..).map(Notification::FillDone));
                    out.extend(
                        component
                            .pending_empties
                            .drain(..)
                            .map(Notification::EmptyDone),
                    );
                }
            }
            if !stalled {
                out.push(Notification::Event(Event::command_complete(
                    command.kind(),
                    command.param(),
                )));
            }
            Ok(())
        })
    }

    fn get_state(&self, handle: Handle) -> Result<State> {
        self.with_component(handle, |component, _, _| Ok(component.state))
    }

    fn port_range(&self, handle: Handle, domain: PortDomain) -> Result<PortRange> {
        self.with_component(handle, |component, _, _| {
            Ok(component.spec.range(domain))
        })
    }

    fn port_requirements(&self, handle: Handle, port: u32) -> Result<PortRequirements> {
        self.with_component(handle, |component, _, _| {
            Self::declared(component, port)?;
            Ok(component.spec.requirements)
        })
    }

    fn get_parameter(&self, handle: Handle, index: u32, payload: &mut [u8]) -> Result<()> {
        self.with_component(handle, |component, _, _| {
            let stored = component
                .params
                .get(&index)
                .ok_or(Error::DriverRejected(ErrorCode::UNSUPPORTED_INDEX))?;
            let len = stored.len().min(payload.len());
            payload[..len].copy_from_slice(&stored[..len]);
            Ok(())
        })
    }

    fn set_parameter(&self, handle: Handle, index: u32, payload: &[u8]) -> Result<()> {
        self.with_component(handle, |component, _, _| {
            component.params.insert(index, payload.to_vec());
            Ok(())
        })
    }

    fn get_config(&self, handle: Handle, index: u32, payload: &mut [u8]) -> Result<()> {
        self.get_parameter(handle, index, payload)
    }

    fn set_config(&self, handle: Handle, index: u32, payload: &[u8]) -> Result<()> {
        self.set_parameter(handle, index, payload)
    }

    fn allocate_buffer(
        &self,
        handle: Handle,
        port: u32,
        size: u32,
        app_private: usize,
    ) -> Result<HeaderPtr> {
        self.with_component(handle, |component, faults, _| {
            Self::declared(component, port)?;
            if faults
                .allocation_limit
                .is_some_and(|limit| component.buffers.len() >= limit)
            {
                return Err(Error::DriverRejected(ErrorCode::INSUFFICIENT_RESOURCES));
            }
            let mut storage = vec![0u8; size as usize];
            let header = sys::BufferHeader {
                pBuffer: storage.as_mut_ptr(),
                nAllocLen: size,
                pAppPrivate: app_private as *mut _,
                nOutputPortIndex: port,
                nInputPortIndex: port,
                ..Default::default()
            };
            let mut buffer = SimBuffer {
                header: Box::new(header),
                port,
                storage: Some(storage),
            };
            let ptr = buffer.ptr();
            component.buffers.insert(ptr.as_ptr() as usize, buffer);
            Ok(ptr)
        })
    }

    unsafe fn use_buffer(
        &self,
        handle: Handle,
        port: u32,
        app_private: usize,
        data: NonNull<u8>,
        size: u32,
    ) -> Result<HeaderPtr> {
        self.with_component(handle, |component, faults, _| {
            Self::declared(component, port)?;
            if faults
                .allocation_limit
                .is_some_and(|limit| component.buffers.len() >= limit)
            {
                return Err(Error::DriverRejected(ErrorCode::INSUFFICIENT_RESOURCES));
            }
            let header = sys::BufferHeader {
                pBuffer: data.as_ptr(),
                nAllocLen: size,
                pAppPrivate: app_private as *mut _,
                nOutputPortIndex: port,
                nInputPortIndex: port,
                ..Default::default()
            };
            let mut buffer = SimBuffer {
                header: Box::new(header),
                port,
                storage: None,
            };
            let ptr = buffer.ptr();
            component.buffers.insert(ptr.as_ptr() as usize, buffer);
            Ok(ptr)
        })
    }

    fn free_buffer(&self, handle: Handle, port: u32, header: HeaderPtr) -> Result<()> {
        self.with_component(handle, |component, _, _| {
            let key = header.as_ptr() as usize;
            match component.buffers.get(&key) {
                Some(buffer) if buffer.port == port => {}
                _ => return Err(Error::DriverRejected(ErrorCode::BAD_PARAMETER)),
            }
            component.pending_fills.retain(|queued| *queued != header);
            component.pending_empties.retain(|queued| *queued != header);
            component.buffers.remove(&key);
            Ok(())
        })
    }

    fn empty_this_buffer(&self, handle: Handle, header: HeaderPtr) -> Result<()> {
        self.with_component(handle, |component, faults, _| {
            if let Some(code) = faults.submit {
                return Err(Error::DriverRejected(code));
            }
            if !component.buffers.contains_key(&(header.as_ptr() as usize)) {
                return Err(Error::DriverRejected(ErrorCode::BAD_PARAMETER));
            }
            component.pending_empties.push_back(header);
            Ok(())
        })
    }

    fn fill_this_buffer(&self, handle: Handle, header: HeaderPtr) -> Result<()> {
        self.with_component(handle, |component, faults, _| {
            if let Some(code) = faults.submit {
                return Err(Error::DriverRejected(code));
            }
            if !matches!(
                component.state,
                State::Idle | State::Executing | State::Pause
            ) {
                return Err(Error::DriverRejected(ErrorCode::INCORRECT_STATE_OPERATION));
            }
            if !component.buffers.contains_key(&(header.as_ptr() as usize)) {
                return Err(Error::DriverRejected(ErrorCode::BAD_PARAMETER));
            }
            component.pending_fills.push_back(header);
            Ok(())
        })
    }

    fn setup_tunnel(
        &self,
        output: Handle,
        output_port: u32,
        input: Option<(Handle, u32)>,
    ) -> Result<()> {
        let mut model = self.lock();
        if !model.components.contains_key(&output) {
            return Err(Error::DriverRejected(ErrorCode::BAD_PARAMETER));
        }
        match input {
            Some(input) => {
                if !model.components.contains_key(&input.0) {
                    return Err(Error::DriverRejected(ErrorCode::BAD_PARAMETER));
                }
                model.tunnels.insert((output, output_port), input);
            }
            None => {
                model.unbinds.push((output, output_port));
                if let Some(code) = model.faults.unbind {
                    return Err(Error::DriverRejected(code));
                }
                let end = (output, output_port);
                model
                    .tunnels
                    .retain(|source, destination| *source != end && *destination != end);
            }
        }
        Ok(())
    }
}
