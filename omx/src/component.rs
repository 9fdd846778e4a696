// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Hardware components: state machine, port control and buffer exchange.
//!
//! A [`Component`] wraps one driver handle. Its event log and its two buffer
//! pools live in a shared context that the driver's callback thread posts
//! into; control threads block on that context with bounded waits.

use std::{
    collections::BTreeSet,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::{debug, error, trace, warn};

use crate::{
    Error, Result,
    buffer::{AlignedMemory, Buffer, BufferPool, HeaderPtr, Memory, PoolStats},
    config::{ComponentConfig, Timeouts},
    driver::{
        CallbackSink, Command, CommandKind, Direction, Driver, Handle, PortDomain, PortRange,
        State,
    },
    event::{Event, EventKind, EventLog},
};

/// State shared with the driver's callback context.
struct Shared {
    name: Mutex<String>,
    events: EventLog,
    input: Arc<BufferPool>,
    output: Arc<BufferPool>,
    eos: AtomicBool,
}

impl CallbackSink for Shared {
    fn event(&self, event: Event) {
        if event.kind == EventKind::BufferFlag && event.data2 & omx_sys::OMX_BUFFERFLAG_EOS != 0 {
            self.eos.store(true, Ordering::Release);
        }
        if event.kind == EventKind::Error {
            let name = self.name.lock().unwrap_or_else(|p| p.into_inner());
            debug!(component = %name, code = %crate::ErrorCode(event.data1), "error event");
        }
        self.events.post(event);
    }

    fn empty_buffer_done(&self, header: HeaderPtr) {
        trace!("input buffer returned");
        self.input.release(header);
    }

    fn fill_buffer_done(&self, header: HeaderPtr) {
        trace!("output buffer returned");
        self.output.release(header);
    }
}

/// One hardware processing unit.
///
/// A component is created empty, bound to a driver handle by
/// [`Component::initialise`] (or [`Component::open`]) and released by
/// [`Component::deinitialise`], which also runs on drop. Without a handle it
/// exposes no buffers and reports [`State::Unloaded`].
///
/// All operations except initialisation and teardown take `&self`, so a
/// component can be shared between the thread that feeds it and the thread
/// that drains it.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use omx::{Component, ComponentConfig, IlDriver, State, config, load_api};
///
/// # fn main() -> Result<(), omx::Error> {
/// let api = load_api(config::library_path(), Some(config::host_library_path().as_path()))?;
/// let driver = Arc::new(IlDriver::new(api));
///
/// let encoder = Component::open(driver, "OMX.broadcom.video_encode", ComponentConfig::default())?;
/// encoder.allocate_output_buffers(false)?;
/// encoder.run()?;
///
/// if let Some(buffer) = encoder.acquire_output_buffer(Duration::from_millis(200)) {
///     encoder.request_fill(buffer)?;
/// }
/// assert_eq!(encoder.state(), State::Executing);
/// # Ok(())
/// # }
/// ```
pub struct Component {
    driver: Arc<dyn Driver>,
    config: ComponentConfig,
    name: String,
    handle: Option<Handle>,
    input_port: u32,
    output_port: u32,
    enabled_ports: Mutex<BTreeSet<u32>>,
    shared: Arc<Shared>,
}

impl Component {
    /// Creates an empty component. Nothing is requested from the driver
    /// until [`Component::initialise`].
    pub fn new(driver: Arc<dyn Driver>, config: ComponentConfig) -> Self {
        Self {
            driver,
            config,
            name: String::new(),
            handle: None,
            input_port: 0,
            output_port: 0,
            enabled_ports: Mutex::new(BTreeSet::new()),
            shared: Arc::new(Shared {
                name: Mutex::new(String::new()),
                events: EventLog::new(),
                input: Arc::new(BufferPool::new(Direction::Input)),
                output: Arc::new(BufferPool::new(Direction::Output)),
                eos: AtomicBool::new(false),
            }),
        }
    }

    /// Creates and initialises a component in one step.
    ///
    /// # Errors
    ///
    /// See [`Component::initialise`].
    pub fn open(driver: Arc<dyn Driver>, name: &str, config: ComponentConfig) -> Result<Self> {
        let mut component = Self::new(driver, config);
        component.initialise(name)?;
        Ok(component)
    }

    /// Tears the component down and reports the outcome, instead of leaving
    /// it to drop.
    pub fn close(mut self) -> Result<()> {
        self.deinitialise()
    }

    /// Binds the component to a new driver handle for the unit `name`.
    ///
    /// Port numbers are resolved with the layout configured for `name`,
    /// against the layout's port domain or, if it names none, the first
    /// domain the unit declares ports in. Every
    /// declared port is then disabled, so the enabled-port bookkeeping
    /// starts out matching the driver.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the component already has a handle, or
    ///   if the configured domain has no ports
    /// - Driver errors from handle creation, port queries or the disable
    ///   commands
    pub fn initialise(&mut self, name: &str) -> Result<()> {
        if self.handle.is_some() {
            return Err(Error::InvalidState(format!(
                "component {} is already initialised",
                self.name
            )));
        }

        self.shared.events.clear();
        self.shared.eos.store(false, Ordering::Release);
        *self.shared.name.lock().unwrap_or_else(|p| p.into_inner()) = name.to_string();
        self.enabled().clear();

        let sink: Arc<dyn CallbackSink> = self.shared.clone();
        let handle = self.driver.get_handle(name, sink)?;
        self.handle = Some(handle);
        self.name = name.to_string();

        let layout = self.config.layouts.layout_for(name);
        let range = match layout.domain {
            Some(domain) => {
                let range = self.driver.port_range(handle, domain)?;
                if range.is_empty() {
                    return Err(Error::InvalidState(format!(
                        "unit {name} declares no {domain:?} ports"
                    )));
                }
                Some(range)
            }
            None => self.first_port_range(handle)?,
        };
        if let Some(range) = range {
            (self.input_port, self.output_port) = layout.resolve(range.start, range.count);
        }

        self.disable_all_ports()?;
        debug!(
            component = name,
            input_port = self.input_port,
            output_port = self.output_port,
            "component initialised"
        );
        Ok(())
    }

    /// Drains buffers, walks the state machine back to Loaded and releases
    /// the driver handle.
    ///
    /// Each intermediate step is best effort: failures are logged and the
    /// teardown continues. Calling this on a component without a handle does
    /// nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] while the application still holds buffer
    ///   descriptors; nothing is torn down and the call can be repeated once
    ///   they are dropped or submitted
    /// - Otherwise the driver's answer to releasing the handle
    pub fn deinitialise(&mut self) -> Result<()> {
        let Some(handle) = self.handle else {
            return Ok(());
        };
        let held = self.shared.input.stats().held() + self.shared.output.stats().held();
        if held > 0 {
            return Err(Error::InvalidState(format!(
                "component {} still has {held} buffers held by the application",
                self.name
            )));
        }
        debug!(component = %self.name, "deinitialising component");

        self.shared.input.begin_exit();
        self.shared.output.begin_exit();
        self.log_teardown("flush", self.flush_all());

        if self.state() == State::Executing {
            self.log_teardown("pause", self.set_state(State::Pause));
        }
        if self.state() != State::Idle {
            self.log_teardown("idle", self.set_state(State::Idle));
        }

        self.log_teardown("free output buffers", self.free_output_buffers(true));
        self.log_teardown("free input buffers", self.free_input_buffers(true));

        if self.state() != State::Idle {
            self.log_teardown("idle", self.set_state(State::Idle));
        }
        if self.state() != State::Loaded {
            self.log_teardown("unload", self.set_state(State::Loaded));
        }

        let result = self.driver.free_handle(handle);
        self.handle = None;
        self.input_port = 0;
        self.output_port = 0;
        self.enabled().clear();
        self.shared.events.clear();
        result
    }

    fn first_port_range(&self, handle: Handle) -> Result<Option<PortRange>> {
        for domain in PortDomain::ALL {
            let range = self.driver.port_range(handle, domain)?;
            if !range.is_empty() {
                return Ok(Some(range));
            }
        }
        Ok(None)
    }

    fn log_teardown(&self, step: &str, result: Result<()>) {
        if let Err(err) = result {
            warn!(component = %self.name, step, "teardown step failed: {err}");
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The driver handle, `None` while uninitialised.
    pub fn handle(&self) -> Option<Handle> {
        self.handle
    }

    pub fn is_initialised(&self) -> bool {
        self.handle.is_some()
    }

    pub fn input_port(&self) -> u32 {
        self.input_port
    }

    pub fn output_port(&self) -> u32 {
        self.output_port
    }

    pub fn config(&self) -> &ComponentConfig {
        &self.config
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.config.timeouts
    }

    pub(crate) fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub(crate) fn require_handle(&self) -> Result<Handle> {
        self.handle.ok_or_else(|| {
            Error::InvalidState(format!("component '{}' has no driver handle", self.name))
        })
    }

    fn enabled(&self) -> MutexGuard<'_, BTreeSet<u32>> {
        self.enabled_ports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sends a command, absorbing a same-state refusal.
    ///
    /// Returns whether a completion event is on its way.
    fn issue(&self, handle: Handle, command: Command) -> Result<bool> {
        debug!(component = %self.name, ?command, "sending command");
        match self.driver.send_command(handle, command) {
            Ok(()) => Ok(true),
            Err(err) if err.is_same_state() => {
                debug!(component = %self.name, ?command, "command already satisfied");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Waits for a command completion, treating a same-state error as done.
    fn complete(&self, kind: CommandKind, param: u32) -> Result<()> {
        match self.wait_for_command(kind, param, self.config.timeouts.command) {
            Err(err) if err.is_same_state() => Ok(()),
            other => other,
        }
    }

    // State machine

    /// The driver's current state, or [`State::Unloaded`] without a handle.
    ///
    /// A failing state query is logged and also reported as unloaded.
    pub fn state(&self) -> State {
        let Some(handle) = self.handle else {
            return State::Unloaded;
        };
        match self.driver.get_state(handle) {
            Ok(state) => state,
            Err(err) => {
                warn!(component = %self.name, "state query failed: {err}");
                State::Unloaded
            }
        }
    }

    /// Moves the component to `target` and waits for the driver to confirm.
    ///
    /// Does nothing if the component is already in `target`. A same-state
    /// answer from the driver counts as success.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] without a handle, or for [`State::Unloaded`]
    /// - [`Error::Timeout`] if no completion arrives within the command
    ///   timeout
    /// - Any other error reported by the driver; the transition is then
    ///   abandoned
    pub fn set_state(&self, target: State) -> Result<()> {
        let handle = self.require_handle()?;
        if target == State::Unloaded {
            return Err(Error::InvalidState(
                "the unloaded state is left by releasing the handle".to_string(),
            ));
        }
        let current = self.driver.get_state(handle)?;
        if current == target {
            return Ok(());
        }

        debug!(component = %self.name, from = %current, to = %target, "changing state");
        if self.issue(handle, Command::StateSet(target))? {
            self.complete(CommandKind::StateSet, target.as_raw())
                .inspect_err(|err| {
                    warn!(component = %self.name, to = %target, "state change failed: {err}")
                })?;
        }
        Ok(())
    }

    pub fn run(&self) -> Result<()> {
        self.set_state(State::Executing)
    }

    pub fn idle(&self) -> Result<()> {
        self.set_state(State::Idle)
    }

    pub fn pause(&self) -> Result<()> {
        self.set_state(State::Pause)
    }

    /// Brings a running component back to Loaded, releasing its buffers on
    /// the way.
    pub fn stop(&self) -> Result<()> {
        if matches!(self.state(), State::Executing | State::Pause) {
            self.set_state(State::Idle)?;
        }
        self.free_output_buffers(true)?;
        self.free_input_buffers(true)?;
        self.set_state(State::Loaded)
    }

    // Ports

    /// Enables `port` unless it is already enabled.
    ///
    /// # Arguments
    ///
    /// * `port` - Port index as numbered by the driver
    /// * `wait` - Block until the driver reports the command complete
    ///
    /// # Errors
    ///
    /// Driver rejections other than same-state, and [`Error::Timeout`] when
    /// waiting.
    pub fn enable_port(&self, port: u32, wait: bool) -> Result<()> {
        if self.toggle_port(port, true)? && wait {
            self.complete(CommandKind::PortEnable, port)?;
        }
        Ok(())
    }

    /// Disables `port` unless it is already disabled.
    ///
    /// Same contract as [`Component::enable_port`].
    pub fn disable_port(&self, port: u32, wait: bool) -> Result<()> {
        if self.toggle_port(port, false)? && wait {
            self.complete(CommandKind::PortDisable, port)?;
        }
        Ok(())
    }

    /// Sends the enable or disable command for `port` if its bookkeeping
    /// differs from `enable`.
    ///
    /// Returns whether a completion event is on its way.
    fn toggle_port(&self, port: u32, enable: bool) -> Result<bool> {
        let handle = self.require_handle()?;
        let mut enabled = self.enabled();
        let changed = if enable {
            enabled.insert(port)
        } else {
            enabled.remove(&port)
        };
        if !changed {
            return Ok(false);
        }
        let command = if enable {
            Command::PortEnable(port)
        } else {
            Command::PortDisable(port)
        };
        self.issue(handle, command).inspect_err(|_| {
            if enable {
                enabled.remove(&port);
            } else {
                enabled.insert(port);
            }
        })
    }

    /// Disables every port the unit declares, in every domain, waiting for
    /// each completion.
    pub fn disable_all_ports(&self) -> Result<()> {
        let handle = self.require_handle()?;
        for domain in PortDomain::ALL {
            let range = self.driver.port_range(handle, domain)?;
            for port in range.ports() {
                if self.issue(handle, Command::PortDisable(port))? {
                    self.complete(CommandKind::PortDisable, port)?;
                }
                self.enabled().remove(&port);
            }
        }
        Ok(())
    }

    pub fn is_port_enabled(&self, port: u32) -> bool {
        self.enabled().contains(&port)
    }

    /// Enabled ports in ascending order.
    pub fn enabled_ports(&self) -> Vec<u32> {
        self.enabled().iter().copied().collect()
    }

    /// Current definition of `port`, as reported by the driver.
    pub fn port_definition(&self, port: u32) -> Result<omx_sys::PortDefinition> {
        let mut definition: omx_sys::PortDefinition = omx_sys::init_structure();
        definition.nPortIndex = port;
        self.get_parameter(omx_sys::OMX_IndexParamPortDefinition, &mut definition)?;
        Ok(definition)
    }

    // Events and commands

    /// Blocks until an event of `kind` arrives.
    ///
    /// # Errors
    ///
    /// - The error of any pending error event, which this wait consumes
    /// - [`Error::Timeout`] if nothing matched within `timeout`
    pub fn wait_for_event(&self, kind: EventKind, timeout: Duration) -> Result<()> {
        self.shared.events.wait_for_event(kind, timeout)
    }

    /// Blocks until the command `kind` with parameter `param` completes.
    ///
    /// Error handling is the same as [`Component::wait_for_event`].
    pub fn wait_for_command(
        &self,
        kind: CommandKind,
        param: u32,
        timeout: Duration,
    ) -> Result<()> {
        self.shared.events.wait_for_command(kind, param, timeout)
    }

    /// Sends a raw command without waiting or bookkeeping.
    pub fn send_command(&self, command: Command) -> Result<()> {
        let handle = self.require_handle()?;
        self.driver.send_command(handle, command)
    }

    /// Returns every buffer the driver holds on the input port.
    pub fn flush_input(&self) -> Result<()> {
        self.flush_port(self.input_port)
    }

    /// Returns every buffer the driver holds on the output port.
    pub fn flush_output(&self) -> Result<()> {
        self.flush_port(self.output_port)
    }

    pub fn flush_all(&self) -> Result<()> {
        self.flush_input()?;
        self.flush_output()
    }

    pub(crate) fn flush_port(&self, port: u32) -> Result<()> {
        let handle = self.require_handle()?;
        if self.issue(handle, Command::Flush(port))? {
            self.complete(CommandKind::Flush, port)?;
        }
        Ok(())
    }

    /// Whether the driver flagged end of stream since initialisation.
    pub fn is_eos(&self) -> bool {
        self.shared.eos.load(Ordering::Acquire)
    }

    // Parameters

    /// Reads the indexed parameter into `value`.
    ///
    /// The payload is opaque to the core; `value` must carry a valid header,
    /// see [`omx_sys::init_structure`].
    pub fn get_parameter<T: omx_sys::Structure>(&self, index: u32, value: &mut T) -> Result<()> {
        let handle = self.require_handle()?;
        self.driver.get_parameter(handle, index, bytes_of_mut(value))
    }

    pub fn set_parameter<T: omx_sys::Structure>(&self, index: u32, value: &T) -> Result<()> {
        let handle = self.require_handle()?;
        self.driver.set_parameter(handle, index, bytes_of(value))
    }

    pub fn get_config<T: omx_sys::Structure>(&self, index: u32, value: &mut T) -> Result<()> {
        let handle = self.require_handle()?;
        self.driver.get_config(handle, index, bytes_of_mut(value))
    }

    pub fn set_config<T: omx_sys::Structure>(&self, index: u32, value: &T) -> Result<()> {
        let handle = self.require_handle()?;
        self.driver.set_config(handle, index, bytes_of(value))
    }

    // Buffers

    fn pool(&self, direction: Direction) -> (&Arc<BufferPool>, u32) {
        match direction {
            Direction::Input => (&self.shared.input, self.input_port),
            Direction::Output => (&self.shared.output, self.output_port),
        }
    }

    /// Allocates the input pool. See [`Component::allocate_output_buffers`].
    pub fn allocate_input_buffers(&self, use_external: bool) -> Result<()> {
        self.allocate_buffers(Direction::Input, use_external)
    }

    /// Allocates the buffers the driver requires on the output port.
    ///
    /// The component is brought to Idle first if needed and the port is
    /// enabled. Each buffer is either requested from the driver or, with
    /// `use_external`, backed by aligned caller memory. All buffers start
    /// out available.
    ///
    /// Call this only after every tunnel on the port is established; the
    /// tunnel handshake toggles the same port.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] without a handle or if the pool is already
    ///   allocated
    /// - [`Error::AllocationFailed`] if memory or a header could not be
    ///   obtained
    /// - Driver rejections and timeouts from the state change and port
    ///   enable; buffers allocated up to the failure stay in the pool for
    ///   [`Component::free_output_buffers`]
    pub fn allocate_output_buffers(&self, use_external: bool) -> Result<()> {
        self.allocate_buffers(Direction::Output, use_external)
    }

    fn allocate_buffers(&self, direction: Direction, use_external: bool) -> Result<()> {
        let handle = self.require_handle()?;
        let (pool, port) = self.pool(direction);
        let requirements = self.driver.port_requirements(handle, port)?;
        pool.reset(port, requirements)?;

        let state = self.state();
        if state != State::Idle {
            if state != State::Loaded {
                self.set_state(State::Loaded)?;
            }
            self.set_state(State::Idle)?;
        }

        let enabling = self.toggle_port(port, true)?;

        for _ in 0..requirements.count {
            let index = pool.next_index();
            if use_external {
                let memory = AlignedMemory::new(
                    requirements.size as usize,
                    requirements.alignment as usize,
                )?;
                // SAFETY: the memory is kept in the pool slot until after the
                // header is freed.
                let header = unsafe {
                    self.driver
                        .use_buffer(handle, port, index, memory.as_ptr(), requirements.size)?
                };
                pool.insert(header, Memory::Caller(memory));
            } else {
                let header = self
                    .driver
                    .allocate_buffer(handle, port, requirements.size, index)?;
                pool.insert(header, Memory::Driver);
            }
        }

        if enabling {
            self.complete(CommandKind::PortEnable, port)?;
        }
        debug!(
            component = %self.name,
            port,
            count = requirements.count,
            size = requirements.size,
            alignment = requirements.alignment,
            use_external,
            "buffers allocated"
        );
        Ok(())
    }

    pub fn free_input_buffers(&self, wait: bool) -> Result<()> {
        self.free_buffers(Direction::Input, wait)
    }

    /// Releases every output buffer and disables the port.
    ///
    /// Waiters blocked in [`Component::acquire_output_buffer`] return `None`
    /// immediately. Does nothing on an empty pool.
    ///
    /// # Arguments
    ///
    /// * `wait` - Block until the port-disable command completes
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] while the application still holds one of
    ///   the buffers; nothing is freed and the pool keeps working
    /// - The first driver error from freeing a header or the port disable
    pub fn free_output_buffers(&self, wait: bool) -> Result<()> {
        self.free_buffers(Direction::Output, wait)
    }

    fn free_buffers(&self, direction: Direction, wait: bool) -> Result<()> {
        let (pool, port) = self.pool(direction);
        let (pool_port, slots) = pool.drain()?;
        if slots.is_empty() {
            return Ok(());
        }
        let handle = self.require_handle()?;

        let mut result = Ok(());
        let disabling = self.enabled().remove(&port);
        let pending = disabling
            && self
                .issue(handle, Command::PortDisable(port))
                .unwrap_or_else(|err| {
                    warn!(component = %self.name, port, "port disable failed: {err}");
                    result = Err(err);
                    false
                });

        // The pool is already empty, so every header is freed regardless.
        let count = slots.len();
        for slot in slots {
            if let Err(err) = self.driver.free_buffer(handle, pool_port, slot.header) {
                warn!(component = %self.name, port = pool_port, "freeing buffer failed: {err}");
                if result.is_ok() {
                    result = Err(err);
                }
            }
            match slot.memory {
                Memory::Driver => {}
                Memory::Caller(memory) => drop(memory),
            }
        }

        if wait && pending {
            self.complete(CommandKind::PortDisable, port)?;
        }
        debug!(component = %self.name, port = pool_port, count, "buffers freed");
        result
    }

    /// Takes an empty input buffer, waiting up to `timeout`.
    ///
    /// `None` means no buffer was free in time or the pool is flushing; it
    /// is the normal "not yet" answer in a streaming loop.
    pub fn acquire_input_buffer(&self, timeout: Duration) -> Option<Buffer> {
        self.handle?;
        self.shared.input.acquire(timeout)
    }

    /// Takes a filled output buffer, waiting up to `timeout`.
    pub fn acquire_output_buffer(&self, timeout: Duration) -> Option<Buffer> {
        self.handle?;
        self.shared.output.acquire(timeout)
    }

    /// Hands a filled input buffer to the driver for consumption.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the buffer is not from this component's
    ///   input pool
    /// - The driver's refusal, in which case the buffer is back in the
    ///   availability queue
    pub fn submit_filled(&self, buffer: Buffer) -> Result<()> {
        let handle = self.require_handle()?;
        let index = buffer.index();
        let header = self.shared.input.begin_submit(buffer)?;
        trace!(component = %self.name, index, "empty this buffer");
        self.driver
            .empty_this_buffer(handle, header)
            .inspect_err(|err| {
                self.shared.input.reclaim(header);
                warn!(component = %self.name, index, "input buffer refused: {err}");
            })
    }

    /// Hands an output buffer to the driver for filling.
    ///
    /// Same contract as [`Component::submit_filled`], on the output pool.
    pub fn request_fill(&self, buffer: Buffer) -> Result<()> {
        let handle = self.require_handle()?;
        let index = buffer.index();
        let header = self.shared.output.begin_submit(buffer)?;
        trace!(component = %self.name, index, "fill this buffer");
        self.driver
            .fill_this_buffer(handle, header)
            .inspect_err(|err| {
                self.shared.output.reclaim(header);
                warn!(component = %self.name, index, "output buffer refused: {err}");
            })
    }

    /// Bytes across all input buffers.
    pub fn input_buffer_size(&self) -> usize {
        self.shared.input.total_bytes()
    }

    pub fn output_buffer_size(&self) -> usize {
        self.shared.output.total_bytes()
    }

    /// Bytes across the input buffers currently available.
    pub fn input_buffer_space(&self) -> usize {
        self.shared.input.available_bytes()
    }

    pub fn output_buffer_space(&self) -> usize {
        self.shared.output.available_bytes()
    }

    pub fn input_stats(&self) -> PoolStats {
        self.shared.input.stats()
    }

    pub fn output_stats(&self) -> PoolStats {
        self.shared.output.stats()
    }

    /// Waits until the driver has returned every input buffer.
    pub fn wait_for_input_done(&self, timeout: Duration) -> Result<()> {
        self.shared.input.wait_until_settled(timeout)
    }

    pub fn wait_for_output_done(&self, timeout: Duration) -> Result<()> {
        self.shared.output.wait_until_settled(timeout)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("input_port", &self.input_port)
            .field("output_port", &self.output_port)
            .finish_non_exhaustive()
    }
}

impl Drop for Component {
    /// Releases the driver handle if the component was not closed
    /// explicitly.
    fn drop(&mut self) {
        if let Err(err) = self.deinitialise() {
            error!("Failed to release component '{}': {err}", self.name);
        }
    }
}

fn bytes_of<T: omx_sys::Structure>(value: &T) -> &[u8] {
    // SAFETY: `Structure` types are plain `repr(C)` data.
    unsafe { std::slice::from_raw_parts((value as *const T).cast::<u8>(), size_of::<T>()) }
}

fn bytes_of_mut<T: omx_sys::Structure>(value: &mut T) -> &mut [u8] {
    // SAFETY: as above; any byte pattern written back is valid C data.
    unsafe { std::slice::from_raw_parts_mut((value as *mut T).cast::<u8>(), size_of::<T>()) }
}
