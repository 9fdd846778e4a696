// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Driver-level bindings between an output port and an input port.

use tracing::{debug, error, warn};

use crate::{
    Component, Error, Result,
    driver::{CommandKind, State},
    event::EventKind,
};

#[derive(Debug, Clone, Copy)]
struct Endpoints<'a> {
    source: &'a Component,
    source_port: u32,
    destination: &'a Component,
    destination_port: u32,
}

/// A tunnel from one component's output port to another component's input
/// port.
///
/// Data moves across an established tunnel inside the driver, without
/// application buffers. The tunnel borrows both components, so neither can
/// be torn down while it exists; dropping the tunnel deestablishes it.
///
/// The handshake toggles the port enable state of both ends, so buffers
/// for any other port of the two components are allocated only after
/// [`Tunnel::establish`] returns.
///
/// # Examples
///
/// ```no_run
/// # use omx::{Component, Tunnel};
/// # fn example(camera: &Component, encoder: &Component) -> Result<(), omx::Error> {
/// let mut tunnel = Tunnel::bind(camera, 71, encoder, encoder.input_port());
/// tunnel.establish(false)?;
///
/// encoder.allocate_output_buffers(false)?;
/// encoder.run()?;
/// camera.run()?;
/// // ...
/// tunnel.deestablish(false)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Tunnel<'a> {
    endpoints: Option<Endpoints<'a>>,
    established: bool,
    /// A command was issued since the last teardown.
    dirty: bool,
    /// A port-settings-changed event was awaited on establishment.
    port_settings_changed: bool,
}

impl<'a> Tunnel<'a> {
    /// Creates a tunnel without endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tunnel bound to the given ports.
    pub fn bind(
        source: &'a Component,
        source_port: u32,
        destination: &'a Component,
        destination_port: u32,
    ) -> Self {
        Self {
            endpoints: Some(Endpoints {
                source,
                source_port,
                destination,
                destination_port,
            }),
            established: false,
            dirty: false,
            port_settings_changed: false,
        }
    }

    /// Binds the tunnel's endpoints. Nothing is sent to the driver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] while the current binding has
    /// commands outstanding; deestablish it first.
    pub fn init(
        &mut self,
        source: &'a Component,
        source_port: u32,
        destination: &'a Component,
        destination_port: u32,
    ) -> Result<()> {
        if self.dirty {
            return Err(Error::InvalidState(
                "tunnel must be deestablished before it is rebound".to_string(),
            ));
        }
        *self = Self::bind(source, source_port, destination, destination_port);
        Ok(())
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn source(&self) -> Option<(&'a Component, u32)> {
        self.endpoints.map(|ends| (ends.source, ends.source_port))
    }

    pub fn destination(&self) -> Option<(&'a Component, u32)> {
        self.endpoints
            .map(|ends| (ends.destination, ends.destination_port))
    }

    fn endpoints(&self) -> Result<Endpoints<'a>> {
        self.endpoints
            .ok_or_else(|| Error::InvalidState("tunnel has no endpoints".to_string()))
    }

    /// Runs the connect handshake.
    ///
    /// The steps run in a fixed order the hardware depends on:
    ///
    /// 1. A Loaded source is moved to Idle.
    /// 2. With `expect_port_settings_changed`, the source's
    ///    port-settings-changed event is awaited.
    /// 3. Source and destination ports are disabled.
    /// 4. The ports are bound at the driver level.
    /// 5. Both ports are enabled.
    /// 6. The destination's enable completion is awaited, then the
    ///    destination is moved to Idle if it was Loaded before that wait.
    /// 7. The source's enable completion is awaited.
    ///
    /// Establishing an established tunnel does nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] without endpoints or if either component
    ///   has no handle
    /// - The first driver error or timeout; the handshake stops there and
    ///   already issued commands are not rolled back
    pub fn establish(&mut self, expect_port_settings_changed: bool) -> Result<()> {
        let ends = self.endpoints()?;
        if self.established {
            return Ok(());
        }
        let Endpoints {
            source,
            source_port,
            destination,
            destination_port,
        } = ends;
        let source_handle = source.require_handle()?;
        let destination_handle = destination.require_handle()?;
        debug!(
            source = source.name(),
            source_port,
            destination = destination.name(),
            destination_port,
            "establishing tunnel"
        );
        self.dirty = true;

        if source.state() == State::Loaded {
            source.set_state(State::Idle)?;
        }
        if expect_port_settings_changed {
            source.wait_for_event(EventKind::PortSettingsChanged, source.timeouts().event)?;
        }

        source.disable_port(source_port, false)?;
        destination.disable_port(destination_port, false)?;

        source.driver().setup_tunnel(
            source_handle,
            source_port,
            Some((destination_handle, destination_port)),
        )?;

        source.enable_port(source_port, false)?;
        destination.enable_port(destination_port, false)?;

        let destination_was_loaded = destination.state() == State::Loaded;
        destination.wait_for_command(
            CommandKind::PortEnable,
            destination_port,
            destination.timeouts().command,
        )?;
        if destination_was_loaded {
            destination.set_state(State::Idle)?;
        }
        source.wait_for_command(CommandKind::PortEnable, source_port, source.timeouts().command)?;

        self.port_settings_changed = expect_port_settings_changed;
        self.established = true;
        Ok(())
    }

    /// Runs the disconnect handshake.
    ///
    /// Teardown is best effort: port disable failures are logged, and an
    /// unbind refused with "incorrect state operation" (a component that
    /// already stopped) is accepted. Unless `no_wait` is set, a
    /// port-settings-changed event expected at establishment is awaited
    /// first so the teardown does not race renegotiation.
    ///
    /// Does nothing on a tunnel that never issued a command.
    ///
    /// # Errors
    ///
    /// Returns the first unbind error other than "incorrect state
    /// operation". Both ends are unbound regardless.
    pub fn deestablish(&mut self, no_wait: bool) -> Result<()> {
        let Some(ends) = self.endpoints else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let Endpoints {
            source,
            source_port,
            destination,
            destination_port,
        } = ends;
        debug!(
            source = source.name(),
            source_port,
            destination = destination.name(),
            destination_port,
            "deestablishing tunnel"
        );

        if self.port_settings_changed
            && !no_wait
            && let Err(err) =
                source.wait_for_event(EventKind::PortSettingsChanged, source.timeouts().event)
        {
            warn!(source = source.name(), "port settings wait before teardown: {err}");
        }

        if let Err(err) = source.disable_port(source_port, false) {
            warn!(source = source.name(), source_port, "disable failed: {err}");
        }
        if let Err(err) = destination.disable_port(destination_port, false) {
            warn!(
                destination = destination.name(),
                destination_port, "disable failed: {err}"
            );
        }

        let mut result = Ok(());
        for (component, port) in [(source, source_port), (destination, destination_port)] {
            let Some(handle) = component.handle() else {
                continue;
            };
            match component.driver().setup_tunnel(handle, port, None) {
                Ok(()) => {}
                Err(err) if err.is_incorrect_state_operation() => {
                    debug!(component = component.name(), port, "unbind refused, already stopped");
                }
                Err(err) => {
                    warn!(component = component.name(), port, "unbind failed: {err}");
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }

        self.established = false;
        self.dirty = false;
        self.port_settings_changed = false;
        result
    }

    /// Flushes both tunnelled ports and waits for both completions.
    ///
    /// Failures are logged, never returned.
    pub fn flush(&self) {
        let Some(ends) = self.endpoints else {
            return;
        };
        for (component, port) in [
            (ends.source, ends.source_port),
            (ends.destination, ends.destination_port),
        ] {
            if let Err(err) = component.flush_port(port) {
                warn!(component = component.name(), port, "tunnel flush failed: {err}");
            }
        }
    }
}

impl Drop for Tunnel<'_> {
    /// Deestablishes the tunnel if it still has commands outstanding.
    fn drop(&mut self) {
        if self.dirty
            && let Err(error) = self.deestablish(false)
        {
            error!("Failed to deestablish tunnel: {error}");
        }
    }
}
