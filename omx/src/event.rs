// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous notifications and the log waiters consume them from.
//!
//! The driver posts events from its own callback context. Control threads
//! block in [`EventLog::wait_for_event`] or [`EventLog::wait_for_command`]
//! until a matching entry shows up, an error is reported, or the timeout
//! expires.

use std::{
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use tracing::{trace, warn};

use crate::{Error, ErrorCode, Result, config, driver::CommandKind};

/// Pending entries kept before the oldest ones are dropped.
pub const MAX_PENDING_EVENTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CmdComplete,
    Error,
    Mark,
    PortSettingsChanged,
    BufferFlag,
    Other(u32),
}

impl EventKind {
    pub fn from_raw(raw: omx_sys::EventType) -> Self {
        match raw {
            omx_sys::OMX_EventCmdComplete => EventKind::CmdComplete,
            omx_sys::OMX_EventError => EventKind::Error,
            omx_sys::OMX_EventMark => EventKind::Mark,
            omx_sys::OMX_EventPortSettingsChanged => EventKind::PortSettingsChanged,
            omx_sys::OMX_EventBufferFlag => EventKind::BufferFlag,
            other => EventKind::Other(other),
        }
    }

    pub fn as_raw(self) -> omx_sys::EventType {
        match self {
            EventKind::CmdComplete => omx_sys::OMX_EventCmdComplete,
            EventKind::Error => omx_sys::OMX_EventError,
            EventKind::Mark => omx_sys::OMX_EventMark,
            EventKind::PortSettingsChanged => omx_sys::OMX_EventPortSettingsChanged,
            EventKind::BufferFlag => omx_sys::OMX_EventBufferFlag,
            EventKind::Other(raw) => raw,
        }
    }
}

/// One notification: its kind and the two data words that came with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    pub kind: EventKind,
    pub data1: u32,
    pub data2: u32,
}

impl Event {
    pub fn new(kind: EventKind, data1: u32, data2: u32) -> Self {
        Self { kind, data1, data2 }
    }

    pub fn command_complete(kind: CommandKind, param: u32) -> Self {
        Self::new(EventKind::CmdComplete, kind.as_raw(), param)
    }

    pub fn error(code: ErrorCode, data2: u32) -> Self {
        Self::new(EventKind::Error, code.0, data2)
    }

    /// A same-state error whose second word marks the request as already
    /// satisfied.
    pub fn is_satisfied_same_state(&self) -> bool {
        self.kind == EventKind::Error
            && ErrorCode(self.data1) == ErrorCode::SAME_STATE
            && self.data2 == 1
    }
}

/// Mutex-protected record of pending notifications with blocking lookup.
///
/// Identical entries collapse to the most recent one. Any entry that ends a
/// wait is removed, so an error event is delivered to exactly one waiter.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
    posted: Condvar,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records an event and wakes every waiter.
    pub fn post(&self, event: Event) {
        let mut events = self.lock();
        events.retain(|pending| *pending != event);
        if events.len() >= MAX_PENDING_EVENTS {
            let dropped = events.remove(0);
            warn!(?dropped, "event log full, dropping oldest entry");
        }
        trace!(?event, "event posted");
        events.push(event);
        drop(events);
        self.posted.notify_all();
    }

    /// Waits for an event of the given kind.
    ///
    /// # Errors
    ///
    /// - The error carried by the first pending error event, unless it is a
    ///   satisfied same-state report, which ends the wait successfully
    /// - [`Error::Timeout`] if nothing matched within `timeout`
    pub fn wait_for_event(&self, kind: EventKind, timeout: Duration) -> Result<()> {
        self.wait_for(timeout, |event| event.kind == kind)
    }

    /// Waits for the completion of a command with the given parameter.
    ///
    /// Error handling is the same as [`EventLog::wait_for_event`].
    pub fn wait_for_command(
        &self,
        kind: CommandKind,
        param: u32,
        timeout: Duration,
    ) -> Result<()> {
        let expected = Event::command_complete(kind, param);
        self.wait_for(timeout, |event| *event == expected)
    }

    fn wait_for(&self, timeout: Duration, matches: impl Fn(&Event) -> bool) -> Result<()> {
        let deadline = config::deadline(timeout);
        let mut events = self.lock();
        loop {
            let found = events
                .iter()
                .position(|event| event.kind == EventKind::Error || matches(event));
            if let Some(position) = found {
                let event = events.remove(position);
                if event.kind != EventKind::Error || event.is_satisfied_same_state() {
                    return Ok(());
                }
                return Err(Error::from_event_code(event.data1));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            events = match self.posted.wait_timeout(events, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A copy of the pending entries, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock().clone()
    }
}
