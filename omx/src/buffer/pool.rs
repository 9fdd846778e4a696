// SPDX-FileCopyrightText: 2025 2025 Contributors to the OMX pipeline core project.
// SPDX-License-Identifier: Apache-2.0

//! Per-port buffer pool with a blocking availability queue.

use std::{
    collections::{BTreeSet, VecDeque},
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use tracing::{trace, warn};

use crate::{
    Error, Result,
    buffer::{Buffer, HeaderPtr, Memory, Ownership},
    config,
    driver::{Direction, PortRequirements},
};

/// Counters describing where the buffers of a pool currently are.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers allocated on the port.
    pub allocated: usize,
    /// Buffers waiting in the availability queue.
    pub available: usize,
    /// Buffers owned by the driver.
    pub in_flight: usize,
}

impl PoolStats {
    /// Buffers currently held by the application.
    pub fn held(&self) -> usize {
        self.allocated
            .saturating_sub(self.available)
            .saturating_sub(self.in_flight)
    }
}

/// One allocated buffer as recorded by the pool.
#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) header: HeaderPtr,
    pub(crate) memory: Memory,
}

impl Slot {
    fn ownership(&self) -> Ownership {
        match self.memory {
            Memory::Driver => Ownership::Driver,
            Memory::Caller(_) => Ownership::Caller,
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    port: u32,
    requirements: PortRequirements,
    slots: Vec<Slot>,
    available: VecDeque<usize>,
    in_flight: BTreeSet<usize>,
    /// Sticky until the pool is repopulated; fails every acquire.
    flushing: bool,
    /// Set while the owning component tears down; completions are ignored.
    exiting: bool,
    /// Bumped on every reset so stale descriptors cannot requeue.
    generation: u64,
}

impl PoolState {
    fn enqueue(&mut self, index: usize) -> bool {
        if index >= self.slots.len() || self.available.contains(&index) {
            return false;
        }
        self.available.push_back(index);
        true
    }
}

/// Buffers of one port plus the FIFO of those available to the application.
///
/// Every allocated buffer is in exactly one place: the availability queue,
/// the driver, or the application's hands.
#[derive(Debug)]
pub struct BufferPool {
    direction: Direction,
    state: Mutex<PoolState>,
    /// Signalled when a buffer is queued or a flush starts.
    returned: Condvar,
    /// Signalled on every change waiters of [`BufferPool::wait_until_settled`]
    /// care about.
    settled: Condvar,
}

impl BufferPool {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            state: Mutex::new(PoolState::default()),
            returned: Condvar::new(),
            settled: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn port(&self) -> u32 {
        self.lock().port
    }

    pub fn requirements(&self) -> PortRequirements {
        self.lock().requirements
    }

    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    pub fn is_flushing(&self) -> bool {
        self.lock().flushing
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            allocated: state.slots.len(),
            available: state.available.len(),
            in_flight: state.in_flight.len(),
        }
    }

    /// Bytes across all allocated buffers.
    pub fn total_bytes(&self) -> usize {
        let state = self.lock();
        state.slots.len() * state.requirements.size as usize
    }

    /// Bytes across the buffers currently in the availability queue.
    pub fn available_bytes(&self) -> usize {
        let state = self.lock();
        state.available.len() * state.requirements.size as usize
    }

    /// Prepares an empty pool for a new allocation on `port`.
    pub(crate) fn reset(&self, port: u32, requirements: PortRequirements) -> Result<()> {
        let mut state = self.lock();
        if !state.slots.is_empty() {
            return Err(Error::InvalidState(format!(
                "port {} already has {} buffers allocated",
                state.port,
                state.slots.len()
            )));
        }
        state.port = port;
        state.requirements = requirements;
        state.available.clear();
        state.in_flight.clear();
        state.flushing = false;
        state.exiting = false;
        state.generation += 1;
        Ok(())
    }

    /// Records a freshly allocated buffer and queues it as available.
    pub(crate) fn insert(&self, header: HeaderPtr, memory: Memory) {
        let mut state = self.lock();
        let index = state.slots.len();
        state.slots.push(Slot { header, memory });
        state.available.push_back(index);
        drop(state);
        self.returned.notify_one();
        self.settled.notify_all();
    }

    /// Index the next inserted buffer will get.
    pub(crate) fn next_index(&self) -> usize {
        self.lock().slots.len()
    }

    /// Takes the oldest available buffer, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout, and immediately once a flush has started,
    /// even if buffers are queued.
    pub fn acquire(self: &Arc<Self>, timeout: Duration) -> Option<Buffer> {
        let deadline = config::deadline(timeout);
        let mut state = self.lock();
        loop {
            if state.flushing {
                return None;
            }
            if let Some(index) = state.available.pop_front() {
                let slot = &state.slots[index];
                let buffer = Buffer::new(
                    self.clone(),
                    slot.header,
                    index,
                    state.generation,
                    state.port,
                    slot.ownership(),
                );
                trace!(port = state.port, index, "buffer acquired");
                return Some(buffer);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = match self.returned.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Marks `buffer` as owned by the driver and returns its header.
    pub(crate) fn begin_submit(&self, buffer: Buffer) -> Result<HeaderPtr> {
        if !buffer.belongs_to(self) {
            return Err(Error::InvalidState(format!(
                "buffer {} does not belong to the {:?} pool",
                buffer.index(),
                self.direction
            )));
        }
        let mut state = self.lock();
        if buffer.generation() != state.generation {
            drop(state);
            return Err(Error::InvalidState(
                "buffer outlived the allocation it came from".to_string(),
            ));
        }
        let (header, index) = buffer.into_submitted();
        state.in_flight.insert(index);
        Ok(header)
    }

    /// Completion path: the driver hands a buffer back.
    ///
    /// Ignored while the owning component is tearing down.
    pub(crate) fn release(&self, header: HeaderPtr) {
        let index = header.slot_index();
        let mut state = self.lock();
        if state.flushing && state.exiting {
            return;
        }
        let known = state.slots.get(index).is_some_and(|slot| slot.header == header);
        if !known || !state.in_flight.remove(&index) {
            warn!(
                port = state.port,
                index, "completion for a buffer the pool does not track"
            );
            return;
        }
        state.enqueue(index);
        drop(state);
        self.returned.notify_one();
        self.settled.notify_all();
    }

    /// Returns a buffer the driver refused to take.
    pub(crate) fn reclaim(&self, header: HeaderPtr) {
        let index = header.slot_index();
        let mut state = self.lock();
        if state.in_flight.remove(&index) {
            state.enqueue(index);
            drop(state);
            self.returned.notify_one();
            self.settled.notify_all();
        }
    }

    /// A descriptor was dropped without being submitted.
    pub(crate) fn restore(&self, index: usize, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation
            && !state.in_flight.contains(&index)
            && state.enqueue(index)
        {
            drop(state);
            self.returned.notify_one();
            self.settled.notify_all();
        }
    }

    /// Fails every current and future acquire until the pool is reset.
    pub fn begin_flush(&self) {
        self.lock().flushing = true;
        self.returned.notify_all();
        self.settled.notify_all();
    }

    /// Starts a flush and stops accepting completions.
    pub(crate) fn begin_exit(&self) {
        let mut state = self.lock();
        state.flushing = true;
        state.exiting = true;
        drop(state);
        self.returned.notify_all();
        self.settled.notify_all();
    }

    /// Flushes and empties the pool, handing the slots to the caller for
    /// release.
    ///
    /// Every waiter in [`BufferPool::acquire`] returns `None` afterwards. An
    /// empty pool is only flagged as flushing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`], leaving the pool untouched, while the
    /// application still holds descriptors: their headers must outlive them.
    pub(crate) fn drain(&self) -> Result<(u32, Vec<Slot>)> {
        let mut state = self.lock();
        let held = state
            .slots
            .len()
            .saturating_sub(state.available.len())
            .saturating_sub(state.in_flight.len());
        if held > 0 {
            return Err(Error::InvalidState(format!(
                "{held} buffers of port {} are still held by the application",
                state.port
            )));
        }
        state.flushing = true;
        state.available.clear();
        state.in_flight.clear();
        state.generation += 1;
        let slots = std::mem::take(&mut state.slots);
        let port = state.port;
        drop(state);
        self.returned.notify_all();
        self.settled.notify_all();
        Ok((port, slots))
    }

    /// Waits until every allocated buffer is back in the availability queue.
    ///
    /// Returns immediately on an empty or flushing pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if buffers are still out after `timeout`.
    pub fn wait_until_settled(&self, timeout: Duration) -> Result<()> {
        let deadline = config::deadline(timeout);
        let mut state = self.lock();
        loop {
            if state.flushing || state.available.len() == state.slots.len() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            state = match self.settled.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}
