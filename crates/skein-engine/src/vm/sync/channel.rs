//! Blocking FIFO channel of script values
//!
//! A channel with capacity 0 is a synchronous handoff: the value sits in a
//! single slot and `send` returns only once a receiver has taken it. A
//! buffered channel holds up to `capacity` values. Closing is one-shot;
//! buffered values stay receivable after close, an un-taken handoff value is
//! discarded.

use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};
use parking_lot::{Condvar, Mutex as ParkingLotMutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a Channel
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Generate a new unique ChannelId
    pub fn new() -> Self {
        static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);
        ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

/// Wake-up signal registered by a blocked select
#[derive(Debug, Default)]
pub(super) struct SelectSignal {
    fired: ParkingLotMutex<bool>,
    cond: Condvar,
}

impl SelectSignal {
    pub(super) fn notify(&self) {
        *self.fired.lock() = true;
        self.cond.notify_one();
    }

    /// Block until notified, consuming the notification
    pub(super) fn wait(&self) {
        let mut fired = self.fired.lock();
        while !*fired {
            self.cond.wait(&mut fired);
        }
        *fired = false;
    }
}

struct ChannelInner {
    /// Declared capacity (0 = handoff)
    capacity: usize,
    queue: VecDeque<Value>,
    closed: bool,
    /// Values ever enqueued
    sent: u64,
    /// Values ever taken
    received: u64,
    watchers: Vec<Arc<SelectSignal>>,
}

impl ChannelInner {
    fn slots(&self) -> usize {
        self.capacity.max(1)
    }

    fn wake_watchers(&self) {
        for watcher in &self.watchers {
            watcher.notify();
        }
    }
}

/// Channel shared between tasks
pub struct Channel {
    id: ChannelId,
    inner: ParkingLotMutex<ChannelInner>,
    /// Senders waiting for a free slot
    not_full: Condvar,
    /// Receivers waiting for a value
    not_empty: Condvar,
    /// Handoff senders waiting for their value to be taken
    taken: Condvar,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("capacity", &inner.capacity)
            .field("length", &inner.queue.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

impl Channel {
    /// Create a channel with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            id: ChannelId::new(),
            inner: ParkingLotMutex::new(ChannelInner {
                capacity,
                queue: VecDeque::new(),
                closed: false,
                sent: 0,
                received: 0,
                watchers: Vec::new(),
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            taken: Condvar::new(),
        }
    }

    /// Get the channel ID
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Buffer capacity
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Buffered values (always 0 for a handoff channel)
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        if inner.capacity == 0 {
            0
        } else {
            inner.queue.len()
        }
    }

    /// Check for an empty buffer
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the channel is closed
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Send a value
    ///
    /// Blocks until a slot is free, and for a handoff channel until a
    /// receiver has taken the value.
    pub fn send(&self, value: Value) -> VmResult<()> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return Err(VmError::ClosedChannel("send on closed channel"));
            }
            if inner.queue.len() < inner.slots() {
                break;
            }
            self.not_full.wait(&mut inner);
        }

        inner.queue.push_back(value);
        inner.sent += 1;
        let ticket = inner.sent;
        self.not_empty.notify_one();
        inner.wake_watchers();

        if inner.capacity == 0 {
            while inner.received < ticket {
                if inner.closed {
                    return Err(VmError::ClosedChannel("send on closed channel"));
                }
                self.taken.wait(&mut inner);
            }
        }
        Ok(())
    }

    /// Receive a value
    ///
    /// Blocks until a value is available. Returns `None` once the channel is
    /// closed and drained.
    pub fn receive(&self) -> Option<Value> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(value) = self.take(&mut inner) {
                return Some(value);
            }
            if inner.closed {
                return None;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Receive without blocking
    pub fn try_receive(&self) -> Option<Value> {
        let mut inner = self.inner.lock();
        self.take(&mut inner)
    }

    /// Close the channel, waking every blocked sender, receiver and select
    pub fn close(&self) -> VmResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(VmError::ClosedChannel("close of closed channel"));
        }
        inner.closed = true;
        if inner.capacity == 0 {
            inner.queue.clear();
        }
        self.not_full.notify_all();
        self.not_empty.notify_all();
        self.taken.notify_all();
        inner.wake_watchers();
        Ok(())
    }

    /// A value is available or the channel is closed
    pub(super) fn is_ready(&self) -> bool {
        let inner = self.inner.lock();
        !inner.queue.is_empty() || inner.closed
    }

    /// Non-blocking receive for select
    ///
    /// `Some(Some(v))` took a value, `Some(None)` closed and drained,
    /// `None` nothing ready.
    pub(super) fn poll(&self) -> Option<Option<Value>> {
        let mut inner = self.inner.lock();
        match self.take(&mut inner) {
            Some(value) => Some(Some(value)),
            None if inner.closed => Some(None),
            None => None,
        }
    }

    pub(super) fn watch(&self, signal: &Arc<SelectSignal>) {
        self.inner.lock().watchers.push(Arc::clone(signal));
    }

    pub(super) fn unwatch(&self, signal: &Arc<SelectSignal>) {
        self.inner
            .lock()
            .watchers
            .retain(|w| !Arc::ptr_eq(w, signal));
    }

    fn take(&self, inner: &mut ChannelInner) -> Option<Value> {
        let value = inner.queue.pop_front()?;
        inner.received += 1;
        self.not_full.notify_one();
        if inner.capacity == 0 {
            self.taken.notify_all();
        }
        Some(value)
    }
}
