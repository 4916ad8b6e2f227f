//! Periodic and one-shot callbacks
//!
//! Each ticker or timer owns a thread that waits on a condvar deadline.
//! The creating instance is cloned once at creation into a seed; every
//! firing clones the seed again and runs the callback on that clone on its
//! own thread, so a slow callback never delays or coalesces later ticks.

use super::launcher::{dispatch, Origin};
use super::spawn_named;
use crate::vm::interpreter::Vm;
use crate::vm::permissions::Permission;
use crate::vm::value::Callable;
use crate::vm::{VmError, VmResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Seed instance and callback shared by every firing
struct Firing {
    seed: Mutex<Vm>,
    callback: Callable,
}

impl Firing {
    fn new(vm: &Vm, callback: Callable) -> VmResult<Self> {
        vm.require(Permission::CONCURRENCY)?;
        Ok(Self {
            seed: Mutex::new(vm.clone_for_async()?),
            callback,
        })
    }

    fn fire(&self) {
        let seed = self.seed.lock();
        if let Err(e) = dispatch(&seed, self.callback.clone(), Vec::new(), Origin::Timer) {
            tracing::warn!(target: "skein::timer", kind = e.kind(), "callback not dispatched: {}", e);
        }
    }
}

struct TickerState {
    stopped: bool,
    ticks: u64,
}

struct TickerShared {
    state: Mutex<TickerState>,
    notify: Condvar,
    interval: Duration,
    firing: Firing,
}

/// Periodic callback
///
/// Dropping the handle does not stop the ticker; only `stop` does.
pub struct Ticker {
    shared: Arc<TickerShared>,
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("interval", &self.shared.interval)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Ticker {
    /// Start a ticker firing every `interval`
    pub fn start(vm: &Vm, interval: Duration, callback: Callable) -> VmResult<Self> {
        if interval.is_zero() {
            return Err(VmError::argument("ticker interval must be positive"));
        }
        let shared = Arc::new(TickerShared {
            state: Mutex::new(TickerState {
                stopped: false,
                ticks: 0,
            }),
            notify: Condvar::new(),
            interval,
            firing: Firing::new(vm, callback)?,
        });

        let looped = Arc::clone(&shared);
        spawn_named("skein-ticker".to_string(), move || looped.run_loop())?;
        tracing::debug!(target: "skein::timer", ?interval, "ticker started");
        Ok(Self { shared })
    }

    /// Prevent further ticks; an in-flight callback is not interrupted
    pub fn stop(&self) {
        self.shared.state.lock().stopped = true;
        self.shared.notify.notify_one();
    }

    /// Check whether `stop` was called
    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().stopped
    }

    /// Ticks fired so far
    pub fn ticks(&self) -> u64 {
        self.shared.state.lock().ticks
    }

    /// Tick interval
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }
}

impl TickerShared {
    fn run_loop(&self) {
        let mut next = Instant::now() + self.interval;
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                break;
            }
            let now = Instant::now();
            if now < next {
                self.notify.wait_until(&mut state, next);
                continue;
            }

            state.ticks += 1;
            drop(state);
            self.firing.fire();

            next += self.interval;
            let now = Instant::now();
            if next <= now {
                next = now + self.interval;
            }
            state = self.state.lock();
        }
        tracing::debug!(target: "skein::timer", "ticker stopped");
    }
}

struct TimerState {
    deadline: Option<Instant>,
    /// Set when the handle is dropped
    orphaned: bool,
    fired: u64,
}

struct TimerShared {
    state: Mutex<TimerState>,
    notify: Condvar,
    firing: Firing,
}

/// One-shot callback
///
/// Dropping an armed timer lets it fire once; its thread then exits.
pub struct Timer {
    shared: Arc<TimerShared>,
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl Timer {
    /// Arm a timer firing once after `duration`
    pub fn start(vm: &Vm, duration: Duration, callback: Callable) -> VmResult<Self> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                deadline: Some(Instant::now() + duration),
                orphaned: false,
                fired: 0,
            }),
            notify: Condvar::new(),
            firing: Firing::new(vm, callback)?,
        });

        let looped = Arc::clone(&shared);
        spawn_named("skein-timer".to_string(), move || looped.run_loop())?;
        tracing::debug!(target: "skein::timer", ?duration, "timer armed");
        Ok(Self { shared })
    }

    /// Rearm to fire once after `duration`
    ///
    /// Returns true if the timer was still armed.
    pub fn reset(&self, duration: Duration) -> bool {
        let mut state = self.shared.state.lock();
        let was_armed = state.deadline.is_some();
        state.deadline = Some(Instant::now() + duration);
        self.shared.notify.notify_one();
        was_armed
    }

    /// Disarm the timer
    ///
    /// Returns true if the timer was still armed.
    pub fn stop(&self) -> bool {
        let mut state = self.shared.state.lock();
        let was_armed = state.deadline.take().is_some();
        self.shared.notify.notify_one();
        was_armed
    }

    /// Check whether the timer will fire
    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().deadline.is_some()
    }

    /// Times the timer has fired
    pub fn fired(&self) -> u64 {
        self.shared.state.lock().fired
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shared.state.lock().orphaned = true;
        self.shared.notify.notify_one();
    }
}

impl TimerShared {
    fn run_loop(&self) {
        let mut state = self.state.lock();
        loop {
            let deadline = state.deadline;
            match deadline {
                None if state.orphaned => break,
                None => self.notify.wait(&mut state),
                Some(at) if Instant::now() < at => {
                    self.notify.wait_until(&mut state, at);
                }
                Some(_) => {
                    state.deadline = None;
                    state.fired += 1;
                    drop(state);
                    self.firing.fire();
                    state = self.state.lock();
                }
            }
        }
        tracing::debug!(target: "skein::timer", "timer released");
    }
}
