//! Join barrier over launched tasks

use super::semaphore::{Semaphore, SemaphoreError, SemaphorePermit};
use parking_lot::{Condvar, Mutex as ParkingLotMutex};
use std::sync::Arc;

/// Errors that can occur when using a WaitGroup
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitGroupError {
    /// `done` called more often than `add`
    #[error("negative wait group counter")]
    NegativeCounter,
}

/// Counter of outstanding tasks with an optional concurrency bound
///
/// The bound is a token pool fixed at construction: a task must hold a
/// token from before it is dispatched until its body has finished.
#[derive(Debug)]
pub struct WaitGroup {
    counter: ParkingLotMutex<usize>,
    zero: Condvar,
    tokens: Option<Arc<Semaphore>>,
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitGroup {
    /// Create an unbounded wait group
    pub fn new() -> Self {
        Self {
            counter: ParkingLotMutex::new(0),
            zero: Condvar::new(),
            tokens: None,
        }
    }

    /// Create a wait group allowing at most `limit` concurrent bodies
    pub fn with_limit(limit: usize) -> Result<Self, SemaphoreError> {
        Ok(Self {
            tokens: Some(Arc::new(Semaphore::new(limit)?)),
            ..Self::new()
        })
    }

    /// Concurrency bound, if any
    pub fn limit(&self) -> Option<usize> {
        self.tokens.as_ref().map(|t| t.max_permits())
    }

    /// Outstanding tasks
    pub fn count(&self) -> usize {
        *self.counter.lock()
    }

    /// Add `n` outstanding tasks
    pub fn add(&self, n: usize) {
        *self.counter.lock() += n;
    }

    /// Mark one task finished
    pub fn done(&self) -> Result<(), WaitGroupError> {
        let mut counter = self.counter.lock();
        if *counter == 0 {
            return Err(WaitGroupError::NegativeCounter);
        }
        *counter -= 1;
        if *counter == 0 {
            self.zero.notify_all();
        }
        Ok(())
    }

    /// Add one outstanding task, marked done when the guard drops
    pub fn enter(self: &Arc<Self>) -> WaitGroupGuard {
        self.add(1);
        WaitGroupGuard {
            group: Arc::clone(self),
        }
    }

    /// Take a concurrency token, blocking while the bound is saturated
    ///
    /// Returns `None` for an unbounded group.
    pub fn acquire_token(&self) -> Option<SemaphorePermit> {
        self.tokens.as_ref().map(|t| t.acquire())
    }

    /// Block until the counter is zero
    pub fn wait(&self) {
        let mut counter = self.counter.lock();
        while *counter > 0 {
            self.zero.wait(&mut counter);
        }
    }
}

/// One outstanding task; marks it done on drop
#[derive(Debug)]
pub struct WaitGroupGuard {
    group: Arc<WaitGroup>,
}

impl Drop for WaitGroupGuard {
    fn drop(&mut self) {
        if let Err(e) = self.group.done() {
            tracing::error!(target: "skein::task", "{}", e);
        }
    }
}
