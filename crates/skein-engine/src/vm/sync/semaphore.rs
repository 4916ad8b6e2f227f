//! Counting semaphore with RAII permits

use parking_lot::{Condvar, Mutex as ParkingLotMutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a Semaphore
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SemaphoreId(u64);

impl SemaphoreId {
    /// Create a new unique semaphore ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SemaphoreId {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when creating a Semaphore
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SemaphoreError {
    /// Invalid permit count
    #[error("Invalid permit count: {0}")]
    InvalidCount(usize),
}

/// Counting semaphore
///
/// Permits are handed out as `SemaphorePermit` guards; dropping the guard
/// returns the permit and wakes one blocked acquirer.
#[derive(Debug)]
pub struct Semaphore {
    id: SemaphoreId,
    permits: ParkingLotMutex<usize>,
    max_permits: usize,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore with `permits` permits (at least one)
    pub fn new(permits: usize) -> Result<Self, SemaphoreError> {
        if permits == 0 {
            return Err(SemaphoreError::InvalidCount(permits));
        }
        Ok(Self {
            id: SemaphoreId::new(),
            permits: ParkingLotMutex::new(permits),
            max_permits: permits,
            available: Condvar::new(),
        })
    }

    /// Get the semaphore ID
    pub fn id(&self) -> SemaphoreId {
        self.id
    }

    /// Get the current number of available permits
    pub fn available_permits(&self) -> usize {
        *self.permits.lock()
    }

    /// Get the maximum number of permits
    pub fn max_permits(&self) -> usize {
        self.max_permits
    }

    /// Block until a permit is available
    pub fn acquire(self: &Arc<Self>) -> SemaphorePermit {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
        SemaphorePermit {
            semaphore: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut permits = self.permits.lock();
        if *permits < self.max_permits {
            *permits += 1;
        }
        self.available.notify_one();
    }
}

/// A held permit; released on drop
#[derive(Debug)]
pub struct SemaphorePermit {
    semaphore: Arc<Semaphore>,
}

impl SemaphorePermit {
    /// The semaphore this permit belongs to
    pub fn semaphore(&self) -> &Arc<Semaphore> {
        &self.semaphore
    }
}

impl Drop for SemaphorePermit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_zero_permits_rejected() {
        assert_eq!(Semaphore::new(0).unwrap_err(), SemaphoreError::InvalidCount(0));
    }

    #[test]
    fn test_acquire_release() {
        let sem = Arc::new(Semaphore::new(2).unwrap());
        let a = sem.acquire();
        let b = sem.acquire();
        assert_eq!(sem.available_permits(), 0);

        drop(a);
        assert_eq!(sem.available_permits(), 1);
        drop(b);
        assert_eq!(sem.available_permits(), sem.max_permits());
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let sem = Arc::new(Semaphore::new(1).unwrap());
        let held = sem.acquire();

        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || {
                let _permit = sem.acquire();
            })
        };

        thread::sleep(Duration::from_millis(30));
        assert!(!waiter.is_finished());

        drop(held);
        waiter.join().unwrap();
        assert_eq!(sem.available_permits(), 1);
    }
}
