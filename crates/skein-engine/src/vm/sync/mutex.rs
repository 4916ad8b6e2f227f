//! Exclusive, non-reentrant mutex

use crate::vm::VmError;
use parking_lot::{Condvar, Mutex as ParkingLotMutex};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a Mutex
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MutexId(u64);

static NEXT_MUTEX_ID: AtomicU64 = AtomicU64::new(1);

impl MutexId {
    /// Generate a new unique MutexId
    pub fn new() -> Self {
        MutexId(NEXT_MUTEX_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for MutexId {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when using a Mutex
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutexError {
    /// Unlock called while the mutex was not held
    #[error("unlock of unlocked mutex")]
    NotLocked(MutexId),
}

impl From<MutexError> for VmError {
    fn from(e: MutexError) -> Self {
        VmError::runtime(e.to_string())
    }
}

/// Exclusive lock shared by any number of tasks
///
/// There is no owner tracking: any caller may unlock a locked mutex, and a
/// caller locking twice without unlocking deadlocks.
pub struct Mutex {
    id: MutexId,
    locked: ParkingLotMutex<bool>,
    released: Condvar,
}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("id", &self.id)
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    /// Create an unlocked mutex
    pub fn new() -> Self {
        Self {
            id: MutexId::new(),
            locked: ParkingLotMutex::new(false),
            released: Condvar::new(),
        }
    }

    /// Get the mutex ID
    pub fn id(&self) -> MutexId {
        self.id
    }

    /// Block until the mutex is acquired
    pub fn lock(&self) {
        let mut locked = self.locked.lock();
        while *locked {
            self.released.wait(&mut locked);
        }
        *locked = true;
    }

    /// Release the mutex, waking one waiter
    pub fn unlock(&self) -> Result<(), MutexError> {
        let mut locked = self.locked.lock();
        if !*locked {
            return Err(MutexError::NotLocked(self.id));
        }
        *locked = false;
        self.released.notify_one();
        Ok(())
    }

    /// Check whether the mutex is held
    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_mutex_id_uniqueness() {
        let id1 = MutexId::new();
        let id2 = MutexId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn test_lock_unlock() {
        let mutex = Mutex::new();
        mutex.lock();
        assert!(mutex.is_locked());

        mutex.unlock().unwrap();
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_unlock_unlocked_fails() {
        let mutex = Mutex::new();
        let err = mutex.unlock().unwrap_err();
        assert_eq!(err, MutexError::NotLocked(mutex.id()));
        assert_eq!(VmError::from(err).to_string(), "unlock of unlocked mutex");
    }

    #[test]
    fn test_contention() {
        let mutex = Arc::new(Mutex::new());
        let counter = Arc::new(ParkingLotMutex::new(0u32));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let mutex = Arc::clone(&mutex);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    mutex.lock();
                    let value = *counter.lock();
                    thread::yield_now();
                    *counter.lock() = value + 1;
                    mutex.unlock().unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*counter.lock(), 800);
    }
}
