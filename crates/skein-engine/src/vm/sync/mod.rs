//! Blocking synchronization primitives
//!
//! Every primitive parks the calling OS thread. Instances never share these
//! by cloning; the script layer hands out `Arc`s so a primitive passed to a
//! launched task is the same object on both sides.

mod channel;
mod mutex;
mod select;
mod semaphore;
mod wait_group;

pub use channel::{Channel, ChannelId};
pub use mutex::{Mutex, MutexError, MutexId};
pub use select::{select, SelectResult};
pub use semaphore::{Semaphore, SemaphoreError, SemaphoreId, SemaphorePermit};
pub use wait_group::{WaitGroup, WaitGroupError, WaitGroupGuard};
