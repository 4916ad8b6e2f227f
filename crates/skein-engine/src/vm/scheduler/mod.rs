//! Asynchronous dispatch: task launch, timers and the worker pool
//!
//! Every path here runs script code on an instance produced by
//! `Vm::clone_for_async`, each on its own named OS thread.

pub mod launcher;
mod timer;
mod worker;

pub use launcher::{launch, launch_in_group, TaskId};
pub use timer::{Ticker, Timer};
pub use worker::{ErrorHandler, Job, JobFailure, Worker, MAX_QUEUE_SIZE};

use crate::vm::{VmError, VmResult};
use std::thread::{self, JoinHandle};

/// Spawn a named OS thread, mapping spawn failure to a runtime error
pub(crate) fn spawn_named<F>(name: String, f: F) -> VmResult<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name)
        .spawn(f)
        .map_err(|e| VmError::runtime(format!("failed to spawn thread: {}", e)))
}
