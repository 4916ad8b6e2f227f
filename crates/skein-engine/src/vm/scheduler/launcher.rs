//! Fire-and-forget task launch
//!
//! A launched callable runs on a clone of the launching instance, on its
//! own thread. Errors never reach the launcher: they are logged as
//! `UnhandledTaskError`.

use super::spawn_named;
use crate::vm::interpreter::Vm;
use crate::vm::permissions::Permission;
use crate::vm::sync::{SemaphorePermit, WaitGroup, WaitGroupGuard};
use crate::vm::value::{Callable, Value};
use crate::vm::VmResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a launched task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a dispatched invocation came from (selects log target and level)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Launch,
    Timer,
}

/// Launch `callable` on a clone of `vm`
///
/// Requires the concurrency permission.
pub fn launch(vm: &Vm, callable: Callable) -> VmResult<TaskId> {
    vm.require(Permission::CONCURRENCY)?;
    let child = vm.clone_for_async()?;
    spawn_task(child, callable, Vec::new(), Origin::Launch, None, None)
}

/// Launch `callable` on a clone of `vm`, tracked by `group`
///
/// The group counter is incremented before dispatch and decremented when
/// the body finishes, whatever its outcome. A bounded group blocks the
/// caller until a concurrency token is free.
pub fn launch_in_group(vm: &Vm, callable: Callable, group: &Arc<WaitGroup>) -> VmResult<TaskId> {
    vm.require(Permission::CONCURRENCY)?;
    let token = group.acquire_token();
    let child = vm.clone_for_async()?;
    let guard = group.enter();
    spawn_task(child, callable, Vec::new(), Origin::Launch, Some(guard), token)
}

/// Invoke `callable` with `args` on a fresh clone of `seed`, asynchronously
pub(crate) fn dispatch(
    seed: &Vm,
    callable: Callable,
    args: Vec<Value>,
    origin: Origin,
) -> VmResult<TaskId> {
    let child = seed.clone_for_async()?;
    spawn_task(child, callable, args, origin, None, None)
}

fn spawn_task(
    mut vm: Vm,
    callable: Callable,
    args: Vec<Value>,
    origin: Origin,
    guard: Option<WaitGroupGuard>,
    token: Option<SemaphorePermit>,
) -> VmResult<TaskId> {
    let id = TaskId::new();
    spawn_named(format!("skein-task-{}", id.as_u64()), move || {
        // Counter is decremented before the token is returned.
        let _token = token;
        let _guard = guard;

        let span = tracing::debug_span!("task", id = id.as_u64(), vm = vm.id().as_u64());
        let _enter = span.enter();
        tracing::debug!(target: "skein::task", "task started");

        match (callable.invoke(&mut vm, &args), origin) {
            (Ok(_), _) => tracing::debug!(target: "skein::task", "task finished"),
            (Err(e), Origin::Launch) => tracing::error!(
                target: "skein::task",
                class = "UnhandledTaskError",
                kind = e.kind(),
                "{}",
                e
            ),
            (Err(e), Origin::Timer) => tracing::warn!(
                target: "skein::timer",
                class = "UnhandledTaskError",
                kind = e.kind(),
                "{}",
                e
            ),
        }
    })?;
    Ok(id)
}
