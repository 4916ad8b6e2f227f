//! Cloning an instance for asynchronous execution
//!
//! Every asynchronous invocation path (launched tasks, wait-group tasks,
//! ticker and timer callbacks, worker jobs and worker error handlers) runs
//! on an instance produced here.

use super::instance::{Vm, VmId};
use crate::vm::{VmError, VmResult};
use std::sync::Arc;

impl Vm {
    /// Produce an isolated child instance
    ///
    /// The child shares the program and filesystem capability, owns a copy
    /// of the current global slots, inherits the ceilings, the trust flag and
    /// the consumed step count, and gets a forked execution context whose
    /// data-store handle is reopened against the same store.
    ///
    /// Fails when the step budget is already exhausted.
    pub fn clone_for_async(&self) -> VmResult<Vm> {
        if let Some(max) = self.limits.max_steps {
            if self.steps >= max {
                return Err(VmError::StepLimit(max));
            }
        }

        let mut child = Vm {
            id: VmId::new(),
            program: Arc::clone(&self.program),
            globals: self.globals.clone(),
            limits: self.limits.clone(),
            steps: 0,
            allocations: 0,
            frames: 0,
            filesystem: self.filesystem.clone(),
            trusted: self.trusted,
            context: self.context.fork(),
            worker_defaults: self.worker_defaults,
        };
        child.add_steps(self.steps)?;

        tracing::trace!(
            parent = self.id.as_u64(),
            child = child.id.as_u64(),
            steps = child.steps,
            "cloned instance"
        );
        Ok(child)
    }
}
