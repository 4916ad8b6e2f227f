//! Bounded worker pool with per-job timeout
//!
//! A single dispatch loop takes jobs off a bounded queue and runs each one
//! on a detached thread, racing it against the job's timeout. A job that
//! loses the race is reported as a `TimeoutError` and left running; its
//! result is discarded.
//!
//! A panicking job body is reported as a `PanicError` only when panics
//! unwind. Under the release profile (`panic = "abort"`) it ends the process.

use super::spawn_named;
use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};
use crossbeam::channel::{
    bounded, Receiver, RecvTimeoutError, Select, Sender, TryRecvError, TrySendError,
};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Body of a job
pub type JobBody = Box<dyn FnOnce() -> VmResult<()> + Send>;

/// Handler for failed or timed-out jobs
///
/// A handler that itself fails panics the dispatch loop.
pub type ErrorHandler = Arc<dyn Fn(&JobFailure) -> VmResult<()> + Send + Sync>;

/// A unit of work for a `Worker`
pub struct Job {
    id: Option<i64>,
    params: Value,
    timeout: Duration,
    work: JobBody,
    on_error: Option<ErrorHandler>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("timeout", &self.timeout)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl Job {
    /// Create a job with a one minute timeout
    pub fn new(work: impl FnOnce() -> VmResult<()> + Send + 'static) -> Self {
        Self {
            id: None,
            params: Value::Null,
            timeout: Duration::from_secs(60),
            work: Box::new(work),
            on_error: None,
        }
    }

    /// Set the task id
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the parameter value handed to error handlers
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Set the timeout (zero keeps the current one)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Handle this job's failure instead of the pool-wide handler
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// Task id
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A failed job as seen by an error handler
#[derive(Debug, Clone)]
pub struct JobFailure {
    /// Task id of the job
    pub id: Option<i64>,
    /// Parameters of the job
    pub params: Value,
    /// Why the job failed
    pub error: VmError,
}

/// Largest accepted queue capacity
///
/// The queue buffer is allocated when the worker is created.
pub const MAX_QUEUE_SIZE: usize = 1 << 16;

struct WorkerState {
    /// Set by `start`, cleared by `stop`
    running: bool,
    /// A dispatch loop thread is alive, possibly finishing a job after `stop`
    looping: bool,
    /// Incremented per spawned loop
    generation: u64,
}

/// Bounded job queue with a single dispatch loop
pub struct Worker {
    jobs_tx: Sender<Job>,
    jobs_rx: Receiver<Job>,
    queue_size: usize,
    /// Wakes an idle dispatch loop so it re-reads `state`
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    state: Mutex<WorkerState>,
    error_handler: RwLock<Option<ErrorHandler>>,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("queue_size", &self.queue_size)
            .field("queued", &self.queued())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Worker {
    /// Create a stopped worker with a queue of `queue_size` jobs
    pub fn new(queue_size: usize) -> VmResult<Arc<Self>> {
        if queue_size == 0 || queue_size > MAX_QUEUE_SIZE {
            return Err(VmError::argument(format!(
                "worker queue size must be between 1 and {}, got {}",
                MAX_QUEUE_SIZE, queue_size
            )));
        }
        let (jobs_tx, jobs_rx) = bounded(queue_size);
        let (wake_tx, wake_rx) = bounded(1);
        Ok(Arc::new(Self {
            jobs_tx,
            jobs_rx,
            queue_size,
            wake_tx,
            wake_rx,
            state: Mutex::new(WorkerState {
                running: false,
                looping: false,
                generation: 0,
            }),
            error_handler: RwLock::new(None),
        }))
    }

    /// Queue capacity
    pub fn queue_size(&self) -> usize {
        self.queue_size
    }

    /// Jobs waiting in the queue
    pub fn queued(&self) -> usize {
        self.jobs_rx.len()
    }

    /// Check whether the dispatch loop is running
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Set or clear the pool-wide error handler
    pub fn set_error_handler(&self, handler: Option<ErrorHandler>) {
        *self.error_handler.write() = handler;
    }

    /// Enqueue a job without blocking the caller
    ///
    /// When the queue is full a helper thread completes the enqueue.
    pub fn add(&self, job: Job) -> VmResult<()> {
        match self.jobs_tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) => {
                tracing::debug!(target: "skein::worker", "queue full, deferring enqueue");
                let jobs = self.jobs_tx.clone();
                spawn_named("skein-worker-enqueue".to_string(), move || {
                    // Fails only once the worker itself is gone.
                    let _ = jobs.send(job);
                })?;
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(VmError::runtime("worker queue closed")),
        }
    }

    /// Start the dispatch loop (no-op when running)
    ///
    /// A loop still finishing its job after `stop` is resumed instead of
    /// spawning a second one.
    pub fn start(self: &Arc<Self>) -> VmResult<()> {
        let mut state = self.state.lock();
        if state.running {
            return Ok(());
        }
        state.running = true;
        if state.looping {
            tracing::debug!(target: "skein::worker", generation = state.generation, "worker resumed");
            return Ok(());
        }

        state.generation += 1;
        let generation = state.generation;
        let worker = Arc::clone(self);
        if let Err(e) = spawn_named("skein-worker".to_string(), move || {
            worker.dispatch_loop(generation)
        }) {
            state.running = false;
            return Err(e);
        }
        state.looping = true;
        tracing::debug!(target: "skein::worker", generation, "worker started");
        Ok(())
    }

    /// Stop the dispatch loop after its current job (no-op when stopped)
    ///
    /// Undispatched jobs stay queued for the next `start`.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.running {
            state.running = false;
            // A full slot already holds a pending wake-up.
            let _ = self.wake_tx.try_send(());
            tracing::debug!(target: "skein::worker", "worker stopping");
        }
    }

    fn dispatch_loop(&self, generation: u64) {
        let mut exit = LoopExit {
            worker: self,
            generation,
            unwinding: true,
        };
        loop {
            let mut ready = Select::new();
            ready.recv(&self.wake_rx);
            ready.recv(&self.jobs_rx);
            ready.ready();
            let _ = self.wake_rx.try_recv();

            // Dequeue under the state lock so no job is taken after `stop`.
            let job = {
                let mut state = self.state.lock();
                if !state.running {
                    state.looping = false;
                    exit.unwinding = false;
                    return;
                }
                match self.jobs_rx.try_recv() {
                    Ok(job) => job,
                    Err(TryRecvError::Empty) => continue,
                    Err(TryRecvError::Disconnected) => {
                        state.running = false;
                        state.looping = false;
                        exit.unwinding = false;
                        return;
                    }
                }
            };
            self.run_job(job);
        }
    }

    fn run_job(&self, job: Job) {
        let Job {
            id,
            params,
            timeout,
            work,
            on_error,
        } = job;

        let (done_tx, done_rx) = bounded::<VmResult<()>>(1);
        let spawned = spawn_named("skein-job".to_string(), move || {
            // The dispatch loop may have given up on this job.
            let _ = done_tx.send(work());
        });

        let outcome = match spawned {
            Err(e) => Err(e),
            Ok(_) => match done_rx.recv_timeout(timeout) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => Err(VmError::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => Err(VmError::Panic("job panicked".to_string())),
            },
        };

        if let Err(error) = outcome {
            self.report(JobFailure { id, params, error }, on_error);
        }
    }

    fn report(&self, failure: JobFailure, on_error: Option<ErrorHandler>) {
        let handler = on_error.or_else(|| self.error_handler.read().clone());
        match handler {
            Some(handler) => {
                if let Err(e) = handler(&failure) {
                    panic!(
                        "worker error handler failed: {} (while handling: {})",
                        e, failure.error
                    );
                }
            }
            None => tracing::error!(
                target: "skein::worker",
                job = ?failure.id,
                kind = failure.error.kind(),
                "unhandled job error: {}",
                failure.error
            ),
        }
    }
}

/// Resets the lifecycle flags when a dispatch loop unwinds
struct LoopExit<'a> {
    worker: &'a Worker,
    generation: u64,
    unwinding: bool,
}

impl Drop for LoopExit<'_> {
    fn drop(&mut self) {
        if self.unwinding {
            let mut state = self.worker.state.lock();
            state.running = false;
            state.looping = false;
        }
        tracing::debug!(target: "skein::worker", generation = self.generation, "dispatch loop exited");
    }
}
