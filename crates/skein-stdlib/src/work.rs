//! `sync.newWorker` and `sync.newJob`
//!
//! A script job is a property bag (`idTask`, `params`, `timeout`,
//! `workFunc`, `errorFunc`). Adding it to a worker snapshots the adding
//! instance; the work function runs on that snapshot with `params` as its
//! only argument. Error handlers run on a fresh clone of the instance that
//! installed them, receiving `(params, error)`.

use crate::args;
use parking_lot::Mutex;
use skein_engine::vm::scheduler::{ErrorHandler, Job, JobFailure, Worker, MAX_QUEUE_SIZE};
use skein_engine::vm::{Arity, ErrorObject, NativeFunctionRegistry, NativeObject};
use skein_engine::{Callable, Permission, Value, Vm, VmError, VmResult};
use std::sync::Arc;
use std::time::Duration;

/// Register `sync.newWorker` and `sync.newJob`
pub fn register_work(registry: &mut NativeFunctionRegistry) {
    registry.register("sync.newWorker", Arity::Range(0, 1), |vm, args| {
        vm.require(Permission::TRUSTED)?;
        let queue_size = match args::opt_int("sync.newWorker", args, 0)? {
            None => vm.worker_defaults().queue_size,
            Some(n) if n > 0 && n as u64 <= MAX_QUEUE_SIZE as u64 => n as usize,
            Some(n) => {
                return Err(VmError::argument(format!(
                    "sync.newWorker: queue size must be between 1 and {}, got {}",
                    MAX_QUEUE_SIZE, n
                )))
            }
        };
        Ok(Value::object(WorkerObject {
            worker: Worker::new(queue_size)?,
            error_func: Mutex::new(None),
        }))
    });

    registry.register("sync.newJob", Arity::Exact(0), |_vm, _args| {
        Ok(Value::object(JobObject::default()))
    });
}

/// Build an error handler that runs `callable` on a clone of `vm`
fn error_handler(vm: &Vm, callable: Callable) -> VmResult<ErrorHandler> {
    let seed = Arc::new(Mutex::new(vm.clone_for_async()?));
    Ok(Arc::new(move |failure: &JobFailure| {
        let mut child = seed.lock().clone_for_async()?;
        let error = ErrorObject::value(failure.error.clone());
        callable.invoke(&mut child, &[failure.params.clone(), error])?;
        Ok(())
    }))
}

/// Script worker (`sync.Worker`)
///
/// The pool is stopped when the last reference is dropped.
#[derive(Debug)]
pub struct WorkerObject {
    worker: Arc<Worker>,
    error_func: Mutex<Option<Callable>>,
}

impl WorkerObject {
    /// The engine worker
    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    fn add(&self, job: &Value, vm: &Vm) -> VmResult<()> {
        let job = job.downcast_ref::<JobObject>().ok_or_else(|| {
            VmError::argument(format!(
                "sync.Worker.add: expected a job object, got {}",
                job.type_name()
            ))
        })?;
        let spec = job.spec.lock().clone();
        let work_func = spec
            .work_func
            .ok_or_else(|| VmError::argument("sync.Worker.add: invalid workFunc"))?;

        let mut runner = vm.clone_for_async()?;
        let params = spec.params.clone();
        let mut engine_job = Job::new(move || {
            work_func.invoke(&mut runner, &[params])?;
            Ok(())
        })
        .with_params(spec.params)
        .with_timeout(vm.worker_defaults().job_timeout)
        .with_timeout(spec.timeout);
        if let Some(id) = spec.id_task {
            engine_job = engine_job.with_id(id);
        }
        if let Some(error_func) = spec.error_func {
            engine_job = engine_job.with_error_handler(error_handler(vm, error_func)?);
        }

        self.worker.add(engine_job)
    }
}

impl Drop for WorkerObject {
    fn drop(&mut self) {
        self.worker.stop();
    }
}

impl NativeObject for WorkerObject {
    fn type_name(&self) -> &'static str {
        "sync.Worker"
    }

    fn call_method(&self, name: &str, args: &[Value], vm: &mut Vm) -> VmResult<Value> {
        match name {
            "add" => {
                let job = args::one_arg(self.type_name(), name, args)?;
                self.add(job, vm)?;
                Ok(Value::Null)
            }
            "start" => {
                args::no_args(self.type_name(), name, args)?;
                self.worker.start()?;
                Ok(Value::Null)
            }
            "stop" => {
                args::no_args(self.type_name(), name, args)?;
                self.worker.stop();
                Ok(Value::Null)
            }
            _ => Err(VmError::UnknownMethod {
                type_name: self.type_name(),
                method: name.to_string(),
            }),
        }
    }

    fn get_property(&self, name: &str, _vm: &Vm) -> VmResult<Value> {
        match name {
            "isRunning" => Ok(Value::Bool(self.worker.is_running())),
            "errorFunc" => Ok(self
                .error_func
                .lock()
                .as_ref()
                .map(Callable::to_value)
                .unwrap_or(Value::Null)),
            "queued" => Ok(Value::Int(self.worker.queued() as i64)),
            _ => Ok(Value::Undefined),
        }
    }

    fn set_property(&self, name: &str, value: Value, vm: &mut Vm) -> VmResult<()> {
        match name {
            "errorFunc" if value.is_nullish() => {
                *self.error_func.lock() = None;
                self.worker.set_error_handler(None);
                Ok(())
            }
            "errorFunc" => {
                let callable = args::callable(vm, "sync.Worker.errorFunc", &value)?;
                let handler = error_handler(vm, callable.clone())?;
                *self.error_func.lock() = Some(callable);
                self.worker.set_error_handler(Some(handler));
                Ok(())
            }
            _ => Err(VmError::ReadOnlyProperty(name.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct JobSpec {
    id_task: Option<i64>,
    params: Value,
    /// Zero means the worker default
    timeout: Duration,
    work_func: Option<Callable>,
    error_func: Option<Callable>,
}

/// Script job (`sync.Job`)
#[derive(Debug, Default)]
pub struct JobObject {
    spec: Mutex<JobSpec>,
}

fn callable_property(callable: &Option<Callable>) -> Value {
    callable.as_ref().map(Callable::to_value).unwrap_or(Value::Null)
}

impl NativeObject for JobObject {
    fn type_name(&self) -> &'static str {
        "sync.Job"
    }

    fn get_property(&self, name: &str, _vm: &Vm) -> VmResult<Value> {
        let spec = self.spec.lock();
        match name {
            "idTask" => Ok(spec.id_task.map(Value::Int).unwrap_or(Value::Null)),
            "params" => Ok(spec.params.clone()),
            "timeout" => Ok(Value::Int(spec.timeout.as_nanos() as i64)),
            "workFunc" => Ok(callable_property(&spec.work_func)),
            "errorFunc" => Ok(callable_property(&spec.error_func)),
            _ => Ok(Value::Undefined),
        }
    }

    fn set_property(&self, name: &str, value: Value, vm: &mut Vm) -> VmResult<()> {
        match name {
            "idTask" => {
                let id = value.as_int().ok_or_else(|| {
                    VmError::argument(format!(
                        "sync.Job.idTask: expected int, got {}",
                        value.type_name()
                    ))
                })?;
                self.spec.lock().id_task = Some(id);
            }
            "params" => self.spec.lock().params = value,
            "timeout" => {
                self.spec.lock().timeout = args::duration("sync.Job.timeout", &value)?;
            }
            "workFunc" => {
                let callable = args::callable(vm, "sync.Job.workFunc", &value)?;
                self.spec.lock().work_func = Some(callable);
            }
            "errorFunc" if value.is_nullish() => self.spec.lock().error_func = None,
            "errorFunc" => {
                let callable = args::callable(vm, "sync.Job.errorFunc", &value)?;
                self.spec.lock().error_func = Some(callable);
            }
            _ => return Err(VmError::ReadOnlyProperty(name.to_string())),
        }
        Ok(())
    }
}
