//! Interpreter instance
//!
//! A `Vm` runs on exactly one OS thread at a time. Concurrency is obtained
//! by cloning an instance (`clone_for_async`) and moving the clone to another
//! thread; the program is shared, everything else is owned.

use super::context::ExecContext;
use super::filesystem::FileSystem;
use super::limits::ResourceLimits;
use crate::vm::options::{VmOptions, WorkerDefaults};
use crate::vm::permissions::Permission;
use crate::vm::program::Program;
use crate::vm::value::{Callable, Closure, FunctionIndex, Value};
use crate::vm::{VmError, VmResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for an interpreter instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VmId(u64);

impl VmId {
    /// Generate a new unique instance ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        VmId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for VmId {
    fn default() -> Self {
        Self::new()
    }
}

/// An interpreter instance
#[derive(Debug)]
pub struct Vm {
    pub(super) id: VmId,
    pub(super) program: Arc<Program>,
    pub(super) globals: Vec<Value>,
    pub(super) limits: ResourceLimits,
    pub(super) steps: u64,
    pub(super) allocations: u64,
    pub(super) frames: usize,
    pub(super) filesystem: Option<Arc<dyn FileSystem>>,
    pub(super) trusted: bool,
    pub(super) context: ExecContext,
    pub(super) worker_defaults: WorkerDefaults,
}

impl Vm {
    /// Create a root instance with default options
    pub fn new(program: Arc<Program>) -> Self {
        Self::with_options(program, VmOptions::default())
    }

    /// Create a root instance
    pub fn with_options(program: Arc<Program>, options: VmOptions) -> Self {
        let globals = vec![Value::Null; program.global_count()];
        Self {
            id: VmId::new(),
            program,
            globals,
            limits: options.limits,
            steps: 0,
            allocations: 0,
            frames: 0,
            filesystem: None,
            trusted: options.trusted,
            context: ExecContext::new(&options.locale, &options.timezone),
            worker_defaults: options.worker,
        }
    }

    /// Instance ID
    pub fn id(&self) -> VmId {
        self.id
    }

    /// The shared program
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    // ===== Globals =====

    /// All global slots
    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    /// Read a global slot
    pub fn global(&self, index: usize) -> VmResult<Value> {
        self.globals
            .get(index)
            .cloned()
            .ok_or(VmError::InvalidGlobal(index))
    }

    /// Write a global slot
    pub fn set_global(&mut self, index: usize, value: Value) -> VmResult<()> {
        let slot = self
            .globals
            .get_mut(index)
            .ok_or(VmError::InvalidGlobal(index))?;
        *slot = value;
        Ok(())
    }

    /// Read a global slot by name
    pub fn global_by_name(&self, name: &str) -> Option<Value> {
        self.program
            .global_index(name)
            .and_then(|index| self.globals.get(index).cloned())
    }

    // ===== Permissions =====

    /// Trust flag
    pub fn trusted(&self) -> bool {
        self.trusted
    }

    /// Set the trust flag
    pub fn set_trusted(&mut self, trusted: bool) {
        self.trusted = trusted;
    }

    /// Check a permission
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.trusted || self.program.permissions().allows(permission)
    }

    /// Fail with an authorization error unless `permission` is held
    pub fn require(&self, permission: Permission) -> VmResult<()> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(VmError::Authorization(permission.name().to_string()))
        }
    }

    // ===== Resource accounting =====

    /// Resource ceilings
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Executed steps, including those inherited from ancestors
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Allocation units used by this instance
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Current call depth
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Account `n` executed steps
    pub fn add_steps(&mut self, n: u64) -> VmResult<()> {
        let total = self.steps.checked_add(n).ok_or(VmError::StepOverflow)?;
        if let Some(max) = self.limits.max_steps {
            if total > max {
                return Err(VmError::StepLimit(max));
            }
        }
        self.steps = total;
        Ok(())
    }

    /// Account `n` allocation units
    pub fn add_allocations(&mut self, n: u64) -> VmResult<()> {
        let total = self
            .allocations
            .checked_add(n)
            .ok_or(VmError::AllocationLimit(u64::MAX))?;
        if let Some(max) = self.limits.max_allocations {
            if total > max {
                return Err(VmError::AllocationLimit(max));
            }
        }
        self.allocations = total;
        Ok(())
    }

    // ===== Capabilities =====

    /// Filesystem capability
    pub fn filesystem(&self) -> Option<&Arc<dyn FileSystem>> {
        self.filesystem.as_ref()
    }

    /// Grant a filesystem capability
    pub fn set_filesystem(&mut self, filesystem: Arc<dyn FileSystem>) {
        self.filesystem = Some(filesystem);
    }

    /// Execution context
    pub fn context(&self) -> &ExecContext {
        &self.context
    }

    /// Mutable execution context
    pub fn context_mut(&mut self) -> &mut ExecContext {
        &mut self.context
    }

    /// Worker pool defaults
    pub fn worker_defaults(&self) -> WorkerDefaults {
        self.worker_defaults
    }

    // ===== Invocation =====

    /// Run a program function by name
    pub fn run(&mut self, name: &str, args: &[Value]) -> VmResult<Value> {
        let index = self
            .program
            .function_index(name)
            .ok_or_else(|| VmError::runtime(format!("undefined function: {}", name)))?;
        self.run_function(index, args)
    }

    /// Run a program function
    ///
    /// Each call is one executed step and one call frame.
    pub fn run_function(&mut self, index: FunctionIndex, args: &[Value]) -> VmResult<Value> {
        let body = Arc::clone(self.program.function(index)?.body());
        if let Some(max) = self.limits.max_frames {
            if self.frames >= max {
                return Err(VmError::FrameLimit(max));
            }
        }
        self.add_steps(1)?;

        self.frames += 1;
        let result = body(self, args);
        self.frames -= 1;
        result
    }

    /// Run a closure: bound values first, then `args`
    pub fn run_closure(&mut self, closure: &Closure, args: &[Value]) -> VmResult<Value> {
        if closure.bound().is_empty() {
            return self.run_function(closure.function(), args);
        }
        let mut full = Vec::with_capacity(closure.bound().len() + args.len());
        full.extend_from_slice(closure.bound());
        full.extend_from_slice(args);
        self.run_function(closure.function(), &full)
    }

    /// Resolve a value into a callable of this program
    pub fn callable(&self, value: &Value) -> VmResult<Callable> {
        let callable = Callable::from_value(value)?;
        self.program.function(callable.function())?;
        Ok(callable)
    }

    /// Call a callable value
    pub fn call(&mut self, value: &Value, args: &[Value]) -> VmResult<Value> {
        let callable = self.callable(value)?;
        callable.invoke(self, args)
    }

    /// Call a registered native function
    pub fn call_native(&mut self, name: &str, args: &[Value]) -> VmResult<Value> {
        let program = Arc::clone(&self.program);
        let native = program
            .natives()
            .get(name)
            .ok_or_else(|| VmError::UnknownNative(name.to_string()))?;
        native.call(self, args)
    }

    /// Call a method on a native object
    pub fn call_method(&mut self, receiver: &Value, name: &str, args: &[Value]) -> VmResult<Value> {
        match receiver {
            Value::Object(obj) => {
                let obj = Arc::clone(obj);
                obj.call_method(name, args, self)
            }
            other => Err(VmError::UnknownMethod {
                type_name: other.type_name(),
                method: name.to_string(),
            }),
        }
    }

    /// Read a property of a map or native object
    pub fn get_property(&self, receiver: &Value, name: &str) -> VmResult<Value> {
        match receiver {
            Value::Object(obj) => obj.get_property(name, self),
            Value::Map(map) => Ok(map.read().get(name).cloned().unwrap_or(Value::Undefined)),
            other => Err(VmError::runtime(format!(
                "cannot read property '{}' of {}",
                name,
                other.type_name()
            ))),
        }
    }

    /// Write a property of a map or native object
    pub fn set_property(&mut self, receiver: &Value, name: &str, value: Value) -> VmResult<()> {
        match receiver {
            Value::Object(obj) => {
                let obj = Arc::clone(obj);
                obj.set_property(name, value, self)
            }
            Value::Map(map) => {
                map.write().insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(VmError::ReadOnlyProperty(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> Arc<Program> {
        let mut b = Program::builder();
        b.global("counter");
        b.function("add", |_, args| {
            let a = args.first().and_then(Value::as_int).unwrap_or(0);
            let b = args.get(1).and_then(Value::as_int).unwrap_or(0);
            Ok(Value::Int(a + b))
        });
        b.function("recurse", move |vm, _| {
            let me = vm.program().function_index("recurse").unwrap();
            vm.run_function(me, &[])
        });
        b.function("bump", |vm, _| {
            let n = vm.global(0)?.as_int().unwrap_or(0);
            vm.set_global(0, Value::Int(n + 1))?;
            Ok(Value::Null)
        });
        b.permit(Permission::CONCURRENCY);
        b.build()
    }

    #[test]
    fn test_vm_id_unique() {
        let a = VmId::new();
        let b = VmId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_globals() {
        let mut vm = Vm::new(program());
        assert_eq!(vm.globals(), [Value::Null]);

        vm.run("bump", &[]).unwrap();
        vm.run("bump", &[]).unwrap();
        assert_eq!(vm.global_by_name("counter"), Some(Value::Int(2)));
        assert!(vm.set_global(3, Value::Null).is_err());
    }

    #[test]
    fn test_closure_binds_leading_args() {
        let mut vm = Vm::new(program());
        let add = vm.program().function_index("add").unwrap();
        let closure = Value::closure(add, vec![Value::Int(40)]);

        assert_eq!(vm.call(&closure, &[Value::Int(2)]).unwrap(), Value::Int(42));
        assert_eq!(vm.steps(), 1);
    }

    #[test]
    fn test_step_budget() {
        let options = VmOptions {
            limits: ResourceLimits::with_step_budget(2),
            ..Default::default()
        };
        let mut vm = Vm::with_options(program(), options);

        vm.run("bump", &[]).unwrap();
        vm.run("bump", &[]).unwrap();
        assert_eq!(vm.run("bump", &[]), Err(VmError::StepLimit(2)));
        assert_eq!(vm.steps(), 2);
    }

    #[test]
    fn test_frame_limit() {
        let options = VmOptions {
            limits: ResourceLimits::with_frame_limit(8),
            ..Default::default()
        };
        let mut vm = Vm::with_options(program(), options);

        assert_eq!(vm.run("recurse", &[]), Err(VmError::FrameLimit(8)));
        assert_eq!(vm.frames(), 0);
    }

    #[test]
    fn test_allocation_limit() {
        let options = VmOptions {
            limits: ResourceLimits::with_allocation_limit(10),
            ..Default::default()
        };
        let mut vm = Vm::with_options(program(), options);

        vm.add_allocations(10).unwrap();
        assert_eq!(vm.add_allocations(1), Err(VmError::AllocationLimit(10)));
    }

    #[test]
    fn test_permissions() {
        let mut vm = Vm::new(program());
        assert!(vm.has_permission(Permission::CONCURRENCY));
        assert_eq!(
            vm.require(Permission::CREATE_MUTEX),
            Err(VmError::Authorization("create-mutex".to_string()))
        );

        vm.set_trusted(true);
        assert!(vm.require(Permission::CREATE_MUTEX).is_ok());
        assert!(vm.require(Permission::TRUSTED).is_ok());
    }

    #[test]
    fn test_map_properties() {
        let mut vm = Vm::new(program());
        let map = Value::map([("a", Value::Int(1))]);

        vm.set_property(&map, "b", Value::Int(2)).unwrap();
        assert_eq!(vm.get_property(&map, "b").unwrap(), Value::Int(2));
        assert_eq!(vm.get_property(&map, "z").unwrap(), Value::Undefined);
        assert!(vm.get_property(&Value::Int(1), "a").is_err());
        assert!(vm.call_native("sync.newChannel", &[]).is_err());
    }
}
