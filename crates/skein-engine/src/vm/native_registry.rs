//! Native function registry
//!
//! Libraries register their script-callable functions here by symbolic
//! name (e.g. "sync.newChannel"). A program holds the registry by `Arc`,
//! so every cloned instance dispatches through the same table.

use crate::vm::value::Value;
use crate::vm::{Vm, VmError, VmResult};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A native function handler
pub type NativeFn = Arc<dyn Fn(&mut Vm, &[Value]) -> VmResult<Value> + Send + Sync>;

/// Accepted argument counts of a native function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n` arguments
    Exact(usize),
    /// Between `min` and `max` arguments (inclusive)
    Range(usize, usize),
}

impl Arity {
    /// Validate an argument count
    pub fn check(&self, name: &str, count: usize) -> VmResult<()> {
        match *self {
            Arity::Exact(n) if count != n => Err(VmError::argument(format!(
                "{}: expected {} args, got {}",
                name, n, count
            ))),
            Arity::Range(min, max) if count < min || count > max => {
                Err(VmError::argument(format!(
                    "{}: expected {} to {} args, got {}",
                    name, min, max, count
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A registered native function
#[derive(Clone)]
pub struct NativeFunction {
    name: String,
    arity: Arity,
    handler: NativeFn,
}

impl NativeFunction {
    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accepted argument counts
    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Validate the argument count and invoke the handler
    pub fn call(&self, vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
        self.arity.check(&self.name, args.len())?;
        (self.handler)(vm, args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Registry of native functions indexed by symbolic name
#[derive(Default)]
pub struct NativeFunctionRegistry {
    functions: FxHashMap<String, NativeFunction>,
}

impl NativeFunctionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native function by name
    pub fn register(
        &mut self,
        name: &str,
        arity: Arity,
        handler: impl Fn(&mut Vm, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    ) {
        self.functions.insert(
            name.to_string(),
            NativeFunction {
                name: name.to_string(),
                arity,
                handler: Arc::new(handler),
            },
        );
    }

    /// Get a function by name
    pub fn get(&self, name: &str) -> Option<&NativeFunction> {
        self.functions.get(name)
    }

    /// Check if a function is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for NativeFunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunctionRegistry")
            .field("count", &self.functions.len())
            .finish()
    }
}
