//! Immutable compiled programs
//!
//! A `Program` is produced once and shared by `Arc` across every instance
//! cloned from it. Function bodies are host-provided; each invocation is
//! accounted as one executed step and one call frame by the instance that
//! runs it.

use crate::vm::native_registry::NativeFunctionRegistry;
use crate::vm::permissions::Permission;
use crate::vm::value::{FunctionIndex, Value};
use crate::vm::{Vm, VmError, VmResult};
use std::fmt;
use std::sync::Arc;

/// Body of a program function
pub type FunctionBody = Arc<dyn Fn(&mut Vm, &[Value]) -> VmResult<Value> + Send + Sync>;

/// A program function
#[derive(Clone)]
pub struct Function {
    name: String,
    body: FunctionBody,
}

impl Function {
    /// Function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Function body
    pub fn body(&self) -> &FunctionBody {
        &self.body
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("name", &self.name).finish()
    }
}

/// An immutable compiled program
#[derive(Debug)]
pub struct Program {
    functions: Vec<Function>,
    globals: Vec<String>,
    permissions: Permission,
    natives: Arc<NativeFunctionRegistry>,
}

impl Program {
    /// Start building a program
    pub fn builder() -> ProgramBuilder {
        ProgramBuilder::new()
    }

    /// Look up a function by index
    pub fn function(&self, index: FunctionIndex) -> VmResult<&Function> {
        self.functions
            .get(index.as_usize())
            .ok_or(VmError::UnknownFunction(index.as_usize()))
    }

    /// Find a function index by name
    pub fn function_index(&self, name: &str) -> Option<FunctionIndex> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FunctionIndex)
    }

    /// Number of functions
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Number of global slots
    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    /// Find a global slot by name
    pub fn global_index(&self, name: &str) -> Option<usize> {
        self.globals.iter().position(|g| g == name)
    }

    /// Permissions granted to the program
    pub fn permissions(&self) -> Permission {
        self.permissions
    }

    /// Native function table
    pub fn natives(&self) -> &NativeFunctionRegistry {
        &self.natives
    }
}

/// Builder for `Program`
#[derive(Default)]
pub struct ProgramBuilder {
    functions: Vec<Function>,
    globals: Vec<String>,
    permissions: Permission,
    natives: Option<Arc<NativeFunctionRegistry>>,
}

impl ProgramBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a global slot, returning its index
    pub fn global(&mut self, name: &str) -> usize {
        if let Some(index) = self.globals.iter().position(|g| g == name) {
            return index;
        }
        self.globals.push(name.to_string());
        self.globals.len() - 1
    }

    /// Add a function, returning its index
    pub fn function(
        &mut self,
        name: &str,
        body: impl Fn(&mut Vm, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    ) -> FunctionIndex {
        self.functions.push(Function {
            name: name.to_string(),
            body: Arc::new(body),
        });
        FunctionIndex(self.functions.len() - 1)
    }

    /// Grant permissions
    pub fn permit(&mut self, permissions: Permission) -> &mut Self {
        self.permissions = self.permissions.union(permissions);
        self
    }

    /// Use a native function table
    pub fn natives(&mut self, natives: Arc<NativeFunctionRegistry>) -> &mut Self {
        self.natives = Some(natives);
        self
    }

    /// Finish the program
    pub fn build(self) -> Arc<Program> {
        Arc::new(Program {
            functions: self.functions,
            globals: self.globals,
            permissions: self.permissions,
            natives: self.natives.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let mut b = Program::builder();
        let counter = b.global("counter");
        let again = b.global("counter");
        let other = b.global("other");
        let main = b.function("main", |_, _| Ok(Value::Null));
        let work = b.function("work", |_, args| Ok(args.first().cloned().unwrap_or_default()));
        b.permit(Permission::CONCURRENCY);
        let program = b.build();

        assert_eq!(counter, again);
        assert_eq!(other, 1);
        assert_eq!(program.global_count(), 2);
        assert_eq!(program.global_index("other"), Some(1));
        assert_eq!(program.function_count(), 2);
        assert_eq!(program.function_index("work"), Some(work));
        assert_eq!(program.function(main).unwrap().name(), "main");
        assert!(program.function(FunctionIndex(9)).is_err());
        assert!(program.permissions().contains(Permission::CONCURRENCY));
        assert!(program.natives().is_empty());
    }
}
