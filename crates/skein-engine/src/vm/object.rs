//! Native (host) objects exposed to scripts
//!
//! Host objects are reached through methods and properties. Every object
//! lives behind an `Arc`, so handing one to a launched task shares it by
//! identity.

use crate::vm::value::Value;
use crate::vm::{Vm, VmError, VmResult};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Downcasting support for native objects
pub trait AsAny {
    /// Borrow as `Any`
    fn as_any(&self) -> &dyn Any;

    /// Convert a shared handle into `Any`
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A host object reachable from scripts
pub trait NativeObject: AsAny + fmt::Debug + Send + Sync {
    /// Script-visible type name (e.g. "sync.Channel")
    fn type_name(&self) -> &'static str;

    /// Call a method on the object
    fn call_method(&self, name: &str, _args: &[Value], _vm: &mut Vm) -> VmResult<Value> {
        Err(VmError::UnknownMethod {
            type_name: self.type_name(),
            method: name.to_string(),
        })
    }

    /// Read a property (`Undefined` when absent)
    fn get_property(&self, _name: &str, _vm: &Vm) -> VmResult<Value> {
        Ok(Value::Undefined)
    }

    /// Write a property
    fn set_property(&self, name: &str, _value: Value, _vm: &mut Vm) -> VmResult<()> {
        Err(VmError::ReadOnlyProperty(name.to_string()))
    }
}

/// A `VmError` handed to script code (e.g. a worker error handler)
#[derive(Debug)]
pub struct ErrorObject {
    error: VmError,
}

impl ErrorObject {
    /// Wrap an error as a script value
    pub fn value(error: VmError) -> Value {
        Value::object(ErrorObject { error })
    }

    /// The wrapped error
    pub fn error(&self) -> &VmError {
        &self.error
    }
}

impl NativeObject for ErrorObject {
    fn type_name(&self) -> &'static str {
        "errors.Error"
    }

    fn get_property(&self, name: &str, _vm: &Vm) -> VmResult<Value> {
        match name {
            "message" => Ok(Value::str(self.error.to_string())),
            "kind" => Ok(Value::str(self.error.kind())),
            _ => Ok(Value::Undefined),
        }
    }
}
