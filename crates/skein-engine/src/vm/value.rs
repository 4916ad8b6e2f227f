//! Script values
//!
//! Primitives are stored inline; arrays, maps, closures and native objects
//! are reference types shared by identity. Copying a `Value` never deep-copies
//! a reference type, which is what makes a snapshot of the global slots cheap
//! while keeping explicitly shared objects (mutexes, channels, workers) the
//! same object on both sides of a clone.

use crate::vm::object::{AsAny, NativeObject};
use crate::vm::{Vm, VmError, VmResult};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Index into a program's function table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionIndex(pub usize);

impl FunctionIndex {
    /// Get the raw index
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// A function reference with bound (captured) values
///
/// Invoking a closure passes its bound values first, followed by the
/// call arguments.
#[derive(Debug)]
pub struct Closure {
    function: FunctionIndex,
    bound: Vec<Value>,
}

impl Closure {
    /// Create a closure over `function` with `bound` captured values
    pub fn new(function: FunctionIndex, bound: Vec<Value>) -> Self {
        Self { function, bound }
    }

    /// Target function
    pub fn function(&self) -> FunctionIndex {
        self.function
    }

    /// Captured values
    pub fn bound(&self) -> &[Value] {
        &self.bound
    }
}

/// A script value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// null
    #[default]
    Null,
    /// undefined (missing property, absent map entry)
    Undefined,
    /// Boolean
    Bool(bool),
    /// 64-bit integer (durations are nanoseconds)
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Immutable string
    Str(Arc<str>),
    /// Shared array
    Array(Arc<RwLock<Vec<Value>>>),
    /// Shared string-keyed map
    Map(Arc<RwLock<FxHashMap<String, Value>>>),
    /// Named function reference
    Func(FunctionIndex),
    /// Closure reference
    Closure(Arc<Closure>),
    /// Host object (mutex, channel, worker, ...)
    Object(Arc<dyn NativeObject>),
}

impl Value {
    /// Create a string value
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Create an array value
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Arc::new(RwLock::new(values)))
    }

    /// Create a map value from key/value pairs
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v))
            .collect::<FxHashMap<_, _>>();
        Value::Map(Arc::new(RwLock::new(map)))
    }

    /// Wrap a native object
    pub fn object<T: NativeObject + 'static>(object: T) -> Self {
        Value::Object(Arc::new(object))
    }

    /// Create a closure value
    pub fn closure(function: FunctionIndex, bound: Vec<Value>) -> Self {
        Value::Closure(Arc::new(Closure::new(function, bound)))
    }

    /// Script-visible type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Undefined => "undefined",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Func(_) => "function",
            Value::Closure(_) => "closure",
            Value::Object(obj) => obj.type_name(),
        }
    }

    /// Check for null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check for null or undefined
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Snapshot the elements of an array
    pub fn to_vec(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.read().clone()),
            _ => None,
        }
    }

    /// Look up a key of a map value (`Undefined` when absent)
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Map(map) => Some(map.read().get(key).cloned().unwrap_or(Value::Undefined)),
            _ => None,
        }
    }

    /// Borrow the native object as a concrete type
    pub fn downcast_ref<T: NativeObject + 'static>(&self) -> Option<&T> {
        match self {
            Value::Object(obj) => {
                let obj: &dyn NativeObject = obj.as_ref();
                obj.as_any().downcast_ref::<T>()
            }
            _ => None,
        }
    }

    /// Get a shared handle to the native object as a concrete type
    pub fn downcast_arc<T: NativeObject + 'static>(&self) -> Option<Arc<T>> {
        match self {
            Value::Object(obj) => AsAny::into_any(Arc::clone(obj)).downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Undefined, Value::Undefined) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

/// A uniformly invocable function or closure
#[derive(Debug, Clone)]
pub enum Callable {
    /// Named function reference
    Function(FunctionIndex),
    /// Closure with bound values
    Closure(Arc<Closure>),
}

impl Callable {
    /// Extract a callable from a script value
    pub fn from_value(value: &Value) -> VmResult<Self> {
        match value {
            Value::Func(index) => Ok(Callable::Function(*index)),
            Value::Closure(closure) => Ok(Callable::Closure(Arc::clone(closure))),
            other => Err(VmError::argument(format!(
                "expected a function, got: {}",
                other.type_name()
            ))),
        }
    }

    /// Invoke on the given instance
    pub fn invoke(&self, vm: &mut Vm, args: &[Value]) -> VmResult<Value> {
        match self {
            Callable::Function(index) => vm.run_function(*index, args),
            Callable::Closure(closure) => vm.run_closure(closure, args),
        }
    }

    /// Target function index
    pub fn function(&self) -> FunctionIndex {
        match self {
            Callable::Function(index) => *index,
            Callable::Closure(closure) => closure.function(),
        }
    }

    /// Convert back into a script value
    pub fn to_value(&self) -> Value {
        match self {
            Callable::Function(index) => Value::Func(*index),
            Callable::Closure(closure) => Value::Closure(Arc::clone(closure)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_equality() {
        assert_eq!(Value::Int(7), Value::from(7));
        assert_eq!(Value::str("a"), Value::from("a"));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Null, Value::Undefined);
    }

    #[test]
    fn test_reference_identity() {
        let a = Value::array(vec![Value::Int(1)]);
        let b = a.clone();
        let c = Value::array(vec![Value::Int(1)]);

        assert_eq!(a, b);
        assert_ne!(a, c);

        if let Value::Array(items) = &b {
            items.write().push(Value::Int(2));
        }
        assert_eq!(a.to_vec().map(|v| v.len()), Some(2));
    }

    #[test]
    fn test_map_lookup() {
        let m = Value::map([("index", Value::Int(1)), ("receivedOK", Value::Bool(true))]);
        assert_eq!(m.get("index"), Some(Value::Int(1)));
        assert_eq!(m.get("value"), Some(Value::Undefined));
        assert_eq!(Value::Int(1).get("index"), None);
    }

    #[test]
    fn test_callable_from_value() {
        assert!(matches!(
            Callable::from_value(&Value::Func(FunctionIndex(3))),
            Ok(Callable::Function(FunctionIndex(3)))
        ));

        let closure = Value::closure(FunctionIndex(1), vec![Value::Int(5)]);
        let callable = Callable::from_value(&closure).unwrap();
        assert_eq!(callable.function(), FunctionIndex(1));
        assert_eq!(callable.to_value(), closure);

        let err = Callable::from_value(&Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), "ArgumentError");
    }
}
