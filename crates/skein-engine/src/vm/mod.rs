//! Virtual machine instances, script values and the concurrency bridge

pub mod interpreter;
pub mod native_registry;
pub mod object;
pub mod options;
pub mod permissions;
pub mod program;
pub mod scheduler;
pub mod sync;
pub mod value;

use std::time::Duration;

pub use interpreter::{
    Database, DirFileSystem, ExecContext, FileSystem, ResourceLimits, Store, Transaction, Vm,
    VmId,
};
pub use native_registry::{Arity, NativeFn, NativeFunction, NativeFunctionRegistry};
pub use object::{ErrorObject, NativeObject};
pub use options::{ConfigError, EngineConfig, VmOptions, WorkerDefaults};
pub use permissions::Permission;
pub use program::{Function, FunctionBody, Program, ProgramBuilder};
pub use value::{Callable, Closure, FunctionIndex, Value};

/// VM execution errors
///
/// Every error is `Clone` so a single failure can be handed to a script
/// error handler and still be logged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VmError {
    /// A required permission is absent
    #[error("Unauthorized: missing permission '{0}'")]
    Authorization(String),

    /// Wrong arity or argument type at a call boundary
    #[error("Argument error: {0}")]
    Argument(String),

    /// Send on a closed channel, or a second close
    #[error("{0}")]
    ClosedChannel(&'static str),

    /// A worker job exceeded its allotted duration
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// Executed step budget exceeded
    #[error("Step limit reached: {0}")]
    StepLimit(u64),

    /// Step counter overflowed (corrupt budget)
    #[error("Step limit overflow")]
    StepOverflow,

    /// Allocation budget exceeded
    #[error("Max allocations reached: {0}")]
    AllocationLimit(u64),

    /// Call depth exceeded
    #[error("Max call frames reached: {0}")]
    FrameLimit(usize),

    /// Function index outside the program's function table
    #[error("Invalid function index: {0}")]
    UnknownFunction(usize),

    /// Native function name not registered
    #[error("Unknown native function: {0}")]
    UnknownNative(String),

    /// Method not supported by a native object
    #[error("{type_name} has no method '{method}'")]
    UnknownMethod {
        /// Script-visible type name of the receiver
        type_name: &'static str,
        /// Requested method
        method: String,
    },

    /// Property is read-only or does not exist
    #[error("Readonly or undefined property: {0}")]
    ReadOnlyProperty(String),

    /// Global slot index out of range
    #[error("Invalid global slot: {0}")]
    InvalidGlobal(usize),

    /// Backing store failure
    #[error("Store error: {0}")]
    Store(String),

    /// A task or job body panicked
    #[error("Panic: {0}")]
    Panic(String),

    /// Error raised by script code
    #[error("{0}")]
    Runtime(String),
}

impl VmError {
    /// Create a runtime (script-raised) error
    pub fn runtime(message: impl Into<String>) -> Self {
        VmError::Runtime(message.into())
    }

    /// Create an argument error
    pub fn argument(message: impl Into<String>) -> Self {
        VmError::Argument(message.into())
    }

    /// Taxonomy class exposed to scripts as `error.kind`
    pub fn kind(&self) -> &'static str {
        match self {
            VmError::Authorization(_) => "AuthorizationError",
            VmError::Argument(_) => "ArgumentError",
            VmError::ClosedChannel(_) => "ClosedChannelError",
            VmError::Timeout(_) => "TimeoutError",
            VmError::StepLimit(_)
            | VmError::StepOverflow
            | VmError::AllocationLimit(_)
            | VmError::FrameLimit(_) => "LimitError",
            VmError::UnknownFunction(_)
            | VmError::UnknownNative(_)
            | VmError::UnknownMethod { .. }
            | VmError::ReadOnlyProperty(_)
            | VmError::InvalidGlobal(_) => "ReferenceError",
            VmError::Store(_) => "StoreError",
            VmError::Panic(_) => "PanicError",
            VmError::Runtime(_) => "Error",
        }
    }

    /// Check for a worker timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, VmError::Timeout(_))
    }
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;
