//! Skein Engine
//!
//! Interpreter instances and the concurrency bridge that lets a
//! single-threaded script instance launch and coordinate concurrent work:
//! - Execution context cloning (one isolated instance per async unit of work)
//! - Task launch (fire-and-forget) and wait groups
//! - Mutexes, channels and a fair multi-way select
//! - Tickers, timers and a bounded worker pool with per-job timeouts

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod vm;

pub use vm::{
    Callable, Closure, EngineConfig, ExecContext, FunctionIndex, NativeFunctionRegistry,
    NativeObject, Permission, Program, ProgramBuilder, ResourceLimits, Value, Vm, VmError,
    VmOptions, VmResult,
};
