//! Interpreter instances and their execution context

mod clone;
mod context;
mod filesystem;
mod instance;
mod limits;

pub use context::{Database, ExecContext, Store, Transaction};
pub use filesystem::{DirFileSystem, FileSystem};
pub use instance::{Vm, VmId};
pub use limits::ResourceLimits;
