//! Skein Standard Library
//!
//! Script-facing surface of the concurrency bridge: the `launch`, `sync.*`
//! and `time.after` native functions and the objects they hand out.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod args;
pub mod registry;
pub mod sync;
pub mod time;
pub mod work;

pub use registry::{register_stdlib, stdlib_registry};
