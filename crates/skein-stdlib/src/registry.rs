//! Symbolic native function registry for the stdlib
//!
//! Registers every stdlib native function by symbolic name (e.g.
//! "sync.newChannel", "time.after") into a `NativeFunctionRegistry` that a
//! program is then built with.

use skein_engine::NativeFunctionRegistry;
use std::sync::Arc;

/// Register all stdlib native functions into the given registry
pub fn register_stdlib(registry: &mut NativeFunctionRegistry) {
    crate::sync::register_sync(registry);
    crate::work::register_work(registry);
    crate::time::register_time(registry);
}

/// A registry holding every stdlib native function
pub fn stdlib_registry() -> Arc<NativeFunctionRegistry> {
    let mut registry = NativeFunctionRegistry::new();
    register_stdlib(&mut registry);
    Arc::new(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stdlib_names() {
        let registry = stdlib_registry();
        assert_eq!(
            registry.names(),
            vec![
                "launch",
                "sync.newChannel",
                "sync.newJob",
                "sync.newMutex",
                "sync.newTicker",
                "sync.newTimer",
                "sync.newWaitGroup",
                "sync.newWorker",
                "sync.select",
                "time.after",
            ]
        );
    }
}
