//! `time.after`

use crate::args;
use crate::sync::ChannelObject;
use skein_engine::vm::sync::Channel;
use skein_engine::vm::{Arity, NativeFunctionRegistry};
use skein_engine::{Permission, Value, VmError};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

/// Register `time.after`
///
/// `time.after(durationNanos, value?)` returns a channel that receives
/// `value` once after the duration, or the fire time in nanoseconds since
/// the epoch when no value is given.
pub fn register_time(registry: &mut NativeFunctionRegistry) {
    registry.register("time.after", Arity::Range(1, 2), |vm, args| {
        vm.require(Permission::CONCURRENCY)?;
        let delay = args::duration("time.after", &args[0])?;
        let payload = args.get(1).cloned();

        let channel = Arc::new(Channel::new(1));
        let sender = Arc::clone(&channel);
        thread::Builder::new()
            .name("skein-time-after".to_string())
            .spawn(move || {
                thread::sleep(delay);
                let value = payload.unwrap_or_else(now_nanos);
                if let Err(e) = sender.send(value) {
                    tracing::debug!(target: "skein::timer", "time.after: {}", e);
                }
            })
            .map_err(|e| VmError::runtime(format!("time.after: {}", e)))?;

        Ok(ChannelObject::value(channel))
    });
}

fn now_nanos() -> Value {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    Value::Int(nanos)
}
