//! Argument validation shared by the native functions

use skein_engine::vm::sync::Channel;
use skein_engine::{Callable, Value, Vm, VmError, VmResult};
use std::sync::Arc;
use std::time::Duration;

use crate::sync::ChannelObject;

/// Method taking no arguments
pub(crate) fn no_args(type_name: &str, method: &str, args: &[Value]) -> VmResult<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(VmError::argument(format!(
            "{}.{}: expected 0 args, got {}",
            type_name,
            method,
            args.len()
        )))
    }
}

/// Method taking exactly one argument
pub(crate) fn one_arg<'a>(type_name: &str, method: &str, args: &'a [Value]) -> VmResult<&'a Value> {
    match args {
        [value] => Ok(value),
        _ => Err(VmError::argument(format!(
            "{}.{}: expected 1 arg, got {}",
            type_name,
            method,
            args.len()
        ))),
    }
}

/// Optional integer argument (absent, null or undefined is `None`)
pub(crate) fn opt_int(name: &str, args: &[Value], index: usize) -> VmResult<Option<i64>> {
    match args.get(index) {
        None | Some(Value::Null) | Some(Value::Undefined) => Ok(None),
        Some(Value::Int(n)) => Ok(Some(*n)),
        Some(other) => Err(VmError::argument(format!(
            "{}: expected argument {} to be int, got {}",
            name,
            index + 1,
            other.type_name()
        ))),
    }
}

/// Optional boolean argument (absent, null or undefined is `false`)
pub(crate) fn opt_bool(name: &str, args: &[Value], index: usize) -> VmResult<bool> {
    match args.get(index) {
        None | Some(Value::Null) | Some(Value::Undefined) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(VmError::argument(format!(
            "{}: expected argument {} to be bool, got {}",
            name,
            index + 1,
            other.type_name()
        ))),
    }
}

/// Non-negative duration in nanoseconds
pub(crate) fn duration(name: &str, value: &Value) -> VmResult<Duration> {
    match value {
        Value::Int(n) if *n >= 0 => Ok(Duration::from_nanos(*n as u64)),
        Value::Int(n) => Err(VmError::argument(format!(
            "{}: negative duration {}",
            name, n
        ))),
        other => Err(VmError::argument(format!(
            "{}: expected a duration, got {}",
            name,
            other.type_name()
        ))),
    }
}

/// Callable argument of this instance's program
pub(crate) fn callable(vm: &Vm, name: &str, value: &Value) -> VmResult<Callable> {
    vm.callable(value)
        .map_err(|e| VmError::argument(format!("{}: {}", name, e)))
}

/// Channel argument
pub(crate) fn channel(name: &str, value: &Value) -> VmResult<Arc<Channel>> {
    value
        .downcast_ref::<ChannelObject>()
        .map(|c| Arc::clone(c.channel()))
        .ok_or_else(|| {
            VmError::argument(format!(
                "{}: expected a channel, got {}",
                name,
                value.type_name()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_args() {
        let args = [Value::Int(3), Value::Null, Value::Bool(true)];
        assert_eq!(opt_int("f", &args, 0).unwrap(), Some(3));
        assert_eq!(opt_int("f", &args, 1).unwrap(), None);
        assert_eq!(opt_int("f", &args, 9).unwrap(), None);
        assert!(opt_int("f", &args, 2).is_err());

        assert!(opt_bool("f", &args, 2).unwrap());
        assert!(!opt_bool("f", &args, 1).unwrap());
        assert!(opt_bool("f", &args, 0).is_err());
    }

    #[test]
    fn test_duration() {
        assert_eq!(
            duration("f", &Value::Int(1_000_000)).unwrap(),
            Duration::from_millis(1)
        );
        assert!(duration("f", &Value::Int(-1)).is_err());
        assert_eq!(
            duration("f", &Value::str("1s")).unwrap_err().to_string(),
            "Argument error: f: expected a duration, got string"
        );
    }

    #[test]
    fn test_channel_arg() {
        let ch = ChannelObject::value(Arc::new(Channel::new(1)));
        assert!(channel("f", &ch).is_ok());
        assert!(channel("f", &Value::Int(1)).is_err());
    }
}
