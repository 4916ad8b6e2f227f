//! `launch` and the `sync.*` primitives
//!
//! | Native               | Arguments                      | Permission    |
//! |----------------------|--------------------------------|---------------|
//! | `launch`             | callable                       | concurrency   |
//! | `sync.newMutex`      |                                | create-mutex  |
//! | `sync.newChannel`    | buffer?                        | concurrency   |
//! | `sync.select`        | channels, defaultCase?         | concurrency   |
//! | `sync.newWaitGroup`  | concurrency?                   | concurrency   |
//! | `sync.newTicker`     | intervalNanos, callback        | concurrency   |
//! | `sync.newTimer`      | durationNanos, callback        | concurrency   |

use crate::args;
use skein_engine::vm::scheduler::{launch, launch_in_group, Ticker, Timer};
use skein_engine::vm::sync::{select, Channel, Mutex, WaitGroup};
use skein_engine::vm::{Arity, NativeFunctionRegistry, NativeObject};
use skein_engine::{Permission, Value, Vm, VmError, VmResult};
use std::sync::Arc;

/// Register `launch` and the `sync.*` primitives
pub fn register_sync(registry: &mut NativeFunctionRegistry) {
    registry.register("launch", Arity::Exact(1), |vm, args| {
        let callable = args::callable(vm, "launch", &args[0])?;
        launch(vm, callable)?;
        Ok(Value::Null)
    });

    registry.register("sync.newMutex", Arity::Exact(0), |vm, _args| {
        vm.require(Permission::CREATE_MUTEX)?;
        Ok(Value::object(MutexObject::default()))
    });

    registry.register("sync.newChannel", Arity::Range(0, 1), |vm, args| {
        vm.require(Permission::CONCURRENCY)?;
        let capacity = match args::opt_int("sync.newChannel", args, 0)? {
            None => 0,
            Some(n) => usize::try_from(n).map_err(|_| {
                VmError::argument(format!("sync.newChannel: negative buffer size {}", n))
            })?,
        };
        Ok(ChannelObject::value(Arc::new(Channel::new(capacity))))
    });

    registry.register("sync.select", Arity::Range(1, 2), |vm, args| {
        vm.require(Permission::CONCURRENCY)?;
        let items = args[0].to_vec().ok_or_else(|| {
            VmError::argument(format!(
                "sync.select: expected an array of channels, got {}",
                args[0].type_name()
            ))
        })?;
        let channels = items
            .iter()
            .map(|v| args::channel("sync.select", v))
            .collect::<VmResult<Vec<_>>>()?;
        let default_case = args::opt_bool("sync.select", args, 1)?;

        let result = select(&channels, default_case)?;
        let mut entries = vec![
            ("index", Value::Int(result.index as i64)),
            ("receivedOK", Value::Bool(result.received_ok)),
        ];
        if result.index < channels.len() {
            entries.push(("value", result.value.unwrap_or(Value::Null)));
        }
        Ok(Value::map(entries))
    });

    registry.register("sync.newWaitGroup", Arity::Range(0, 1), |vm, args| {
        vm.require(Permission::CONCURRENCY)?;
        let group = match args::opt_int("sync.newWaitGroup", args, 0)? {
            None => WaitGroup::new(),
            Some(n) if n > 0 => {
                let limit = usize::try_from(n)
                    .map_err(|e| VmError::argument(format!("sync.newWaitGroup: {}", e)))?;
                WaitGroup::with_limit(limit)
                    .map_err(|e| VmError::argument(format!("sync.newWaitGroup: {}", e)))?
            }
            Some(n) => {
                return Err(VmError::argument(format!(
                    "sync.newWaitGroup: concurrency must be positive, got {}",
                    n
                )))
            }
        };
        Ok(Value::object(WaitGroupObject {
            group: Arc::new(group),
        }))
    });

    registry.register("sync.newTicker", Arity::Exact(2), |vm, args| {
        let interval = args::duration("sync.newTicker", &args[0])?;
        let callback = args::callable(vm, "sync.newTicker", &args[1])?;
        let ticker = Ticker::start(vm, interval, callback)?;
        Ok(Value::object(TickerObject { ticker }))
    });

    registry.register("sync.newTimer", Arity::Exact(2), |vm, args| {
        let duration = args::duration("sync.newTimer", &args[0])?;
        let callback = args::callable(vm, "sync.newTimer", &args[1])?;
        let timer = Timer::start(vm, duration, callback)?;
        Ok(Value::object(TimerObject { timer }))
    });
}

/// Script mutex (`sync.Mutex`)
#[derive(Debug, Default)]
pub struct MutexObject {
    mutex: Mutex,
}

impl MutexObject {
    /// The engine mutex
    pub fn mutex(&self) -> &Mutex {
        &self.mutex
    }
}

impl NativeObject for MutexObject {
    fn type_name(&self) -> &'static str {
        "sync.Mutex"
    }

    fn call_method(&self, name: &str, args: &[Value], _vm: &mut Vm) -> VmResult<Value> {
        match name {
            "lock" => {
                args::no_args(self.type_name(), name, args)?;
                self.mutex.lock();
                Ok(Value::Null)
            }
            "unlock" => {
                args::no_args(self.type_name(), name, args)?;
                self.mutex.unlock()?;
                Ok(Value::Null)
            }
            _ => Err(VmError::UnknownMethod {
                type_name: self.type_name(),
                method: name.to_string(),
            }),
        }
    }
}

/// Script channel (`sync.Channel`)
#[derive(Debug)]
pub struct ChannelObject {
    channel: Arc<Channel>,
}

impl ChannelObject {
    /// Wrap a channel as a script value
    pub fn value(channel: Arc<Channel>) -> Value {
        Value::object(ChannelObject { channel })
    }

    /// The engine channel
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }
}

impl NativeObject for ChannelObject {
    fn type_name(&self) -> &'static str {
        "sync.Channel"
    }

    fn call_method(&self, name: &str, args: &[Value], _vm: &mut Vm) -> VmResult<Value> {
        match name {
            "send" => {
                let value = args::one_arg(self.type_name(), name, args)?;
                self.channel.send(value.clone())?;
                Ok(Value::Null)
            }
            "receive" => {
                args::no_args(self.type_name(), name, args)?;
                Ok(self.channel.receive().unwrap_or(Value::Null))
            }
            "close" => {
                args::no_args(self.type_name(), name, args)?;
                self.channel.close()?;
                Ok(Value::Null)
            }
            _ => Err(VmError::UnknownMethod {
                type_name: self.type_name(),
                method: name.to_string(),
            }),
        }
    }

    fn get_property(&self, name: &str, _vm: &Vm) -> VmResult<Value> {
        match name {
            "length" => Ok(Value::Int(self.channel.len() as i64)),
            "capacity" => Ok(Value::Int(self.channel.capacity() as i64)),
            "closed" => Ok(Value::Bool(self.channel.is_closed())),
            _ => Ok(Value::Undefined),
        }
    }
}

/// Script wait group (`sync.WaitGroup`)
#[derive(Debug)]
pub struct WaitGroupObject {
    group: Arc<WaitGroup>,
}

impl WaitGroupObject {
    /// The engine wait group
    pub fn group(&self) -> &Arc<WaitGroup> {
        &self.group
    }
}

impl NativeObject for WaitGroupObject {
    fn type_name(&self) -> &'static str {
        "sync.WaitGroup"
    }

    fn call_method(&self, name: &str, args: &[Value], vm: &mut Vm) -> VmResult<Value> {
        match name {
            "go" => {
                let value = args::one_arg(self.type_name(), name, args)?;
                let callable = args::callable(vm, "sync.WaitGroup.go", value)?;
                launch_in_group(vm, callable, &self.group)?;
                Ok(Value::Null)
            }
            "wait" => {
                args::no_args(self.type_name(), name, args)?;
                self.group.wait();
                Ok(Value::Null)
            }
            _ => Err(VmError::UnknownMethod {
                type_name: self.type_name(),
                method: name.to_string(),
            }),
        }
    }
}

/// Script ticker (`sync.Ticker`)
#[derive(Debug)]
pub struct TickerObject {
    ticker: Ticker,
}

impl NativeObject for TickerObject {
    fn type_name(&self) -> &'static str {
        "sync.Ticker"
    }

    fn call_method(&self, name: &str, args: &[Value], _vm: &mut Vm) -> VmResult<Value> {
        match name {
            "stop" => {
                args::no_args(self.type_name(), name, args)?;
                self.ticker.stop();
                Ok(Value::Null)
            }
            _ => Err(VmError::UnknownMethod {
                type_name: self.type_name(),
                method: name.to_string(),
            }),
        }
    }
}

/// Script timer (`sync.Timer`)
#[derive(Debug)]
pub struct TimerObject {
    timer: Timer,
}

impl NativeObject for TimerObject {
    fn type_name(&self) -> &'static str {
        "sync.Timer"
    }

    fn call_method(&self, name: &str, args: &[Value], _vm: &mut Vm) -> VmResult<Value> {
        match name {
            "reset" => {
                let value = args::one_arg(self.type_name(), name, args)?;
                let duration = args::duration("sync.Timer.reset", value)?;
                Ok(Value::Bool(self.timer.reset(duration)))
            }
            "stop" => {
                args::no_args(self.type_name(), name, args)?;
                Ok(Value::Bool(self.timer.stop()))
            }
            _ => Err(VmError::UnknownMethod {
                type_name: self.type_name(),
                method: name.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_engine::Program;

    fn vm(permissions: Permission) -> Vm {
        let mut registry = NativeFunctionRegistry::new();
        register_sync(&mut registry);
        let mut b = Program::builder();
        b.natives(Arc::new(registry)).permit(permissions);
        Vm::new(b.build())
    }

    #[test]
    fn test_mutex_methods() {
        let mut vm = vm(Permission::CREATE_MUTEX);
        let mutex = vm.call_native("sync.newMutex", &[]).unwrap();
        assert_eq!(mutex.type_name(), "sync.Mutex");

        vm.call_method(&mutex, "lock", &[]).unwrap();
        vm.call_method(&mutex, "unlock", &[]).unwrap();
        let err = vm.call_method(&mutex, "unlock", &[]).unwrap_err();
        assert_eq!(err.to_string(), "unlock of unlocked mutex");
        assert!(vm.call_method(&mutex, "tryLock", &[]).is_err());
    }

    #[test]
    fn test_channel_properties() {
        let mut vm = vm(Permission::CONCURRENCY);
        let ch = vm.call_native("sync.newChannel", &[Value::Int(2)]).unwrap();
        vm.call_method(&ch, "send", &[Value::Int(1)]).unwrap();

        assert_eq!(vm.get_property(&ch, "length").unwrap(), Value::Int(1));
        assert_eq!(vm.get_property(&ch, "capacity").unwrap(), Value::Int(2));
        assert_eq!(vm.get_property(&ch, "closed").unwrap(), Value::Bool(false));
        assert!(vm.call_method(&ch, "send", &[]).is_err());
    }

    #[test]
    fn test_negative_buffer_rejected() {
        let mut vm = vm(Permission::CONCURRENCY);
        let err = vm.call_native("sync.newChannel", &[Value::Int(-1)]).unwrap_err();
        assert_eq!(err.kind(), "ArgumentError");
        let err = vm.call_native("sync.newWaitGroup", &[Value::Int(0)]).unwrap_err();
        assert_eq!(err.kind(), "ArgumentError");
    }
}
