//! Fair multi-way receive over channels

use super::channel::{Channel, SelectSignal};
use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};
use rand::Rng;
use std::sync::Arc;

/// Outcome of a select
#[derive(Debug, Clone, PartialEq)]
pub struct SelectResult {
    /// Chosen channel, or `channels.len()` for the default branch
    pub index: usize,
    /// Received value
    pub value: Option<Value>,
    /// False when the chosen channel was closed and drained, or on default
    pub received_ok: bool,
}

/// Receive from whichever channel is ready
///
/// Picks uniformly at random among all channels that hold a value or are
/// closed. Without `default_case` it blocks until one is ready; with it, it
/// returns the default branch (`index == channels.len()`) immediately when
/// none is.
pub fn select(channels: &[Arc<Channel>], default_case: bool) -> VmResult<SelectResult> {
    if channels.is_empty() && !default_case {
        return Err(VmError::argument("select: no channels and no default case"));
    }

    let signal = Arc::new(SelectSignal::default());
    for channel in channels {
        channel.watch(&signal);
    }
    let result = select_loop(channels, default_case, &signal);
    for channel in channels {
        channel.unwatch(&signal);
    }
    Ok(result)
}

fn select_loop(
    channels: &[Arc<Channel>],
    default_case: bool,
    signal: &Arc<SelectSignal>,
) -> SelectResult {
    let mut rng = rand::thread_rng();
    loop {
        let ready: Vec<usize> = channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_ready())
            .map(|(i, _)| i)
            .collect();

        if ready.is_empty() {
            if default_case {
                return SelectResult {
                    index: channels.len(),
                    value: None,
                    received_ok: false,
                };
            }
            signal.wait();
            continue;
        }

        let index = ready[rng.gen_range(0..ready.len())];
        // Lost the race to another receiver: rescan.
        if let Some(received) = channels[index].poll() {
            return SelectResult {
                index,
                received_ok: received.is_some(),
                value: received,
            };
        }
    }
}
