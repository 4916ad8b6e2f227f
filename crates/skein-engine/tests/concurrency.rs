//! Integration tests for the concurrency primitives
//!
//! These tests drive the engine API directly: program functions are host
//! closures, launched through the launcher and wait groups onto cloned
//! instances.

use parking_lot::Mutex as ParkingLotMutex;
use skein_engine::vm::scheduler::{launch, launch_in_group, Job, JobFailure, Ticker, Worker};
use skein_engine::vm::sync::{select, Channel, Mutex, WaitGroup};
use skein_engine::{Callable, Permission, Program, Value, Vm, VmError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn function(vm: &Vm, name: &str) -> Callable {
    Callable::Function(vm.program().function_index(name).unwrap())
}

fn join_counter(n: usize) {
    let mutex = Arc::new(Mutex::new());
    let counter = Arc::new(ParkingLotMutex::new(0usize));

    let mut b = Program::builder();
    {
        let mutex = Arc::clone(&mutex);
        let counter = Arc::clone(&counter);
        b.function("incr", move |_, _| {
            mutex.lock();
            let value = *counter.lock();
            thread::yield_now();
            *counter.lock() = value + 1;
            mutex.unlock()?;
            Ok(Value::Null)
        });
    }
    b.permit(Permission::CONCURRENCY);
    let vm = Vm::new(b.build());

    let group = Arc::new(WaitGroup::new());
    let incr = function(&vm, "incr");
    for _ in 0..n {
        launch_in_group(&vm, incr.clone(), &group).unwrap();
    }
    group.wait();

    assert_eq!(*counter.lock(), n);
}

#[test]
fn test_join_correctness_zero_tasks() {
    init_tracing();
    join_counter(0);
}

#[test]
fn test_join_correctness_ten_tasks() {
    init_tracing();
    join_counter(10);
}

#[test]
fn test_bounded_concurrency() {
    init_tracing();
    const LIMIT: usize = 3;

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut b = Program::builder();
    {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        b.function("body", move |_, _| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::Null)
        });
    }
    b.permit(Permission::CONCURRENCY);
    let vm = Vm::new(b.build());

    let group = Arc::new(WaitGroup::with_limit(LIMIT).unwrap());
    let body = function(&vm, "body");
    for _ in 0..12 {
        launch_in_group(&vm, body.clone(), &group).unwrap();
    }
    group.wait();

    let peak = peak.load(Ordering::SeqCst);
    assert!(peak <= LIMIT, "peak {} exceeds limit", peak);
    assert!(peak >= 1);
}

#[test]
fn test_channel_handoff_pairs() {
    init_tracing();
    let ch = Arc::new(Channel::new(0));
    let received = Arc::new(ParkingLotMutex::new(Vec::new()));

    let receivers: Vec<_> = (0..4)
        .map(|_| {
            let ch = Arc::clone(&ch);
            let received = Arc::clone(&received);
            thread::spawn(move || {
                if let Some(v) = ch.receive() {
                    received.lock().push(v.as_int().unwrap());
                }
            })
        })
        .collect();

    for i in 0..4 {
        ch.send(Value::Int(i)).unwrap();
    }
    for r in receivers {
        r.join().unwrap();
    }

    let mut values = received.lock().clone();
    values.sort_unstable();
    assert_eq!(values, vec![0, 1, 2, 3]);
}

#[test]
fn test_close_wakes_everyone() {
    init_tracing();
    let ch = Arc::new(Channel::new(0));
    let receivers: Vec<_> = (0..3)
        .map(|_| {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.receive())
        })
        .collect();
    let selector = {
        let ch = Arc::clone(&ch);
        thread::spawn(move || select(&[ch], false))
    };

    thread::sleep(Duration::from_millis(30));
    ch.close().unwrap();

    for r in receivers {
        assert_eq!(r.join().unwrap(), None);
    }
    let result = selector.join().unwrap().unwrap();
    assert_eq!(result.index, 0);
    assert!(!result.received_ok);

    assert_eq!(
        ch.send(Value::Null),
        Err(VmError::ClosedChannel("send on closed channel"))
    );
    assert!(ch.close().is_err());
}

#[test]
fn test_launched_task_is_isolated() {
    init_tracing();
    let done = Arc::new(Channel::new(1));

    let mut b = Program::builder();
    let slot = b.global("shared");
    {
        let done = Arc::clone(&done);
        b.function("task", move |vm, _| {
            vm.set_global(slot, Value::str("changed in task"))?;
            done.send(vm.global(slot)?)?;
            Ok(Value::Null)
        });
    }
    b.permit(Permission::CONCURRENCY);
    let mut vm = Vm::new(b.build());
    vm.set_global(slot, Value::str("original")).unwrap();

    launch(&vm, function(&vm, "task")).unwrap();

    assert_eq!(done.receive(), Some(Value::str("changed in task")));
    assert_eq!(vm.global(slot).unwrap(), Value::str("original"));
}

#[test]
fn test_closure_bound_values_are_shared_by_identity() {
    init_tracing();
    let mut b = Program::builder();
    b.function("append", |_, args| {
        if let Value::Array(items) = &args[0] {
            items.write().push(Value::Int(1));
        }
        Ok(Value::Null)
    });
    b.permit(Permission::CONCURRENCY);
    let vm = Vm::new(b.build());

    let shared = Value::array(Vec::new());
    let closure = Value::closure(
        vm.program().function_index("append").unwrap(),
        vec![shared.clone()],
    );
    let group = Arc::new(WaitGroup::new());
    for _ in 0..5 {
        launch_in_group(&vm, vm.callable(&closure).unwrap(), &group).unwrap();
    }
    group.wait();

    assert_eq!(shared.to_vec().map(|v| v.len()), Some(5));
}

#[test]
fn test_worker_timeout_isolation() {
    init_tracing();
    let worker = Worker::new(1).unwrap();
    let failures = Arc::new(ParkingLotMutex::new(Vec::new()));
    {
        let failures = Arc::clone(&failures);
        worker.set_error_handler(Some(Arc::new(move |f: &JobFailure| {
            failures.lock().push(f.error.clone());
            Ok(())
        })));
    }
    worker.start().unwrap();

    worker
        .add(
            Job::new(|| {
                thread::sleep(Duration::from_millis(50));
                Ok(())
            })
            .with_timeout(Duration::from_millis(10)),
        )
        .unwrap();

    let fast = Arc::new(AtomicUsize::new(0));
    {
        let fast = Arc::clone(&fast);
        worker
            .add(Job::new(move || {
                fast.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while fast.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    thread::sleep(Duration::from_millis(80));

    assert_eq!(fast.load(Ordering::SeqCst), 1);
    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].is_timeout());
    worker.stop();
}

#[test]
fn test_slow_ticks_are_not_coalesced() {
    init_tracing();
    let started = Arc::new(AtomicUsize::new(0));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut b = Program::builder();
    {
        let started = Arc::clone(&started);
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        b.function("tick", move |_, _| {
            started.fetch_add(1, Ordering::SeqCst);
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(60));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::Null)
        });
    }
    b.permit(Permission::CONCURRENCY);
    let vm = Vm::new(b.build());

    let ticker = Ticker::start(&vm, Duration::from_millis(10), function(&vm, "tick")).unwrap();
    thread::sleep(Duration::from_millis(150));
    ticker.stop();

    assert!(started.load(Ordering::SeqCst) >= 5);
    assert!(peak.load(Ordering::SeqCst) >= 2);
}

#[test]
fn test_worker_restart_with_job_in_flight() {
    init_tracing();
    let worker = Worker::new(2).unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let job = |sleep: Duration| {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        let finished = Arc::clone(&finished);
        Job::new(move || {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(sleep);
            running.fetch_sub(1, Ordering::SeqCst);
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    worker.start().unwrap();
    worker.add(job(Duration::from_millis(200))).unwrap();
    thread::sleep(Duration::from_millis(50));
    worker.stop();
    worker.start().unwrap();
    worker.add(job(Duration::from_millis(10))).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while finished.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(finished.load(Ordering::SeqCst), 2);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(worker.is_running());
    worker.stop();
}

#[test]
fn test_oversized_queue_is_rejected() {
    let err = Worker::new(usize::MAX).unwrap_err();
    assert_eq!(err.kind(), "ArgumentError");

    let ch = Channel::new(usize::MAX);
    ch.send(Value::Int(1)).unwrap();
    assert_eq!(ch.receive(), Some(Value::Int(1)));
}
