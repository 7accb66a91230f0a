//! Integration tests for the non-default execution disciplines.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use common::model_with_workers;
use parking_lot::Mutex;
use prometheus_wiring::core::{TaskSchedulerType, WiringError};

// ============================================================================
// DIRECT
// ============================================================================

#[test]
fn test_direct_runs_on_caller_thread() {
    let model = model_with_workers(1);
    let scheduler = model
        .scheduler_builder("direct")
        .unwrap()
        .with_type(TaskSchedulerType::Direct)
        .build::<thread::ThreadId>()
        .unwrap();
    let input = scheduler.build_input_wire::<()>("trigger").unwrap();
    input.bind(|()| Some(thread::current().id())).unwrap();

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    scheduler
        .output_wire()
        .solder_to_consumer("record", move |id| sink.lock().push(id))
        .unwrap();
    model.start().unwrap();

    input.put(()).unwrap();
    // Forwarding is synchronous: the consumer already ran.
    assert_eq!(*observed.lock(), vec![thread::current().id()]);
    assert!(TaskSchedulerType::Direct.runs_on_caller());
}

#[test]
fn test_direct_threadsafe_serializes_callers() {
    let model = model_with_workers(1);
    let scheduler = model
        .scheduler_builder("guarded")
        .unwrap()
        .with_type(TaskSchedulerType::DirectThreadsafe)
        .build::<()>()
        .unwrap();
    let input = scheduler.build_input_wire::<u32>("values").unwrap();

    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));
    {
        let in_flight = Arc::clone(&in_flight);
        let max_in_flight = Arc::clone(&max_in_flight);
        let handled = Arc::clone(&handled);
        input
            .bind_consumer(move |_| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);
                thread::yield_now();
                in_flight.fetch_sub(1, Ordering::SeqCst);
                handled.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    model.start().unwrap();

    let callers: Vec<_> = (0..4)
        .map(|_| {
            let input = input.clone();
            thread::spawn(move || {
                for value in 0..250 {
                    input.put(value).unwrap();
                }
            })
        })
        .collect();
    for caller in callers {
        caller.join().unwrap();
    }

    assert_eq!(handled.load(Ordering::SeqCst), 1_000);
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}

// ============================================================================
// CONCURRENT
// ============================================================================

#[test]
fn test_concurrent_runs_handlers_in_parallel() {
    let model = model_with_workers(4);
    let scheduler = model
        .scheduler_builder("parallel")
        .unwrap()
        .with_type(TaskSchedulerType::Concurrent)
        .with_flushing_enabled(true)
        .build::<()>()
        .unwrap();
    let input = scheduler.build_input_wire::<u32>("values").unwrap();

    // Both handlers must be inside the barrier at once for either to finish.
    let barrier = Arc::new(Barrier::new(2));
    let handled = Arc::new(AtomicUsize::new(0));
    {
        let barrier = Arc::clone(&barrier);
        let handled = Arc::clone(&handled);
        input
            .bind_consumer(move |_| {
                barrier.wait();
                handled.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    model.start().unwrap();

    input.put(1).unwrap();
    input.put(2).unwrap();
    scheduler.flush().unwrap();

    assert_eq!(handled.load(Ordering::SeqCst), 2);
    assert_eq!(scheduler.unprocessed_task_count(), 0);
}

// ============================================================================
// SEQUENTIAL_THREAD
// ============================================================================

#[test]
fn test_sequential_thread_uses_dedicated_thread_and_buffers_before_start() {
    let model = model_with_workers(1);
    let scheduler = model
        .scheduler_builder("worker")
        .unwrap()
        .with_type(TaskSchedulerType::SequentialThread)
        .with_flushing_enabled(true)
        .build::<()>()
        .unwrap();
    let input = scheduler.build_input_wire::<u32>("values").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    input
        .bind_consumer(move |value| {
            let name = thread::current().name().map(str::to_string);
            sink.lock().push((value, name));
        })
        .unwrap();

    for value in 0..3 {
        input.put(value).unwrap();
    }
    assert_eq!(scheduler.unprocessed_task_count(), 3);
    assert!(seen.lock().is_empty());

    model.start().unwrap();
    for value in 3..100 {
        input.put(value).unwrap();
    }
    scheduler.flush().unwrap();

    let seen = seen.lock();
    let values: Vec<u32> = seen.iter().map(|(value, _)| *value).collect();
    assert_eq!(values, (0..100).collect::<Vec<_>>());
    assert!(seen
        .iter()
        .all(|(_, name)| name.as_deref() == Some("worker-thread")));
}

// ============================================================================
// NO_OP
// ============================================================================

#[test]
fn test_no_op_discards_everything() {
    let model = model_with_workers(1);
    let scheduler = model
        .scheduler_builder("sink_hole")
        .unwrap()
        .with_type(TaskSchedulerType::NoOp)
        .with_flushing_enabled(true)
        .build::<u32>()
        .unwrap();
    let input = scheduler.build_input_wire::<u32>("values").unwrap();
    let called = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&called);
    input
        .bind(move |value| {
            counted.fetch_add(1, Ordering::SeqCst);
            Some(value)
        })
        .unwrap();
    model.start().unwrap();

    for value in 0..10 {
        input.put(value).unwrap();
    }
    scheduler.flush().unwrap();

    assert_eq!(called.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.unprocessed_task_count(), 0);
    let stats = scheduler.stats();
    assert_eq!(stats.handled, 0);
    assert_eq!(stats.squelched, 10);
    assert!(matches!(scheduler.start_squelching(), Err(WiringError::Unsupported(_))));
}
