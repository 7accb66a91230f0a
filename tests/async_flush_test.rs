//! Flushing from async code.

#![cfg(feature = "tokio-runtime")]

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::model_with_workers;
use prometheus_wiring::core::{TaskSchedulerType, WiringError};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_flush_async_waits_for_handlers() {
    let model = model_with_workers(2);
    let scheduler = model
        .scheduler_builder("slow")
        .unwrap()
        .with_type(TaskSchedulerType::Concurrent)
        .with_flushing_enabled(true)
        .build::<()>()
        .unwrap();
    let input = scheduler.build_input_wire::<u64>("delays").unwrap();
    let handled = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&handled);
    input
        .bind_consumer(move |millis| {
            std::thread::sleep(Duration::from_millis(millis));
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    model.start().unwrap();

    for millis in [5, 10, 15, 20] {
        input.put(millis).unwrap();
    }
    scheduler.flush_async().await.unwrap();

    assert_eq!(handled.load(Ordering::SeqCst), 4);
    assert_eq!(scheduler.unprocessed_task_count(), 0);
}

#[tokio::test]
async fn test_flush_async_requires_flushing() {
    let model = model_with_workers(1);
    let scheduler = model.scheduler_builder("plain").unwrap().build::<()>().unwrap();
    assert!(matches!(
        scheduler.flush_async().await,
        Err(WiringError::Unsupported(_))
    ));
}
