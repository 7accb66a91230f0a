//! Integration tests for heartbeat wires.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::assert_eventually;
use parking_lot::Mutex;
use prometheus_wiring::config::{WiringConfig, WorkerPoolConfig};
use prometheus_wiring::core::{TaskSchedulerType, WiringError};
use prometheus_wiring::model::{VertexKind, WiringModel};
use prometheus_wiring::util::{FakeTime, Time};

fn fake_model() -> (WiringModel, Arc<FakeTime>) {
    let time = Arc::new(FakeTime::new());
    let config = WiringConfig::new().with_pool(WorkerPoolConfig::new().with_worker_count(2));
    let model = WiringModel::with_time(config, time.clone()).unwrap();
    (model, time)
}

#[test]
fn test_one_simulated_second_at_100_hz() {
    let (model, time) = fake_model();
    let heartbeat = model.build_heartbeat_wire_with_frequency(100.0).unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&ticks);
    heartbeat
        .solder_to_consumer("count_ticks", move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    model.start().unwrap();

    time.tick(Duration::from_secs(1));
    assert_eventually(Duration::from_secs(5), "heartbeats delivered", || {
        ticks.load(Ordering::SeqCst) >= 50
    });
    std::thread::sleep(Duration::from_millis(50));
    let delivered = ticks.load(Ordering::SeqCst);
    assert!((50..=150).contains(&delivered), "got {delivered} ticks");

    model.stop().unwrap();
}

#[test]
fn test_heartbeat_drives_scheduler_with_clock_readings() {
    let (model, time) = fake_model();
    let heartbeat = model.build_heartbeat_wire(Duration::from_millis(250)).unwrap();
    assert_eq!(heartbeat.name(), "heartbeat_0");

    let scheduler = model
        .scheduler_builder("ticker")
        .unwrap()
        .with_type(TaskSchedulerType::Sequential)
        .with_flushing_enabled(true)
        .build::<()>()
        .unwrap();
    let input = scheduler.build_input_wire::<Instant>("heartbeat").unwrap();
    let readings = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&readings);
    input.bind_consumer(move |now| sink.lock().push(now)).unwrap();
    heartbeat.solder(&input).unwrap();
    model.start().unwrap();

    time.tick(Duration::from_secs(1));
    assert_eventually(Duration::from_secs(5), "four ticks", || readings.lock().len() == 4);
    scheduler.flush().unwrap();
    model.stop().unwrap();

    let readings = readings.lock();
    assert_eq!(readings.len(), 4);
    assert!(readings.iter().all(|reading| *reading <= time.now()));
}

#[test]
fn test_panicking_listener_does_not_stop_heartbeats() {
    let (model, time) = fake_model();
    let heartbeat = model.build_heartbeat_wire(Duration::from_millis(100)).unwrap();
    heartbeat
        .solder_to_consumer("explodes", |_| panic!("listener failure"))
        .unwrap();
    let ticks = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&ticks);
    heartbeat
        .solder_to_consumer("survivor", move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    model.start().unwrap();

    time.tick(Duration::from_millis(500));
    assert_eventually(Duration::from_secs(5), "first five ticks", || {
        ticks.load(Ordering::SeqCst) == 5
    });
    time.tick(Duration::from_millis(500));
    assert_eventually(Duration::from_secs(5), "ticks after the failures", || {
        ticks.load(Ordering::SeqCst) == 10
    });
    model.stop().unwrap();
}

#[test]
fn test_heartbeat_validation_and_topology() {
    let (model, _time) = fake_model();
    assert!(matches!(
        model.build_heartbeat_wire(Duration::ZERO),
        Err(WiringError::InvalidConfig(_))
    ));
    assert!(matches!(
        model.build_heartbeat_wire_with_frequency(0.0),
        Err(WiringError::InvalidConfig(_))
    ));
    assert!(matches!(
        model.build_heartbeat_wire_with_frequency(f64::NAN),
        Err(WiringError::InvalidConfig(_))
    ));

    model.build_heartbeat_wire(Duration::from_secs(1)).unwrap();
    let vertex = model.topology().vertex("heartbeat_0").cloned().unwrap();
    assert_eq!(vertex.kind, VertexKind::Heartbeat);

    model.start().unwrap();
    assert!(matches!(
        model.build_heartbeat_wire(Duration::from_secs(1)),
        Err(WiringError::AlreadyStarted)
    ));
}
