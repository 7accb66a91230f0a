//! Integration tests for soldering output wires to their destinations.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::model_with_workers;
use parking_lot::Mutex;
use prometheus_wiring::core::{TaskSchedulerType, WiringError};
use prometheus_wiring::wires::SolderType;

fn collector<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(T) + Send + Sync + 'static) {
    let store = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&store);
    (store, move |value| sink.lock().push(value))
}

#[test]
fn test_fan_out_reaches_every_destination_in_order() {
    let model = model_with_workers(4);
    let source = model
        .scheduler_builder("source")
        .unwrap()
        .with_type(TaskSchedulerType::Direct)
        .build::<u64>()
        .unwrap();
    let source_in = source.build_input_wire::<u64>("numbers").unwrap();
    source_in.bind(Some).unwrap();

    let mut sinks = Vec::new();
    for name in ["left", "right"] {
        let scheduler = model
            .scheduler_builder(name)
            .unwrap()
            .with_type(TaskSchedulerType::Sequential)
            .with_flushing_enabled(true)
            .build::<()>()
            .unwrap();
        let input = scheduler.build_input_wire::<u64>("numbers").unwrap();
        let (store, sink) = collector();
        input.bind_consumer(sink).unwrap();
        source.output_wire().solder(&input).unwrap();
        sinks.push((scheduler, store));
    }
    assert_eq!(source.output_wire().destination_count(), 2);
    model.start().unwrap();

    for value in 0..50 {
        source_in.put(value).unwrap();
    }
    for (scheduler, store) in &sinks {
        scheduler.flush().unwrap();
        assert_eq!(*store.lock(), (0..50).collect::<Vec<_>>());
    }
}

#[test]
fn test_filtering_handler_forwards_two_thirds() {
    let model = model_with_workers(1);
    let filter = model
        .scheduler_builder("skip_thirds")
        .unwrap()
        .with_type(TaskSchedulerType::Direct)
        .build::<u32>()
        .unwrap();
    let input = filter.build_input_wire::<u32>("values").unwrap();
    input
        .bind(|value| if value % 3 == 0 { None } else { Some(value) })
        .unwrap();

    let forwarded = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&forwarded);
    filter
        .output_wire()
        .solder_to_consumer("count", move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    model.start().unwrap();

    for value in 1..=100 {
        input.put(value).unwrap();
    }
    assert_eq!(forwarded.load(Ordering::SeqCst), 67);
}

#[test]
fn test_transformer_filter_and_splitter_chain() {
    let model = model_with_workers(1);
    let batcher = model
        .scheduler_builder("batcher")
        .unwrap()
        .with_type(TaskSchedulerType::Direct)
        .build::<Vec<u32>>()
        .unwrap();
    let input = batcher.build_input_wire::<u32>("size").unwrap();
    input.bind(|size| Some((0..size).collect())).unwrap();

    let elements = batcher.output_wire().build_splitter::<u32>("each").unwrap();
    let evens = elements.build_filter("evens", |value| value % 2 == 0).unwrap();
    let labels = evens
        .build_transformer("label", |value| format!("item-{value}"))
        .unwrap();
    let (store, sink) = collector();
    labels.solder_to_consumer("collect", sink).unwrap();
    model.start().unwrap();

    input.put(6).unwrap();
    assert_eq!(*store.lock(), vec!["item-0", "item-2", "item-4"]);

    let topology = model.topology();
    for name in ["each", "evens", "label", "collect"] {
        assert!(topology.vertex(name).is_some(), "missing vertex {name}");
    }
}

#[test]
fn test_secondary_output_wire_is_forwarded_explicitly() {
    let model = model_with_workers(1);
    let router = model
        .scheduler_builder("router")
        .unwrap()
        .with_type(TaskSchedulerType::Direct)
        .build::<u32>()
        .unwrap();
    let errors = router.build_secondary_output_wire::<String>();
    let input = router.build_input_wire::<i64>("values").unwrap();
    {
        let errors = errors.clone();
        input
            .bind(move |value| match u32::try_from(value) {
                Ok(value) => Some(value),
                Err(_) => {
                    errors.forward(format!("negative: {value}"));
                    None
                }
            })
            .unwrap();
    }
    let (primary, primary_sink) = collector();
    let (secondary, secondary_sink) = collector();
    router.output_wire().solder_to_consumer("accepted", primary_sink).unwrap();
    errors.solder_to_consumer("rejected", secondary_sink).unwrap();
    model.start().unwrap();

    for value in [3, -1, 7, -9] {
        input.put(value).unwrap();
    }
    assert_eq!(*primary.lock(), vec![3, 7]);
    assert_eq!(*secondary.lock(), vec!["negative: -1", "negative: -9"]);
    assert_eq!(errors.name(), "router");
}

#[test]
fn test_panicking_destination_does_not_starve_later_ones() {
    let model = model_with_workers(1);
    let source = model
        .scheduler_builder("source")
        .unwrap()
        .with_type(TaskSchedulerType::Direct)
        .build::<u32>()
        .unwrap();
    let input = source.build_input_wire::<u32>("values").unwrap();
    input.bind(Some).unwrap();

    let output = source.output_wire();
    output.solder_to_consumer("broken", |_| panic!("consumer refuses everything")).unwrap();
    let (picky, picky_sink) = collector();
    output
        .build_filter("fragile", |value: &u32| {
            assert!(*value != 2, "filter cannot look at two");
            true
        })
        .unwrap()
        .solder_to_consumer("after_fragile", picky_sink)
        .unwrap();
    let (store, sink) = collector();
    output.solder_to_consumer("healthy", sink).unwrap();
    model.start().unwrap();

    for value in 0..5 {
        input.put(value).unwrap();
    }

    assert_eq!(*store.lock(), vec![0, 1, 2, 3, 4]);
    assert_eq!(*picky.lock(), vec![0, 1, 3, 4]);
    assert_eq!(source.stats().failed, 0);
}

#[test]
fn test_inject_bypasses_capacity() {
    let model = model_with_workers(1);
    let bounded = model
        .scheduler_builder("bounded")
        .unwrap()
        .with_type(TaskSchedulerType::SequentialThread)
        .with_unhandled_task_capacity(1)
        .with_flushing_enabled(true)
        .build::<()>()
        .unwrap();
    let input = bounded.build_input_wire::<u32>("values").unwrap();
    let (store, sink) = collector();
    input.bind_consumer(sink).unwrap();

    // Not started: tasks stay queued, so capacity is observable.
    input.put(1).unwrap();
    assert!(!input.offer(2).unwrap());
    input.inject(3).unwrap();
    input.inject(4).unwrap();
    assert_eq!(bounded.unprocessed_task_count(), 3);

    model.start().unwrap();
    bounded.flush().unwrap();
    assert_eq!(*store.lock(), vec![1, 3, 4]);
}

#[test]
fn test_solder_types_are_recorded_in_topology() {
    let model = model_with_workers(1);
    let upstream = model.scheduler_builder("upstream").unwrap().build::<u32>().unwrap();
    let downstream = model.scheduler_builder("downstream").unwrap().build::<()>().unwrap();
    let puts = downstream.build_input_wire::<u32>("puts").unwrap();
    let offers = downstream.build_input_wire::<u32>("offers").unwrap();
    let injects = downstream.build_input_wire::<u32>("injects").unwrap();

    let output = upstream.output_wire();
    output.solder(&puts).unwrap();
    output.solder_to(&offers, SolderType::Offer).unwrap();
    output.solder_to(&injects, SolderType::Inject).unwrap();

    let topology = model.topology();
    let kinds: Vec<(&str, &str, SolderType)> = topology
        .edges()
        .iter()
        .map(|edge| (edge.target.as_str(), edge.label.as_str(), edge.solder_type))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("downstream", "puts", SolderType::Put),
            ("downstream", "offers", SolderType::Offer),
            ("downstream", "injects", SolderType::Inject),
        ]
    );
}

#[test]
fn test_wiring_is_frozen_after_start() {
    let model = model_with_workers(1);
    let upstream = model.scheduler_builder("upstream").unwrap().build::<u32>().unwrap();
    let downstream = model.scheduler_builder("downstream").unwrap().build::<()>().unwrap();
    let input = downstream.build_input_wire::<u32>("values").unwrap();
    model.start().unwrap();

    assert!(matches!(upstream.output_wire().solder(&input), Err(WiringError::AlreadyStarted)));
    assert!(matches!(
        downstream.build_input_wire::<u32>("late"),
        Err(WiringError::AlreadyStarted)
    ));
    assert!(matches!(
        upstream.output_wire().solder_to_consumer("late_sink", |_| {}),
        Err(WiringError::AlreadyStarted)
    ));
    // Binding stays allowed after start.
    input.bind_consumer(|_| {}).unwrap();
}
