//! End-to-end seed scenarios (spec §8), exercising `Manager` + `Process` +
//! `TreeBuilder` together the way a server integration test would exercise
//! a whole engine.

use std::sync::{Arc, Mutex};

use process_core::node::ThresholdMode;
use process_core::{Condition, ContextMode, HandlerFn, Manager, NodeUpdatePolicy, Priority, Process, Status, TreeBuilder};

fn logger(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str, status: Status) -> HandlerFn {
    let log = log.clone();
    HandlerFn::new(label, move |_| {
        log.lock().unwrap().push(label);
        status
    })
}

/// §8 scenario 1 "Layer composition": global + instance + processing() +
/// WithProcessing() all contribute a handler to the same sequence, and all
/// four layers also contribute a competing override of a nested handler —
/// only the last layer's override ever runs.
#[test]
fn layer_composition_seed_scenario() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let manager = Manager::new();

    manager
        .register(
            "checkContextMerge",
            None,
            TreeBuilder::new().sequence("checkContextMerge", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                b.handler("global", NodeUpdatePolicy::NONE, Priority::Normal, vec![], logger(&log, "Global", Status::Success))
                    .sequence("override", NodeUpdatePolicy::NONE, Priority::Low, vec![], |b| {
                        b.handler(
                            "overridedHandler",
                            NodeUpdatePolicy::NONE,
                            Priority::Normal,
                            vec![],
                            logger(&log, "GlobalOverride", Status::Success),
                        )
                    })
            }),
        )
        .unwrap();

    manager
        .register(
            "checkContextMerge",
            Some("instance-1"),
            TreeBuilder::new().sequence("checkContextMerge", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                b.handler("instanced", NodeUpdatePolicy::NONE, Priority::Normal, vec![], logger(&log, "Instanced", Status::Success))
                    .sequence("override", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                        b.handler(
                            "overridedHandler",
                            NodeUpdatePolicy::NONE,
                            Priority::Normal,
                            vec![],
                            logger(&log, "InstancedOverride", Status::Success),
                        )
                    })
            }),
        )
        .unwrap();

    let manager = Arc::new(manager);
    let log_processing = log.clone();
    let log_with_processing = log.clone();
    let mut process = Process::new("checkContextMerge")
        .processing(move || {
            TreeBuilder::new()
                .sequence("checkContextMerge", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                    b.handler(
                        "processing",
                        NodeUpdatePolicy::NONE,
                        Priority::Normal,
                        vec![],
                        logger(&log_processing, "processing", Status::Success),
                    )
                })
                .build()
                .unwrap()
        })
        .with_processing(move || {
            TreeBuilder::new()
                .sequence("checkContextMerge", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                    b.handler(
                        "withProcessing",
                        NodeUpdatePolicy::NONE,
                        Priority::Normal,
                        vec![],
                        logger(&log_with_processing, "WithProcessing", Status::Success),
                    )
                    .sequence("override", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                        b.handler(
                            "overridedHandler",
                            NodeUpdatePolicy::NONE,
                            Priority::Normal,
                            vec![],
                            logger(&log_with_processing, "WithProcessingOverride", Status::Success),
                        )
                    })
                })
                .build()
                .unwrap()
        });

    let status = process.execute(&manager, ContextMode::All, &["instance-1".to_string()]).unwrap();

    assert_eq!(status, Status::Success);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["Global", "Instanced", "processing", "WithProcessing", "WithProcessingOverride"]
    );
}

/// §8 scenario 2 "Selector short-circuit".
#[test]
fn selector_short_circuit_seed_scenario() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let manager = Arc::new(Manager::new());
    manager
        .register(
            "pick-one",
            None,
            TreeBuilder::new().selector("root", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                b.handler("A", NodeUpdatePolicy::NONE, Priority::Normal, vec![], logger(&log, "A", Status::Failure))
                    .handler("B", NodeUpdatePolicy::NONE, Priority::Normal, vec![], logger(&log, "B", Status::Success))
                    .handler("C", NodeUpdatePolicy::NONE, Priority::Normal, vec![], logger(&log, "C", Status::Success))
            }),
        )
        .unwrap();

    let mut process = Process::new("pick-one");
    let status = process.execute(&manager, ContextMode::Global, &[]).unwrap();

    assert_eq!(status, Status::Success);
    assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
}

/// §8 scenario 3 "Parallel with resume": the waiting handler is invoked
/// exactly once more on resume, and the addressed-success tips the
/// threshold over.
#[test]
fn parallel_resume_seed_scenario() {
    let manager = Arc::new(Manager::new());
    let w_calls = Arc::new(Mutex::new(0u32));
    let ok_calls = Arc::new(Mutex::new(0u32));
    let w_calls2 = w_calls.clone();
    let ok_calls2 = ok_calls.clone();

    manager
        .register(
            "approval",
            None,
            TreeBuilder::new().parallel("root", NodeUpdatePolicy::NONE, Priority::Normal, vec![], 2, 1, ThresholdMode::SuccessPriority, move |b| {
                let w_calls2 = w_calls2.clone();
                let ok_calls2 = ok_calls2.clone();
                b.handler("W", NodeUpdatePolicy::NONE, Priority::Normal, vec![], HandlerFn::new("W", move |_| {
                    let mut c = w_calls2.lock().unwrap();
                    *c += 1;
                    if *c == 1 {
                        Status::Waiting
                    } else {
                        Status::Success
                    }
                }))
                .handler("OK", NodeUpdatePolicy::NONE, Priority::Normal, vec![], HandlerFn::new("OK", move |_| {
                    *ok_calls2.lock().unwrap() += 1;
                    Status::Success
                }))
            }),
        )
        .unwrap();

    let mut process = Process::new("approval");
    let first = process.execute(&manager, ContextMode::Global, &[]).unwrap();
    assert_eq!(first, Status::Waiting);

    let second = process.resume("W").unwrap();
    assert_eq!(second, Status::Success);
    assert_eq!(*w_calls.lock().unwrap(), 2);
    assert_eq!(*ok_calls.lock().unwrap(), 1);
}

/// §8 scenario 4 "Inverter propagation".
#[test]
fn inverter_propagation_seed_scenario() {
    let manager = Arc::new(Manager::new());
    manager
        .register(
            "gate",
            None,
            TreeBuilder::new().inverter("root", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                b.handler("child", NodeUpdatePolicy::NONE, Priority::Normal, vec![], HandlerFn::new("child", |_| Status::Waiting))
            }),
        )
        .unwrap();

    let mut process = Process::new("gate");
    assert_eq!(process.execute(&manager, ContextMode::Global, &[]).unwrap(), Status::Waiting);
    assert_eq!(process.resume("child").unwrap(), Status::Failure);
}

/// §8 scenario 5 "Read-only protection": a read-only global handler cannot
/// be overridden by a later instance-specific registration.
#[test]
fn read_only_protection_seed_scenario() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let manager = Manager::new();
    manager
        .register(
            "secured",
            None,
            TreeBuilder::new().sequence("root", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                b.handler("protected", NodeUpdatePolicy::READONLY, Priority::Normal, vec![], logger(&log, "original", Status::Success))
            }),
        )
        .unwrap();
    manager
        .register(
            "secured",
            Some("instance-1"),
            TreeBuilder::new().sequence("root", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                b.handler("protected", NodeUpdatePolicy::NONE, Priority::Normal, vec![], logger(&log, "override", Status::Failure))
            }),
        )
        .unwrap();

    let manager = Arc::new(manager);
    let mut process = Process::new("secured");
    let status = process.execute(&manager, ContextMode::All, &["instance-1".to_string()]).unwrap();

    assert_eq!(status, Status::Success);
    assert_eq!(*log.lock().unwrap(), vec!["original"]);
}

/// §8 scenario 6 "Policy combo": `IGNORE_CHANGES` on the existing node
/// beats `REPLACE_NODE` on the incoming operation, within a single builder
/// pass.
#[test]
fn ignore_changes_beats_replace_node_seed_scenario() {
    let tree = TreeBuilder::new()
        .sequence("root", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
            let b = b.sequence("x", NodeUpdatePolicy::IGNORE_CHANGES, Priority::Normal, vec![], |b| b);
            b.selector("x", NodeUpdatePolicy::REPLACE_NODE, Priority::Normal, vec![], |b| b)
        })
        .build()
        .unwrap();

    let x = tree.get_child("x").unwrap();
    assert_eq!(x.kind(), process_core::NodeKind::Sequence);
}

/// Typed condition gating: a condition built for one process type always
/// fails for a differently-typed process (§4.7).
#[test]
fn typed_condition_gates_on_process_type() {
    let manager = Arc::new(Manager::new());
    manager
        .register(
            "gadget",
            None,
            TreeBuilder::new().sequence("root", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                b.handler(
                    "only-for-widgets",
                    NodeUpdatePolicy::NONE,
                    Priority::Normal,
                    vec![Condition::typed("widget-only", "widget", |_| true)],
                    HandlerFn::new("should-not-run", |_| Status::Failure),
                )
            }),
        )
        .unwrap();

    let mut process = Process::new("gadget");
    let status = process.execute(&manager, ContextMode::Global, &[]).unwrap();
    assert_eq!(status, Status::Success);
}
