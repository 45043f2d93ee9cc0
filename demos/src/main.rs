use std::sync::{Arc, Mutex};

use process_core::node::ThresholdMode;
use process_core::{ContextMode, HandlerFn, Manager, NodeUpdatePolicy, Priority, Process, Status, TreeBuilder};
use tracing_subscriber::EnvFilter;

/// A small runnable consumer of `process-core`: builds a couple of example
/// trees, registers them at different layers, executes `Process`es against
/// them and prints the resulting status and handler log — the synchronous,
/// single-process analogue of what a server would expose over a wire
/// protocol.
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    layer_composition_demo();
    parallel_resume_demo();
}

fn logging_handler(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str, status: Status) -> HandlerFn {
    let log = log.clone();
    HandlerFn::new(label, move |_| {
        log.lock().unwrap().push(label);
        status
    })
}

/// Mirrors the "layer composition" seed scenario: a global tree, an
/// instance-specific tree, and a process's own `processing()`/
/// `WithProcessing()` hooks all contribute a handler to the same sequence.
fn layer_composition_demo() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let manager = Manager::new();

    manager
        .register(
            "checkContextMerge",
            None,
            TreeBuilder::new().sequence(
                "checkContextMerge",
                NodeUpdatePolicy::NONE,
                Priority::Normal,
                vec![],
                |b| b.handler("global-slot", NodeUpdatePolicy::NONE, Priority::Normal, vec![], logging_handler(&log, "Global", Status::Success)),
            ),
        )
        .expect("global registration");

    manager
        .register(
            "checkContextMerge",
            Some("instance-1"),
            TreeBuilder::new().sequence(
                "checkContextMerge",
                NodeUpdatePolicy::NONE,
                Priority::Normal,
                vec![],
                |b| b.handler("instance-slot", NodeUpdatePolicy::NONE, Priority::Normal, vec![], logging_handler(&log, "Instanced", Status::Success)),
            ),
        )
        .expect("instance registration");

    let manager = Arc::new(manager);
    let log_processing = log.clone();
    let log_with_processing = log.clone();
    let mut process = Process::new("checkContextMerge")
        .processing(move || {
            TreeBuilder::new()
                .sequence("checkContextMerge", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                    b.handler(
                        "processing-slot",
                        NodeUpdatePolicy::NONE,
                        Priority::Normal,
                        vec![],
                        logging_handler(&log_processing, "processing", Status::Success),
                    )
                })
                .build()
                .expect("processing() tree")
        })
        .with_processing(move || {
            TreeBuilder::new()
                .sequence("checkContextMerge", NodeUpdatePolicy::NONE, Priority::Normal, vec![], |b| {
                    b.handler(
                        "with-processing-slot",
                        NodeUpdatePolicy::NONE,
                        Priority::Normal,
                        vec![],
                        logging_handler(&log_with_processing, "WithProcessing", Status::Success),
                    )
                })
                .build()
                .expect("WithProcessing() tree")
        });

    let status = process
        .execute(&manager, ContextMode::All, &["instance-1".to_string()])
        .expect("execute");

    println!("layer composition: status={status:?} log={:?}", *log.lock().unwrap());
}

/// Mirrors the "parallel with resume" seed scenario: one handler waits,
/// one succeeds immediately; resuming the waiting handler to success tips
/// the threshold over to an overall success.
fn parallel_resume_demo() {
    let manager = Arc::new(Manager::new());
    let waiting_call_count = Arc::new(Mutex::new(0u32));
    let call_count = waiting_call_count.clone();

    manager
        .register(
            "approval",
            None,
            TreeBuilder::new().parallel(
                "parallel-root",
                NodeUpdatePolicy::NONE,
                Priority::Normal,
                vec![],
                2,
                1,
                ThresholdMode::SuccessPriority,
                move |b| {
                    let call_count = call_count.clone();
                    b.handler("W", NodeUpdatePolicy::NONE, Priority::Normal, vec![], HandlerFn::new("W", move |_| {
                        let mut calls = call_count.lock().unwrap();
                        *calls += 1;
                        if *calls == 1 {
                            Status::Waiting
                        } else {
                            Status::Success
                        }
                    }))
                    .handler("OK", NodeUpdatePolicy::NONE, Priority::Normal, vec![], HandlerFn::new("OK", |_| Status::Success))
                },
            ),
        )
        .expect("approval registration");

    let mut process = Process::new("approval");
    let first = process.execute(&manager, ContextMode::Global, &[]).expect("first execute");
    println!("parallel resume: first execute -> {first:?}");

    let second = process.resume("W").expect("resume");
    println!("parallel resume: after resume -> {second:?} (W invoked {} time(s))", *waiting_call_count.lock().unwrap());
}
