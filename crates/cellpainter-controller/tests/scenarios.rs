// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! Integration scenarios against the full worker/executor stack, using the
//! in-process device fakes (`NoopBiotek`/`NoopIncu`/`NoopRobotArm` plus a
//! scripted `BiotekDevice`) as stand-ins for real hardware — no network, no
//! async runtime, matching the synchronous adapter stack the whole
//! executor is built on. Grounded on spec §8's Scenario C/D (retry on
//! transient wash error, fatal wash error) and invariant 4 ("for every
//! `WaitForResource(r)` that returns, `r`'s queue is empty and state is
//! ready").

use std::sync::{Arc, Mutex};

use cellpainter_controller::{Devices, Executor};
use cellpainter_ore::clock::{Clock, TimeMode};
use cellpainter_repr::command::{Assume, BiotekMode, Command, Resource};
use cellpainter_service::{BiotekDevice, BiotekOutcome, NoopBiotek, NoopIncu, NoopRobotArm};

/// A washer/dispenser stand-in that replays a fixed script of outcomes, one
/// per call, holding `Success` once the script runs out.
struct ScriptedBiotek {
    outcomes: Mutex<std::collections::VecDeque<BiotekOutcome>>,
}

impl ScriptedBiotek {
    fn new(outcomes: Vec<BiotekOutcome>) -> ScriptedBiotek {
        ScriptedBiotek {
            outcomes: Mutex::new(outcomes.into()),
        }
    }
}

impl BiotekDevice for ScriptedBiotek {
    fn run(&self, _mode: BiotekMode, _protocol_path: Option<&str>) -> anyhow::Result<BiotekOutcome> {
        Ok(self.outcomes.lock().unwrap().pop_front().unwrap_or(BiotekOutcome::Success))
    }
}

fn devices_with_wash(wash: Arc<dyn BiotekDevice>) -> Devices {
    Devices {
        wash,
        disp: Arc::new(NoopBiotek),
        incu: Arc::new(NoopIncu),
        robotarm: Arc::new(NoopRobotArm),
    }
}

/// Scenario C — a wash call reports the known-transient 6061 signature once
/// before succeeding; the run completes as if the first call never
/// happened, and the checkpoint after it is still recorded.
#[test]
fn transient_wash_error_is_retried_to_success() {
    let wash = Arc::new(ScriptedBiotek::new(vec![
        BiotekOutcome::Transient("Error code: 6061".to_string()),
        BiotekOutcome::Success,
    ]));
    let devices = devices_with_wash(wash);
    let clock = Arc::new(Clock::new(TimeMode::FastForward));
    let executor = Executor::new(devices, clock);

    let tree = Command::sequence(vec![
        Command::wash(None, BiotekMode::Run),
        Command::checkpoint("batch 0"),
    ]);
    executor.execute(&tree).unwrap();

    let log = executor.shutdown();
    assert!(log.checkpoints().contains_key("batch 0"));
    assert!(log.errors().is_empty());
}

/// Scenario D — a wash call reports an unrecognized failure; the run aborts
/// and the last recorded error is fatal. The wash runs on its worker thread
/// (via `Fork`), matching where fatal errors actually get logged
/// (`WorkerHandle`'s loop, not the unforked main-thread path).
#[test]
fn fatal_wash_error_aborts_the_run() {
    let wash = Arc::new(ScriptedBiotek::new(vec![BiotekOutcome::Fatal("status 99: unrecognized".to_string())]));
    let devices = devices_with_wash(wash);
    let clock = Arc::new(Clock::new(TimeMode::FastForward));
    let executor = Executor::new(devices, clock);

    let tree = Command::sequence(vec![
        Command::fork(Command::wash(None, BiotekMode::Run), Resource::Wash, Assume::Idle),
        Command::wait_for_resource(Resource::Wash, Assume::WillWait),
    ]);
    // The wait drains the worker's queue regardless of outcome; the fatal
    // entry is recorded before the worker clears its pending count.
    let _ = executor.execute(&tree);

    let log = executor.shutdown();
    let errors = log.errors();
    assert!(!errors.is_empty());
    assert!(errors.last().unwrap().fatal);
}

/// Invariant 4 — once `WaitForResource` returns, the resource's worker has
/// drained its queue and is free to take the next fork.
#[test]
fn wait_for_resource_only_returns_once_the_workers_queue_is_drained() {
    let devices = Devices::noop();
    let clock = Arc::new(Clock::new(TimeMode::FastForward));
    let executor = Executor::new(devices, clock);

    let tree = Command::sequence(vec![
        Command::fork(Command::wash(None, BiotekMode::Run), Resource::Wash, Assume::Idle),
        Command::wait_for_resource(Resource::Wash, Assume::WillWait),
        Command::checkpoint("after wait"),
    ]);
    executor.execute(&tree).unwrap();

    let log = executor.shutdown();
    assert!(log.checkpoints().contains_key("after wait"));
}
