// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The top-level executor: owns the per-resource worker threads and walks
//! whatever subtree the main thread runs directly (everything that isn't
//! itself inside a fork). Grounded on `original_source/robots.py`'s
//! `wait_for`/`Ready.wait` (a plain polling loop) and `protocol.py`'s
//! `execute_program`, which assigns ids, optimizes, then calls
//! `program.execute(runtime, {})` on the main thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use cellpainter_ore::clock::Clock;
use cellpainter_repr::command::{Assume, Command, CommandKind, Resource};
use cellpainter_repr::error::{PainterError, Result};

use crate::devices::Devices;
use crate::interpreter::Interpreter;
use crate::log::Log;
use crate::state::SharedState;
use crate::worker::WorkerHandle;

/// How often the main thread polls a busy resource while honoring a
/// `WaitForResource`, matching `Ready.wait`'s `time.sleep(0.01)`.
const POLL_INTERVAL: StdDuration = StdDuration::from_millis(10);

pub struct Executor {
    interpreter: Arc<Interpreter>,
    workers: HashMap<Resource, WorkerHandle>,
}

impl Executor {
    pub fn new(devices: Devices, clock: Arc<Clock>) -> Executor {
        let shared = Arc::new(SharedState::new());
        let interpreter = Arc::new(Interpreter::new(Arc::clone(&shared), clock, devices));
        let workers = Resource::ALL
            .iter()
            .map(|&resource| (resource, WorkerHandle::spawn(resource, Arc::clone(&interpreter))))
            .collect();
        Executor { interpreter, workers }
    }

    /// Runs `cmd` to completion on the main thread, dispatching any `Fork`
    /// to its resource's worker and polling through any `WaitForResource`.
    #[tracing::instrument(level = "debug", skip(self, cmd))]
    pub fn execute(&self, cmd: &Command) -> Result<()> {
        self.run(cmd)
    }

    fn run(&self, cmd: &Command) -> Result<()> {
        if self.interpreter.shared.is_aborted() {
            return Err(PainterError::Device {
                device: "executor",
                detail: "aborted after a prior fatal error".to_string(),
            });
        }
        match &cmd.kind {
            CommandKind::Sequence(children) => {
                for child in children {
                    self.run(child)?;
                }
                Ok(())
            }
            CommandKind::Fork { command, resource, assume } => self.fork(command, *resource, *assume),
            CommandKind::WaitForResource { resource, .. } => self.wait_for_resource(*resource),
            _ => self.interpreter.run(cmd),
        }
    }

    fn worker(&self, resource: Resource) -> &WorkerHandle {
        self.workers
            .get(&resource)
            .unwrap_or_else(|| panic!("no worker spawned for resource {}", resource.name()))
    }

    fn fork(&self, command: &Command, resource: Resource, assume: Assume) -> Result<()> {
        let worker = self.worker(resource);
        if assume == Assume::Idle && !worker.is_ready() {
            return Err(PainterError::ResourceBusy(resource.name()));
        }
        worker.dispatch(command.clone());
        Ok(())
    }

    fn wait_for_resource(&self, resource: Resource) -> Result<()> {
        let worker = self.worker(resource);
        while !worker.is_ready() {
            if self.interpreter.shared.is_aborted() {
                return Err(PainterError::Device {
                    device: "executor",
                    detail: "aborted while waiting for a resource".to_string(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(())
    }

    /// Joins every worker thread and returns the accumulated log. Call
    /// once the top-level command tree has finished running (or failed).
    pub fn shutdown(self) -> Log {
        for (_, worker) in self.workers {
            worker.join();
        }
        self.interpreter.shared.take_log()
    }
}
