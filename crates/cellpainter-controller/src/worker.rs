// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! One OS thread per physical resource (wash, disp, incu), each draining a
//! FIFO queue of dispatched subtrees. Grounded on `original_source/robots.py`'s
//! `Biotek` dataclass: a `queue: SimpleQueue`, a `ready|busy` state, and a
//! `loop()` that dequeues, runs, and flips back to ready. The `ready|busy`
//! flag and "queue is empty" are collapsed here into a single pending
//! counter, since under a single-consumer worker the two always agree:
//! nothing is ever dequeued-but-not-yet-running.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::error;

use cellpainter_ore::task::{self, WorkerThread};
use cellpainter_repr::command::{Command, Resource};

use crate::interpreter::Interpreter;

/// A handle to a device worker thread and its FIFO dispatch queue.
pub struct WorkerHandle {
    resource: Resource,
    sender: crossbeam_channel::Sender<Command>,
    pending: Arc<AtomicUsize>,
    thread: Option<WorkerThread<()>>,
}

impl WorkerHandle {
    pub fn spawn(resource: Resource, interpreter: Arc<Interpreter>) -> WorkerHandle {
        let (sender, receiver) = crossbeam_channel::unbounded::<Command>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);
        let name = format!("cellpainter-worker-{}", resource.name());
        let shared = Arc::clone(&interpreter.shared);
        let thread = task::spawn(&name, move |abort| {
            while !abort.is_aborted() {
                let cmd = match receiver.recv() {
                    Ok(cmd) => cmd,
                    Err(_) => break,
                };
                let now = interpreter.clock.now_secs();
                if let Err(e) = interpreter.run(&cmd) {
                    error!(resource = resource.name(), error = %e, "device worker hit a fatal error");
                    shared.record_fatal(now, e.to_string());
                }
                worker_pending.fetch_sub(1, Ordering::SeqCst);
            }
        });
        WorkerHandle {
            resource,
            sender,
            pending,
            thread: Some(thread),
        }
    }

    /// Enqueues `cmd` for this worker to run. Must only be called on an
    /// already-ready worker; callers (the executor) are responsible for
    /// honoring `Assume::Idle`'s precondition before dispatching.
    pub fn dispatch(&self, cmd: Command) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        // An unbounded channel only disconnects once every sender (and
        // this is the only one) is dropped, so send() cannot fail here.
        self.sender.send(cmd).expect("worker thread outlives its handle");
    }

    /// True once the queue is empty and nothing is currently running,
    /// matching `original_source/robots.py`'s `Biotek.is_ready`.
    pub fn is_ready(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// Drops the dispatch channel, letting the worker drain anything
    /// already queued and exit on its own once `recv()` sees the
    /// disconnect, then joins the thread.
    pub fn join(self) {
        let WorkerHandle { sender, thread, .. } = self;
        drop(sender);
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            thread.abort_handle().abort();
        }
    }
}
