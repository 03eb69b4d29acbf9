// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! Worker-thread spawning helpers.
//!
//! Device workers and the robot-arm connection are plain OS threads, not
//! tokio tasks — the executor is deliberately kept synchronous (see
//! `DESIGN NOTES`: "Coroutine-like Fork ... no async runtime required").
//! [`AbortHandle`] gives those threads a cooperative stop flag, since a
//! `std::thread::JoinHandle` cannot be forcibly aborted the way the compute
//! controller aborts a replica's tokio task on drop; the thread body must
//! check [`AbortHandle::is_aborted`] at its own suspension points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A cooperative stop signal shared between a spawned thread and its owner.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Creates a fresh, not-yet-aborted handle.
    pub fn new() -> AbortHandle {
        AbortHandle(Arc::new(AtomicBool::new(false)))
    }

    /// Requests that the owning thread stop at its next suspension point.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`AbortHandle::abort`] has been called.
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A named worker thread plus the abort handle used to stop it.
pub struct WorkerThread<T> {
    handle: JoinHandle<T>,
    abort: AbortHandle,
}

impl<T> WorkerThread<T> {
    /// The cooperative abort handle for this thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Signals the thread to stop and waits for it to exit.
    pub fn join(self) -> thread::Result<T> {
        self.abort.abort();
        self.handle.join()
    }
}

/// Spawns a named worker thread, handing the body an [`AbortHandle`] it
/// should poll at its own blocking points (e.g. between dequeuing
/// requests).
pub fn spawn<F, T>(name: &str, f: F) -> WorkerThread<T>
where
    F: FnOnce(AbortHandle) -> T + Send + 'static,
    T: Send + 'static,
{
    let abort = AbortHandle::new();
    let abort2 = abort.clone();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || f(abort2))
        .expect("failed to spawn worker thread");
    WorkerThread { handle, abort }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn abort_handle_stops_loop() {
        let worker = spawn("test", |abort| {
            let mut iterations = 0;
            while !abort.is_aborted() {
                iterations += 1;
                thread::sleep(Duration::from_millis(1));
            }
            iterations
        });
        thread::sleep(Duration::from_millis(20));
        let iterations = worker.join().unwrap();
        assert!(iterations > 0);
    }
}
