// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The coarse shared state every thread of the executor touches: the
//! checkpoint map, the run log, and the abort flag. Spec §4.6/§5: "Shared
//! state (`checkpoints`, `resource_busy`) is protected by a single coarse
//! mutex; contention is negligible because only the main thread and each
//! worker's completion callback touch it."

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::log::{Log, LogEntry};

/// State shared by the main thread and every device worker thread.
#[derive(Debug, Default)]
pub struct SharedState {
    pub(crate) checkpoints: Mutex<HashMap<String, f64>>,
    pub(crate) log: Mutex<Log>,
    abort: AtomicBool,
}

impl SharedState {
    pub fn new() -> SharedState {
        SharedState::default()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Records a fatal error and raises the abort flag every suspension
    /// point checks, matching spec §7: "Fatal faults unwind the main
    /// thread, signal workers to drain, then exit."
    pub(crate) fn record_fatal(&self, now: f64, message: impl Into<String>) {
        self.abort.store(true, Ordering::SeqCst);
        self.log.lock().unwrap().push(LogEntry::error(now, message, true));
    }

    /// Takes the accumulated log, leaving an empty one behind. Called once
    /// the run has finished (successfully or not).
    pub fn take_log(&self) -> Log {
        std::mem::take(&mut *self.log.lock().unwrap())
    }
}
