// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The runtime side of the cell-painting controller: a single cooperative
//! main thread plus one background worker thread per physical resource
//! (wash, disp, incu), executing a [`cellpainter_repr::command::Command`]
//! tree that has already been assigned ids and resolved by
//! `cellpainter-optimizer`. Grounded on `original_source/robots.py` (the
//! per-device worker loop) and `original_source/protocol.py`'s
//! `execute_program` (the top-level run driver).

pub mod devices;
pub mod executor;
pub mod log;
mod interpreter;
mod state;
mod worker;

pub use devices::Devices;
pub use executor::Executor;
pub use log::{Log, LogEntry, LogError};
pub use state::SharedState;
