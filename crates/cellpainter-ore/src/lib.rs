// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! Internal utility libraries shared across the cell-painter crates.
//!
//! This is meant to be a small extension of the stdlib for the rest of the
//! workspace: retrying with backoff, spawning abortable background tasks, a
//! clock abstraction that can be fast-forwarded in test/simulator configs,
//! and the operator-confirmation prompt every CLI entry point gates
//! hardware-touching runs behind. Keep dependencies here minimal.

pub mod cli;
pub mod clock;
pub mod retry;
pub mod task;
