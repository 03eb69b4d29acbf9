// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The crate-internal error currency for the cell-painter workspace.
//!
//! One enum per concern, used wherever a command can fail for a reason the
//! caller should be able to match on; `anyhow::Error` is reserved for the
//! process boundary (device transport failures, `main`). The per-variant
//! shape (named fields, a `Display` message per variant) follows
//! `sql::catalog::CatalogError`; the `thiserror::Error` derive saves the
//! hand-written `Display`/`std::error::Error` impls that enum writes out by
//! hand, using the `thiserror` dependency most of the teacher's own crates
//! (`compute-client`, `storage-client`, `sql`, `persist-client`) already
//! declare for exactly this purpose.

use thiserror::Error;

/// Everything that can go wrong building, optimizing, or executing a
/// cell-painter command tree.
#[derive(Debug, Error)]
pub enum PainterError {
    /// Two plates in `define_plates` ended up sharing a physical slot.
    #[error("plates {a:?} and {b:?} both claim {kind} slot {loc:?}")]
    SlotCollision {
        a: String,
        b: String,
        kind: &'static str,
        loc: String,
    },

    /// A `ProtocolConfig`'s parallel per-step lists did not agree in length.
    #[error("protocol config field {a_name:?} has {a_len} entries but {b_name:?} has {b_len}")]
    MismatchedLengths {
        a_name: &'static str,
        a_len: usize,
        b_name: &'static str,
        b_len: usize,
    },

    /// `ProtocolConfig::interleavings` named a template that was never
    /// registered.
    #[error("interleaving template {0:?} is not registered")]
    UnknownInterleaving(String),

    /// An `Interleaving::parse` input did not repeat every transition the
    /// same number of times.
    #[error("interleaving template malformed: {0}")]
    MalformedInterleaving(String),

    /// The dependency graph the interleaving engine builds for a batch has
    /// a cycle; this is a protocol-configuration fault, not a bug in the
    /// executor.
    #[error("interleaving graph for batch {batch} has a cycle through {0:?}", .nodes.join(" -> "))]
    InterleavingCycle { batch: usize, nodes: Vec<String> },

    /// A `Checkpoint(name)` was recorded twice in the same run.
    #[error("checkpoint {0:?} was recorded more than once in this run")]
    DuplicateCheckpoint(String),

    /// A `Duration`/`WaitForCheckpoint` referenced a checkpoint that was
    /// never recorded on the path actually executed.
    #[error("checkpoint {0:?} has not been recorded")]
    MissingCheckpoint(String),

    /// The move-list registry has no entry for this robot-arm program.
    #[error("no move list registered for robot-arm program {0:?}")]
    UnknownProgram(String),

    /// The estimator was asked for a `(device, argument)` pair it has never
    /// seen, logged nor overridden. Per spec §4.9 this must fail loudly
    /// rather than fall back to a default.
    #[error("no duration estimate for ({0}, {1:?}); add a log entry or override")]
    MissingEstimate(&'static str, String),

    /// The constraint optimizer could not find a feasible assignment.
    #[error("plan infeasible: {0}")]
    Infeasible(String),

    /// A `Fork` was dispatched, or a synchronous command was issued,
    /// against a resource that was already busy.
    #[error("resource {0} is already busy")]
    ResourceBusy(&'static str),

    /// The operator declined an `ATTENTION` confirmation prompt.
    #[error("operator declined to continue")]
    UserAbort,

    /// A device replied with a response the worker does not recognize as
    /// either success or the known-transient 6061 signature.
    #[error("fatal device error from {device}: {detail}")]
    Device { device: &'static str, detail: String },

    /// The robot arm's TCP stream produced a frame matching one of the
    /// known failure patterns (`syntax_error_on_line`, `compile_error_name_not_found`, …).
    #[error("robot arm reported failure running {program:?}: {frame}")]
    RobotArm { program: String, frame: String },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PainterError>;
