// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! Turns a [`cellpainter_repr::ProtocolConfig`] plus a batch of plates into
//! an executable command tree: the per-plate-per-step recipe builder, the
//! interleaving engine that linearizes a batch's chunks, the move-list
//! registry, and the move-fusion ("sleek") rewriter.

pub mod builder;
pub mod interleave_engine;
pub mod movelist;
pub mod sleek;

pub use builder::paint_batch;
pub use interleave_engine::{linearize_batch, Desc};
pub use movelist::{InMemoryMoveListRegistry, MoveListRegistry, Pose};
pub use sleek::sleek;
