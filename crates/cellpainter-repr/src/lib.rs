// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The data model for the cell-painter command algebra: plates and the
//! physical layout they're drawn from, symbolic time expressions, the
//! command tree and its traversal operations, interleaving templates, the
//! per-step `ProtocolConfig`, and the shared [`PainterError`] type every
//! other crate in the workspace propagates.

pub mod command;
pub mod error;
pub mod interleaving;
pub mod layout;
pub mod metadata;
pub mod protocol_config;
pub mod sym;

pub use command::{Assume, BiotekMode, Command, CommandKind, IncuAction, Resource};
pub use error::{PainterError, Result};
pub use interleaving::Interleaving;
pub use layout::Plate;
pub use metadata::Metadata;
pub use protocol_config::ProtocolConfig;
pub use sym::SymVar;
