// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! Wire-level device adapters: the `GenericClient`-style JSON-over-HTTP
//! helper shared by the washer/dispenser/incubator, and the robot arm's raw
//! TCP adapter. Grounded on `original_source/robots.py` (`curl`, `Biotek`,
//! `incu_cmd`, `get_robotarm`) and `cellpainter/bioteks.py` (the
//! success/transient/fatal response classification).
//!
//! This crate only speaks the wire protocol; it knows nothing about
//! checkpoints, forking, or retries — that belongs to the device workers in
//! `cellpainter-controller`, which `run()` against the traits here until
//! they get a non-transient answer.

pub mod biotek;
pub mod client;
pub mod incu;
pub mod robotarm;

pub use biotek::{BiotekDevice, BiotekOutcome, HttpBiotek, NoopBiotek, ShortBiotek};
pub use client::{JsonClient, ReqwestJsonClient};
pub use incu::{HttpIncu, IncuDevice, NoopIncu};
pub use robotarm::{NoGripperRobotArm, NoopRobotArm, RobotArm, TcpRobotArm};
