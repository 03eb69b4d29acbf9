// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The concrete devices an [`crate::Executor`] drives, bundled so a run
//! config (`live`, `test-all`, `simulator`, `dry-run`, …) can swap in
//! noop/short stand-ins per device exactly as `original_source/robots.py`'s
//! `configs` table does with `disp_and_wash_mode`/`incu_mode`/`robotarm_mode`.

use std::sync::Arc;

use cellpainter_service::{BiotekDevice, IncuDevice, NoopBiotek, NoopIncu, NoopRobotArm, RobotArm};

/// One handle per physical resource. Cloning is cheap; every field is an
/// `Arc` to a trait object so the same `Devices` can be shared with every
/// device worker thread.
#[derive(Clone)]
pub struct Devices {
    pub wash: Arc<dyn BiotekDevice>,
    pub disp: Arc<dyn BiotekDevice>,
    pub incu: Arc<dyn IncuDevice>,
    pub robotarm: Arc<dyn RobotArm>,
}

impl Devices {
    /// Every device is a no-op, matching the `dry-run` config.
    pub fn noop() -> Devices {
        Devices {
            wash: Arc::new(NoopBiotek),
            disp: Arc::new(NoopBiotek),
            incu: Arc::new(NoopIncu),
            robotarm: Arc::new(NoopRobotArm),
        }
    }
}
