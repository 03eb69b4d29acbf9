// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The part of command execution common to the main thread and every
//! device worker: `Sequence`, `Checkpoint`, `Duration`, `WaitForCheckpoint`,
//! `Idle`, and the four device leaves. `Fork`/`WaitForResource` dispatch
//! belongs to [`crate::executor::Executor`], which owns the worker handles;
//! a forked subtree is not expected to itself contain another `Fork`, so
//! [`Interpreter::run`] treats that as a (recoverable-looking but in
//! practice never hit) fatal error rather than silently dropping it.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tracing::warn;

use cellpainter_ore::clock::Clock;
use cellpainter_ore::retry::Retry;
use cellpainter_repr::command::{BiotekMode, Command, CommandKind, IncuAction};
use cellpainter_repr::error::{PainterError, Result};
use cellpainter_repr::metadata::Metadata;
use cellpainter_repr::sym::SymVar;
use cellpainter_service::BiotekOutcome;

use crate::devices::Devices;
use crate::log::LogEntry;
use crate::state::SharedState;

/// How far a `Duration(.., exactly=..)` binding's observed length may drift
/// from its planned value before the executor logs a warning. Advisory
/// only: plan-time `exactly` is enforced by the optimizer, not here.
const EXACTLY_DRIFT_TOLERANCE_SECS: f64 = 0.1;

pub struct Interpreter {
    pub(crate) shared: Arc<SharedState>,
    pub(crate) clock: Arc<Clock>,
    pub(crate) devices: Devices,
}

impl Interpreter {
    pub fn new(shared: Arc<SharedState>, clock: Arc<Clock>, devices: Devices) -> Interpreter {
        Interpreter { shared, clock, devices }
    }

    /// Runs `cmd` and everything under it, except `Fork`/`WaitForResource`
    /// dispatch. Used directly by device workers (whose queued subtrees
    /// never fork further) and wrapped by [`crate::executor::Executor::run`]
    /// for every other node.
    pub fn run(&self, cmd: &Command) -> Result<()> {
        if self.shared.is_aborted() {
            return Err(PainterError::Device {
                device: "executor",
                detail: "aborted after a prior fatal error".to_string(),
            });
        }
        match &cmd.kind {
            CommandKind::Sequence(children) => {
                for child in children {
                    self.run(child)?;
                }
                Ok(())
            }
            CommandKind::Checkpoint(name) => self.checkpoint(name, &cmd.metadata),
            CommandKind::Duration { name, exactly, .. } => self.duration(name, exactly, &cmd.metadata),
            CommandKind::WaitForCheckpoint {
                name,
                wake,
                report_behind_time,
            } => self.wait_for_checkpoint(name, wake, *report_behind_time),
            CommandKind::Idle { secs, .. } => {
                self.clock.sleep(secs.as_const().unwrap_or(0.0));
                Ok(())
            }
            CommandKind::WashCmd { protocol_path, mode } => {
                self.run_biotek("wash", self.devices.wash.as_ref(), *mode, protocol_path.as_deref(), &cmd.metadata)
            }
            CommandKind::DispCmd { protocol_path, mode } => {
                self.run_biotek("disp", self.devices.disp.as_ref(), *mode, protocol_path.as_deref(), &cmd.metadata)
            }
            CommandKind::IncuCmd { action, loc } => self.run_incu(*action, loc.as_deref(), &cmd.metadata),
            CommandKind::RobotarmCmd(name) => self.run_robotarm(name, &cmd.metadata),
            CommandKind::Fork { .. } | CommandKind::WaitForResource { .. } => Err(PainterError::Device {
                device: "executor",
                detail: "a forked subtree may not itself contain Fork or WaitForResource".to_string(),
            }),
        }
    }

    fn log(&self, entry: LogEntry) {
        self.shared.log.lock().unwrap().push(entry);
    }

    fn checkpoint(&self, name: &str, metadata: &Metadata) -> Result<()> {
        let t = self.clock.now_secs();
        let mut checkpoints = self.shared.checkpoints.lock().unwrap();
        if checkpoints.contains_key(name) {
            return Err(PainterError::DuplicateCheckpoint(name.to_string()));
        }
        checkpoints.insert(name.to_string(), t);
        drop(checkpoints);
        self.log(LogEntry::checkpoint(t, name, metadata.clone()));
        Ok(())
    }

    fn duration(&self, name: &str, exactly: &Option<SymVar>, metadata: &Metadata) -> Result<()> {
        let t0 = *self
            .shared
            .checkpoints
            .lock()
            .unwrap()
            .get(name)
            .ok_or_else(|| PainterError::MissingCheckpoint(name.to_string()))?;
        let t = self.clock.now_secs();
        if let Some(target) = exactly {
            let want = target.as_const().unwrap_or(0.0);
            let observed = t - t0;
            if (observed - want).abs() > EXACTLY_DRIFT_TOLERANCE_SECS {
                warn!(name, observed, want, "duration drifted from its exactly binding");
            }
        }
        self.log(LogEntry::duration(t, t0, name, metadata.clone()));
        Ok(())
    }

    fn wait_for_checkpoint(&self, name: &str, wake: &SymVar, report_behind_time: bool) -> Result<()> {
        let t0 = *self
            .shared
            .checkpoints
            .lock()
            .unwrap()
            .get(name)
            .ok_or_else(|| PainterError::MissingCheckpoint(name.to_string()))?;
        let target = t0 + wake.as_const().unwrap_or(0.0);
        let now = self.clock.now_secs();
        let delta = target - now;
        if delta >= 0.0 {
            self.clock.sleep(delta);
        } else if report_behind_time {
            warn!(name, behind_by = -delta, "behind time waiting for checkpoint");
        }
        Ok(())
    }

    fn run_biotek(
        &self,
        device: &'static str,
        biotek: &dyn cellpainter_service::BiotekDevice,
        mode: BiotekMode,
        protocol_path: Option<&str>,
        metadata: &Metadata,
    ) -> Result<()> {
        let outcome = Retry::default()
            .initial_backoff(StdDuration::from_millis(200))
            .retry(|_state| -> std::result::Result<BiotekOutcome, String> {
                match biotek.run(mode, protocol_path) {
                    Ok(BiotekOutcome::Transient(detail)) => {
                        warn!(device, %detail, "transient device error, retrying");
                        Err(detail)
                    }
                    Ok(outcome) => Ok(outcome),
                    Err(e) => Ok(BiotekOutcome::Fatal(e.to_string())),
                }
            })
            .expect("Retry::default() has no max_tries and never gives up");
        match outcome {
            BiotekOutcome::Success => {
                self.log(LogEntry::device(
                    self.clock.now_secs(),
                    device,
                    protocol_path.map(str::to_string).or_else(|| Some(mode.name().to_string())),
                    metadata.clone(),
                ));
                Ok(())
            }
            BiotekOutcome::Fatal(detail) => Err(PainterError::Device { device, detail }),
            BiotekOutcome::Transient(_) => unreachable!("transient outcomes are retried, never returned"),
        }
    }

    fn run_incu(&self, action: IncuAction, loc: Option<&str>, metadata: &Metadata) -> Result<()> {
        let loc = loc.unwrap_or_default();
        let result = match action {
            IncuAction::Put => self.devices.incu.put(loc),
            IncuAction::Get => self.devices.incu.get(loc),
            IncuAction::GetClimate => self.devices.incu.get_climate().map(|_| ()),
        };
        result.map_err(|e| PainterError::Device {
            device: "incu",
            detail: e.to_string(),
        })?;
        self.log(LogEntry::device(
            self.clock.now_secs(),
            "incu",
            Some(action.name().to_string()),
            metadata.clone(),
        ));
        Ok(())
    }

    fn run_robotarm(&self, program_name: &str, metadata: &Metadata) -> Result<()> {
        self.devices.robotarm.execute(program_name)?;
        self.log(LogEntry::device(
            self.clock.now_secs(),
            "robotarm",
            Some(program_name.to_string()),
            metadata.clone(),
        ));
        Ok(())
    }
}
