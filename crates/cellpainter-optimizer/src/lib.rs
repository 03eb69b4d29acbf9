// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The constraint optimizer: walks an assembled command tree, predicts a
//! symbolic time for every checkpoint and `Duration` marker, solves the
//! `exactly`-bound durations for the free delay variables that satisfy
//! them, and returns the tree with every `SymVar` resolved to a concrete
//! constant.
//!
//! Grounded on `optimize_schedule`'s constraint-generation pass in
//! `original_source/protocol.py` (the `utils.timeit('constraints')` span it
//! wraps becomes the `#[tracing::instrument]` below) — implemented, per
//! spec §4.5, as forward longest-path propagation plus a slack solver
//! ([`solver::solve`]) rather than a general LP/simplex, since every
//! `exactly` binding here pins down exactly one still-free variable once
//! its neighbors are known.
//!
//! Each [`Resource`] also gets its own timeline (`Walker::resource_free`):
//! a fork dispatched onto a resource that's still busy with an earlier fork
//! is predicted to start when that earlier fork's subtree ends, not at the
//! dispatching thread's own "now", matching §4.5's `start(firstOf(f)) ≥
//! end(previousForkOn(resource))` and the real FIFO serialization every
//! `WorkerHandle` (`cellpainter-controller::worker`) enforces at run time.

mod linexpr;
mod solver;

use std::collections::HashMap;

use cellpainter_estimator::{Estimator, EstimatorError, Source};
use cellpainter_repr::command::{Command, CommandKind, Resource};
use cellpainter_repr::error::{PainterError, Result};
use cellpainter_repr::sym::SymVar;

use linexpr::LinExpr;

/// The outcome of [`Optimizer::optimize`]: the original tree (ids
/// assigned), the same tree with every `SymVar` resolved to a concrete
/// constant, the solved variable assignment, every checkpoint's predicted
/// time, and the objective value those choices achieve.
#[derive(Debug, Clone)]
pub struct OptimizedPlan {
    pub tree: Command,
    pub resolved_tree: Command,
    pub assignment: HashMap<String, f64>,
    pub checkpoints: HashMap<String, f64>,
    pub expected_end_secs: f64,
    pub objective_value: f64,
}

/// One checkpoint/duration whose dry-run-observed time disagreed with the
/// plan's prediction by more than the caller's tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct Discrepancy {
    pub checkpoint: String,
    pub predicted_secs: f64,
    pub observed_secs: f64,
    pub diff_secs: f64,
}

/// Walks command trees against a fixed duration estimator.
pub struct Optimizer<'a> {
    estimator: &'a Estimator,
}

impl<'a> Optimizer<'a> {
    pub fn new(estimator: &'a Estimator) -> Optimizer<'a> {
        Optimizer { estimator }
    }

    /// Assigns ids, predicts every checkpoint and `Duration` time, solves
    /// the resulting `exactly` equalities for their free variables, and
    /// returns the plan. Fails with [`PainterError::MissingEstimate`] if a
    /// leaf's duration was never logged or overridden, with
    /// [`PainterError::MissingCheckpoint`] if a `Duration`/
    /// `WaitForCheckpoint` names a checkpoint that's never opened on the
    /// path actually walked, and with [`PainterError::Infeasible`] if the
    /// `exactly` bindings contradict each other.
    #[tracing::instrument(level = "debug", skip(self, tree))]
    pub fn optimize(&self, tree: Command) -> Result<OptimizedPlan> {
        let tree = tree.assign_ids();

        let mut walker = Walker {
            estimator: self.estimator,
            checkpoints: HashMap::new(),
            equalities: Vec::new(),
            objective_terms: Vec::new(),
            resource_free: HashMap::new(),
        };
        let end = walker.walk(&tree, LinExpr::constant(0.0))?;

        let assignment = solver::solve(&walker.equalities)?;

        let checkpoints: HashMap<String, f64> = walker
            .checkpoints
            .iter()
            .map(|(name, expr)| (name.clone(), expr.resolve(&assignment)))
            .collect();
        let expected_end_secs = end.resolve(&assignment);
        let objective_value = walker
            .objective_terms
            .iter()
            .map(|(weight, expr)| weight * expr.resolve(&assignment))
            .sum();

        let resolved_tree = resolve_tree(tree.clone(), &assignment);

        tracing::debug!(expected_end_secs, objective_value, "optimized command tree");

        Ok(OptimizedPlan {
            tree,
            resolved_tree,
            assignment,
            checkpoints,
            expected_end_secs,
            objective_value,
        })
    }
}

/// Compares a dry run's observed checkpoint times against `plan`'s
/// predictions, matching the post-hoc verification loop at the end of
/// `execute_program` in `original_source/protocol.py`. Every checkpoint the
/// plan predicted that `observed` also recorded is checked; a checkpoint
/// present in one but not the other is silently ignored (a dry run that
/// takes a different branch, e.g. `six=false`, legitimately records fewer
/// checkpoints).
pub fn verify_against_dry_run(
    plan: &OptimizedPlan,
    observed: &HashMap<String, f64>,
    tolerance_secs: f64,
) -> Vec<Discrepancy> {
    let mut out = Vec::new();
    for (name, predicted) in &plan.checkpoints {
        if let Some(&observed_secs) = observed.get(name) {
            let diff = observed_secs - predicted;
            if diff.abs() > tolerance_secs {
                out.push(Discrepancy {
                    checkpoint: name.clone(),
                    predicted_secs: *predicted,
                    observed_secs,
                    diff_secs: diff,
                });
            }
        }
    }
    out.sort_by(|a, b| a.checkpoint.cmp(&b.checkpoint));
    out
}

struct Walker<'a> {
    estimator: &'a Estimator,
    checkpoints: HashMap<String, LinExpr>,
    equalities: Vec<(LinExpr, LinExpr)>,
    objective_terms: Vec<(f64, LinExpr)>,
    /// The predicted time each resource's `WorkerHandle` FIFO (see
    /// `cellpainter-controller::worker`) drains the last command dispatched
    /// to it, keyed by `Resource`. A resource absent from this map has never
    /// been forked onto yet, so the next fork onto it starts at whatever
    /// time its own thread dispatches it.
    resource_free: HashMap<Resource, LinExpr>,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, cmd: &Command, now: LinExpr) -> Result<LinExpr> {
        match &cmd.kind {
            CommandKind::Sequence(children) => {
                let mut cur = now;
                for child in children {
                    cur = self.walk(child, cur)?;
                }
                Ok(cur)
            }
            CommandKind::Fork { command, resource, .. } => {
                // The forked command runs concurrently on its own device
                // thread; it does not hold up the thread that forked it, so
                // the fork itself still returns `now` unchanged. But the
                // forked command can't start any earlier than the same
                // resource's FIFO has drained whatever was dispatched to it
                // last, even if this thread reaches the fork sooner than
                // that.
                let start = match self.resource_free.get(resource) {
                    Some(free) => free.later(&now),
                    None => now.clone(),
                };
                let end = self.walk(command, start)?;
                self.resource_free.insert(*resource, end);
                Ok(now)
            }
            CommandKind::WaitForResource { resource, .. } => Ok(match self.resource_free.get(resource) {
                Some(free) => free.later(&now),
                None => now,
            }),
            CommandKind::Checkpoint(name) => {
                if self.checkpoints.insert(name.clone(), now.clone()).is_some() {
                    return Err(PainterError::DuplicateCheckpoint(name.clone()));
                }
                Ok(now)
            }
            CommandKind::WaitForCheckpoint { name, wake, .. } => {
                let checkpoint = self
                    .checkpoints
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PainterError::MissingCheckpoint(name.clone()))?;
                Ok(checkpoint.add(&LinExpr::from_symvar(wake)).later(&now))
            }
            CommandKind::Idle { secs, .. } => Ok(now.add(&LinExpr::from_symvar(secs))),
            CommandKind::Duration {
                name,
                opt_weight,
                exactly,
            } => {
                let checkpoint = self
                    .checkpoints
                    .get(name)
                    .cloned()
                    .ok_or_else(|| PainterError::MissingCheckpoint(name.clone()))?;
                let elapsed = now.sub(&checkpoint);
                if let Some(target) = exactly {
                    self.equalities.push((elapsed.clone(), LinExpr::from_symvar(target)));
                }
                if let Some(weight) = opt_weight {
                    self.objective_terms.push((*weight, elapsed));
                }
                Ok(now)
            }
            other => Ok(now.add_const(self.leaf_duration(other)?)),
        }
    }

    fn leaf_duration(&self, kind: &CommandKind) -> Result<f64> {
        let Some((source, arg)) = leaf_estimate_key(kind) else {
            return Ok(0.0);
        };
        if !self.estimator.contains(source, &arg) {
            return Err(PainterError::MissingEstimate(source.name(), arg));
        }
        self.estimator.estimate(source, &arg).map_err(|e| match e {
            EstimatorError::MissingEstimate(dev, arg) => PainterError::MissingEstimate(dev, arg),
            other => PainterError::MissingEstimate(source.name(), format!("{arg}: {other}")),
        })
    }
}

/// The `(Source, arg)` key a leaf command's duration is looked up under.
/// Device commands with an explicit protocol path are keyed on that path;
/// bare-mode commands (e.g. `TestCommunications`, or a `RunValidated` with
/// no path) fall back to the mode's name, matching the override table's
/// `"TestCommunications"`-style entries.
fn leaf_estimate_key(kind: &CommandKind) -> Option<(Source, String)> {
    match kind {
        CommandKind::RobotarmCmd(name) => Some((Source::Robotarm, name.clone())),
        CommandKind::WashCmd { protocol_path, mode } => {
            Some((Source::Wash, protocol_path.clone().unwrap_or_else(|| mode.name().to_string())))
        }
        CommandKind::DispCmd { protocol_path, mode } => {
            Some((Source::Disp, protocol_path.clone().unwrap_or_else(|| mode.name().to_string())))
        }
        CommandKind::IncuCmd { action, .. } => Some((Source::Incu, action.name().to_string())),
        _ => None,
    }
}

fn resolve_symvar(v: &SymVar, assignment: &HashMap<String, f64>) -> f64 {
    match v {
        SymVar::Const(c) => *c,
        SymVar::Var(name) => assignment.get(name).copied().unwrap_or(0.0),
        SymVar::Plus(name, off) => assignment.get(name).copied().unwrap_or(0.0) + off,
    }
}

/// Rebuilds `tree` with every `SymVar` replaced by the constant it resolves
/// to under `assignment`, so the executor never has to resolve a variable
/// at run time.
fn resolve_tree(tree: Command, assignment: &HashMap<String, f64>) -> Command {
    tree.transform(&|c| {
        let kind = match c.kind {
            CommandKind::Idle {
                secs,
                only_for_scheduling,
            } => CommandKind::Idle {
                secs: SymVar::constant(resolve_symvar(&secs, assignment)),
                only_for_scheduling,
            },
            CommandKind::WaitForCheckpoint {
                name,
                wake,
                report_behind_time,
            } => CommandKind::WaitForCheckpoint {
                name,
                wake: SymVar::constant(resolve_symvar(&wake, assignment)),
                report_behind_time,
            },
            CommandKind::Duration {
                name,
                opt_weight,
                exactly,
            } => CommandKind::Duration {
                name,
                opt_weight,
                exactly: exactly.map(|e| SymVar::constant(resolve_symvar(&e, assignment))),
            },
            other => other,
        };
        Command {
            kind,
            metadata: c.metadata,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellpainter_repr::command::{Assume, BiotekMode, Resource};

    fn estimator() -> Estimator {
        let mut e = Estimator::empty();
        e.insert(Source::Robotarm, "move", 2.0);
        e.insert(Source::Wash, "Run", 3.0);
        e
    }

    #[test]
    fn a_plain_sequence_sums_leaf_durations() {
        let tree = Command::sequence(vec![Command::robotarm("move"), Command::robotarm("move")]);
        let plan = Optimizer::new(&estimator()).optimize(tree).unwrap();
        assert_eq!(plan.expected_end_secs, 4.0);
    }

    #[test]
    fn exactly_binding_solves_the_free_delay() {
        let tree = Command::sequence(vec![
            Command::checkpoint("c"),
            Command::idle(SymVar::var("delay")),
            Command::duration("c").exactly(SymVar::constant(7.0)),
        ]);
        let plan = Optimizer::new(&estimator()).optimize(tree).unwrap();
        assert_eq!(plan.assignment.get("delay"), Some(&7.0));
        assert_eq!(plan.expected_end_secs, 7.0);
    }

    #[test]
    fn missing_checkpoint_is_an_error() {
        let tree = Command::sequence(vec![Command::duration("nope")]);
        assert!(matches!(
            Optimizer::new(&estimator()).optimize(tree).unwrap_err(),
            PainterError::MissingCheckpoint(_)
        ));
    }

    #[test]
    fn missing_estimate_surfaces_during_planning() {
        let tree = Command::sequence(vec![Command::robotarm("unknown move")]);
        assert!(matches!(
            Optimizer::new(&estimator()).optimize(tree).unwrap_err(),
            PainterError::MissingEstimate(_, _)
        ));
    }

    #[test]
    fn fork_does_not_advance_the_forking_threads_clock() {
        let tree = Command::sequence(vec![
            Command::fork(
                Command::sequence(vec![Command::wash(None, BiotekMode::Run)]),
                Resource::Wash,
                Assume::Nothing,
            ),
            Command::robotarm("move"),
        ]);
        let plan = Optimizer::new(&estimator()).optimize(tree).unwrap();
        assert_eq!(plan.expected_end_secs, 2.0);
    }

    #[test]
    fn a_fork_onto_a_busy_resource_starts_when_the_earlier_fork_ends() {
        // Mirrors `cellpainter-planner::builder`'s wash chunk: two forks
        // dispatched onto `Resource::Wash` back to back, with no
        // `WaitForResource` between them to force serialization explicitly.
        let tree = Command::sequence(vec![
            Command::fork(
                Command::sequence(vec![Command::wash(None, BiotekMode::Run)]),
                Resource::Wash,
                Assume::Idle,
            ),
            Command::fork(
                Command::sequence(vec![Command::checkpoint("second wash started")]),
                Resource::Wash,
                Assume::Nothing,
            ),
        ]);
        let plan = Optimizer::new(&estimator()).optimize(tree).unwrap();
        assert_eq!(plan.checkpoints.get("second wash started"), Some(&3.0));
    }

    #[test]
    fn wait_for_resource_advances_to_the_resources_free_time() {
        let tree = Command::sequence(vec![
            Command::fork(
                Command::sequence(vec![Command::wash(None, BiotekMode::Run)]),
                Resource::Wash,
                Assume::Idle,
            ),
            Command::wait_for_resource(Resource::Wash, Assume::WillWait),
            Command::checkpoint("after wait"),
        ]);
        let plan = Optimizer::new(&estimator()).optimize(tree).unwrap();
        assert_eq!(plan.checkpoints.get("after wait"), Some(&3.0));
    }

    #[test]
    fn contradictory_exactly_bindings_are_infeasible() {
        let tree = Command::sequence(vec![
            Command::checkpoint("c"),
            Command::duration("c").exactly(SymVar::constant(5.0)),
            Command::duration("c").exactly(SymVar::constant(9.0)),
        ]);
        let err = Optimizer::new(&estimator()).optimize(tree).unwrap_err();
        assert!(matches!(err, PainterError::Infeasible(_)));
    }

    #[test]
    fn verify_against_dry_run_flags_drift_beyond_tolerance() {
        let tree = Command::sequence(vec![Command::checkpoint("c"), Command::robotarm("move")]);
        let plan = Optimizer::new(&estimator()).optimize(tree).unwrap();
        let mut observed = HashMap::new();
        observed.insert("c".to_string(), 3.0);
        let discrepancies = verify_against_dry_run(&plan, &observed, 0.5);
        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].checkpoint, "c");
    }

    #[test]
    fn wait_for_checkpoint_does_not_rewind_a_thread_past_its_arrival_time() {
        // Mirrors the `batch sep` wait between `builder.rs`'s batches: the
        // thread reaches the wait well after `checkpoint + wake` (wake is
        // 0 here, as the solver leaves an unconstrained `incu delay`), so
        // the predicted time must stay at arrival, not rewind to the
        // checkpoint.
        let tree = Command::sequence(vec![
            Command::checkpoint("batch 0"),
            Command::robotarm("move"),
            Command::wait_for_checkpoint("batch 0", SymVar::constant(0.0)),
            Command::checkpoint("batch 1"),
        ]);
        let plan = Optimizer::new(&estimator()).optimize(tree).unwrap();
        let batch_0 = *plan.checkpoints.get("batch 0").unwrap();
        let batch_1 = *plan.checkpoints.get("batch 1").unwrap();
        assert!(
            batch_1 > batch_0,
            "batch 1 ({batch_1}) must be predicted strictly after batch 0 ({batch_0})"
        );
        assert_eq!(batch_1, 2.0);
    }

    #[test]
    fn verify_against_dry_run_tolerates_small_drift() {
        let tree = Command::sequence(vec![Command::checkpoint("c"), Command::robotarm("move")]);
        let plan = Optimizer::new(&estimator()).optimize(tree).unwrap();
        let mut observed = HashMap::new();
        observed.insert("c".to_string(), 0.2);
        assert!(verify_against_dry_run(&plan, &observed, 0.5).is_empty());
    }
}
