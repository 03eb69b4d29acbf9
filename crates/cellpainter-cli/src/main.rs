// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! `cell-paint`: the command-line entry point for the lab controller.
//! Wires a [`cellpainter_repr::ProtocolConfig`] through
//! [`cellpainter_planner::paint_batch`], [`cellpainter_planner::sleek`], and
//! [`cellpainter_optimizer::Optimizer`] into an executable command tree, then
//! hands it to a [`cellpainter_controller::Executor`] built against one of
//! the five run configs from `original_source/robots.py`'s `configs` table.
//!
//! The diagnostic subcommands (`time-bioteks`, `time-arm-incu`,
//! `lid-stress-test`, `load-incu`, `unload-incu`, `test-comm`,
//! `test-circuit`) exercise a slice of the hardware directly, without a full
//! protocol, matching the single-device flags (`--wash`, `--incu-put`, …) in
//! `original_source/cli.py`.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use cellpainter_controller::{Devices, Executor};
use cellpainter_estimator::Estimator;
use cellpainter_ore::clock::{Clock, TimeMode};
use cellpainter_optimizer::{verify_against_dry_run, OptimizedPlan, Optimizer};
use cellpainter_planner::{paint_batch, sleek, InMemoryMoveListRegistry};
use cellpainter_repr::command::{Assume, BiotekMode, Command, IncuAction, Resource};
use cellpainter_repr::error::PainterError;
use cellpainter_repr::layout::{define_plates, group_by_batch, incu_locs, lid_locs};
use cellpainter_repr::protocol_config::make_v3;
use cellpainter_service::{
    BiotekDevice, HttpBiotek, HttpIncu, IncuDevice, NoGripperRobotArm, NoopBiotek, NoopIncu,
    NoopRobotArm, ReqwestJsonClient, RobotArm, ShortBiotek, TcpRobotArm,
};

#[derive(Parser, Debug)]
#[clap(name = "cell-paint", version, about = "Automated cell-painting lab controller.")]
struct Args {
    #[clap(subcommand)]
    command: SubCommand,

    /// Which device/timing configuration to run against: `live`,
    /// `test-all`, `test-arm-incu`, `simulator`, or `dry-run`.
    #[clap(long, default_value = "dry-run", global = true, parse(try_from_str = parse_run_config))]
    config: RunConfigName,

    /// Comma-separated incubation time per step: `"MM:SS"`, bare seconds, or
    /// a variable name for the optimizer to solve.
    #[clap(long, default_value = "30,30,30,30,30", global = true)]
    incu: String,

    /// Use the six-step protocol (adds `Wash 1`), matching `make_v3(six=true)`.
    #[clap(long, global = true)]
    six: bool,

    /// Overlap plates within a batch using the registered interleaving templates.
    #[clap(long, global = true)]
    interleave: bool,

    /// Lock interleaved steps to a strict round-robin, per `make_v3(lockstep=true)`.
    #[clap(long, global = true)]
    lockstep: bool,

    /// Where to write this run's JSONL event log.
    #[clap(long, default_value = "cell-paint.jsonl", global = true)]
    out: PathBuf,

    /// A historical JSONL event log the estimator should average durations
    /// from, in addition to the standard overrides.
    #[clap(long, global = true)]
    estimator_log: Option<PathBuf>,

    /// Skip the `ATTENTION` confirmation prompt.
    #[clap(long, global = true)]
    yes: bool,

    /// After the run, compare this run's recorded checkpoints against the
    /// optimizer's predicted plan and report any that drifted beyond
    /// tolerance. Only meaningful for `cell-paint`; ignored by the
    /// diagnostic subcommands, which have no optimized plan to check
    /// against.
    #[clap(long, global = true)]
    verify_plan: bool,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the full cell-painting protocol over `num_plates` plates.
    CellPaint {
        #[clap(long)]
        num_plates: usize,
    },
    /// Time a `TestCommunications` round trip to the washer and dispenser.
    TimeBioteks,
    /// Time a robot-arm no-op program alongside an incubator climate read.
    TimeArmIncu,
    /// Cycle a plate's lid on and off repeatedly, to shake out gripper faults.
    LidStressTest {
        #[clap(long)]
        num_plates: usize,
    },
    /// Load `num_plates` plates into the incubator's first free slots.
    LoadIncu {
        #[clap(long)]
        num_plates: usize,
    },
    /// Unload `num_plates` plates from the incubator's first occupied slots.
    UnloadIncu {
        #[clap(long)]
        num_plates: usize,
    },
    /// Verify the washer and dispenser answer at all, without running them.
    TestComm,
    /// Exercise every hotel/rest/lid slot the robot arm can reach, with no devices involved.
    TestCircuit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunConfigName {
    Live,
    TestAll,
    TestArmIncu,
    Simulator,
    DryRun,
}

fn parse_run_config(s: &str) -> Result<RunConfigName, String> {
    match s {
        "live" => Ok(RunConfigName::Live),
        "test-all" => Ok(RunConfigName::TestAll),
        "test-arm-incu" => Ok(RunConfigName::TestArmIncu),
        "simulator" => Ok(RunConfigName::Simulator),
        "dry-run" => Ok(RunConfigName::DryRun),
        other => Err(format!(
            "unknown run config {other:?}; expected one of live, test-all, test-arm-incu, simulator, dry-run"
        )),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("cell-paint: fatal: {err:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    confirm_attention(&args)?;

    let estimator = build_estimator(args.estimator_log.as_deref())?;
    let devices = build_devices(args.config)?;
    let clock = Arc::new(Clock::new(time_mode(args.config)));
    let executor = Executor::new(devices, Arc::clone(&clock));

    let mut plan = None;
    let tree = match &args.command {
        SubCommand::CellPaint { num_plates } => {
            let built = cell_paint_plan(&args, *num_plates, &estimator)?;
            let tree = built.resolved_tree.clone().remove_scheduling_idles();
            plan = Some(built);
            tree
        }
        SubCommand::TimeBioteks => time_bioteks_tree(),
        SubCommand::TimeArmIncu => time_arm_incu_tree(),
        SubCommand::LidStressTest { num_plates } => lid_stress_test_tree(*num_plates)?,
        SubCommand::LoadIncu { num_plates } => load_incu_tree(*num_plates),
        SubCommand::UnloadIncu { num_plates } => unload_incu_tree(*num_plates),
        SubCommand::TestComm => test_comm_tree(),
        SubCommand::TestCircuit => test_circuit_tree()?,
    };

    // Run to completion or first fatal error; either way the workers are
    // joined and the log flushed to disk before we decide whether to fail,
    // per spec §7: "user-visible failure prints ... the log file path."
    let outcome = executor.execute(&tree);
    let log = executor.shutdown();
    log.write_jsonl(&args.out)
        .with_context(|| format!("writing event log to {}", args.out.display()))?;

    outcome.with_context(|| format!("command tree execution failed; see {}", args.out.display()))?;

    if args.verify_plan {
        match &plan {
            Some(plan) => report_plan_verification(plan, &log.checkpoints()),
            None => eprintln!("cell-paint: --verify-plan has no optimized plan to check outside cell-paint; ignoring"),
        }
    }

    println!(
        "cell-paint: run {} logged {} entries to {} ({} plates, {:.1}s fast-forwarded)",
        log.run_id,
        log.len(),
        args.out.display(),
        log.num_plates(),
        clock.skipped_secs(),
    );
    Ok(())
}

/// Reports checkpoints whose observed time drifted from the optimizer's
/// prediction by more than a second, per `--verify-plan`. Printed rather
/// than failing the run: drift is diagnostic information about the
/// estimator's accuracy, not a run failure in its own right.
fn report_plan_verification(plan: &OptimizedPlan, observed: &std::collections::HashMap<String, f64>) {
    let discrepancies = verify_against_dry_run(plan, observed, 1.0);
    if discrepancies.is_empty() {
        println!("cell-paint: --verify-plan: every checkpoint matched the optimized plan within tolerance");
        return;
    }
    eprintln!("cell-paint: --verify-plan: {} checkpoint(s) drifted from the plan:", discrepancies.len());
    for d in discrepancies {
        eprintln!(
            "  {:?}: predicted {:.2}s, observed {:.2}s ({:+.2}s)",
            d.checkpoint, d.predicted_secs, d.observed_secs, d.diff_secs
        );
    }
}

/// Carries forward the `ATTENTION(prompt)` gate from
/// `original_source/protocol.py`'s `execute_program`: every subcommand
/// confirms lab prerequisites with the operator before touching hardware,
/// except `cell-paint --dry-run` and `test-comm` (spec §6).
fn confirm_attention(args: &Args) -> anyhow::Result<()> {
    let exempt = args.yes
        || matches!(args.command, SubCommand::TestComm)
        || (matches!(args.command, SubCommand::CellPaint { .. }) && args.config == RunConfigName::DryRun);
    if exempt {
        return Ok(());
    }
    let prompt = format!(
        "ATTENTION: about to run {:?} against the {:?} config. Lab prerequisites ready?",
        args.command, args.config
    );
    if !cellpainter_ore::cli::confirm(prompt)? {
        return Err(PainterError::UserAbort.into());
    }
    Ok(())
}

fn build_estimator(log_path: Option<&std::path::Path>) -> anyhow::Result<Estimator> {
    let base = match log_path {
        Some(path) => Estimator::from_log_file(path)
            .with_context(|| format!("loading estimator log {}", path.display()))?,
        None => Estimator::empty(),
    };
    Ok(base.with_overrides(Estimator::standard_overrides()))
}

fn time_mode(config: RunConfigName) -> TimeMode {
    match config {
        RunConfigName::Live => TimeMode::Wall,
        RunConfigName::TestAll | RunConfigName::TestArmIncu | RunConfigName::Simulator | RunConfigName::DryRun => {
            TimeMode::FastForward
        }
    }
}

/// Builds the device set for a run config, matching `robots.py`'s `configs`
/// table: `(disp_and_wash_mode, incu_mode, robotarm_mode)` per config name.
fn build_devices(config: RunConfigName) -> anyhow::Result<Devices> {
    let biotek_url = std::env::var("BIOTEK_URL").unwrap_or_else(|_| "http://localhost:5050".to_string());
    let incu_url = std::env::var("INCU_URL").unwrap_or_else(|_| "http://localhost:5051".to_string());

    let wash: Arc<dyn BiotekDevice> = match config {
        RunConfigName::Live => Arc::new(HttpBiotek::new(ReqwestJsonClient::new()?, biotek_url.clone(), "wash")),
        RunConfigName::TestAll => Arc::new(ShortBiotek::new(ReqwestJsonClient::new()?, biotek_url.clone(), "wash")),
        RunConfigName::TestArmIncu | RunConfigName::Simulator | RunConfigName::DryRun => Arc::new(NoopBiotek),
    };
    let disp: Arc<dyn BiotekDevice> = match config {
        RunConfigName::Live => Arc::new(HttpBiotek::new(ReqwestJsonClient::new()?, biotek_url.clone(), "disp")),
        RunConfigName::TestAll => Arc::new(ShortBiotek::new(ReqwestJsonClient::new()?, biotek_url, "disp")),
        RunConfigName::TestArmIncu | RunConfigName::Simulator | RunConfigName::DryRun => Arc::new(NoopBiotek),
    };
    let incu: Arc<dyn IncuDevice> = match config {
        RunConfigName::Live | RunConfigName::TestAll | RunConfigName::TestArmIncu => {
            Arc::new(HttpIncu::new(ReqwestJsonClient::new()?, incu_url))
        }
        RunConfigName::Simulator | RunConfigName::DryRun => Arc::new(NoopIncu),
    };
    let robotarm: Arc<dyn RobotArm> = match config {
        RunConfigName::Live | RunConfigName::TestAll | RunConfigName::TestArmIncu => Arc::new(TcpRobotArm::from_env()),
        RunConfigName::Simulator => Arc::new(NoGripperRobotArm::from_env()),
        RunConfigName::DryRun => Arc::new(NoopRobotArm),
    };

    Ok(Devices { wash, disp, incu, robotarm })
}

/// A representative subset of the robot arm's installed move-list keys,
/// covering the hand-off poses `paint_batch` actually produces adjacent
/// `RobotarmCmd` pairs at: the wash/dispenser doors, and the `B21` staging
/// slot a lid is dropped at right before the plate itself arrives at wash.
/// The concrete joint-move payload behind each key lives on the robot
/// controller, not in this crate (spec §1); `original_source`'s own
/// move-list module was not part of the retained reference material, so
/// this table only names the keys the planner's naming convention predicts,
/// not every key a fully commissioned cell-painter installation would have.
fn build_move_registry() -> InMemoryMoveListRegistry {
    let mut keys = vec![
        "wash put return to wash door".to_string(),
        "wash_to_disp prep from wash door".to_string(),
        "wash_to_disp return to disp door".to_string(),
        "disp get prep from disp door".to_string(),
        "wash put prep from B21".to_string(),
    ];
    for lid in lid_locs() {
        keys.push(format!("lid_{lid} put return to B21"));
    }
    InMemoryMoveListRegistry::new(keys)
}

fn cell_paint_plan(args: &Args, num_plates: usize, estimator: &Estimator) -> anyhow::Result<OptimizedPlan> {
    let config = make_v3(&args.incu, args.interleave, args.six, args.lockstep).context("building protocol config")?;
    config.validate().context("validating protocol config")?;

    let plates = define_plates(&[num_plates]).context("assigning plate slots")?;
    let batches = group_by_batch(plates);

    let mut batch_trees = Vec::with_capacity(batches.len());
    for batch in &batches {
        batch_trees.push(paint_batch(batch, &config, estimator).context("building batch command tree")?);
    }

    let tree = Command::sequence(batch_trees);
    let registry = build_move_registry();
    let tree = sleek(tree, &registry);

    let optimizer = Optimizer::new(estimator);
    let plan = optimizer.optimize(tree).context("optimizing command tree")?;
    tracing::info!(
        expected_end_secs = plan.expected_end_secs,
        objective_value = plan.objective_value,
        "optimized cell-paint run"
    );

    Ok(plan)
}

/// `time-bioteks`: forks a `TestCommunications` round trip to both the
/// washer and dispenser and waits for both, bracketed by a checkpoint pair
/// so the observed duration lands in the event log.
fn time_bioteks_tree() -> Command {
    Command::sequence(vec![
        Command::checkpoint("time-bioteks"),
        Command::fork(
            Command::wash(None, BiotekMode::TestCommunications),
            Resource::Wash,
            Assume::Nothing,
        ),
        Command::fork(
            Command::disp(None, BiotekMode::TestCommunications),
            Resource::Disp,
            Assume::Nothing,
        ),
        Command::wait_for_resource(Resource::Wash, Assume::Nothing),
        Command::wait_for_resource(Resource::Disp, Assume::Nothing),
        Command::duration("time-bioteks"),
    ])
}

/// `time-arm-incu`: times a robot-arm no-op program (the estimator's
/// `(Robotarm, "noop")` override) alongside an incubator climate read.
fn time_arm_incu_tree() -> Command {
    Command::sequence(vec![
        Command::checkpoint("time-arm-incu"),
        Command::fork(
            Command::incu(IncuAction::GetClimate, None),
            Resource::Incu,
            Assume::Nothing,
        ),
        Command::robotarm("noop"),
        Command::wait_for_resource(Resource::Incu, Assume::Nothing),
        Command::duration("time-arm-incu"),
    ])
}

/// `lid-stress-test`: cycles every plate's lid off and back on, using each
/// plate's assigned `lid_loc`, to shake out gripper faults independent of
/// any chemistry.
fn lid_stress_test_tree(num_plates: usize) -> anyhow::Result<Command> {
    let plates = define_plates(&[num_plates]).context("assigning plate slots")?;
    let mut cmds = Vec::new();
    for plate in &plates {
        cmds.push(Command::robotarm(plate.lid_put()));
        cmds.push(Command::robotarm(plate.lid_get()));
    }
    Ok(Command::sequence(cmds))
}

/// `load-incu N`: puts `N` plates into the incubator's first `N` slots,
/// matching `--incu-put` in `original_source/cli.py` run in a batch.
fn load_incu_tree(num_plates: usize) -> Command {
    let locs = incu_locs();
    Command::sequence(
        locs.into_iter()
            .take(num_plates)
            .map(|loc| {
                Command::fork(
                    Command::incu(IncuAction::Put, Some(loc)),
                    Resource::Incu,
                    Assume::Nothing,
                )
            })
            .chain(std::iter::once(Command::wait_for_resource(Resource::Incu, Assume::Nothing)))
            .collect(),
    )
}

/// `unload-incu N`: the `--incu-get` counterpart to [`load_incu_tree`].
fn unload_incu_tree(num_plates: usize) -> Command {
    let locs = incu_locs();
    Command::sequence(
        locs.into_iter()
            .take(num_plates)
            .map(|loc| {
                Command::fork(
                    Command::incu(IncuAction::Get, Some(loc)),
                    Resource::Incu,
                    Assume::Nothing,
                )
            })
            .chain(std::iter::once(Command::wait_for_resource(Resource::Incu, Assume::Nothing)))
            .collect(),
    )
}

/// `test-comm`: a `TestCommunications` round trip with no retries expected
/// and no batch/checkpoint bookkeeping, the minimal "is anyone home" check.
fn test_comm_tree() -> Command {
    Command::sequence(vec![
        Command::wash(None, BiotekMode::TestCommunications),
        Command::disp(None, BiotekMode::TestCommunications),
    ])
}

/// `test-circuit`: moves the arm to and from every rest/output/lid slot
/// defined in [`cellpainter_repr::layout`], with no device involved, to
/// confirm the physical circuit is clear before a real run.
fn test_circuit_tree() -> anyhow::Result<Command> {
    let plates = define_plates(&[1]).context("assigning a probe plate")?;
    let plate = &plates[0];
    Ok(Command::sequence(vec![
        Command::robotarm(plate.rt_put()),
        Command::robotarm(plate.rt_get()),
        Command::robotarm(plate.lid_put()),
        Command::robotarm(plate.lid_get()),
        Command::robotarm(plate.out_put()),
        Command::robotarm(plate.out_get()),
    ]))
}
