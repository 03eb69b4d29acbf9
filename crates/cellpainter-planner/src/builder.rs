// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The protocol builder: turns a batch of plates plus a [`ProtocolConfig`]
//! into the command tree for that batch, grounded verbatim on `paint_batch`
//! in `original_source/protocol.py` (the per-step, per-plate chunk recipes
//! keyed by `(plate, step, sub_part)` and the final assembly over
//! [`crate::interleave_engine::linearize_batch`]'s linearization).

use std::collections::HashMap;

use cellpainter_estimator::{Estimator, Source};
use cellpainter_repr::command::{Assume, BiotekMode, Command, IncuAction, Resource};
use cellpainter_repr::error::Result;
use cellpainter_repr::layout::{lid_locs, Plate};
use cellpainter_repr::sym::SymVar;
use cellpainter_repr::ProtocolConfig;

use crate::interleave_engine::{linearize_batch, Desc};

fn desc(plate_id: &str, step: &str, sub_part: &str) -> Desc {
    Desc {
        plate_id: plate_id.to_string(),
        step: step.to_string(),
        sub_part: sub_part.to_string(),
    }
}

/// `RobotarmCmds(base, before_pick, after_drop)`: every robot-arm move is
/// three named sub-programs (`prep`/`transfer`/`return`), with room for
/// extra commands to run between `prep` and `transfer` (while the arm is
/// reaching for the plate) or between `transfer` and `return` (right after
/// it's been dropped off).
fn robotarm_cmds(base: &str, before_pick: Vec<Command>, after_drop: Vec<Command>) -> Vec<Command> {
    let mut cmds = vec![Command::robotarm(format!("{base} prep"))];
    cmds.extend(before_pick);
    cmds.push(Command::robotarm(format!("{base} transfer")));
    cmds.extend(after_drop);
    cmds.push(Command::robotarm(format!("{base} return")));
    cmds
}

/// Builds the full command tree for one batch: a `prep` chunk (prime
/// wash/disp, wait for the previous batch to clear its separation delay,
/// open `Checkpoint("batch N")`), the linearized per-plate-per-step chunks,
/// and a `post` chunk that closes `Duration("batch N")`.
///
/// `estimator` is consulted once, to bind the wash-to-disp transfer
/// duration to the robot arm's own estimate (spec §4.3: "bound `transfer`
/// duration exactly equal to the arm's transfer estimate, so the optimizer
/// cannot stretch it").
pub fn paint_batch(batch: &[Plate], config: &ProtocolConfig, estimator: &Estimator) -> Result<Command> {
    let p = config;
    let first_plate = &batch[0];
    let batch_index = first_plate.batch_index;

    let prep_wash = match &p.prep_wash {
        Some(path) => Command::fork(
            Command::wash(Some(path.clone()), BiotekMode::Run),
            Resource::Wash,
            Assume::Nothing,
        ),
        None => Command::idle(SymVar::zero()),
    };
    let prep_disp = match &p.prep_disp {
        Some(path) => Command::fork(
            Command::disp(Some(path.clone()), BiotekMode::Run),
            Resource::Disp,
            Assume::Nothing,
        ),
        None => Command::idle(SymVar::zero()),
    };

    let mut prep_cmds = vec![prep_wash, prep_disp];
    if batch_index > 0 {
        prep_cmds.push(Command::wait_for_checkpoint(
            format!("batch {}", batch_index - 1),
            SymVar::var("batch sep"),
        ));
    }
    prep_cmds.push(Command::checkpoint(format!("batch {batch_index}")));

    let post_cmds = vec![Command::duration(format!("batch {batch_index}")).opt_weight(-1.0)];

    let transfer_est = estimator
        .estimate(Source::Robotarm, "wash_to_disp transfer")
        .map_err(|e| match e {
            cellpainter_estimator::EstimatorError::MissingEstimate(dev, arg) => {
                cellpainter_repr::error::PainterError::MissingEstimate(dev, arg)
            }
            other => cellpainter_repr::error::PainterError::MissingEstimate(
                Source::Robotarm.name(),
                other.to_string(),
            ),
        })?;

    let lid_pool = lid_locs();
    let mut lid_index = 0usize;

    let mut chunks: HashMap<Desc, Vec<Command>> = HashMap::new();

    for (i, step) in p.step_names.iter().enumerate() {
        for plate in batch {
            let lid_loc = lid_pool[lid_index % lid_pool.len()].clone();
            lid_index += 1;
            let plate_with_lid = plate.with_lid_loc(lid_loc);
            let ix = i + 1;
            let plate_desc = format!("plate {}", plate.id);
            let is_mito = step.as_str() == "Mito";
            let is_pfa = step.as_str() == "PFA";

            let (incu_delay, wash_delay) = if is_mito {
                (
                    vec![Command::wait_for_checkpoint(
                        format!("batch {batch_index}"),
                        SymVar::var(format!("{plate_desc} incu delay {ix}")),
                    )],
                    vec![Command::wait_for_checkpoint(
                        format!("batch {batch_index}"),
                        SymVar::var(format!("{plate_desc} first wash delay")),
                    )],
                )
            } else {
                (
                    vec![Command::wait_for_checkpoint(
                        format!("{plate_desc} incubation {}", ix - 1),
                        SymVar::var(format!("{plate_desc} incu delay {ix}")),
                    )],
                    vec![
                        Command::early(2.0),
                        Command::wait_for_checkpoint(
                            format!("{plate_desc} incubation {}", ix - 1),
                            p.incu[i - 1].clone(),
                        ),
                    ],
                )
            };

            let lid_off = robotarm_cmds(
                &plate_with_lid.lid_put(),
                vec![Command::checkpoint(format!("{plate_desc} lid off {ix}"))],
                vec![],
            );
            let lid_on = {
                let mut cmds = robotarm_cmds(&plate_with_lid.lid_get(), vec![], vec![]);
                cmds.push(Command::duration(format!("{plate_desc} lid off {ix}")).opt_weight(-1.0));
                cmds
            };

            let incu_get = if is_mito || is_pfa {
                let mut before_pick = vec![Command::wait_for_resource(Resource::Incu, Assume::WillWait)];
                if is_pfa {
                    before_pick.push(Command::duration(format!("{plate_desc} 37C")).opt_weight(1.0));
                }
                let mut cmds = vec![
                    Command::wait_for_resource(Resource::Incu, Assume::Nothing),
                    Command::fork(
                        Command::incu(IncuAction::Get, Some(plate.incu_loc.clone())),
                        Resource::Incu,
                        Assume::Nothing,
                    ),
                ];
                cmds.extend(robotarm_cmds("incu get", before_pick, vec![]));
                cmds.extend(lid_off.clone());
                cmds
            } else {
                let mut cmds = robotarm_cmds(&plate.rt_get(), vec![], vec![]);
                cmds.extend(lid_off.clone());
                cmds
            };

            let b21_to_incu = if is_mito {
                robotarm_cmds(
                    "incu put",
                    vec![Command::wait_for_resource(Resource::Incu, Assume::Nothing)],
                    vec![Command::fork(
                        Command::sequence(vec![
                            Command::incu(IncuAction::Put, Some(plate.incu_loc.clone())),
                            Command::checkpoint(format!("{plate_desc} 37C")),
                        ]),
                        Resource::Incu,
                        Assume::Nothing,
                    )],
                )
            } else {
                robotarm_cmds(&plate.rt_put(), vec![], vec![])
            };

            let disp_prime = if plate.id == first_plate.id {
                p.prime[i].clone()
            } else {
                None
            };
            let (pre_disp, pre_disp_wait) = if p.disp[i].is_some() || disp_prime.is_some() {
                let mut body = vec![
                    Command::wait_for_checkpoint(format!("{plate_desc} pre disp {ix}"), SymVar::zero()),
                    Command::idle(SymVar::var(format!("{plate_desc} pre disp {ix} delay"))),
                ];
                body.push(match &disp_prime {
                    Some(prime) => Command::disp(Some(prime.clone()), BiotekMode::Run),
                    None => Command::idle(SymVar::zero()),
                });
                body.push(match &p.pre_disp[i] {
                    Some(path) => Command::disp(Some(path.clone()), BiotekMode::Run),
                    None => Command::idle(SymVar::zero()),
                });
                body.push(Command::disp(p.disp[i].clone(), BiotekMode::Validate));
                body.push(Command::early(3.0));
                body.push(Command::checkpoint(format!("{plate_desc} pre disp done {ix}")));
                (
                    Command::fork(Command::sequence(body), Resource::Disp, Assume::Nothing),
                    Command::duration(format!("{plate_desc} pre disp done {ix}")).opt_weight(-1.0),
                )
            } else {
                (Command::idle(SymVar::zero()), Command::idle(SymVar::zero()))
            };

            let mut wash_fork_body = wash_delay.clone();
            if i > 0 {
                wash_fork_body.push(
                    Command::duration(format!("{plate_desc} incubation {}", ix - 1)).exactly(p.incu[i - 1].clone()),
                );
            } else {
                wash_fork_body.push(Command::idle(SymVar::zero()));
            }
            wash_fork_body.push(Command::checkpoint(format!("{plate_desc} pre disp {ix}")));
            wash_fork_body.push(Command::wash(Some(p.wash[i].clone()), BiotekMode::RunValidated));
            wash_fork_body.push(if i + 1 < p.num_steps() {
                Command::checkpoint(format!("{plate_desc} transfer {ix}"))
            } else {
                Command::checkpoint(format!("{plate_desc} incubation {ix}"))
            });

            let wash_chunk = vec![
                Command::fork(
                    Command::wash(Some(p.wash[i].clone()), BiotekMode::Validate),
                    Resource::Wash,
                    Assume::Idle,
                ),
                Command::robotarm("wash put prep"),
                Command::robotarm("wash put transfer"),
                Command::fork(Command::sequence(wash_fork_body), Resource::Wash, Assume::Nothing),
                pre_disp,
                Command::robotarm("wash put return"),
            ];

            let mut disp_chunk = vec![
                Command::robotarm("wash_to_disp prep"),
                Command::early(1.0),
                Command::wait_for_resource(Resource::Wash, Assume::WillWait),
                Command::robotarm("wash_to_disp transfer"),
            ];
            disp_chunk.push(
                Command::duration(format!("{plate_desc} transfer {ix}"))
                    .exactly(SymVar::constant(transfer_est)),
            );
            disp_chunk.push(pre_disp_wait);
            disp_chunk.push(Command::fork(
                Command::sequence(vec![
                    Command::disp(p.disp[i].clone(), BiotekMode::RunValidated),
                    Command::checkpoint(format!("{plate_desc} disp {ix} done")),
                    Command::checkpoint(format!("{plate_desc} incubation {ix}")),
                ]),
                Resource::Disp,
                Assume::Nothing,
            ));
            disp_chunk.push(Command::robotarm("wash_to_disp return"));

            let mut disp_to_b21 = vec![
                Command::robotarm("disp get prep"),
                Command::wait_for_checkpoint(format!("{plate_desc} disp {ix} done"), SymVar::zero())
                    .quiet_if_behind(),
                Command::robotarm("disp get transfer"),
                Command::robotarm("disp get return"),
            ];
            disp_to_b21.extend(lid_on.clone());

            let wash_to_b21 = {
                let mut cmds = robotarm_cmds(
                    "wash get",
                    vec![Command::wait_for_resource(Resource::Wash, Assume::Nothing)],
                    vec![],
                );
                cmds.extend(lid_on.clone());
                cmds
            };
            let wash_to_b15 = robotarm_cmds(
                "wash15 get",
                vec![Command::wait_for_resource(Resource::Wash, Assume::Nothing)],
                vec![],
            );
            let b15_to_b21 = {
                let mut cmds = robotarm_cmds("B15 get", vec![], vec![]);
                cmds.extend(lid_on.clone());
                cmds
            };

            let mut incu_to_b21 = incu_delay;
            incu_to_b21.extend(incu_get);
            let b21_to_out = robotarm_cmds(&plate.out_put(), vec![], vec![]);

            chunks.insert(desc(&plate.id, step, "incu -> B21"), incu_to_b21);
            chunks.insert(desc(&plate.id, step, "B21 -> wash"), wash_chunk);
            chunks.insert(desc(&plate.id, step, "wash -> disp"), disp_chunk);
            chunks.insert(desc(&plate.id, step, "disp -> B21"), disp_to_b21);
            chunks.insert(desc(&plate.id, step, "wash -> B21"), wash_to_b21);
            chunks.insert(desc(&plate.id, step, "wash -> B15"), wash_to_b15);
            chunks.insert(desc(&plate.id, step, "B15 -> B21"), b15_to_b21);
            chunks.insert(desc(&plate.id, step, "B21 -> incu"), b21_to_incu);
            chunks.insert(desc(&plate.id, step, "B21 -> out"), b21_to_out);
        }
    }

    let linear = linearize_batch(batch, config)?;
    let mut plate_cmds = Vec::new();
    for d in &linear {
        if let Some(chunk) = chunks.get(d) {
            for cmd in chunk {
                plate_cmds.push(
                    cmd.with_plate_id(d.plate_id.clone())
                        .with_step(d.step.clone())
                        .with_sub_part(d.sub_part.clone()),
                );
            }
        }
    }

    Ok(Command::sequence(vec![
        Command::sequence(prep_cmds).with_step("prep"),
        Command::sequence(plate_cmds),
        Command::sequence(post_cmds),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellpainter_repr::layout::define_plates;
    use cellpainter_repr::protocol_config::make_v3;

    fn estimator_with_transfer() -> Estimator {
        let mut e = Estimator::empty();
        e.insert(Source::Robotarm, "wash_to_disp transfer", 8.5);
        e
    }

    #[test]
    fn builds_a_nonempty_tree_for_one_plate() {
        let plates = define_plates(&[1]).unwrap();
        let config = make_v3("30,30,30,30", false, false, false).unwrap();
        let tree = paint_batch(&plates, &config, &estimator_with_transfer()).unwrap();
        assert!(!tree.collect().is_empty());
    }

    #[test]
    fn every_leaf_for_plate_one_carries_its_plate_id() {
        let plates = define_plates(&[1]).unwrap();
        let config = make_v3("30,30,30,30", false, false, false).unwrap();
        let tree = paint_batch(&plates, &config, &estimator_with_transfer()).unwrap();
        let tagged = tree
            .collect()
            .into_iter()
            .filter(|(_, m)| m.plate_id.is_some())
            .count();
        assert!(tagged > 0);
    }

    #[test]
    fn opens_and_closes_the_batch_checkpoint() {
        let plates = define_plates(&[2]).unwrap();
        let config = make_v3("30,30,30,30", false, false, false).unwrap();
        let tree = paint_batch(&plates, &config, &estimator_with_transfer()).unwrap();
        let leaves = tree.collect();
        let has_checkpoint = leaves.iter().any(|(c, _)| {
            matches!(&c.kind, cellpainter_repr::command::CommandKind::Checkpoint(n) if n == "batch 0")
        });
        let has_duration = leaves.iter().any(|(c, _)| {
            matches!(&c.kind, cellpainter_repr::command::CommandKind::Duration { name, .. } if name == "batch 0")
        });
        assert!(has_checkpoint && has_duration);
    }

    #[test]
    fn two_plate_batch_builds_without_missing_chunks() {
        let plates = define_plates(&[2]).unwrap();
        let config = make_v3("30,30,30,30", true, false, false).unwrap();
        let tree = paint_batch(&plates, &config, &estimator_with_transfer()).unwrap();
        let plate_two_leaves = tree
            .collect()
            .into_iter()
            .filter(|(_, m)| m.plate_id.as_deref() == Some("2"))
            .count();
        assert!(plate_two_leaves > 0);
    }
}
