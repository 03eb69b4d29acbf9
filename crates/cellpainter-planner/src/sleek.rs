// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! Move fusion ("sleek"): rewrites adjacent `RobotarmCmd` leaves that meet
//! at a common hand-off pose into their fused move-list keys, grounded on
//! `sleek_program` in `original_source/protocol.py` and redesigned per
//! DESIGN NOTES §9 to use [`MoveListRegistry::common_handoff`] instead of
//! string concatenation.
//!
//! `sleek_program` rebuilds the whole tree from `program.collect()` rather
//! than rewriting in place; this port does the same, which is what makes
//! the rewrite idempotent — a fused key is no longer a registered base
//! name, so a second pass finds nothing left to fuse.

use cellpainter_repr::command::{Command, CommandKind};

use crate::movelist::MoveListRegistry;

/// Flattens `tree` via [`Command::collect`] and fuses every consecutive
/// pair of `RobotarmCmd` leaves (with only non-arm leaves, if any, between
/// them) that share a hand-off pose in `registry`. Non-arm leaves are
/// never reordered or dropped.
pub fn sleek(tree: Command, registry: &impl MoveListRegistry) -> Command {
    let leaves: Vec<Command> = tree
        .collect()
        .into_iter()
        .map(|(leaf, accumulated)| Command {
            kind: leaf.kind,
            metadata: accumulated,
        })
        .collect();

    Command::sequence(fuse_adjacent(leaves, registry))
}

fn fuse_adjacent(mut leaves: Vec<Command>, registry: &impl MoveListRegistry) -> Vec<Command> {
    let mut last_arm: Option<usize> = None;

    for i in 0..leaves.len() {
        let CommandKind::RobotarmCmd(name) = &leaves[i].kind else {
            continue;
        };
        let name = name.clone();

        if let Some(prev) = last_arm {
            let CommandKind::RobotarmCmd(prev_name) = &leaves[prev].kind else {
                unreachable!("last_arm always points at a RobotarmCmd leaf");
            };
            if let Some((_pose, to_key, from_key)) = registry.common_handoff(prev_name, &name) {
                leaves[prev].kind = CommandKind::RobotarmCmd(to_key);
                leaves[i].kind = CommandKind::RobotarmCmd(from_key);
            }
        }
        last_arm = Some(i);
    }

    leaves
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movelist::InMemoryMoveListRegistry;

    fn registry() -> InMemoryMoveListRegistry {
        InMemoryMoveListRegistry::new([
            "wash get to wash neu",
            "wash_to_disp from wash neu to disp neu",
        ])
    }

    fn names(tree: &Command) -> Vec<String> {
        tree.collect()
            .into_iter()
            .filter_map(|(c, _)| match c.kind {
                CommandKind::RobotarmCmd(n) => Some(n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn fuses_a_pair_sharing_a_handoff_pose() {
        let tree = Command::sequence(vec![
            Command::robotarm("wash get"),
            Command::robotarm("wash_to_disp"),
        ]);
        let fused = sleek(tree, &registry());
        assert_eq!(
            names(&fused),
            vec!["wash get to wash neu", "wash_to_disp from wash neu to disp neu"]
        );
    }

    #[test]
    fn fuses_through_an_intervening_non_arm_leaf() {
        let tree = Command::sequence(vec![
            Command::robotarm("wash get"),
            Command::checkpoint("mid"),
            Command::robotarm("wash_to_disp"),
        ]);
        let fused = sleek(tree, &registry());
        let arm_names = names(&fused);
        assert_eq!(
            arm_names,
            vec!["wash get to wash neu", "wash_to_disp from wash neu to disp neu"]
        );
        // the checkpoint leaf survives, in the middle, untouched.
        assert_eq!(fused.collect().len(), 3);
    }

    #[test]
    fn leaves_unmatched_pairs_untouched() {
        let tree = Command::sequence(vec![
            Command::robotarm("unrelated a"),
            Command::robotarm("unrelated b"),
        ]);
        let fused = sleek(tree, &registry());
        assert_eq!(names(&fused), vec!["unrelated a", "unrelated b"]);
    }

    #[test]
    fn sleek_is_idempotent() {
        let tree = Command::sequence(vec![
            Command::robotarm("wash get"),
            Command::robotarm("wash_to_disp"),
        ]);
        let once = sleek(tree, &registry());
        let twice = sleek(once.clone(), &registry());
        assert_eq!(names(&once), names(&twice));
    }

    fn leaf_strategy() -> impl proptest::strategy::Strategy<Value = Command> {
        use proptest::prelude::*;
        prop_oneof![
            Just(Command::robotarm("wash get")),
            Just(Command::robotarm("wash_to_disp")),
            Just(Command::robotarm("unrelated a")),
            Just(Command::robotarm("unrelated b")),
            Just(Command::checkpoint("mid")),
        ]
    }

    proptest::proptest! {
        /// Invariant 5 (spec §8): `sleek` is idempotent for any sequence of
        /// leaves drawn from a mix of fusable and non-fusable robot-arm
        /// moves and non-arm leaves, not just the fixed examples above.
        #[test]
        fn sleek_is_idempotent_for_arbitrary_leaf_sequences(
            leaves in proptest::collection::vec(leaf_strategy(), 0..8)
        ) {
            let tree = Command::sequence(leaves);
            let once = sleek(tree, &registry());
            let twice = sleek(once.clone(), &registry());
            proptest::prop_assert_eq!(once, twice);
        }
    }
}
