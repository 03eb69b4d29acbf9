// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The command algebra: a closed tree of device commands, control-flow
//! nodes, and timing markers, plus the traversal operations every other
//! crate builds on. Grounded on spec §3/§4.1 and the `Command`/`Fork`/
//! `Checkpoint`/`Duration`/`Idle`/`Sequence` shapes implied by
//! `original_source/protocol.py`'s usage (the concrete `commands.py` module
//! was not retained in `original_source/`, so the node shapes below follow
//! spec.md literally).

use serde::{Deserialize, Serialize};

use crate::metadata::Metadata;
use crate::sym::SymVar;

#[cfg(feature = "proptest")]
use proptest_derive::Arbitrary;

/// Which shared device a [`CommandKind::Fork`] or [`CommandKind::WaitForResource`]
/// refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "proptest", derive(Arbitrary))]
pub enum Resource {
    Wash,
    Disp,
    Incu,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Wash, Resource::Disp, Resource::Incu];

    pub fn name(&self) -> &'static str {
        match self {
            Resource::Wash => "wash",
            Resource::Disp => "disp",
            Resource::Incu => "incu",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A hint about the state the caller believes a resource is in at
/// dispatch/wait time, matching the `assume=` argument threaded through
/// `Fork`/`WaitForResource` in the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "proptest", derive(Arbitrary))]
pub enum Assume {
    /// No hint; the default.
    #[default]
    Nothing,
    /// The caller expects to have to wait for the resource to free up.
    WillWait,
    /// The caller asserts the resource is already idle; violating this is
    /// an invariant fault, not a wait.
    Idle,
}

/// The action mode a wash/dispenser command runs in, matching the
/// `BiotekAction` literal in `original_source/cellpainter/bioteks.py`'s
/// docstring (`Run`, `Validate`, `RunValidated`, `TestCommunications`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "proptest", derive(Arbitrary))]
pub enum BiotekMode {
    Run,
    Validate,
    RunValidated,
    TestCommunications,
}

impl BiotekMode {
    pub fn name(&self) -> &'static str {
        match self {
            BiotekMode::Run => "Run",
            BiotekMode::Validate => "Validate",
            BiotekMode::RunValidated => "RunValidated",
            BiotekMode::TestCommunications => "TestCommunications",
        }
    }
}

/// What to do to the incubator, matching `incu_cmd.action` plus the
/// `get_climate` action from `test_comm_program`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "proptest", derive(Arbitrary))]
pub enum IncuAction {
    Put,
    Get,
    GetClimate,
}

impl IncuAction {
    pub fn name(&self) -> &'static str {
        match self {
            IncuAction::Put => "put",
            IncuAction::Get => "get",
            IncuAction::GetClimate => "get_climate",
        }
    }
}

/// One node of the command tree: a [`CommandKind`] plus its accumulated
/// [`Metadata`]. The tree is built bottom-up by the planner, rewritten by
/// `sleek`, stamped with ids and substituted by the optimizer, and finally
/// walked by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub metadata: Metadata,
}

/// The closed set of variant nodes from spec §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandKind {
    RobotarmCmd(String),
    WashCmd {
        protocol_path: Option<String>,
        mode: BiotekMode,
    },
    DispCmd {
        protocol_path: Option<String>,
        mode: BiotekMode,
    },
    IncuCmd {
        action: IncuAction,
        loc: Option<String>,
    },
    /// Run `command` on a background worker owning `resource`. Treated as
    /// a leaf by [`Command::collect`]; its inner tree is traversed
    /// explicitly by callers that need it (the optimizer, `sleek`, the
    /// executor).
    Fork {
        command: Box<Command>,
        resource: Resource,
        assume: Assume,
    },
    WaitForResource {
        resource: Resource,
        assume: Assume,
    },
    Checkpoint(String),
    Duration {
        name: String,
        opt_weight: Option<f64>,
        exactly: Option<SymVar>,
    },
    WaitForCheckpoint {
        name: String,
        wake: SymVar,
        report_behind_time: bool,
    },
    Idle {
        secs: SymVar,
        only_for_scheduling: bool,
    },
    Sequence(Vec<Command>),
}

impl Command {
    pub fn robotarm(program_name: impl Into<String>) -> Command {
        Command::leaf(CommandKind::RobotarmCmd(program_name.into()))
    }

    pub fn wash(protocol_path: Option<String>, mode: BiotekMode) -> Command {
        Command::leaf(CommandKind::WashCmd { protocol_path, mode })
    }

    pub fn disp(protocol_path: Option<String>, mode: BiotekMode) -> Command {
        Command::leaf(CommandKind::DispCmd { protocol_path, mode })
    }

    pub fn incu(action: IncuAction, loc: Option<String>) -> Command {
        Command::leaf(CommandKind::IncuCmd { action, loc })
    }

    pub fn fork(command: Command, resource: Resource, assume: Assume) -> Command {
        Command::leaf(CommandKind::Fork {
            command: Box::new(command),
            resource,
            assume,
        })
    }

    pub fn wait_for_resource(resource: Resource, assume: Assume) -> Command {
        Command::leaf(CommandKind::WaitForResource { resource, assume })
    }

    pub fn checkpoint(name: impl Into<String>) -> Command {
        Command::leaf(CommandKind::Checkpoint(name.into()))
    }

    pub fn duration(name: impl Into<String>) -> Command {
        Command::leaf(CommandKind::Duration {
            name: name.into(),
            opt_weight: None,
            exactly: None,
        })
    }

    /// Sets the optimizer's objective weight on a [`CommandKind::Duration`]
    /// built by [`Command::duration`]. Typically `-1.0` to maximize overlap
    /// (minimize the gap between checkpoint and duration).
    pub fn opt_weight(mut self, weight: f64) -> Command {
        if let CommandKind::Duration { opt_weight, .. } = &mut self.kind {
            *opt_weight = Some(weight);
        }
        self
    }

    /// Binds a [`CommandKind::Duration`] to an exact symbolic length,
    /// matching `Duration(name, exactly=...)`.
    pub fn exactly(mut self, value: SymVar) -> Command {
        if let CommandKind::Duration { exactly, .. } = &mut self.kind {
            *exactly = Some(value);
        }
        self
    }

    pub fn wait_for_checkpoint(name: impl Into<String>, wake: SymVar) -> Command {
        Command::leaf(CommandKind::WaitForCheckpoint {
            name: name.into(),
            wake,
            report_behind_time: true,
        })
    }

    /// Silences the "behind time" warning a [`CommandKind::WaitForCheckpoint`]
    /// logs when its wake point has already passed.
    pub fn quiet_if_behind(mut self) -> Command {
        if let CommandKind::WaitForCheckpoint {
            report_behind_time, ..
        } = &mut self.kind
        {
            *report_behind_time = false;
        }
        self
    }

    pub fn idle(secs: SymVar) -> Command {
        Command::leaf(CommandKind::Idle {
            secs,
            only_for_scheduling: false,
        })
    }

    /// A scheduling-only delay: slack handed to the optimizer that
    /// [`Command::remove_scheduling_idles`] strips before execution,
    /// matching `Early(secs)` in the original builder.
    pub fn early(secs: f64) -> Command {
        Command::leaf(CommandKind::Idle {
            secs: SymVar::constant(secs),
            only_for_scheduling: true,
        })
    }

    pub fn sequence(children: Vec<Command>) -> Command {
        Command::leaf(CommandKind::Sequence(children))
    }

    pub fn empty() -> Command {
        Command::sequence(Vec::new())
    }

    fn leaf(kind: CommandKind) -> Command {
        Command {
            kind,
            metadata: Metadata::new(),
        }
    }

    /// Returns a copy of this node with `metadata` merged in. Commutes with
    /// [`Command::sequence`]: tagging a `Sequence` node and collecting it
    /// gives the same accumulated metadata as tagging every leaf directly.
    pub fn with_metadata(&self, metadata: Metadata) -> Command {
        Command {
            kind: self.kind.clone(),
            metadata: self.metadata.merge(&metadata),
        }
    }

    pub fn with_plate_id(&self, plate_id: impl Into<String>) -> Command {
        self.with_metadata(Metadata::new().with_plate_id(plate_id))
    }

    pub fn with_step(&self, step: impl Into<String>) -> Command {
        self.with_metadata(Metadata::new().with_step(step))
    }

    pub fn with_sub_part(&self, sub_part: impl Into<String>) -> Command {
        self.with_metadata(Metadata::new().with_sub_part(sub_part))
    }

    /// Depth-first, left-to-right, children-before-siblings traversal: one
    /// entry per leaf (where `Fork` counts as a leaf) paired with its
    /// metadata accumulated from every ancestor `Sequence` it sits under.
    /// Stable: re-running `collect` on the same tree yields the same order.
    pub fn collect(&self) -> Vec<(Command, Metadata)> {
        let mut out = Vec::new();
        self.collect_into(Metadata::new(), &mut out);
        out
    }

    fn collect_into(&self, acc: Metadata, out: &mut Vec<(Command, Metadata)>) {
        let acc = acc.merge(&self.metadata);
        match &self.kind {
            CommandKind::Sequence(children) => {
                for child in children {
                    child.collect_into(acc.clone(), out);
                }
            }
            _ => out.push((self.clone(), acc)),
        }
    }

    /// Rebuilds the tree, applying `f` to every node bottom-up: children
    /// (and a `Fork`'s inner tree) are transformed first, then `f` is
    /// applied to the resulting node.
    pub fn transform(self, f: &impl Fn(Command) -> Command) -> Command {
        let kind = match self.kind {
            CommandKind::Sequence(children) => {
                CommandKind::Sequence(children.into_iter().map(|c| c.transform(f)).collect())
            }
            CommandKind::Fork {
                command,
                resource,
                assume,
            } => CommandKind::Fork {
                command: Box::new(command.transform(f)),
                resource,
                assume,
            },
            other => other,
        };
        f(Command {
            kind,
            metadata: self.metadata,
        })
    }

    /// Stamps every node (not just leaves) with a fresh, unique, opaque id,
    /// overwriting whatever was there before. Run once by the optimizer
    /// before constraint generation so every node can be referenced by id
    /// in `expected_end`.
    pub fn assign_ids(self) -> Command {
        let mut counter = 0usize;
        self.assign_ids_rec(&mut counter)
    }

    fn assign_ids_rec(self, counter: &mut usize) -> Command {
        let kind = match self.kind {
            CommandKind::Sequence(children) => CommandKind::Sequence(
                children
                    .into_iter()
                    .map(|c| c.assign_ids_rec(counter))
                    .collect(),
            ),
            CommandKind::Fork {
                command,
                resource,
                assume,
            } => CommandKind::Fork {
                command: Box::new(command.assign_ids_rec(counter)),
                resource,
                assume,
            },
            other => other,
        };
        *counter += 1;
        let mut metadata = self.metadata;
        metadata.id = Some(format!("cmd{counter}"));
        Command { kind, metadata }
    }

    /// Drops every [`CommandKind::Idle`] flagged `only_for_scheduling`,
    /// recursing into `Sequence` children and `Fork` bodies. Applied after
    /// optimization, right before execution: the scheduling slack has
    /// already done its job of giving the optimizer room to work with.
    pub fn remove_scheduling_idles(self) -> Command {
        match self.kind {
            CommandKind::Sequence(children) => {
                let filtered = children
                    .into_iter()
                    .map(Command::remove_scheduling_idles)
                    .filter(|c| {
                        !matches!(
                            &c.kind,
                            CommandKind::Idle {
                                only_for_scheduling: true,
                                ..
                            }
                        )
                    })
                    .collect();
                Command {
                    kind: CommandKind::Sequence(filtered),
                    metadata: self.metadata,
                }
            }
            CommandKind::Fork {
                command,
                resource,
                assume,
            } => Command {
                kind: CommandKind::Fork {
                    command: Box::new(command.remove_scheduling_idles()),
                    resource,
                    assume,
                },
                metadata: self.metadata,
            },
            other => Command {
                kind: other,
                metadata: self.metadata,
            },
        }
    }

    /// The device resource this leaf pertains to, if any — used for
    /// grouping log entries the way `LogEntry.machine()` does.
    pub fn required_resource(&self) -> Option<Resource> {
        match &self.kind {
            CommandKind::WashCmd { .. } => Some(Resource::Wash),
            CommandKind::DispCmd { .. } => Some(Resource::Disp),
            CommandKind::IncuCmd { .. } => Some(Resource::Incu),
            CommandKind::Fork { resource, .. } => Some(*resource),
            CommandKind::WaitForResource { resource, .. } => Some(*resource),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_names(cmds: &[(Command, Metadata)]) -> Vec<String> {
        cmds.iter()
            .map(|(c, _)| match &c.kind {
                CommandKind::RobotarmCmd(name) => name.clone(),
                CommandKind::Checkpoint(name) => name.clone(),
                other => format!("{other:?}"),
            })
            .collect()
    }

    #[test]
    fn collect_is_left_to_right_children_before_siblings() {
        let tree = Command::sequence(vec![
            Command::robotarm("a"),
            Command::sequence(vec![Command::robotarm("b"), Command::robotarm("c")]),
            Command::robotarm("d"),
        ]);
        assert_eq!(leaf_names(&tree.collect()), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn collect_treats_fork_as_a_leaf() {
        let tree = Command::sequence(vec![Command::fork(
            Command::sequence(vec![Command::robotarm("inner")]),
            Resource::Wash,
            Assume::Nothing,
        )]);
        let collected = tree.collect();
        assert_eq!(collected.len(), 1);
        assert!(matches!(collected[0].0.kind, CommandKind::Fork { .. }));
    }

    #[test]
    fn with_metadata_commutes_with_sequence() {
        let tagged_leaf = Command::robotarm("a").with_metadata(Metadata::new().with_step("Mito"));
        let via_sequence = Command::sequence(vec![Command::robotarm("a")])
            .with_metadata(Metadata::new().with_step("Mito"));
        assert_eq!(
            tagged_leaf.metadata.step,
            via_sequence.collect()[0].1.step
        );
    }

    #[test]
    fn assign_ids_gives_every_node_a_distinct_id() {
        let tree = Command::sequence(vec![Command::robotarm("a"), Command::robotarm("b")])
            .assign_ids();
        let ids: Vec<_> = tree.collect().iter().map(|(_, m)| m.id.clone()).collect();
        assert_ne!(ids[0], ids[1]);
        assert!(ids.iter().all(Option::is_some));
    }

    #[test]
    fn remove_scheduling_idles_drops_only_flagged_ones() {
        let tree = Command::sequence(vec![
            Command::early(5.0),
            Command::idle(SymVar::constant(5.0)),
            Command::robotarm("a"),
        ]);
        let cleaned = tree.remove_scheduling_idles();
        assert_eq!(cleaned.collect().len(), 2);
    }

    #[test]
    fn transform_rewrites_bottom_up() {
        let tree = Command::sequence(vec![Command::robotarm("a")]);
        let renamed = tree.transform(&|c| match c.kind {
            CommandKind::RobotarmCmd(name) => Command {
                kind: CommandKind::RobotarmCmd(name.to_uppercase()),
                metadata: c.metadata,
            },
            other => Command {
                kind: other,
                metadata: c.metadata,
            },
        });
        assert_eq!(leaf_names(&renamed.collect()), vec!["A"]);
    }

    #[test]
    fn sequence_is_associative_with_empty_identity() {
        let a = Command::sequence(vec![Command::robotarm("x")]);
        let with_empty = Command::sequence(vec![Command::empty(), a.clone(), Command::empty()]);
        assert_eq!(leaf_names(&with_empty.collect()), leaf_names(&a.collect()));
    }

    fn arbitrary_tree() -> impl proptest::strategy::Strategy<Value = Command> {
        use proptest::prelude::*;

        let leaf = prop_oneof![
            "[a-z]{1,4}".prop_map(Command::robotarm),
            "[a-z]{1,4}".prop_map(Command::checkpoint),
            Just(Command::empty()),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            proptest::collection::vec(inner, 0..4).prop_map(Command::sequence)
        })
    }

    proptest::proptest! {
        /// `collect()` never drops or duplicates a leaf: every tree, however
        /// nested, flattens to exactly as many entries as it has leaves
        /// reachable without crossing a `Fork`.
        #[test]
        fn collect_is_stable_under_an_extra_wrapping_sequence(tree in arbitrary_tree()) {
            let direct = leaf_names(&tree.collect());
            let wrapped = leaf_names(&Command::sequence(vec![tree]).collect());
            proptest::prop_assert_eq!(direct, wrapped);
        }

        /// `assign_ids` gives every node in the tree a distinct, present id,
        /// for arbitrary tree shapes, not just the two-leaf example above.
        #[test]
        fn assign_ids_gives_every_node_a_distinct_id_for_any_tree(tree in arbitrary_tree()) {
            let tree = tree.assign_ids();
            let ids: Vec<_> = tree.collect().into_iter().map(|(_, m)| m.id).collect();
            proptest::prop_assert!(ids.iter().all(Option::is_some));
            let mut sorted = ids.clone();
            sorted.sort();
            sorted.dedup();
            proptest::prop_assert_eq!(sorted.len(), ids.len());
        }

        /// `transform` applied with the identity rewrite is a no-op on leaf
        /// names, for arbitrary tree shapes.
        #[test]
        fn transform_with_identity_is_a_no_op(tree in arbitrary_tree()) {
            let rewritten = tree.clone().transform(&|c| c);
            proptest::prop_assert_eq!(leaf_names(&tree.collect()), leaf_names(&rewritten.collect()));
        }
    }
}
