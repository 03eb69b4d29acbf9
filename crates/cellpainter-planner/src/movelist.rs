// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The move-list registry: a read-only mapping from robot-arm program name
//! to an opaque motion sequence (the core never interprets a move list
//! itself, only recognizes which ones share a hand-off pose), grounded on
//! DESIGN NOTES §9's redesign of the teacher's `"<name> to <pose>"` /
//! `"<name> from <pose>"` string convention into a `(start_pose, end_pose)`
//! table lookup.

use std::collections::HashMap;

use cellpainter_repr::error::{PainterError, Result};

/// A named hand-off point two robot-arm programs can meet at (a hotel
/// slot, a wash/disp door, `B21`, …). Opaque beyond equality: the planner
/// never inspects what a pose physically means, only whether two programs
/// share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pose(pub String);

impl Pose {
    pub fn new(name: impl Into<String>) -> Pose {
        Pose(name.into())
    }
}

/// One registered move-list key, decomposed into the base program name it
/// belongs to and the poses it transits between, following the `"{base}
/// to {pose}"` / `"{base} from {pose}"` / `"{base} from {start} to {end}"`
/// key conventions.
#[derive(Debug, Clone)]
struct ParsedKey {
    key: String,
    base: String,
    start_pose: Option<Pose>,
    end_pose: Option<Pose>,
}

fn parse_key(key: &str) -> ParsedKey {
    if let Some((base, rest)) = key.split_once(" from ") {
        let (start_pose, end_pose) = match rest.split_once(" to ") {
            Some((start, end)) => (Some(Pose::new(start)), Some(Pose::new(end))),
            None => (Some(Pose::new(rest)), None),
        };
        ParsedKey {
            key: key.to_string(),
            base: base.to_string(),
            start_pose,
            end_pose,
        }
    } else if let Some((base, pose)) = key.split_once(" to ") {
        ParsedKey {
            key: key.to_string(),
            base: base.to_string(),
            start_pose: None,
            end_pose: Some(Pose::new(pose)),
        }
    } else {
        ParsedKey {
            key: key.to_string(),
            base: key.to_string(),
            start_pose: None,
            end_pose: None,
        }
    }
}

/// Read-only mapping from program name to a motion sequence. The planner
/// only ever asks it "is this name registered" and "what keys, if any,
/// take this base program to/from a given pose" — the actual joint-move
/// payload is opaque and never round-trips through this crate.
pub trait MoveListRegistry {
    fn is_registered(&self, program_name: &str) -> bool;

    fn require_registered(&self, program_name: &str) -> Result<()> {
        if self.is_registered(program_name) {
            Ok(())
        } else {
            Err(PainterError::UnknownProgram(program_name.to_string()))
        }
    }

    /// The registered key (if any) for `base`'s move ending at `pose`.
    fn key_ending_at(&self, base: &str, pose: &Pose) -> Option<&str>;

    /// The registered key (if any) for `base`'s move starting at `pose`.
    fn key_starting_at(&self, base: &str, pose: &Pose) -> Option<&str>;

    /// Every pose `base` is registered to end at.
    fn poses_ending(&self, base: &str) -> Vec<Pose>;

    /// Every pose `base` is registered to start at.
    fn poses_starting(&self, base: &str) -> Vec<Pose>;

    /// If `a` ends somewhere `b` also starts, returns the shared pose plus
    /// both keys, preferring the first pose `a` is registered to end at
    /// (matching the original's single-candidate move-fusion lookup).
    fn common_handoff(&self, a: &str, b: &str) -> Option<(Pose, String, String)> {
        for pose in self.poses_ending(a) {
            if let Some(from_key) = self.key_starting_at(b, &pose) {
                let to_key = self.key_ending_at(a, &pose)?.to_string();
                return Some((pose, to_key, from_key.to_string()));
            }
        }
        None
    }
}

/// An in-memory registry built from a flat list of move-list keys, parsed
/// once at construction time into a `(base, pose) -> key` table so that
/// fusion lookups are hash hits, not string splits, per DESIGN NOTES §9.
pub struct InMemoryMoveListRegistry {
    keys: HashMap<String, ()>,
    ends_at: HashMap<(String, Pose), String>,
    starts_at: HashMap<(String, Pose), String>,
}

impl InMemoryMoveListRegistry {
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> InMemoryMoveListRegistry {
        let mut all_keys = HashMap::new();
        let mut ends_at = HashMap::new();
        let mut starts_at = HashMap::new();
        for raw in keys {
            let raw = raw.into();
            let parsed = parse_key(&raw);
            if let Some(pose) = parsed.end_pose.clone() {
                ends_at.insert((parsed.base.clone(), pose), parsed.key.clone());
            }
            if let Some(pose) = parsed.start_pose.clone() {
                starts_at.insert((parsed.base.clone(), pose), parsed.key.clone());
            }
            all_keys.insert(raw, ());
        }
        InMemoryMoveListRegistry {
            keys: all_keys,
            ends_at,
            starts_at,
        }
    }
}

impl MoveListRegistry for InMemoryMoveListRegistry {
    fn is_registered(&self, program_name: &str) -> bool {
        self.keys.contains_key(program_name)
    }

    fn key_ending_at(&self, base: &str, pose: &Pose) -> Option<&str> {
        self.ends_at
            .get(&(base.to_string(), pose.clone()))
            .map(String::as_str)
    }

    fn key_starting_at(&self, base: &str, pose: &Pose) -> Option<&str> {
        self.starts_at
            .get(&(base.to_string(), pose.clone()))
            .map(String::as_str)
    }

    fn poses_ending(&self, base: &str) -> Vec<Pose> {
        self.ends_at
            .keys()
            .filter(|(b, _)| b == base)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn poses_starting(&self, base: &str) -> Vec<Pose> {
        self.starts_at
            .keys()
            .filter(|(b, _)| b == base)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_program_is_rejected() {
        let reg = InMemoryMoveListRegistry::new(["wash get to wash neu"]);
        assert!(reg.require_registered("wash get to wash neu").is_ok());
        assert!(matches!(
            reg.require_registered("nope").unwrap_err(),
            PainterError::UnknownProgram(_)
        ));
    }

    #[test]
    fn convention_keys_resolve_to_shared_pose() {
        let reg = InMemoryMoveListRegistry::new([
            "wash get to wash neu",
            "wash_to_disp from wash neu to disp neu",
        ]);
        let d = Pose::new("wash neu");
        assert_eq!(reg.key_ending_at("wash get", &d), Some("wash get to wash neu"));
        assert_eq!(
            reg.key_starting_at("wash_to_disp", &d),
            Some("wash_to_disp from wash neu to disp neu")
        );
    }

    #[test]
    fn common_handoff_finds_the_shared_pose() {
        let reg = InMemoryMoveListRegistry::new([
            "wash get to wash neu",
            "wash_to_disp from wash neu to disp neu",
        ]);
        let (pose, to_key, from_key) = reg.common_handoff("wash get", "wash_to_disp").unwrap();
        assert_eq!(pose, Pose::new("wash neu"));
        assert_eq!(to_key, "wash get to wash neu");
        assert_eq!(from_key, "wash_to_disp from wash neu to disp neu");
    }

    #[test]
    fn common_handoff_is_none_without_a_shared_pose() {
        let reg = InMemoryMoveListRegistry::new(["a to x", "b from y"]);
        assert!(reg.common_handoff("a", "b").is_none());
    }

    #[test]
    fn underscore_base_names_do_not_confuse_the_to_split() {
        let reg = InMemoryMoveListRegistry::new(["wash_to_disp from wash neu to disp neu"]);
        assert_eq!(
            reg.key_starting_at("wash_to_disp", &Pose::new("wash neu")),
            Some("wash_to_disp from wash neu to disp neu")
        );
    }
}
