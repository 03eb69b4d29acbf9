// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! Per-command metadata, grounded on `commands.Metadata` / `log.LogEntry.add`
//! in `original_source/cellpainter/log.py`: string fields merge by joining
//! with `"; "`, numeric/id fields merge by taking whichever side is set
//! (`with_metadata` never overwrites an already-set id).

use serde::{Deserialize, Serialize};

#[cfg(feature = "proptest")]
use proptest_derive::Arbitrary;

/// The metadata bag every command carries: which plate, step, and sub-part
/// it belongs to, which batch, and (once [`crate::command::Command::assign_ids`]
/// has run) its unique id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "proptest", derive(Arbitrary))]
pub struct Metadata {
    pub plate_id: Option<String>,
    pub step: Option<String>,
    pub sub_part: Option<String>,
    pub batch_index: Option<usize>,
    pub id: Option<String>,
}

impl Metadata {
    pub fn new() -> Metadata {
        Metadata::default()
    }

    pub fn with_plate_id(mut self, plate_id: impl Into<String>) -> Metadata {
        self.plate_id = Some(plate_id.into());
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Metadata {
        self.step = Some(step.into());
        self
    }

    pub fn with_sub_part(mut self, sub_part: impl Into<String>) -> Metadata {
        self.sub_part = Some(sub_part.into());
        self
    }

    pub fn with_batch_index(mut self, batch_index: usize) -> Metadata {
        self.batch_index = Some(batch_index);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Metadata {
        self.id = Some(id.into());
        self
    }

    /// Merges `other` into `self`: string-ish fields concatenate with
    /// `"; "` when both sides are set (matching `LogEntry.add`'s message
    /// joining), `batch_index` takes the max of the two, and `id` prefers
    /// whichever side already has one (an id, once assigned, is never
    /// clobbered by a later merge).
    pub fn merge(&self, other: &Metadata) -> Metadata {
        Metadata {
            plate_id: merge_strings(&self.plate_id, &other.plate_id),
            step: merge_strings(&self.step, &other.step),
            sub_part: merge_strings(&self.sub_part, &other.sub_part),
            batch_index: match (self.batch_index, other.batch_index) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (Some(a), None) => Some(a),
                (None, b) => b,
            },
            id: self.id.clone().or_else(|| other.id.clone()),
        }
    }
}

fn merge_strings(a: &Option<String>, b: &Option<String>) -> Option<String> {
    match (a, b) {
        (Some(a), Some(b)) if a != b => Some(format!("{a}; {b}")),
        (Some(a), Some(_)) => Some(a.clone()),
        (Some(a), None) => Some(a.clone()),
        (None, b) => b.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_concatenates_distinct_strings() {
        let a = Metadata::new().with_step("Mito");
        let b = Metadata::new().with_step("PFA");
        assert_eq!(a.merge(&b).step, Some("Mito; PFA".to_string()));
    }

    #[test]
    fn merge_takes_max_batch_index() {
        let a = Metadata::new().with_batch_index(1);
        let b = Metadata::new().with_batch_index(3);
        assert_eq!(a.merge(&b).batch_index, Some(3));
    }

    #[test]
    fn merge_never_clobbers_an_existing_id() {
        let a = Metadata::new().with_id("cmd-1");
        let b = Metadata::new().with_id("cmd-2");
        assert_eq!(a.merge(&b).id, Some("cmd-1".to_string()));
    }
}
