// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The physical layout enumeration and `Plate` data type, grounded on the
//! `H`/`I`/`*_locs`/`Plate`/`define_plates` definitions in
//! `original_source/protocol.py`.
//!
//! Hotel slots are numbered by hotel position (`H`, counting down by twos
//! from 21) and incubator slots by a flat 1..22 range duplicated across the
//! left (`L`) and right (`R`) incubator halves (`I`). The four named slot
//! families (`out*`, `h*`, `r*`, incubator) are carved up into the
//! `rt`/`out`/`lid` pools a batch actually draws from, matching the
//! original's slicing of `A_locs`/`B_locs`/`C_locs`.

use crate::error::{PainterError, Result};

const H: [u32; 11] = [21, 19, 17, 15, 13, 11, 9, 7, 5, 3, 1];

fn a_locs() -> Vec<String> {
    H.iter().map(|h| format!("out{h}")).collect()
}

fn b_locs() -> Vec<String> {
    H.iter().map(|h| format!("h{h}")).collect()
}

fn c_locs() -> Vec<String> {
    H.iter().map(|h| format!("r{h}")).collect()
}

/// The 44 incubator slots, `L1..L22` then `R1..R22`.
pub fn incu_locs() -> Vec<String> {
    (1..=22)
        .map(|i| format!("L{i}"))
        .chain((1..=22).map(|i| format!("R{i}")))
        .collect()
}

/// Room-temperature rest slots a plate parks in between wash/disp steps
/// that don't go back to the incubator: the first five `r*` slots, the
/// first five `out*` slots, and `h13` (the fifth `h` slot).
pub fn rt_locs() -> Vec<String> {
    let c = c_locs();
    let a = a_locs();
    let b = b_locs();
    let mut v: Vec<String> = c[..5].to_vec();
    v.extend(a[..5].iter().cloned());
    v.push(b[4].clone());
    v
}

/// Output-hotel slots a finished plate is parked in, in the order plates
/// are assigned to them: the remaining `out*`, `h*`, `r*` slots, each
/// reversed.
pub fn out_locs() -> Vec<String> {
    let a = a_locs();
    let b = b_locs();
    let c = c_locs();
    let mut v: Vec<String> = a[5..].to_vec();
    v.reverse();
    let mut b_tail: Vec<String> = b[5..].to_vec();
    b_tail.reverse();
    v.extend(b_tail);
    let mut c_tail: Vec<String> = c[5..].to_vec();
    c_tail.reverse();
    v.extend(c_tail);
    v
}

/// Hotel slots a plate's lid can be parked in while the plate itself is in
/// wash/disp/incubator: `h19` and `h17`.
pub fn lid_locs() -> Vec<String> {
    b_locs()
        .into_iter()
        .filter(|b| b.contains("19") || b.contains("17"))
        .collect()
}

/// `B21`, the staging hotel slot directly adjacent to wash/disp.
pub const B21: &str = "h21";

/// One plate's identity and the physical slots it occupies for the
/// duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plate {
    pub id: String,
    pub incu_loc: String,
    pub rt_loc: String,
    pub lid_loc: String,
    pub out_loc: String,
    pub batch_index: usize,
}

impl Plate {
    /// The robot-arm move-list key for parking this plate's lid.
    pub fn lid_put(&self) -> String {
        format!("lid_{} put", self.lid_loc)
    }

    /// The robot-arm move-list key for retrieving this plate's lid.
    pub fn lid_get(&self) -> String {
        format!("lid_{} get", self.lid_loc)
    }

    /// The robot-arm move-list key for parking this plate at its
    /// room-temperature rest slot.
    pub fn rt_put(&self) -> String {
        format!("{} put", self.rt_loc)
    }

    /// The robot-arm move-list key for retrieving this plate from its
    /// room-temperature rest slot.
    pub fn rt_get(&self) -> String {
        format!("{} get", self.rt_loc)
    }

    /// The robot-arm move-list key for parking this plate at its output
    /// hotel slot.
    pub fn out_put(&self) -> String {
        format!("{} put", self.out_loc)
    }

    /// The robot-arm move-list key for retrieving this plate from its
    /// output hotel slot.
    pub fn out_get(&self) -> String {
        format!("{} get", self.out_loc)
    }

    /// Returns a copy of this plate with its lid slot overridden, used by
    /// the builder to assign a lid slot per step rather than per plate
    /// (interleaved runs rotate through two lid slots).
    pub fn with_lid_loc(&self, lid_loc: impl Into<String>) -> Plate {
        Plate {
            lid_loc: lid_loc.into(),
            ..self.clone()
        }
    }
}

/// Assigns incubator/rest/lid/output slots to every plate in every batch,
/// asserting the distinctness invariants from spec §3 by construction:
/// plates share no slot with any other plate within a batch, and no
/// `incu`/`out` slot with any plate in *any* batch (lid/rt may repeat
/// across batches once earlier plates have vacated them).
pub fn define_plates(batch_sizes: &[usize]) -> Result<Vec<Plate>> {
    let incu = incu_locs();
    let rt = rt_locs();
    let out = out_locs();
    let lid = lid_locs();

    let mut plates = Vec::new();
    let mut index = 0usize;
    for (batch_index, &batch_size) in batch_sizes.iter().enumerate() {
        for index_in_batch in 0..batch_size {
            plates.push(Plate {
                id: format!("{}", index + 1),
                incu_loc: incu[index].clone(),
                rt_loc: rt[index_in_batch % rt.len()].clone(),
                lid_loc: lid[index_in_batch % lid.len()].clone(),
                out_loc: out[index].clone(),
                batch_index,
            });
            index += 1;
        }
    }

    for (i, p) in plates.iter().enumerate() {
        for (j, q) in plates.iter().enumerate() {
            if i == j {
                continue;
            }
            if p.incu_loc == q.incu_loc {
                return Err(PainterError::SlotCollision {
                    a: p.id.clone(),
                    b: q.id.clone(),
                    kind: "incu",
                    loc: p.incu_loc.clone(),
                });
            }
            if p.out_loc == q.out_loc {
                return Err(PainterError::SlotCollision {
                    a: p.id.clone(),
                    b: q.id.clone(),
                    kind: "out",
                    loc: p.out_loc.clone(),
                });
            }
            if p.batch_index == q.batch_index && p.rt_loc == q.rt_loc {
                return Err(PainterError::SlotCollision {
                    a: p.id.clone(),
                    b: q.id.clone(),
                    kind: "rt",
                    loc: p.rt_loc.clone(),
                });
            }
        }
    }

    Ok(plates)
}

/// Groups a flat plate list back into per-batch lists, ordered by batch
/// index, matching `group_by_batch`.
pub fn group_by_batch(plates: Vec<Plate>) -> Vec<Vec<Plate>> {
    use std::collections::BTreeMap;
    let mut groups: BTreeMap<usize, Vec<Plate>> = BTreeMap::new();
    for p in plates {
        groups.entry(p.batch_index).or_default().push(p);
    }
    groups.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_plates_assigns_distinct_slots_within_a_batch() {
        let plates = define_plates(&[5]).unwrap();
        assert_eq!(plates.len(), 5);
        let mut incu: Vec<_> = plates.iter().map(|p| &p.incu_loc).collect();
        incu.sort();
        incu.dedup();
        assert_eq!(incu.len(), 5);
    }

    #[test]
    fn define_plates_keeps_incu_and_out_distinct_across_batches() {
        let plates = define_plates(&[2, 2]).unwrap();
        let mut incu: Vec<_> = plates.iter().map(|p| p.incu_loc.clone()).collect();
        incu.sort();
        incu.dedup();
        assert_eq!(incu.len(), 4);
        let mut out: Vec<_> = plates.iter().map(|p| p.out_loc.clone()).collect();
        out.sort();
        out.dedup();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn group_by_batch_preserves_batch_order() {
        let plates = define_plates(&[2, 3]).unwrap();
        let groups = group_by_batch(plates);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 3);
    }
}
