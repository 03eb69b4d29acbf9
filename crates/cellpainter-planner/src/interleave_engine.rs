// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The interleaving engine: turns an ordered batch of plates plus a
//! per-step `Interleaving` template into a linear chunk order, grounded on
//! the dependency-graph construction and `graphlib.TopologicalSorter` call
//! at the end of `paint_batch` in `original_source/protocol.py`.
//!
//! The Python source builds this graph with two nested list
//! comprehensions whose loop variables shadow their enclosing scope (a
//! `for i, subpart in ilv.rows` inside a comprehension rebinds `i` to the
//! *row* index, not the outer step index, because comprehensions get their
//! own scope) — `row_idx`/`offset` below name those two loop variables
//! explicitly instead of relying on that shadowing.

use std::collections::{HashMap, HashSet};

use cellpainter_repr::error::{PainterError, Result};
use cellpainter_repr::interleaving;
use cellpainter_repr::layout::Plate;
use cellpainter_repr::ProtocolConfig;

/// One chunk key: which plate, which step, which transition within that
/// step (e.g. `"incu -> B21"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Desc {
    pub plate_id: String,
    pub step: String,
    pub sub_part: String,
}

impl Desc {
    fn new(plate_id: &str, step: &str, sub_part: &str) -> Desc {
        Desc {
            plate_id: plate_id.to_string(),
            step: step.to_string(),
            sub_part: sub_part.to_string(),
        }
    }
}

/// Tracks first-seen order (for stable tie-breaking) and successor edges
/// while the graph is built, then performs a Kahn's-algorithm topological
/// sort that always picks the earliest-inserted ready node, matching
/// `graphlib.TopologicalSorter(deps).static_order()`'s insertion-order
/// stability.
#[derive(Default)]
struct Graph {
    order: Vec<Desc>,
    seen: HashSet<Desc>,
    successors: HashMap<Desc, Vec<Desc>>,
}

impl Graph {
    fn note(&mut self, d: &Desc) {
        if self.seen.insert(d.clone()) {
            self.order.push(d.clone());
        }
    }

    fn edge(&mut self, from: &Desc, to: &Desc) {
        self.note(from);
        self.note(to);
        let succ = self.successors.entry(from.clone()).or_default();
        if !succ.contains(to) {
            succ.push(to.clone());
        }
    }

    /// Chains a list of (possibly absent) descs into precedence edges,
    /// matching `seq()`: `None` entries are dropped first, then each
    /// consecutive surviving pair becomes an edge.
    fn chain(&mut self, descs: Vec<Option<Desc>>) {
        let filtered: Vec<Desc> = descs.into_iter().flatten().collect();
        if filtered.len() == 1 {
            self.note(&filtered[0]);
        }
        for pair in filtered.windows(2) {
            self.edge(&pair[0], &pair[1]);
        }
    }

    fn linearize(&self) -> Result<Vec<Desc>> {
        let mut indegree: HashMap<&Desc, usize> = self.order.iter().map(|d| (d, 0)).collect();
        for succs in self.successors.values() {
            for s in succs {
                *indegree.get_mut(s).expect("successor was noted") += 1;
            }
        }

        let mut ready: Vec<Desc> = self
            .order
            .iter()
            .filter(|d| indegree[d] == 0)
            .cloned()
            .collect();
        let mut result = Vec::with_capacity(self.order.len());

        while !ready.is_empty() {
            // Earliest-inserted ready node first, matching the stable
            // tie-breaking spec requires.
            ready.sort_by_key(|d| self.order.iter().position(|o| o == d).unwrap());
            let next = ready.remove(0);
            result.push(next.clone());
            if let Some(succs) = self.successors.get(&next) {
                for s in succs {
                    let e = indegree.get_mut(s).expect("successor was noted");
                    *e -= 1;
                    if *e == 0 {
                        ready.push(s.clone());
                    }
                }
            }
        }

        if result.len() != self.order.len() {
            let stuck: Vec<String> = self
                .order
                .iter()
                .filter(|d| !result.contains(d))
                .map(|d| format!("{}/{}/{}", d.plate_id, d.step, d.sub_part))
                .collect();
            return Err(PainterError::InterleavingCycle {
                batch: 0,
                nodes: stuck,
            });
        }

        Ok(result)
    }
}

/// Builds the dependency graph for one batch and returns its topological
/// linearization: the order `paint_batch` should emit each plate's
/// per-step chunks in.
pub fn linearize_batch(batch: &[Plate], config: &ProtocolConfig) -> Result<Vec<Desc>> {
    let mut graph = Graph::default();

    let first_plate = &batch[0];
    let last_plate = &batch[batch.len() - 1];

    if config.lockstep {
        for i in 0..config.step_names.len().saturating_sub(1) {
            let step = &config.step_names[i];
            let next_step = &config.step_names[i + 1];
            let ilv = interleaving::lookup(&config.interleavings[i])?;
            let next_ilv = interleaving::lookup(&config.interleavings[i + 1])?;

            let ilv_subparts: HashSet<&str> = ilv.sub_parts().into_iter().collect();
            let next_ilv_subparts: HashSet<&str> = next_ilv.sub_parts().into_iter().collect();

            // overlap[k] = (plate, step, allowed sub-parts at that step)
            let overlap: [(&Plate, &str, &HashSet<&str>); 4] = [
                (&batch[batch.len() - 2], step, &ilv_subparts),
                (&batch[batch.len() - 1], step, &ilv_subparts),
                (first_plate, next_step, &next_ilv_subparts),
                (&batch[1.min(batch.len() - 1)], next_step, &next_ilv_subparts),
            ];

            for offset in 0..overlap.len() {
                let chain: Vec<Option<Desc>> = ilv
                    .rows
                    .iter()
                    .filter_map(|(row_idx, sub_part)| {
                        let slot = row_idx + offset;
                        if slot >= overlap.len() {
                            return None;
                        }
                        let (plate, step_name, allowed) = overlap[slot];
                        if allowed.contains(sub_part.as_str()) {
                            Some(Some(Desc::new(&plate.id, step_name, sub_part)))
                        } else {
                            None
                        }
                    })
                    .collect();
                graph.chain(chain);
            }
        }
    } else {
        for i in 0..config.step_names.len().saturating_sub(1) {
            let step = &config.step_names[i];
            let next_step = &config.step_names[i + 1];
            graph.chain(vec![
                Some(Desc::new(&last_plate.id, step, "B21 -> incu")),
                Some(Desc::new(&first_plate.id, next_step, "incu -> B21")),
            ]);
        }
    }

    for (i, step) in config.step_names.iter().enumerate() {
        let ilv = interleaving::lookup(&config.interleavings[i])?;
        for offset in 0..batch.len() {
            let chain: Vec<Option<Desc>> = ilv
                .rows
                .iter()
                .filter_map(|(row_idx, sub_part)| {
                    let plate_idx = row_idx + offset;
                    if plate_idx >= batch.len() {
                        None
                    } else {
                        Some(Some(Desc::new(&batch[plate_idx].id, step, sub_part)))
                    }
                })
                .collect();
            graph.chain(chain);
        }
    }

    graph.linearize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellpainter_repr::layout::define_plates;
    use cellpainter_repr::protocol_config::make_v3;

    #[test]
    fn two_plate_lin_interleave_orders_incu_before_wash() {
        let plates = define_plates(&[2]).unwrap();
        let config = make_v3("30,30,30,30", false, false, false).unwrap();
        let linear = linearize_batch(&plates, &config).unwrap();

        let pos = |plate: &str, step: &str, sub_part: &str| {
            linear
                .iter()
                .position(|d| d.plate_id == plate && d.step == step && d.sub_part == sub_part)
                .unwrap_or_else(|| panic!("missing {plate}/{step}/{sub_part}"))
        };

        assert!(pos("1", "Mito", "incu -> B21") < pos("1", "Mito", "B21 -> wash"));
        assert!(pos("1", "Mito", "B21 -> wash") < pos("1", "Mito", "wash -> disp"));
        assert!(pos("1", "Mito", "wash -> disp") < pos("1", "Mito", "disp -> B21"));
    }

    #[test]
    fn june_interleave_starts_both_plates_incu_before_either_washes() {
        let plates = define_plates(&[2]).unwrap();
        let config = make_v3("30,30,30,30", true, false, false).unwrap();
        let linear = linearize_batch(&plates, &config).unwrap();

        let pos = |plate: &str, step: &str, sub_part: &str| {
            linear
                .iter()
                .position(|d| d.plate_id == plate && d.step == step && d.sub_part == sub_part)
                .unwrap_or_else(|| panic!("missing {plate}/{step}/{sub_part}"))
        };

        assert!(pos("1", "Mito", "incu -> B21") < pos("1", "Mito", "B21 -> wash"));
        assert!(pos("2", "Mito", "incu -> B21") < pos("2", "Mito", "B21 -> wash"));
    }
}
