// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! Interleaving templates: the textual DAG mini-language that describes how
//! N consecutive plates share the wash/disp/hotel21 pipeline at one step.
//! Grounded on `Interleaving.init` and the `lin`/`june`/`mix`/`quad`/
//! `three`/`washlin`/`washjune`/`finlin`/`finjune` templates in
//! `original_source/protocol.py`.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::{PainterError, Result};

/// One parsed interleaving template: an ordered list of `(row_index,
/// sub_part)` pairs, where `row_index` is the occurrence count of
/// `sub_part` seen so far while parsing (so the k-th plate's rows are
/// exactly those with `row_index == k`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interleaving {
    pub rows: Vec<(usize, String)>,
}

impl Interleaving {
    /// Parses a template written as chained `a -> b -> c` lines. Each
    /// consecutive arrow (`a -> b`) becomes one row, tagged with how many
    /// times that exact arrow has already appeared. Every distinct arrow
    /// must appear the same number of times (at least twice — a template
    /// with fewer repeats describes no interleaving at all).
    pub fn parse(source: &str) -> Result<Interleaving> {
        let mut rows = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        let mut counts: HashMap<String, usize> = HashMap::new();

        for line in source.trim().lines() {
            let sides: Vec<&str> = line.trim().split("->").map(str::trim).collect();
            if sides.len() < 2 {
                continue;
            }
            for pair in sides.windows(2) {
                let arrow = format!("{} -> {}", pair[0], pair[1]);
                let count = counts.entry(arrow.clone()).or_insert(0);
                rows.push((*count, arrow.clone()));
                if *count == 0 {
                    seen.push(arrow);
                }
                *count += 1;
            }
        }

        let target = *counts
            .get(seen.first().ok_or_else(|| {
                PainterError::MalformedInterleaving("template has no transitions".to_string())
            })?)
            .unwrap();
        if target < 2 {
            return Err(PainterError::MalformedInterleaving(
                "need at least two copies of every transition".to_string(),
            ));
        }
        for arrow in &seen {
            let count = counts[arrow];
            if count != target {
                return Err(PainterError::MalformedInterleaving(format!(
                    "{arrow:?} occurred {count} times, should be {target} times"
                )));
            }
        }

        Ok(Interleaving { rows })
    }

    /// How many plates this template interleaves (the number of times each
    /// transition repeats).
    pub fn width(&self) -> usize {
        self.rows.iter().map(|(i, _)| i + 1).max().unwrap_or(0)
    }

    /// The set of distinct sub-parts named by this template, in the order
    /// they first appear.
    pub fn sub_parts(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for (_, sub_part) in &self.rows {
            if !seen.contains(&sub_part.as_str()) {
                seen.push(sub_part.as_str());
            }
        }
        seen
    }
}

macro_rules! interleaving {
    ($src:expr) => {
        Lazy::new(|| Interleaving::parse($src).expect("built-in interleaving template"))
    };
}

pub static LIN: Lazy<Interleaving> = interleaving!(
    "
    incu -> B21 -> wash -> disp -> B21 -> incu
    incu -> B21 -> wash -> disp -> B21 -> incu
    "
);

pub static JUNE: Lazy<Interleaving> = interleaving!(
    "
    incu -> B21  -> wash
    incu -> B21
                    wash -> disp
            B21  -> wash
                            disp -> B21 -> incu
    incu -> B21
                    wash -> disp
            B21  -> wash
                            disp -> B21 -> incu
                    wash -> disp
                            disp -> B21 -> incu
    "
);

pub static MIX: Lazy<Interleaving> = interleaving!(
    "
    incu -> B21 -> wash
                   wash -> disp
    incu -> B21 -> wash
                           disp -> B21 -> incu
                   wash -> disp
    incu -> B21 -> wash
                           disp -> B21 -> incu
                   wash -> disp
                           disp -> B21 -> incu
    "
);

pub static QUAD: Lazy<Interleaving> = interleaving!(
    "
    incu -> B21 -> wash
                   wash -> disp
    incu -> B21 -> wash
                           disp -> B21
                   wash -> disp
                                   B21  -> incu
    incu -> B21 -> wash
                           disp -> B21
                   wash -> disp
                                   B21  -> incu
                           disp -> B21
                                   B21  -> incu
    "
);

pub static THREE: Lazy<Interleaving> = interleaving!(
    "
    incu -> B21 -> wash
                   wash -> disp
    incu -> B21 -> wash
                           disp -> B21
                   wash -> disp
    incu -> B21 -> wash
                                   B21 -> incu
                           disp -> B21
                   wash -> disp
    incu -> B21 -> wash
                                   B21 -> incu
                           disp -> B21
                   wash -> disp
                                   B21 -> incu
                           disp -> B21
                                   B21 -> incu
    "
);

pub static WASHLIN: Lazy<Interleaving> = interleaving!(
    "
    incu -> B21 -> wash -> B21 -> incu
    incu -> B21 -> wash -> B21 -> incu
    "
);

pub static WASHJUNE: Lazy<Interleaving> = interleaving!(
    "
    incu -> B21 -> wash
    incu -> B21
                   wash -> B15
            B21 -> wash
                           B15 -> B21 -> incu
    incu -> B21
                   wash -> B15
            B21 -> wash
                           B15 -> B21 -> incu
                   wash -> B15
                           B15 -> B21 -> incu
    "
);

pub static FINLIN: Lazy<Interleaving> = interleaving!(
    "
    incu -> B21 -> wash -> B21 -> out
    incu -> B21 -> wash -> B21 -> out
    "
);

pub static FINJUNE: Lazy<Interleaving> = interleaving!(
    "
    incu -> B21
            B21 -> wash
    incu -> B21
                   wash -> B15
            B21 -> wash
                           B15 -> B21 -> out
    incu -> B21
                   wash -> B15
            B21 -> wash
                           B15 -> B21 -> out
                   wash -> B15
                           B15 -> B21 -> out
    "
);

/// Looks up a registered template by name (`lin`, `june`, `mix`, `quad`,
/// `three`, `washlin`, `washjune`, `finlin`, `finjune`).
pub fn lookup(name: &str) -> Result<&'static Interleaving> {
    match name {
        "lin" => Ok(&LIN),
        "june" => Ok(&JUNE),
        "mix" => Ok(&MIX),
        "quad" => Ok(&QUAD),
        "three" => Ok(&THREE),
        "washlin" => Ok(&WASHLIN),
        "washjune" => Ok(&WASHJUNE),
        "finlin" => Ok(&FINLIN),
        "finjune" => Ok(&FINJUNE),
        other => Err(PainterError::UnknownInterleaving(other.to_string())),
    }
}

/// Whether `name` names a registered template, used by `ProtocolConfig`'s
/// validation.
pub fn is_registered(name: &str) -> bool {
    lookup(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lin_interleaves_two_plates() {
        assert_eq!(LIN.width(), 2);
        assert_eq!(LIN.rows[0], (0, "incu -> B21".to_string()));
        assert_eq!(LIN.rows[6], (1, "incu -> B21".to_string()));
    }

    #[test]
    fn june_interleaves_four_plates() {
        assert_eq!(JUNE.width(), 4);
    }

    #[test]
    fn all_named_templates_are_registered() {
        for name in [
            "lin", "june", "mix", "quad", "three", "washlin", "washjune", "finlin", "finjune",
        ] {
            assert!(is_registered(name), "{name} should be registered");
        }
        assert!(!is_registered("nonexistent"));
    }

    #[test]
    fn parse_rejects_an_unbalanced_template() {
        let err = Interleaving::parse("a -> b\na -> b\na -> b -> c").unwrap_err();
        assert!(matches!(err, PainterError::MalformedInterleaving(_)));
    }

    #[test]
    fn parse_rejects_a_template_that_never_repeats() {
        let err = Interleaving::parse("a -> b -> c").unwrap_err();
        assert!(matches!(err, PainterError::MalformedInterleaving(_)));
    }
}
