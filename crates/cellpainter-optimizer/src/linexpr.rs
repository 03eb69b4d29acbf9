// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! A small affine-expression type (`sum(coeff_i * var_i) + constant`) used
//! internally while walking a command tree: unlike [`cellpainter_repr::SymVar`],
//! which only ever represents a single variable plus an offset, a
//! checkpoint's predicted time is generally a *sum* of every free delay
//! variable on the path that led to it, so the optimizer needs the richer
//! form to propagate times symbolically before solving.

use std::collections::HashMap;

use cellpainter_repr::sym::SymVar;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    pub coeffs: HashMap<String, f64>,
    pub constant: f64,
}

impl LinExpr {
    pub fn constant(value: f64) -> LinExpr {
        LinExpr {
            coeffs: HashMap::new(),
            constant: value,
        }
    }

    pub fn from_symvar(v: &SymVar) -> LinExpr {
        match v {
            SymVar::Const(c) => LinExpr::constant(*c),
            SymVar::Var(name) => {
                let mut coeffs = HashMap::new();
                coeffs.insert(name.clone(), 1.0);
                LinExpr { coeffs, constant: 0.0 }
            }
            SymVar::Plus(name, off) => {
                let mut coeffs = HashMap::new();
                coeffs.insert(name.clone(), 1.0);
                LinExpr {
                    coeffs,
                    constant: *off,
                }
            }
        }
    }

    pub fn add(&self, other: &LinExpr) -> LinExpr {
        let mut coeffs = self.coeffs.clone();
        for (name, c) in &other.coeffs {
            *coeffs.entry(name.clone()).or_insert(0.0) += c;
        }
        LinExpr {
            coeffs,
            constant: self.constant + other.constant,
        }
    }

    pub fn sub(&self, other: &LinExpr) -> LinExpr {
        let mut coeffs = self.coeffs.clone();
        for (name, c) in &other.coeffs {
            *coeffs.entry(name.clone()).or_insert(0.0) -= c;
        }
        LinExpr {
            coeffs,
            constant: self.constant - other.constant,
        }
    }

    pub fn add_const(&self, value: f64) -> LinExpr {
        LinExpr {
            coeffs: self.coeffs.clone(),
            constant: self.constant + value,
        }
    }

    /// Substitutes every variable already present in `assignment`, folding
    /// its contribution into the constant term. What remains is the
    /// expression in terms of whatever variables are still unresolved.
    pub fn partially_resolve(&self, assignment: &HashMap<String, f64>) -> LinExpr {
        let mut constant = self.constant;
        let mut coeffs = HashMap::new();
        for (name, c) in &self.coeffs {
            match assignment.get(name) {
                Some(v) => constant += c * v,
                None => {
                    coeffs.insert(name.clone(), *c);
                }
            }
        }
        LinExpr { coeffs, constant }
    }

    /// Fully resolves this expression given an assignment for every
    /// variable it mentions, defaulting any variable the assignment omits
    /// to zero (a free delay that no `exactly` constraint ever pinned
    /// down, and so is scheduled as tight as possible).
    pub fn resolve(&self, assignment: &HashMap<String, f64>) -> f64 {
        self.constant
            + self
                .coeffs
                .iter()
                .map(|(name, c)| c * assignment.get(name).copied().unwrap_or(0.0))
                .sum::<f64>()
    }

    /// The later of two predicted times. `LinExpr` has no general notion of
    /// "max" of two affine expressions — that's only an affine expression
    /// itself when one side provably dominates. `sub` cancels whatever
    /// variables the two sides share, so when the two timelines differ only
    /// by a known constant (the common case: a resource's previous fork and
    /// the thread dispatching the next one share the same unresolved delay
    /// variables upstream of the fork point) the comparison is exact. If
    /// free variables remain after cancellation, this falls back to
    /// comparing constant terms, which is exact whenever every remaining
    /// free delay resolves to a nonnegative value (true for every delay this
    /// optimizer ever introduces).
    pub fn later(&self, other: &LinExpr) -> LinExpr {
        let diff = self.sub(other);
        if diff.constant >= 0.0 {
            self.clone()
        } else {
            other.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_symvar_plus_keeps_the_offset() {
        let e = LinExpr::from_symvar(&(SymVar::var("x") + 5.0));
        assert_eq!(e.constant, 5.0);
        assert_eq!(e.coeffs.get("x"), Some(&1.0));
    }

    #[test]
    fn sub_cancels_equal_expressions_to_a_pure_constant() {
        let a = LinExpr::from_symvar(&SymVar::var("x")).add_const(10.0);
        let b = LinExpr::from_symvar(&SymVar::var("x")).add_const(3.0);
        let diff = a.sub(&b);
        assert!(diff.coeffs.values().all(|c| c.abs() < 1e-9));
        assert_eq!(diff.constant, 7.0);
    }

    #[test]
    fn partially_resolve_folds_known_variables_into_the_constant() {
        let e = LinExpr::from_symvar(&SymVar::var("x")).add(&LinExpr::from_symvar(&SymVar::var("y")));
        let mut known = HashMap::new();
        known.insert("x".to_string(), 4.0);
        let reduced = e.partially_resolve(&known);
        assert_eq!(reduced.constant, 4.0);
        assert!(!reduced.coeffs.contains_key("x"));
        assert_eq!(reduced.coeffs.get("y"), Some(&1.0));
    }

    #[test]
    fn resolve_defaults_missing_variables_to_zero() {
        let e = LinExpr::from_symvar(&SymVar::var("x")).add_const(2.0);
        assert_eq!(e.resolve(&HashMap::new()), 2.0);
    }

    #[test]
    fn later_picks_the_larger_constant() {
        let a = LinExpr::constant(3.0);
        let b = LinExpr::constant(7.0);
        assert_eq!(a.later(&b).constant, 7.0);
        assert_eq!(b.later(&a).constant, 7.0);
    }

    #[test]
    fn later_cancels_a_shared_free_variable_before_comparing() {
        let shared = LinExpr::from_symvar(&SymVar::var("upstream delay"));
        let a = shared.add_const(3.0);
        let b = shared.add_const(7.0);
        let later = a.later(&b);
        assert_eq!(later.coeffs.get("upstream delay"), Some(&1.0));
        assert_eq!(later.constant, 7.0);
    }
}
