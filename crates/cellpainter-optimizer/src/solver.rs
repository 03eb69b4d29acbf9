// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! The slack solver: given a set of `expr == expr` equalities collected
//! while walking a command tree (one per `Duration(.., exactly=...)`
//! binding), solves for every free variable those equalities pin down, by
//! repeated single-variable substitution rather than a general simplex —
//! matching spec §4.5's "longest-path / slack LP, no full simplex needed"
//! instruction: every `exactly` binding in practice isolates exactly one
//! still-unknown delay variable once its neighbors are substituted in, so
//! Gauss-Seidel-style iteration to a fixed point always converges in one
//! pass over the equation list.

use std::collections::HashMap;

use cellpainter_repr::error::{PainterError, Result};

use crate::linexpr::LinExpr;

const EPSILON: f64 = 1e-6;

/// Solves `lhs == rhs` for every `(lhs, rhs)` pair in `equalities`,
/// returning the resulting `variable -> value` assignment. A pair that
/// reduces to a contradiction (no free variable left, and a nonzero
/// residual) is reported as [`PainterError::Infeasible`]. A pair with more
/// than one free variable remaining after substitution is left for a later
/// pass; if no pass makes progress, it is left unassigned (its variables
/// default to zero when the plan is resolved, exactly like a variable that
/// never appeared in any equality at all).
pub fn solve(equalities: &[(LinExpr, LinExpr)]) -> Result<HashMap<String, f64>> {
    let residuals: Vec<LinExpr> = equalities.iter().map(|(lhs, rhs)| lhs.sub(rhs)).collect();
    let mut assignment: HashMap<String, f64> = HashMap::new();

    loop {
        let mut progressed = false;
        for residual in &residuals {
            let reduced = residual.partially_resolve(&assignment);
            let nonzero: Vec<(&String, &f64)> = reduced
                .coeffs
                .iter()
                .filter(|(_, c)| c.abs() > EPSILON)
                .collect();

            match nonzero.as_slice() {
                [] => {
                    if reduced.constant.abs() > EPSILON {
                        return Err(PainterError::Infeasible(format!(
                            "an `exactly` duration binding is unsatisfiable (residual {:.3}s)",
                            reduced.constant
                        )));
                    }
                }
                [(name, coeff)] => {
                    let name = (*name).clone();
                    if !assignment.contains_key(&name) {
                        assignment.insert(name, -reduced.constant / *coeff);
                        progressed = true;
                    }
                }
                _ => {}
            }
        }
        if !progressed {
            break;
        }
    }

    Ok(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellpainter_repr::sym::SymVar;

    #[test]
    fn solves_a_single_equality_directly() {
        let elapsed = LinExpr::from_symvar(&SymVar::var("x")).add_const(2.0);
        let target = LinExpr::constant(10.0);
        let assignment = solve(&[(elapsed, target)]).unwrap();
        assert_eq!(assignment.get("x"), Some(&8.0));
    }

    #[test]
    fn chains_two_equalities_through_a_shared_variable() {
        let first = (
            LinExpr::from_symvar(&SymVar::var("x")),
            LinExpr::constant(5.0),
        );
        let second = (
            LinExpr::from_symvar(&SymVar::var("y")).add(&LinExpr::from_symvar(&SymVar::var("x"))),
            LinExpr::constant(12.0),
        );
        let assignment = solve(&[first, second]).unwrap();
        assert_eq!(assignment.get("x"), Some(&5.0));
        assert_eq!(assignment.get("y"), Some(&7.0));
    }

    #[test]
    fn contradictory_constants_are_infeasible() {
        let eq = (LinExpr::constant(1.0), LinExpr::constant(2.0));
        assert!(matches!(solve(&[eq]), Err(PainterError::Infeasible(_))));
    }

    #[test]
    fn consistent_constants_are_fine() {
        let eq = (LinExpr::constant(3.0), LinExpr::constant(3.0));
        assert!(solve(&[eq]).unwrap().is_empty());
    }
}
