// Copyright 2026 the cell-paint contributors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License is included in the LICENSE file at the root
// of this workspace.

//! Symbolic time expressions, grounded on `symbolic.Symbolic` as used
//! throughout `original_source/protocol.py` (`Symbolic.wrap`, `Symbolic.var`,
//! `p.incu[i-1]`, `WaitForCheckpoint(..) + Symbolic.var(..)`).
//!
//! A [`SymVar`] is one of three things: a named variable the optimizer must
//! assign, a known non-negative constant, or a named variable shifted by a
//! constant offset. This is deliberately not a general expression tree —
//! spec §3 limits the algebra to exactly these three shapes, which keeps
//! the optimizer's constraint generation linear by construction.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

#[cfg(feature = "proptest")]
use proptest_derive::Arbitrary;

/// A symbolic time expression: a variable, a constant, or `variable +
/// offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "proptest", derive(Arbitrary))]
pub enum SymVar {
    /// A named unknown the optimizer must solve for.
    Var(String),
    /// A known, non-negative constant number of seconds.
    Const(f64),
    /// A named unknown plus a constant offset, e.g. `incu_delay + 2.0`.
    Plus(String, f64),
}

impl SymVar {
    /// Creates a fresh named variable.
    pub fn var(name: impl Into<String>) -> SymVar {
        SymVar::Var(name.into())
    }

    /// Wraps a plain number as a constant, matching `Symbolic.wrap(float)`.
    /// Panics on a negative value: every constant in this algebra is a
    /// duration or a delay, never negative.
    pub fn constant(secs: f64) -> SymVar {
        assert!(secs >= 0.0, "SymVar constants must be non-negative, got {secs}");
        SymVar::Const(secs)
    }

    /// The zero constant, used as the default `Idle` delay and the
    /// no-op `Fork` epsilon base.
    pub fn zero() -> SymVar {
        SymVar::Const(0.0)
    }

    /// If this is a bare constant (no variable part), returns its value.
    pub fn as_const(&self) -> Option<f64> {
        match self {
            SymVar::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// The name of the underlying variable, if any.
    pub fn var_name(&self) -> Option<&str> {
        match self {
            SymVar::Var(name) | SymVar::Plus(name, _) => Some(name),
            SymVar::Const(_) => None,
        }
    }

    /// The constant offset carried by this expression (zero for a bare
    /// variable or constant).
    pub fn offset(&self) -> f64 {
        match self {
            SymVar::Var(_) => 0.0,
            SymVar::Const(v) => *v,
            SymVar::Plus(_, off) => *off,
        }
    }

    /// Evaluates this expression given an assignment for its variable (if
    /// any). Used by the optimizer once it has solved for every variable,
    /// and by tests that want to check a concrete value.
    pub fn resolve(&self, assignment: &std::collections::HashMap<String, f64>) -> f64 {
        match self {
            SymVar::Const(v) => *v,
            SymVar::Var(name) => *assignment
                .get(name)
                .unwrap_or_else(|| panic!("no assignment for variable {name:?}")),
            SymVar::Plus(name, off) => {
                assignment
                    .get(name)
                    .unwrap_or_else(|| panic!("no assignment for variable {name:?}"))
                    + off
            }
        }
    }
}

impl Add<f64> for SymVar {
    type Output = SymVar;

    /// Shifts this expression by a constant offset, matching `Symbolic +
    /// float` in the source: `Var(n) + k -> Plus(n, k)`, `Plus(n, j) + k ->
    /// Plus(n, j+k)`, `Const(c) + k -> Const(c+k)`.
    fn add(self, rhs: f64) -> SymVar {
        match self {
            SymVar::Var(name) => SymVar::Plus(name, rhs),
            SymVar::Const(v) => SymVar::Const(v + rhs),
            SymVar::Plus(name, off) => SymVar::Plus(name, off + rhs),
        }
    }
}

impl From<f64> for SymVar {
    fn from(v: f64) -> SymVar {
        SymVar::constant(v)
    }
}

impl From<&str> for SymVar {
    fn from(name: &str) -> SymVar {
        SymVar::var(name)
    }
}

impl From<String> for SymVar {
    fn from(name: String) -> SymVar {
        SymVar::var(name)
    }
}

impl fmt::Display for SymVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymVar::Var(name) => write!(f, "{name}"),
            SymVar::Const(v) => write!(f, "{v}"),
            SymVar::Plus(name, off) => write!(f, "{name} + {off}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifting_a_variable_keeps_the_name() {
        let v = SymVar::var("incu 0") + 5.0;
        assert_eq!(v, SymVar::Plus("incu 0".to_string(), 5.0));
    }

    #[test]
    fn shifting_twice_accumulates_the_offset() {
        let v = SymVar::var("x") + 1.0 + 2.0;
        assert_eq!(v, SymVar::Plus("x".to_string(), 3.0));
    }

    #[test]
    fn shifting_a_constant_folds() {
        let v = SymVar::constant(10.0) + 5.0;
        assert_eq!(v, SymVar::Const(15.0));
    }

    #[test]
    fn resolve_looks_up_the_variable() {
        let mut assignment = std::collections::HashMap::new();
        assignment.insert("x".to_string(), 7.0);
        assert_eq!(SymVar::var("x").resolve(&assignment), 7.0);
        assert_eq!((SymVar::var("x") + 3.0).resolve(&assignment), 10.0);
        assert_eq!(SymVar::constant(2.0).resolve(&assignment), 2.0);
    }
}
