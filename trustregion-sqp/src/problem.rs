// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The problem handle: an immutable descriptor of bounds, linear constraints
//! and black-box oracles (spec §3 "Problem handle"). Construction is the
//! only fallible entry point in the crate's public surface, per spec §7's
//! "contract violations" category.

use nalgebra::{DMatrix, DVector};

use crate::error::CoreError;

/// Bound constraints `xl <= x <= xu`.
#[derive(Debug, Clone)]
pub struct Bounds {
    pub xl: DVector<f64>,
    pub xu: DVector<f64>,
}

impl Bounds {
    pub fn new(xl: DVector<f64>, xu: DVector<f64>) -> Result<Self, CoreError> {
        if xl.len() != xu.len() {
            return Err(CoreError::BoundsShapeMismatch {
                n: xl.len(),
                xl_len: xl.len(),
                xu_len: xu.len(),
            });
        }
        Ok(Bounds { xl, xu })
    }

    pub fn n(&self) -> usize {
        self.xl.len()
    }
}

/// A linear constraint set `a x <= b` or `a x = b`, depending on where it is
/// used in [`Problem`].
#[derive(Debug, Clone)]
pub struct LinearConstraintSet {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
}

impl LinearConstraintSet {
    pub fn new(a: DMatrix<f64>, b: DVector<f64>, n: usize, kind: &'static str) -> Result<Self, CoreError> {
        if a.ncols() != n && a.nrows() != 0 {
            return Err(CoreError::LinearConstraintShapeMismatch {
                kind,
                rows: a.nrows(),
                cols: a.ncols(),
                n,
            });
        }
        if a.nrows() != b.len() {
            return Err(CoreError::LinearConstraintRhsMismatch {
                kind,
                rows: a.nrows(),
                rhs_len: b.len(),
            });
        }
        Ok(LinearConstraintSet { a, b })
    }

    pub fn empty(n: usize) -> Self {
        LinearConstraintSet {
            a: DMatrix::zeros(0, n),
            b: DVector::zeros(0),
        }
    }

    pub fn m(&self) -> usize {
        self.b.len()
    }
}

/// Categorical problem type, used to pick between the bound-tangential and
/// constrained-tangential subproblem solvers (spec §4.3) and to decide
/// whether the projected-Cauchy geometry candidate applies (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemType {
    Unconstrained,
    BoundConstrained,
    LinearlyConstrained,
    NonlinearlyConstrained,
}

/// Black-box objective and constraint evaluators. History recording and
/// NaN/infinity sanitization (spec §1 "out of scope") live on the caller's
/// side of these closures; the core only ever invokes them directly.
pub struct Problem {
    n: usize,
    bounds: Bounds,
    linear_ub: LinearConstraintSet,
    linear_eq: LinearConstraintSet,
    m_nonlinear_ub: usize,
    m_nonlinear_eq: usize,
    kind: ProblemType,
    fun: Box<dyn Fn(&DVector<f64>) -> f64>,
    cub: Box<dyn Fn(&DVector<f64>) -> DVector<f64>>,
    ceq: Box<dyn Fn(&DVector<f64>) -> DVector<f64>>,
}

impl Problem {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bounds: Bounds,
        linear_ub: LinearConstraintSet,
        linear_eq: LinearConstraintSet,
        m_nonlinear_ub: usize,
        m_nonlinear_eq: usize,
        fun: impl Fn(&DVector<f64>) -> f64 + 'static,
        cub: impl Fn(&DVector<f64>) -> DVector<f64> + 'static,
        ceq: impl Fn(&DVector<f64>) -> DVector<f64> + 'static,
    ) -> Result<Self, CoreError> {
        let n = bounds.n();
        if linear_ub.a.ncols() != n && linear_ub.m() > 0 {
            return Err(CoreError::LinearConstraintShapeMismatch {
                kind: "inequality",
                rows: linear_ub.a.nrows(),
                cols: linear_ub.a.ncols(),
                n,
            });
        }
        if linear_eq.a.ncols() != n && linear_eq.m() > 0 {
            return Err(CoreError::LinearConstraintShapeMismatch {
                kind: "equality",
                rows: linear_eq.a.nrows(),
                cols: linear_eq.a.ncols(),
                n,
            });
        }

        let has_linear = linear_ub.m() > 0 || linear_eq.m() > 0;
        let has_nonlinear = m_nonlinear_ub > 0 || m_nonlinear_eq > 0;
        let has_bounds = bounds
            .xl
            .iter()
            .zip(bounds.xu.iter())
            .any(|(&l, &u)| l.is_finite() || u.is_finite());
        let kind = if has_nonlinear {
            ProblemType::NonlinearlyConstrained
        } else if has_linear {
            ProblemType::LinearlyConstrained
        } else if has_bounds {
            ProblemType::BoundConstrained
        } else {
            ProblemType::Unconstrained
        };

        Ok(Problem {
            n,
            bounds,
            linear_ub,
            linear_eq,
            m_nonlinear_ub,
            m_nonlinear_eq,
            kind,
            fun: Box::new(fun),
            cub: Box::new(cub),
            ceq: Box::new(ceq),
        })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn linear_ub(&self) -> &LinearConstraintSet {
        &self.linear_ub
    }

    pub fn linear_eq(&self) -> &LinearConstraintSet {
        &self.linear_eq
    }

    pub fn m_linear_ub(&self) -> usize {
        self.linear_ub.m()
    }

    pub fn m_linear_eq(&self) -> usize {
        self.linear_eq.m()
    }

    pub fn m_nonlinear_ub(&self) -> usize {
        self.m_nonlinear_ub
    }

    pub fn m_nonlinear_eq(&self) -> usize {
        self.m_nonlinear_eq
    }

    pub fn kind(&self) -> ProblemType {
        self.kind
    }

    pub fn fun(&self, x: &DVector<f64>) -> f64 {
        (self.fun)(x)
    }

    pub fn cub(&self, x: &DVector<f64>) -> DVector<f64> {
        (self.cub)(x)
    }

    pub fn ceq(&self, x: &DVector<f64>) -> DVector<f64> {
        (self.ceq)(x)
    }

    /// L-infinity summary of the constraint violation at `x`, given
    /// precomputed nonlinear constraint values. Not specified by spec.md;
    /// resolved as an Open Question in DESIGN.md.
    pub fn resid(&self, x: &DVector<f64>, cub_val: &DVector<f64>, ceq_val: &DVector<f64>) -> f64 {
        let mut r = 0.0_f64;
        for (&xi, (&lo, &hi)) in x.iter().zip(self.bounds.xl.iter().zip(self.bounds.xu.iter())) {
            r = r.max((lo - xi).max(0.0)).max((xi - hi).max(0.0));
        }
        if self.linear_ub.m() > 0 {
            let v = &self.linear_ub.a * x - &self.linear_ub.b;
            r = r.max(v.iter().fold(0.0_f64, |acc, &vi| acc.max(vi.max(0.0))));
        }
        if self.linear_eq.m() > 0 {
            let v = &self.linear_eq.a * x - &self.linear_eq.b;
            r = r.max(v.iter().fold(0.0_f64, |acc, &vi| acc.max(vi.abs())));
        }
        r = r.max(cub_val.iter().fold(0.0_f64, |acc, &vi| acc.max(vi.max(0.0))));
        r = r.max(ceq_val.iter().fold(0.0_f64, |acc, &vi| acc.max(vi.abs())));
        r
    }
}
