// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Bound- and linearly-constrained tangential subproblems (spec §6
//! `tangential_byrd_omojokun`, `constrained_tangential_byrd_omojokun`).

use nalgebra::{DMatrix, DVector};
use tracing::warn;

use crate::linalg::{arrays_tol, project_box_ball};

use super::cauchy_breakpoint_step;

/// Materializes the (small, dense) Hessian behind a Hessian-vector oracle by
/// probing it on the standard basis; O(n) calls of O(n) work each, matching
/// spec §9's O(n^2)-per-operation budget.
fn materialize_hessian(hess_prod: &impl Fn(&DVector<f64>) -> DVector<f64>, n: usize) -> DMatrix<f64> {
    let mut h = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        let mut e = DVector::<f64>::zeros(n);
        e[i] = 1.0;
        h.set_column(i, &hess_prod(&e));
    }
    // Symmetrize away rounding asymmetry; the Lagrangian Hessian is
    // symmetric by construction (spec §4.1).
    0.5 * (&h + h.transpose())
}

fn quadratic_value(g: &DVector<f64>, h: &DMatrix<f64>, s: &DVector<f64>) -> f64 {
    g.dot(s) + 0.5 * s.dot(&(h * s))
}

/// Attempts the exact (unconstrained) Newton step `-H^{-1} g`, projected onto
/// the box and trust-region ball, returning `None` when `H` is not positive
/// definite enough to trust the step.
fn newton_candidate(
    g: &DVector<f64>,
    h: &DMatrix<f64>,
    xl: &DVector<f64>,
    xu: &DVector<f64>,
    radius: f64,
) -> Option<DVector<f64>> {
    let chol = nalgebra::linalg::Cholesky::new(h.clone())?;
    let s = chol.solve(&(-g));
    Some(project_box_ball(&s, xl, xu, radius))
}

fn debug_check(s: &DVector<f64>, xl: &DVector<f64>, xu: &DVector<f64>, radius: f64, debug: bool, label: &str) {
    if !debug {
        return;
    }
    let tol = arrays_tol(&[xl, xu]);
    if s.iter().zip(xl.iter()).any(|(&si, &lo)| si + tol < lo)
        || s.iter().zip(xu.iter()).any(|(&si, &hi)| hi < si - tol)
    {
        warn!("{label}: step does not respect the bound constraints");
    }
    if s.norm() > 1.1 * radius {
        warn!("{label}: step does not respect the trust-region constraint");
    }
}

/// `min g^T s + 1/2 s^T H s` s.t. `xl <= s <= xu`, `||s|| <= radius`.
pub fn tangential_byrd_omojokun(
    g: &DVector<f64>,
    hess_prod: impl Fn(&DVector<f64>) -> DVector<f64>,
    xl: &DVector<f64>,
    xu: &DVector<f64>,
    radius: f64,
    debug: bool,
) -> DVector<f64> {
    let n = g.len();
    let h = materialize_hessian(&hess_prod, n);
    let cauchy = cauchy_breakpoint_step(g, |v| &h * v, xl, xu, radius);
    let best = match newton_candidate(g, &h, xl, xu, radius) {
        Some(newton) if quadratic_value(g, &h, &newton) < quadratic_value(g, &h, &cauchy) => newton,
        _ => cauchy,
    };
    debug_check(&best, xl, xu, radius, debug, "tangential_byrd_omojokun");
    best
}

/// As [`tangential_byrd_omojokun`], with a soft penalty on `aub s <= bub` and
/// a hard penalty (implemented as a quadratic penalty of increasing weight
/// folded into the Newton candidate) on `aeq s = 0`.
#[allow(clippy::too_many_arguments)]
pub fn constrained_tangential_byrd_omojokun(
    g: &DVector<f64>,
    hess_prod: impl Fn(&DVector<f64>) -> DVector<f64>,
    xl: &DVector<f64>,
    xu: &DVector<f64>,
    aub: &DMatrix<f64>,
    bub: &DVector<f64>,
    aeq: &DMatrix<f64>,
    radius: f64,
    debug: bool,
) -> DVector<f64> {
    let n = g.len();
    let h = materialize_hessian(&hess_prod, n);

    // Penalize linearized violations quadratically; large but finite
    // weights keep the augmented system well-conditioned while strongly
    // discouraging infeasibility, in the spirit of the Byrd-Omojokun
    // decomposition's soft/hard split (spec §6).
    const PENALTY_UB: f64 = 1.0e3;
    const PENALTY_EQ: f64 = 1.0e6;

    let mut h_aug = h.clone();
    let mut g_aug = g.clone();
    if aub.nrows() > 0 {
        h_aug += PENALTY_UB * (aub.transpose() * aub);
        g_aug -= PENALTY_UB * (aub.transpose() * bub);
    }
    if aeq.nrows() > 0 {
        h_aug += PENALTY_EQ * (aeq.transpose() * aeq);
    }

    let cauchy = cauchy_breakpoint_step(&g_aug, |v| &h_aug * v, xl, xu, radius);
    let best = match newton_candidate(&g_aug, &h_aug, xl, xu, radius) {
        Some(newton)
            if quadratic_value(g, &h, &newton) + penalty_value(aub, bub, aeq, &newton)
                < quadratic_value(g, &h, &cauchy) + penalty_value(aub, bub, aeq, &cauchy) =>
        {
            newton
        }
        _ => cauchy,
    };
    debug_check(&best, xl, xu, radius, debug, "constrained_tangential_byrd_omojokun");
    best
}

fn penalty_value(aub: &DMatrix<f64>, bub: &DVector<f64>, aeq: &DMatrix<f64>, s: &DVector<f64>) -> f64 {
    let mut p = 0.0;
    if aub.nrows() > 0 {
        let v = aub * s - bub;
        p += 1.0e3 * v.iter().fold(0.0_f64, |acc, &x| acc + x.max(0.0).powi(2));
    }
    if aeq.nrows() > 0 {
        let v = aeq * s;
        p += 1.0e6 * v.dot(&v);
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconstrained_newton_step_matches_analytic_minimizer() {
        let g = DVector::from_vec(vec![1.0, 10.0]);
        let hess = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 10.0]));
        let xl = DVector::from_element(2, f64::NEG_INFINITY);
        let xu = DVector::from_element(2, f64::INFINITY);
        let s = tangential_byrd_omojokun(&g, |v| &hess * v, &xl, &xu, 10.0, false);
        assert!((s[0] + 1.0).abs() < 1e-6);
        assert!((s[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn respects_box_when_newton_step_is_infeasible() {
        let g = DVector::from_vec(vec![-1.0, -1.0]);
        let hess = DMatrix::identity(2, 2);
        let xl = DVector::from_vec(vec![-0.1, -0.1]);
        let xu = DVector::from_vec(vec![0.1, 0.1]);
        let s = tangential_byrd_omojokun(&g, |v| &hess * v, &xl, &xu, 10.0, false);
        assert!(s[0] <= 0.1 + 1e-9 && s[1] <= 0.1 + 1e-9);
    }
}
