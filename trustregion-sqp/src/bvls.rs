// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Bounded-variable least squares, used internally by
//! [`crate::trustregion::TrustRegion::set_multipliers`] (spec §4.11). Not
//! one of the six external subproblem contracts of spec §6: multiplier
//! estimation is the framework's own responsibility.
//!
//! Spec §9 (Design Notes) allows "any implementation satisfying optimality
//! within a supplied tolerance"; this is a projected-gradient primal
//! algorithm rather than the textbook Lawson-Hanson active-set BVLS, which
//! is adequate for the small, dense active-constraint Jacobians this crate
//! deals with (spec's Non-goals exclude large sparse problems).

use nalgebra::{DMatrix, DVector};

const MAX_ITERS: usize = 200;
const TOL: f64 = 1e-10;

/// Solves `min ||A x - b||^2` subject to `x[i] >= 0` for every `i` where
/// `nonneg[i]` is `true`, and `x[i]` free otherwise.
pub fn solve_bvls(a: &DMatrix<f64>, b: &DVector<f64>, nonneg: &[bool]) -> DVector<f64> {
    let k = a.ncols();
    if k == 0 {
        return DVector::zeros(0);
    }
    let ata = a.transpose() * a;
    let atb = a.transpose() * b;

    let lipschitz = ata
        .iter()
        .fold(0.0_f64, |acc, &v| acc.max(v.abs()))
        * (k as f64);
    let step = if lipschitz > 0.0 { 1.0 / lipschitz } else { 1.0 };

    let mut x = DVector::<f64>::zeros(k);
    for _ in 0..MAX_ITERS {
        let grad = &ata * &x - &atb;
        let candidate = &x - step * &grad;
        let projected = DVector::from_iterator(
            k,
            candidate
                .iter()
                .zip(nonneg.iter())
                .map(|(&v, &nn)| if nn { v.max(0.0) } else { v }),
        );
        let delta = (&projected - &x).norm();
        x = projected;
        if delta < TOL {
            break;
        }
    }
    x
}
