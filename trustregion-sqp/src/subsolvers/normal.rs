// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Normal Byrd-Omojokun subproblem (spec §6 `normal_byrd_omojokun`):
//! approximately minimizes the linearized constraint violation within the
//! box and a (shrunk) trust-region ball.

use nalgebra::{DMatrix, DVector};
use tracing::warn;

use crate::linalg::{arrays_tol, pos_part, project_box_ball};

const MAX_ITERS: usize = 50;

/// `min 1/2 ||max(aub s - bub, 0)||^2 + 1/2 ||aeq s - beq||^2` s.t.
/// `xl <= s <= xu`, `||s|| <= radius`.
///
/// Solved by projected gradient descent on the (smooth, convex) squared
/// violation objective: this is a small, dense, derivative-available
/// subproblem (the objective's gradient is available in closed form), so a
/// handful of projected-gradient iterations converges comfortably within
/// the dense, small-`n` regime spec.md's Non-goals scope this crate to.
#[allow(clippy::too_many_arguments)]
pub fn normal_byrd_omojokun(
    aub: &DMatrix<f64>,
    bub: &DVector<f64>,
    aeq: &DMatrix<f64>,
    beq: &DVector<f64>,
    xl: &DVector<f64>,
    xu: &DVector<f64>,
    radius: f64,
    debug: bool,
) -> DVector<f64> {
    let n = xl.len();
    let mut s = DVector::<f64>::zeros(n);

    if aub.nrows() == 0 && aeq.nrows() == 0 {
        return s;
    }

    let lipschitz = aub.iter().fold(0.0_f64, |acc, &v| acc + v * v)
        + aeq.iter().fold(0.0_f64, |acc, &v| acc + v * v)
        + 1.0;
    let step = 1.0 / lipschitz;

    for _ in 0..MAX_ITERS {
        let mut grad = DVector::<f64>::zeros(n);
        if aub.nrows() > 0 {
            let viol = pos_part(&(aub * &s - bub));
            grad += aub.transpose() * viol;
        }
        if aeq.nrows() > 0 {
            let viol = aeq * &s - beq;
            grad += aeq.transpose() * viol;
        }
        if grad.norm() < 1e-12 {
            break;
        }
        let candidate = &s - step * &grad;
        let projected = project_box_ball(&candidate, xl, xu, radius);
        if (&projected - &s).norm() < 1e-13 {
            s = projected;
            break;
        }
        s = projected;
    }

    if debug {
        let tol = arrays_tol(&[xl, xu]);
        if s.iter().zip(xl.iter()).any(|(&si, &lo)| si + tol < lo)
            || s.iter().zip(xu.iter()).any(|(&si, &hi)| hi < si - tol)
        {
            warn!("normal_byrd_omojokun: step does not respect the bound constraints");
        }
        if s.norm() > 1.1 * radius {
            warn!("normal_byrd_omojokun: step does not respect the trust-region constraint");
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_zero_when_already_feasible() {
        let n = 2;
        let aub = DMatrix::<f64>::zeros(0, n);
        let bub = DVector::<f64>::zeros(0);
        let aeq = DMatrix::<f64>::zeros(0, n);
        let beq = DVector::<f64>::zeros(0);
        let xl = DVector::from_element(n, -1.0);
        let xu = DVector::from_element(n, 1.0);
        let s = normal_byrd_omojokun(&aub, &bub, &aeq, &beq, &xl, &xu, 1.0, false);
        assert_eq!(s, DVector::zeros(n));
    }

    #[test]
    fn reduces_equality_violation() {
        let aeq = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
        let beq = DVector::from_vec(vec![1.0]);
        let aub = DMatrix::<f64>::zeros(0, 2);
        let bub = DVector::<f64>::zeros(0);
        let xl = DVector::from_element(2, -10.0);
        let xu = DVector::from_element(2, 10.0);
        let s = normal_byrd_omojokun(&aub, &bub, &aeq, &beq, &xl, &xu, 5.0, false);
        let residual = (&aeq * &s - &beq).norm();
        assert!(residual < 1e-3);
    }
}
