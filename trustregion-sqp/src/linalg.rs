// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Small dense-vector helpers shared by the framework and the subsolvers.

use nalgebra::DVector;

/// A tolerance derived from the magnitude of a set of arrays, used to decide
/// whether a bound or linear-constraint violation is numerical noise or a
/// genuine contract violation (spec §4.3, §4.4, §7).
pub fn arrays_tol(arrays: &[&DVector<f64>]) -> f64 {
    let max_abs = arrays
        .iter()
        .flat_map(|a| a.iter().copied())
        .filter(|v| v.is_finite())
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    10.0 * f64::EPSILON * (arrays.iter().map(|a| a.len()).max().unwrap_or(1) as f64).max(1.0)
        * max_abs.max(1.0)
}

/// Clamps `s` componentwise to `[xl, xu]`.
pub fn clamp_box(s: &DVector<f64>, xl: &DVector<f64>, xu: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        s.len(),
        s.iter()
            .zip(xl.iter())
            .zip(xu.iter())
            .map(|((&v, &lo), &hi)| v.max(lo).min(hi)),
    )
}

/// Scales `s` down so that `||s|| <= radius`, leaving it unchanged if already
/// within the ball.
pub fn clamp_ball(s: &DVector<f64>, radius: f64) -> DVector<f64> {
    let norm = s.norm();
    if norm > radius && norm > 0.0 {
        s * (radius / norm)
    } else {
        s.clone()
    }
}

/// Approximate Euclidean projection onto the intersection of a box and a
/// ball: clamp to the box, then rescale to the ball. This is exact when the
/// box constraint is inactive at the ball-projected point and is otherwise a
/// standard cheap alternating heuristic, sufficient for subsolvers that only
/// need to return a feasible, reasonably good point (spec §6 contracts do
/// not require exact projections).
pub fn project_box_ball(
    s: &DVector<f64>,
    xl: &DVector<f64>,
    xu: &DVector<f64>,
    radius: f64,
) -> DVector<f64> {
    let mut p = clamp_box(s, xl, xu);
    for _ in 0..5 {
        let clamped = clamp_ball(&p, radius);
        let boxed = clamp_box(&clamped, xl, xu);
        if (&boxed - &p).norm() <= 1e-14 * (1.0 + p.norm()) {
            p = boxed;
            break;
        }
        p = boxed;
    }
    p
}

/// Nonnegative part of a vector, elementwise.
pub fn pos_part(v: &DVector<f64>) -> DVector<f64> {
    v.map(|x| x.max(0.0))
}

/// Stacks two matrices with the same column count row-wise.
pub fn vstack(a: &nalgebra::DMatrix<f64>, b: &nalgebra::DMatrix<f64>) -> nalgebra::DMatrix<f64> {
    let n = a.ncols().max(b.ncols());
    let mut out = nalgebra::DMatrix::<f64>::zeros(a.nrows() + b.nrows(), n);
    out.rows_mut(0, a.nrows()).copy_from(a);
    out.rows_mut(a.nrows(), b.nrows()).copy_from(b);
    out
}

/// Stacks two vectors.
pub fn vstack_vec(a: &DVector<f64>, b: &DVector<f64>) -> DVector<f64> {
    let mut out = DVector::<f64>::zeros(a.len() + b.len());
    out.rows_mut(0, a.len()).copy_from(a);
    out.rows_mut(a.len(), b.len()).copy_from(b);
    out
}
