// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The six subproblem solvers consumed by [`crate::trustregion::TrustRegion`]
//! (spec §6). Spec §1 marks these as external collaborators, specified only
//! by their I/O contract; this module provides one concrete implementation
//! of each contract so the crate is runnable end to end. Any other
//! implementation satisfying the same contract may be substituted.

pub mod geometry;
pub mod normal;
pub mod qr;
pub mod tangential;

use nalgebra::DVector;

/// Generalized Cauchy point along the steepest-descent direction `-g` of a
/// quadratic `g^T s + 1/2 s^T H s`, projected onto the box `[xl, xu]` and
/// truncated at the trust-region boundary. This is the textbook
/// piecewise-breakpoint algorithm (Conn, Gould & Toint, *Trust-Region
/// Methods*, §12.1) shared by the tangential and geometry subsolvers.
pub fn cauchy_breakpoint_step(
    g: &DVector<f64>,
    hess_prod: impl Fn(&DVector<f64>) -> DVector<f64>,
    xl: &DVector<f64>,
    xu: &DVector<f64>,
    radius: f64,
) -> DVector<f64> {
    let n = g.len();
    if n == 0 {
        return DVector::zeros(0);
    }
    let d = -g;

    // Breakpoints: time at which coordinate i would leave its bound if it
    // moved freely along d, sorted increasingly.
    let mut breakpoints: Vec<f64> = (0..n)
        .map(|i| {
            if d[i] > 0.0 && xu[i].is_finite() {
                (xu[i] / d[i]).max(0.0)
            } else if d[i] < 0.0 && xl[i].is_finite() {
                (xl[i] / d[i]).max(0.0)
            } else {
                f64::INFINITY
            }
        })
        .collect();
    breakpoints.push(if radius > 0.0 && d.norm() > 0.0 {
        radius / d.norm()
    } else {
        0.0
    });
    breakpoints.sort_by(|a, b| a.partial_cmp(b).unwrap());
    breakpoints.dedup_by(|a, b| (*a - *b).abs() < 1e-14);

    let radius_cap = if d.norm() > 0.0 {
        radius / d.norm()
    } else {
        0.0
    };

    let mut t_prev = 0.0_f64;
    let mut s = DVector::<f64>::zeros(n);
    let mut free: Vec<bool> = vec![true; n];

    for &t_curr in breakpoints.iter() {
        let t_curr = t_curr.min(radius_cap);
        if t_curr <= t_prev {
            continue;
        }
        // Directional derivative and curvature restricted to currently free
        // coordinates.
        let d_free = DVector::from_iterator(
            n,
            (0..n).map(|i| if free[i] { d[i] } else { 0.0 }),
        );
        let g_free_dot = g.dot(&d_free);
        let hd = hess_prod(&d_free);
        let curv = d_free.dot(&hd);

        // Unconstrained minimizer of the 1-D quadratic on this segment,
        // measured from t_prev.
        let delta_t = if curv > 0.0 {
            (-(g_free_dot + curv * t_prev) / curv).max(0.0)
        } else {
            f64::INFINITY
        };
        let t_stop = t_prev + delta_t;
        if t_stop <= t_curr {
            s = &s + d_free * (t_stop - t_prev);
            return clamp_to_bounds(&s, xl, xu, radius);
        }
        s = &s + d_free * (t_curr - t_prev);
        t_prev = t_curr;

        for i in 0..n {
            if free[i] && (d[i] > 0.0 && xu[i].is_finite() && (xu[i] - (d[i] * t_curr)).abs() < 1e-10
                || d[i] < 0.0 && xl[i].is_finite() && (xl[i] - (d[i] * t_curr)).abs() < 1e-10)
            {
                free[i] = false;
            }
        }
        if t_curr >= radius_cap {
            break;
        }
    }
    clamp_to_bounds(&s, xl, xu, radius)
}

fn clamp_to_bounds(s: &DVector<f64>, xl: &DVector<f64>, xu: &DVector<f64>, radius: f64) -> DVector<f64> {
    crate::linalg::project_box_ball(s, xl, xu, radius)
}
