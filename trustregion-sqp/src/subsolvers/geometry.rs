// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Cauchy and spider geometry-improving subproblems (spec §6
//! `cauchy_geometry`, `spider_geometry`): both maximize the *absolute*
//! value of a quadratic over a box-and-ball region, rather than minimizing
//! it, because they are shaping a Lagrange cardinal polynomial rather than
//! a cost model (spec §4.4).

use nalgebra::{DMatrix, DVector};
use tracing::warn;

use crate::linalg::{arrays_tol, project_box_ball};

use super::cauchy_breakpoint_step;

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

/// Maximizes `|const + g^T s + 1/2 s^T H s|` over `xl <= s <= xu`,
/// `||s|| <= radius`, by comparing the steepest-descent and
/// steepest-ascent Cauchy points.
pub fn cauchy_geometry(
    const_term: f64,
    g: &DVector<f64>,
    hess_prod: impl Fn(&DVector<f64>) -> DVector<f64>,
    xl: &DVector<f64>,
    xu: &DVector<f64>,
    radius: f64,
    debug: bool,
) -> DVector<f64> {
    let value = |s: &DVector<f64>| const_term + g.dot(s) + 0.5 * s.dot(&hess_prod(s));

    let s_desc = cauchy_breakpoint_step(g, &hess_prod, xl, xu, radius);
    let neg_g = -g;
    let s_asc = cauchy_breakpoint_step(&neg_g, &hess_prod, xl, xu, radius);

    let best = if value(&s_desc).abs() >= value(&s_asc).abs() {
        s_desc
    } else {
        s_asc
    };
    debug_check(&best, xl, xu, radius, debug, "cauchy_geometry");
    best
}

/// Maximizes `|const + g^T s + 1/2 s^T H s|` restricted to line searches
/// along each column of `directions`.
#[allow(clippy::too_many_arguments)]
pub fn spider_geometry(
    const_term: f64,
    g: &DVector<f64>,
    hess_prod: impl Fn(&DVector<f64>) -> DVector<f64>,
    directions: &DMatrix<f64>,
    xl: &DVector<f64>,
    xu: &DVector<f64>,
    radius: f64,
    debug: bool,
) -> DVector<f64> {
    let n = g.len();
    let mut best_s = DVector::<f64>::zeros(n);
    let mut best_abs = const_term.abs();

    for d in directions.column_iter() {
        let d = d.clone_owned();
        let dnorm = d.norm();
        if dnorm < 1e-14 {
            continue;
        }
        let a = g.dot(&d);
        let b = d.dot(&hess_prod(&d));

        let mut t_lo = f64::NEG_INFINITY;
        let mut t_hi = f64::INFINITY;
        for i in 0..n {
            if d[i] > 1e-14 {
                if xu[i].is_finite() {
                    t_hi = t_hi.min(xu[i] / d[i]);
                }
                if xl[i].is_finite() {
                    t_lo = t_lo.max(xl[i] / d[i]);
                }
            } else if d[i] < -1e-14 {
                if xl[i].is_finite() {
                    t_hi = t_hi.min(xl[i] / d[i]);
                }
                if xu[i].is_finite() {
                    t_lo = t_lo.max(xu[i] / d[i]);
                }
            }
        }
        let t_ball = radius / dnorm;
        t_lo = t_lo.max(-t_ball);
        t_hi = t_hi.min(t_ball);
        if t_lo > t_hi {
            continue;
        }

        let val = |t: f64| const_term + t * a + 0.5 * t * t * b;
        let mut candidates = vec![t_lo, t_hi];
        if b.abs() > 1e-14 {
            let t_v = -a / b;
            if t_v > t_lo && t_v < t_hi {
                candidates.push(t_v);
            }
        }
        for t in candidates {
            let abs_val = val(t).abs();
            if abs_val > best_abs {
                best_abs = abs_val;
                best_s = &d * t;
            }
        }
    }

    let best_s = project_box_ball(&best_s, xl, xu, radius);
    debug_check(&best_s, xl, xu, radius, debug, "spider_geometry");
    best_s
}
