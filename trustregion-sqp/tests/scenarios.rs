// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! End-to-end scenarios exercising `TrustRegion` the way a driver loop
//! would drive it for a single outer iteration, without implementing a
//! driver loop itself (out of scope).

use std::rc::Rc;

use nalgebra::{DMatrix, DVector};

use trustregion_sqp::interpolation::Interpolation;
use trustregion_sqp::models::Models;
use trustregion_sqp::{Bounds, LinearConstraintSet, Options, Problem, TrustRegion};

fn simplex_interpolation(x_base: DVector<f64>, scale: f64) -> Interpolation {
    let n = x_base.len();
    let mut cols = vec![DVector::zeros(n)];
    for i in 0..n {
        let mut e = DVector::zeros(n);
        e[i] = scale;
        cols.push(e);
    }
    for i in 0..n {
        let mut e = DVector::zeros(n);
        e[i] = -scale;
        cols.push(e);
    }
    Interpolation::new(x_base, DMatrix::from_columns(&cols)).unwrap()
}

#[test]
fn unconstrained_quadratic_step_reduces_the_objective() {
    let n = 2;
    let x0 = DVector::from_vec(vec![1.0, 1.0]);
    let fun = |x: &DVector<f64>| 0.5 * (x[0] * x[0] + 10.0 * x[1] * x[1]);

    let xl = DVector::from_element(n, f64::NEG_INFINITY);
    let xu = DVector::from_element(n, f64::INFINITY);
    let pb = Rc::new(
        Problem::new(
            Bounds::new(xl, xu).unwrap(),
            LinearConstraintSet::empty(n),
            LinearConstraintSet::empty(n),
            0,
            0,
            fun,
            |_: &DVector<f64>| DVector::zeros(0),
            |_: &DVector<f64>| DVector::zeros(0),
        )
        .unwrap(),
    );

    let interp = simplex_interpolation(x0, 0.5);
    let fun_val = DVector::from_iterator(interp.npt(), (0..interp.npt()).map(|k| pb.fun(&interp.point(k))));
    let cub_val = DMatrix::zeros(interp.npt(), 0);
    let ceq_val = DMatrix::zeros(interp.npt(), 0);
    let models = Models::new(&pb, interp, fun_val, cub_val, ceq_val).unwrap();

    let options = Options::new(0.5, 1e-6, false);
    let tr = TrustRegion::new(pb.clone(), models, options);

    let fun_before = tr.fun_best();
    let (n_step, t_step) = tr.trust_region_step();
    let step = &n_step + &t_step;
    let x_new = &tr.x_best() + &step;
    let fun_after = pb.fun(&x_new);

    assert!(fun_after < fun_before, "step must strictly reduce the objective");
    assert_eq!(tr.penalty(), 0.0);

    let ratio = tr.reduction_ratio(&step, fun_after, &DVector::zeros(0), &DVector::zeros(0));
    assert!(ratio > 0.5, "reduction ratio should be large for an exact quadratic model, got {ratio}");
}

#[test]
fn bound_constrained_step_stays_inside_the_box() {
    let n = 2;
    let xl = DVector::from_vec(vec![1.0, 1.0]);
    let xu = DVector::from_vec(vec![2.0, 2.0]);
    let x0 = DVector::from_vec(vec![1.5, 1.5]);
    let fun = |x: &DVector<f64>| x[0] * x[0] + x[1] * x[1];

    let pb = Rc::new(
        Problem::new(
            Bounds::new(xl, xu).unwrap(),
            LinearConstraintSet::empty(n),
            LinearConstraintSet::empty(n),
            0,
            0,
            fun,
            |_: &DVector<f64>| DVector::zeros(0),
            |_: &DVector<f64>| DVector::zeros(0),
        )
        .unwrap(),
    );

    let interp = simplex_interpolation(x0, 0.25);
    let fun_val = DVector::from_iterator(interp.npt(), (0..interp.npt()).map(|k| pb.fun(&interp.point(k))));
    let cub_val = DMatrix::zeros(interp.npt(), 0);
    let ceq_val = DMatrix::zeros(interp.npt(), 0);
    let models = Models::new(&pb, interp, fun_val, cub_val, ceq_val).unwrap();

    let options = Options::new(0.25, 1e-6, false);
    let tr = TrustRegion::new(pb.clone(), models, options);

    let (n_step, t_step) = tr.trust_region_step();
    let x_new = &tr.x_best() + &n_step + &t_step;

    let tol = 1e-9;
    assert!(x_new[0] >= pb.bounds().xl[0] - tol && x_new[0] <= pb.bounds().xu[0] + tol);
    assert!(x_new[1] >= pb.bounds().xl[1] - tol && x_new[1] <= pb.bounds().xu[1] + tol);
    assert_eq!(tr.penalty(), 0.0);
}

#[test]
fn linear_equality_multiplier_estimate_is_nonempty() {
    let n = 2;
    let aeq = DMatrix::from_row_slice(1, n, &[1.0, 1.0]);
    let beq = DVector::from_vec(vec![1.0]);
    let fun = |x: &DVector<f64>| x[0] * x[0] + x[1] * x[1];

    let xl = DVector::from_element(n, f64::NEG_INFINITY);
    let xu = DVector::from_element(n, f64::INFINITY);
    let pb = Rc::new(
        Problem::new(
            Bounds::new(xl, xu).unwrap(),
            LinearConstraintSet::empty(n),
            LinearConstraintSet::new(aeq, beq, n, "equality").unwrap(),
            0,
            0,
            fun,
            |_: &DVector<f64>| DVector::zeros(0),
            |_: &DVector<f64>| DVector::zeros(0),
        )
        .unwrap(),
    );

    let x0 = DVector::from_vec(vec![0.5, 0.5]);
    let interp = simplex_interpolation(x0, 0.2);
    let fun_val = DVector::from_iterator(interp.npt(), (0..interp.npt()).map(|k| pb.fun(&interp.point(k))));
    let cub_val = DMatrix::zeros(interp.npt(), 0);
    let ceq_val = DMatrix::zeros(interp.npt(), 0);
    let models = Models::new(&pb, interp, fun_val, cub_val, ceq_val).unwrap();

    let tr = TrustRegion::new(pb, models, Options::default());
    assert_eq!(tr.lm_linear_eq().len(), 1);
}

#[test]
fn nonlinear_inequality_multiplier_is_nonnegative() {
    let n = 2;
    let cub = |x: &DVector<f64>| DVector::from_vec(vec![x.dot(x) - 1.0]);
    let fun = |x: &DVector<f64>| x[0] + x[1];

    let xl = DVector::from_element(n, f64::NEG_INFINITY);
    let xu = DVector::from_element(n, f64::INFINITY);
    let pb = Rc::new(
        Problem::new(
            Bounds::new(xl, xu).unwrap(),
            LinearConstraintSet::empty(n),
            LinearConstraintSet::empty(n),
            1,
            0,
            fun,
            cub,
            |_: &DVector<f64>| DVector::zeros(0),
        )
        .unwrap(),
    );

    let x0 = DVector::from_vec(vec![
        -1.0 / std::f64::consts::SQRT_2,
        -1.0 / std::f64::consts::SQRT_2,
    ]);
    let interp = simplex_interpolation(x0, 0.1);
    let fun_val = DVector::from_iterator(interp.npt(), (0..interp.npt()).map(|k| pb.fun(&interp.point(k))));
    let cub_val = DMatrix::from_fn(interp.npt(), 1, |k, _| {
        let p = interp.point(k);
        p.dot(&p) - 1.0
    });
    let ceq_val = DMatrix::zeros(interp.npt(), 0);
    let models = Models::new(&pb, interp, fun_val, cub_val, ceq_val).unwrap();

    let tr = TrustRegion::new(pb, models, Options::default());
    assert!(tr.lm_nonlinear_ub()[0] >= 0.0);
}

#[test]
fn increase_penalty_is_monotone_nondecreasing() {
    let n = 2;
    let aub = DMatrix::from_row_slice(1, n, &[1.0, 1.0]);
    let bub = DVector::from_vec(vec![1.0]);
    let fun = |x: &DVector<f64>| x[0] * x[0] + x[1] * x[1];

    let xl = DVector::from_element(n, f64::NEG_INFINITY);
    let xu = DVector::from_element(n, f64::INFINITY);
    let pb = Rc::new(
        Problem::new(
            Bounds::new(xl, xu).unwrap(),
            LinearConstraintSet::new(aub, bub, n, "inequality").unwrap(),
            LinearConstraintSet::empty(n),
            0,
            0,
            fun,
            |_: &DVector<f64>| DVector::zeros(0),
            |_: &DVector<f64>| DVector::zeros(0),
        )
        .unwrap(),
    );

    let x0 = DVector::from_vec(vec![0.9, 0.9]);
    let interp = simplex_interpolation(x0, 0.2);
    let fun_val = DVector::from_iterator(interp.npt(), (0..interp.npt()).map(|k| pb.fun(&interp.point(k))));
    let cub_val = DMatrix::zeros(interp.npt(), 0);
    let ceq_val = DMatrix::zeros(interp.npt(), 0);
    let models = Models::new(&pb, interp, fun_val, cub_val, ceq_val).unwrap();

    let mut tr = TrustRegion::new(pb, models, Options::default());
    let penalty_before = tr.penalty();

    let step = DVector::from_vec(vec![-0.2, -0.2]);
    tr.increase_penalty(&step);
    let penalty_after_first = tr.penalty();
    assert!(penalty_after_first >= penalty_before);

    tr.increase_penalty(&step);
    let penalty_after_second = tr.penalty();
    assert!(penalty_after_second >= penalty_after_first);
}

#[test]
fn second_order_correction_step_stays_within_the_trial_step_radius() {
    let n = 2;
    let aeq = DMatrix::from_row_slice(1, n, &[1.0, 1.0]);
    let beq = DVector::from_vec(vec![1.0]);
    let fun = |x: &DVector<f64>| x[0] * x[0] + x[1] * x[1];

    let xl = DVector::from_element(n, f64::NEG_INFINITY);
    let xu = DVector::from_element(n, f64::INFINITY);
    let pb = Rc::new(
        Problem::new(
            Bounds::new(xl, xu).unwrap(),
            LinearConstraintSet::empty(n),
            LinearConstraintSet::new(aeq, beq, n, "equality").unwrap(),
            0,
            0,
            fun,
            |_: &DVector<f64>| DVector::zeros(0),
            |_: &DVector<f64>| DVector::zeros(0),
        )
        .unwrap(),
    );

    let x0 = DVector::from_vec(vec![0.4, 0.4]);
    let interp = simplex_interpolation(x0, 0.2);
    let fun_val = DVector::from_iterator(interp.npt(), (0..interp.npt()).map(|k| pb.fun(&interp.point(k))));
    let cub_val = DMatrix::zeros(interp.npt(), 0);
    let ceq_val = DMatrix::zeros(interp.npt(), 0);
    let models = Models::new(&pb, interp, fun_val, cub_val, ceq_val).unwrap();

    let tr = TrustRegion::new(pb, models, Options::default());
    let (n_step, t_step) = tr.trust_region_step();
    let step = &n_step + &t_step;

    let soc = tr.second_order_correction_step(&step);
    assert!(soc.norm() <= 1.1 * step.norm() + 1e-12);
}

#[test]
fn debug_mode_runs_the_invariant_checks_without_panicking() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("trustregion_sqp=warn")
        .try_init();

    let n = 2;
    let x0 = DVector::from_vec(vec![1.0, 1.0]);
    let fun = |x: &DVector<f64>| 0.5 * (x[0] * x[0] + 10.0 * x[1] * x[1]);

    let xl = DVector::from_element(n, f64::NEG_INFINITY);
    let xu = DVector::from_element(n, f64::INFINITY);
    let pb = Rc::new(
        Problem::new(
            Bounds::new(xl, xu).unwrap(),
            LinearConstraintSet::empty(n),
            LinearConstraintSet::empty(n),
            0,
            0,
            fun,
            |_: &DVector<f64>| DVector::zeros(0),
            |_: &DVector<f64>| DVector::zeros(0),
        )
        .unwrap(),
    );

    let interp = simplex_interpolation(x0, 0.5);
    let fun_val = DVector::from_iterator(interp.npt(), (0..interp.npt()).map(|k| pb.fun(&interp.point(k))));
    let cub_val = DMatrix::zeros(interp.npt(), 0);
    let ceq_val = DMatrix::zeros(interp.npt(), 0);
    let models = Models::new(&pb, interp, fun_val, cub_val, ceq_val).unwrap();

    // with `debug: true`, out-of-contract subproblem results would be logged
    // via `tracing::warn!` rather than silently ignored.
    let options = Options::new(0.5, 1e-6, true);
    let tr = TrustRegion::new(pb, models, options);
    let (n_step, t_step) = tr.trust_region_step();
    assert!((n_step + t_step).norm() <= 1.1 * std::f64::consts::SQRT_2 * tr.radius() + 1e-9);
}
