// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The trust-region framework itself (spec §4): Lagrangian bookkeeping,
//! the composite normal/tangential step, the geometry-improving step, the
//! second-order correction, the merit function and penalty update,
//! best-point and point-to-discard selection, multiplier estimation, and
//! radius/resolution control.
//!
//! [`TrustRegion`] owns the current [`Models`] and drives the six
//! subproblem solvers in `subsolvers/`; it never evaluates the black-box
//! oracles on [`Problem`] itself for anything beyond the merit function
//! (every model-based quantity comes from `models`).

use std::rc::Rc;

use nalgebra::{DMatrix, DVector};
use tracing::warn;

use crate::bvls::solve_bvls;
use crate::error::CoreError;
use crate::linalg::{arrays_tol, clamp_box, vstack, vstack_vec};
use crate::models::Models;
use crate::options::Options;
use crate::problem::{Problem, ProblemType};
use crate::subsolvers::geometry::{cauchy_geometry, spider_geometry};
use crate::subsolvers::normal::normal_byrd_omojokun;
use crate::subsolvers::qr::qr_tangential_byrd_omojokun;
use crate::subsolvers::tangential::{constrained_tangential_byrd_omojokun, tangential_byrd_omojokun};

/// The trust-region / composite-step SQP framework state.
pub struct TrustRegion {
    pb: Rc<Problem>,
    models: Models,
    options: Options,
    penalty: f64,
    best_index: usize,
    lm_linear_ub: DVector<f64>,
    lm_linear_eq: DVector<f64>,
    lm_nonlinear_ub: DVector<f64>,
    lm_nonlinear_eq: DVector<f64>,
    resolution: f64,
    radius: f64,
}

impl TrustRegion {
    pub fn new(pb: Rc<Problem>, models: Models, options: Options) -> Self {
        let mut tr = TrustRegion {
            pb,
            models,
            options,
            penalty: 0.0,
            best_index: 0,
            lm_linear_ub: DVector::zeros(0),
            lm_linear_eq: DVector::zeros(0),
            lm_nonlinear_ub: DVector::zeros(0),
            lm_nonlinear_eq: DVector::zeros(0),
            resolution: options.radius_init,
            radius: options.radius_init,
        };

        let low = tr.low_penalty_estimate();
        tr.penalty = if low.is_finite() { low } else { 0.0 };
        tr.set_best_index();

        tr.lm_linear_ub = DVector::zeros(tr.pb.m_linear_ub());
        tr.lm_linear_eq = DVector::zeros(tr.pb.m_linear_eq());
        tr.lm_nonlinear_ub = DVector::zeros(tr.pb.m_nonlinear_ub());
        tr.lm_nonlinear_eq = DVector::zeros(tr.pb.m_nonlinear_eq());
        tr.set_multipliers();
        tr
    }

    // -- accessors -----------------------------------------------------

    pub fn problem(&self) -> &Problem {
        &self.pb
    }

    pub fn models(&self) -> &Models {
        &self.models
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    pub fn best_index(&self) -> usize {
        self.best_index
    }

    pub fn x_best(&self) -> DVector<f64> {
        self.models.interpolation().point(self.best_index)
    }

    pub fn fun_best(&self) -> f64 {
        self.models.fun_val()[self.best_index]
    }

    pub fn cub_best(&self) -> DVector<f64> {
        self.models.cub_val().row(self.best_index).transpose().clone_owned()
    }

    pub fn ceq_best(&self) -> DVector<f64> {
        self.models.ceq_val().row(self.best_index).transpose().clone_owned()
    }

    pub fn lm_linear_ub(&self) -> &DVector<f64> {
        &self.lm_linear_ub
    }

    pub fn lm_linear_eq(&self) -> &DVector<f64> {
        &self.lm_linear_eq
    }

    pub fn lm_nonlinear_ub(&self) -> &DVector<f64> {
        &self.lm_nonlinear_ub
    }

    pub fn lm_nonlinear_eq(&self) -> &DVector<f64> {
        &self.lm_nonlinear_eq
    }

    /// Trust-region radius update with the snap-to-floor rule (spec §4.12:
    /// `radius <= 1.4 * resolution => radius := resolution`).
    fn set_radius(&mut self, radius: f64) {
        self.radius = radius;
        if self.radius <= 1.4 * self.resolution {
            self.radius = self.resolution;
        }
    }

    // -- Lagrangian model (spec §4.1) -----------------------------------

    pub fn lag_model(&self, x: &DVector<f64>) -> f64 {
        let mut l = self.models.fun(x);
        if self.pb.m_linear_ub() > 0 {
            let v = &self.pb.linear_ub().a * x - &self.pb.linear_ub().b;
            l += self.lm_linear_ub.dot(&v);
        }
        if self.pb.m_linear_eq() > 0 {
            let v = &self.pb.linear_eq().a * x - &self.pb.linear_eq().b;
            l += self.lm_linear_eq.dot(&v);
        }
        if self.pb.m_nonlinear_ub() > 0 {
            l += self.lm_nonlinear_ub.dot(&self.models.cub(x));
        }
        if self.pb.m_nonlinear_eq() > 0 {
            l += self.lm_nonlinear_eq.dot(&self.models.ceq(x));
        }
        l
    }

    pub fn lag_model_grad(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut g = self.models.fun_grad(x);
        if self.pb.m_linear_ub() > 0 {
            g += self.pb.linear_ub().a.transpose() * &self.lm_linear_ub;
        }
        if self.pb.m_linear_eq() > 0 {
            g += self.pb.linear_eq().a.transpose() * &self.lm_linear_eq;
        }
        if self.pb.m_nonlinear_ub() > 0 {
            g += self.models.cub_grad(x, None).transpose() * &self.lm_nonlinear_ub;
        }
        if self.pb.m_nonlinear_eq() > 0 {
            g += self.models.ceq_grad(x).transpose() * &self.lm_nonlinear_eq;
        }
        g
    }

    /// Hessian of the Lagrangian model. Only the nonlinear constraint
    /// quadratics contribute beyond the objective model; linear constraints
    /// are affine and carry no curvature.
    pub fn lag_model_hess(&self) -> DMatrix<f64> {
        let mut h = self.models.fun_hess().clone();
        for (j, q) in self.models.cub_models().iter().enumerate() {
            h += self.lm_nonlinear_ub[j] * q.hess();
        }
        for (j, q) in self.models.ceq_models().iter().enumerate() {
            h += self.lm_nonlinear_eq[j] * q.hess();
        }
        h
    }

    pub fn lag_model_hess_prod(&self, v: &DVector<f64>) -> DVector<f64> {
        let mut out = self.models.fun_hess_prod(v);
        for (j, hv) in self.models.cub_hess_prod(v).into_iter().enumerate() {
            out += self.lm_nonlinear_ub[j] * hv;
        }
        for (j, hv) in self.models.ceq_hess_prod(v).into_iter().enumerate() {
            out += self.lm_nonlinear_eq[j] * hv;
        }
        out
    }

    pub fn lag_model_curv(&self, v: &DVector<f64>) -> f64 {
        v.dot(&self.lag_model_hess_prod(v))
    }

    // -- step predictions of the quadratic models (spec §4.2) -----------

    pub fn sqp_fun(&self, step: &DVector<f64>) -> f64 {
        let x_best = self.x_best();
        step.dot(&(self.models.fun_grad(&x_best) + 0.5 * self.lag_model_hess_prod(step)))
    }

    pub fn sqp_cub(&self, step: &DVector<f64>) -> DVector<f64> {
        let x_best = self.x_best();
        self.models.cub(&x_best) + self.models.cub_grad(&x_best, None) * step
    }

    pub fn sqp_ceq(&self, step: &DVector<f64>) -> DVector<f64> {
        let x_best = self.x_best();
        self.models.ceq(&x_best) + self.models.ceq_grad(&x_best) * step
    }

    // -- linearized constraints (spec §4.3 step 1) -----------------------

    /// Stacks linear and nonlinear inequality/equality constraints,
    /// linearized at `x`, into one `(aub, bub)` and one `(aeq, beq)` pair.
    pub fn constraint_linearizations(&self, x: &DVector<f64>) -> (DMatrix<f64>, DVector<f64>, DMatrix<f64>, DVector<f64>) {
        let n = self.pb.n();
        let cub_grad = self.models.cub_grad(x, None);
        let cub_val = self.models.cub(x);
        let aub = vstack(&self.pb.linear_ub().a, &cub_grad);
        let bub = vstack_vec(
            &(&self.pb.linear_ub().b - &self.pb.linear_ub().a * x),
            &(-&cub_val),
        );

        let ceq_grad = self.models.ceq_grad(x);
        let ceq_val = self.models.ceq(x);
        let aeq = vstack(&self.pb.linear_eq().a, &ceq_grad);
        let beq = vstack_vec(
            &(&self.pb.linear_eq().b - &self.pb.linear_eq().a * x),
            &(-&ceq_val),
        );

        debug_assert_eq!(aub.ncols(), n);
        debug_assert_eq!(aeq.ncols(), n);
        (aub, bub, aeq, beq)
    }

    // -- merit function (spec §4.6) --------------------------------------

    pub fn merit(
        &self,
        x: &DVector<f64>,
        fun_val: Option<f64>,
        cub_val: Option<DVector<f64>>,
        ceq_val: Option<DVector<f64>>,
    ) -> f64 {
        let fun_val = fun_val.unwrap_or_else(|| self.pb.fun(x));
        let cub_val = cub_val.unwrap_or_else(|| self.pb.cub(x));
        let ceq_val = ceq_val.unwrap_or_else(|| self.pb.ceq(x));

        let mut m = fun_val;
        if self.penalty > 0.0 {
            let bounds = self.pb.bounds();
            let mut v: Vec<f64> = Vec::new();
            for i in 0..self.pb.n() {
                v.push((bounds.xl[i] - x[i]).max(0.0));
            }
            for i in 0..self.pb.n() {
                v.push((x[i] - bounds.xu[i]).max(0.0));
            }
            if self.pb.m_linear_ub() > 0 {
                let lin = &self.pb.linear_ub().a * x - &self.pb.linear_ub().b;
                v.extend(lin.iter().map(|&vi| vi.max(0.0)));
            }
            v.extend(cub_val.iter().map(|&vi| vi.max(0.0)));
            if self.pb.m_linear_eq() > 0 {
                let lin = &self.pb.linear_eq().a * x - &self.pb.linear_eq().b;
                v.extend(lin.iter().map(|&vi| vi.abs()));
            }
            v.extend(ceq_val.iter().map(|&vi| vi.abs()));
            let vv = DVector::from_vec(v);
            m += self.penalty * vv.norm();
        }
        m
    }

    // -- composite trust-region step (spec §4.3) --------------------------

    pub fn trust_region_step(&self) -> (DVector<f64>, DVector<f64>) {
        let x_best = self.x_best();
        let xl = &self.pb.bounds().xl - &x_best;
        let xu = &self.pb.bounds().xu - &x_best;

        let normal = match self.pb.kind() {
            ProblemType::Unconstrained | ProblemType::BoundConstrained => DVector::zeros(self.pb.n()),
            ProblemType::LinearlyConstrained | ProblemType::NonlinearlyConstrained => {
                let (aub, bub, aeq, beq) = self.constraint_linearizations(&x_best);
                normal_byrd_omojokun(&aub, &bub, &aeq, &beq, &xl, &xu, 0.8 * self.radius, self.options.debug)
            }
        };

        let remaining_sq = self.radius * self.radius - normal.norm_squared();
        let tangential_radius = if remaining_sq > 0.0 { remaining_sq.sqrt() } else { 0.0 };
        let xl_t = &xl - &normal;
        let xu_t = &xu - &normal;
        let g_lag = self.models.fun_grad(&x_best) + self.lag_model_hess_prod(&normal);

        let tangential = match self.pb.kind() {
            ProblemType::Unconstrained | ProblemType::BoundConstrained => tangential_byrd_omojokun(
                &g_lag,
                |v| self.lag_model_hess_prod(v),
                &xl_t,
                &xu_t,
                tangential_radius,
                self.options.debug,
            ),
            ProblemType::LinearlyConstrained | ProblemType::NonlinearlyConstrained => {
                let (aub, bub, aeq, _beq) = self.constraint_linearizations(&x_best);
                let bub_t = &bub - &aub * &normal;
                constrained_tangential_byrd_omojokun(
                    &g_lag,
                    |v| self.lag_model_hess_prod(v),
                    &xl_t,
                    &xu_t,
                    &aub,
                    &bub_t,
                    &aeq,
                    tangential_radius,
                    self.options.debug,
                )
            }
        };

        if self.options.debug {
            let combined = &normal + &tangential;
            let tol = arrays_tol(&[&xl, &xu]);
            if combined.iter().zip(xl.iter()).any(|(&si, &lo)| si + tol < lo)
                || combined.iter().zip(xu.iter()).any(|(&si, &hi)| hi < si - tol)
            {
                warn!("trust_region_step: combined step does not respect the bound constraints");
            }
            if combined.norm() > 1.1 * std::f64::consts::SQRT_2 * self.radius {
                warn!("trust_region_step: combined step does not respect the trust-region constraint");
            }
        }

        (normal, tangential)
    }

    // -- geometry-improving step (spec §4.4) ------------------------------

    pub fn geometry_step(&self, k_new: usize) -> DVector<f64> {
        let x_best = self.x_best();
        let n = self.pb.n();

        let xpt = self.models.interpolation().xpt();
        let best_col = xpt.column(self.best_index).clone_owned();
        let mut xpt_shifted = DMatrix::<f64>::zeros(xpt.nrows(), xpt.ncols());
        for j in 0..xpt.ncols() {
            xpt_shifted.set_column(j, &(xpt.column(j) - &best_col));
        }
        xpt_shifted.swap_columns(0, self.best_index);
        let directions = xpt_shifted.columns(1, xpt_shifted.ncols() - 1).clone_owned();

        let xl = &self.pb.bounds().xl - &x_best;
        let xu = &self.pb.bounds().xu - &x_best;

        let lag = self.models.lagrange_polynomial(k_new);
        let g_lag = lag.grad(&self.models.interpolation().point(k_new), self.models.interpolation());

        let mut step = cauchy_geometry(
            0.0,
            &g_lag,
            |v| lag.hess_prod(v),
            &xl,
            &xu,
            self.radius,
            self.options.debug,
        );
        let mut sigma = self.models.denominators(&(&x_best + &step), k_new);

        let step_alt = spider_geometry(
            0.0,
            &g_lag,
            |v| lag.hess_prod(v),
            &directions,
            &xl,
            &xu,
            self.radius,
            self.options.debug,
        );
        let sigma_alt = self.models.denominators(&(&x_best + &step_alt), k_new);
        if sigma_alt.abs() >= sigma.abs() {
            step = step_alt;
            sigma = sigma_alt;
        }

        if matches!(self.pb.kind(), ProblemType::LinearlyConstrained | ProblemType::NonlinearlyConstrained) {
            let (aub, bub, aeq, _beq) = self.constraint_linearizations(&x_best);
            let tol_bd = arrays_tol(&[&xl, &xu]);
            let tol_ub = arrays_tol(&[&bub]);
            let free_xl: Vec<bool> = xl.iter().map(|&v| v <= -tol_bd).collect();
            let free_xu: Vec<bool> = xu.iter().map(|&v| v >= tol_bd).collect();
            let free_ub: Vec<bool> = bub.iter().map(|&v| v >= tol_ub).collect();

            let (n_act, q) = qr_tangential_byrd_omojokun(&aub, &aeq, &free_xl, &free_xu, &free_ub);
            if n_act > 0 && n_act < n {
                let q_free = q.columns(n_act, q.ncols() - n_act).clone_owned();
                let g_lag_proj = &q_free * (q_free.transpose() * &g_lag);
                let norm_proj = g_lag_proj.norm();
                if norm_proj > f64::MIN_POSITIVE * self.radius {
                    let mut candidate = (self.radius / norm_proj) * &g_lag_proj;
                    if lag.curv(&candidate) < 0.0 {
                        candidate = -candidate;
                    }

                    let cub_r = &aub * &candidate - &bub;
                    let ceq_r = &aeq * &candidate;
                    let bd_hi = &candidate - &xu;
                    let bd_lo = &xl - &candidate;
                    let mut resid = cub_r.iter().fold(0.0_f64, |a, &v| a.max(v));
                    resid = resid.max(ceq_r.iter().fold(0.0_f64, |a, &v| a.max(v.abs())));
                    resid = resid.max(bd_hi.iter().fold(0.0_f64, |a, &v| a.max(v)));
                    resid = resid.max(bd_lo.iter().fold(0.0_f64, |a, &v| a.max(v)));

                    let mut tol = 0.0_f64;
                    for i in 0..n {
                        if !free_xl[i] {
                            tol = tol.max(candidate[i].abs());
                        }
                        if !free_xu[i] {
                            tol = tol.max(candidate[i].abs());
                        }
                    }
                    for i in 0..free_ub.len() {
                        if !free_ub[i] {
                            let row = aub.row(i).clone_owned().transpose();
                            tol = tol.max(row.dot(&candidate).abs());
                        }
                    }
                    let tol = (10.0 * tol).min(0.01 * candidate.norm());

                    if resid <= tol {
                        let sigma_alt = self.models.denominators(&(&x_best + &candidate), k_new);
                        if sigma_alt.abs() >= 0.1 * sigma.abs() {
                            step = clamp_box(&candidate, &xl, &xu);
                        }
                    }
                }
            }
        }

        if self.options.debug {
            let tol = arrays_tol(&[&xl, &xu]);
            if step.iter().zip(xl.iter()).any(|(&si, &lo)| si + tol < lo)
                || step.iter().zip(xu.iter()).any(|(&si, &hi)| hi < si - tol)
            {
                warn!("geometry_step: step does not respect the bound constraints");
            }
            if step.norm() > 1.1 * self.radius {
                warn!("geometry_step: step does not respect the trust-region constraint");
            }
        }

        step
    }

    // -- second-order correction (spec §4.5) ------------------------------

    pub fn second_order_correction_step(&self, step: &DVector<f64>) -> DVector<f64> {
        let x_best = self.x_best();
        let (aub, bub, aeq, beq) = self.constraint_linearizations(&x_best);
        let xl = &self.pb.bounds().xl - &x_best;
        let xu = &self.pb.bounds().xu - &x_best;
        let radius = step.norm();

        let soc = normal_byrd_omojokun(&aub, &bub, &aeq, &beq, &xl, &xu, radius, self.options.debug);

        if self.options.debug {
            let tol = arrays_tol(&[&xl, &xu]);
            if soc.iter().zip(xl.iter()).any(|(&si, &lo)| si + tol < lo)
                || soc.iter().zip(xu.iter()).any(|(&si, &hi)| hi < si - tol)
            {
                warn!("second_order_correction_step: step does not respect the bound constraints");
            }
            if soc.norm() > 1.1 * radius {
                warn!("second_order_correction_step: step does not respect the trust-region constraint");
            }
        }
        soc
    }

    // -- reduction ratio (spec §4.7) ---------------------------------------

    pub fn reduction_ratio(&self, step: &DVector<f64>, fun_val: f64, cub_val: &DVector<f64>, ceq_val: &DVector<f64>) -> f64 {
        let x_best = self.x_best();
        let x_new = &x_best + step;

        let merit_old = self.merit(&x_best, Some(self.fun_best()), Some(self.cub_best()), Some(self.ceq_best()));
        let merit_new = self.merit(&x_new, Some(fun_val), Some(cub_val.clone()), Some(ceq_val.clone()));

        let merit_model_old = self.merit(&x_best, Some(0.0), Some(self.models.cub(&x_best)), Some(self.models.ceq(&x_best)));
        let merit_model_new = self.merit(&x_new, Some(self.sqp_fun(step)), Some(self.sqp_cub(step)), Some(self.sqp_ceq(step)));

        let model_reduction = merit_model_old - merit_model_new;
        let actual_reduction = merit_old - merit_new;
        if model_reduction.abs() > f64::MIN_POSITIVE * actual_reduction.abs() {
            actual_reduction / model_reduction.abs()
        } else {
            -1.0
        }
    }

    // -- penalty management (spec §4.8) -----------------------------------

    /// Raises the penalty parameter if the current value underestimates the
    /// exact-penalty threshold implied by the multiplier estimates; returns
    /// whether the best point is unchanged by the (possible) re-ranking.
    pub fn increase_penalty(&mut self, step: &DVector<f64>) -> bool {
        let x_best = self.x_best();
        let (aub, bub, aeq, beq) = self.constraint_linearizations(&x_best);

        let lhs = {
            let mut v: Vec<f64> = bub.iter().map(|&b| (-b).max(0.0)).collect();
            v.extend(beq.iter().copied());
            DVector::from_vec(v).norm()
        };
        let rhs = {
            let r1 = &aub * step - &bub;
            let r2 = &aeq * step - &beq;
            let mut v: Vec<f64> = r1.iter().map(|&x| x.max(0.0)).collect();
            v.extend(r2.iter().copied());
            DVector::from_vec(v).norm()
        };
        let violation_reduction = lhs - rhs;

        let sqp_var = self.sqp_fun(step);

        let mut threshold = {
            let mut v: Vec<f64> = self.lm_linear_ub.iter().copied().collect();
            v.extend(self.lm_linear_eq.iter().copied());
            v.extend(self.lm_nonlinear_ub.iter().copied());
            v.extend(self.lm_nonlinear_eq.iter().copied());
            DVector::from_vec(v).norm()
        };
        if violation_reduction.abs() > f64::MIN_POSITIVE * sqp_var.abs() {
            threshold = threshold.max(sqp_var / violation_reduction);
        }

        let best_index_before = self.best_index;
        if self.penalty <= 1.5 * threshold {
            self.penalty = 2.0 * threshold;
            self.set_best_index();
        }
        best_index_before == self.best_index
    }

    pub fn decrease_penalty(&mut self) {
        self.penalty = self.penalty.min(self.low_penalty_estimate());
    }

    // -- best-point selection (spec §4.9) -----------------------------------

    pub fn set_best_index(&mut self) {
        let npt = self.models.npt();
        let n = self.pb.n();

        let x_best = self.x_best();
        let mut m_best = self.merit(&x_best, Some(self.fun_best()), Some(self.cub_best()), Some(self.ceq_best()));
        let mut r_best = self.pb.resid(&x_best, &self.cub_best(), &self.ceq_best());

        let tol = 10.0 * f64::EPSILON * (npt.max(n) as f64) * m_best.abs().max(1.0);

        let mut best_index = self.best_index;
        for k in 0..npt {
            if k == self.best_index {
                continue;
            }
            let x_k = self.models.interpolation().point(k);
            let cub_k = self.models.cub_val().row(k).transpose().clone_owned();
            let ceq_k = self.models.ceq_val().row(k).transpose().clone_owned();
            let m_k = self.merit(&x_k, Some(self.models.fun_val()[k]), Some(cub_k.clone()), Some(ceq_k.clone()));
            let r_k = self.pb.resid(&x_k, &cub_k, &ceq_k);

            if m_k < m_best || (m_k < m_best + tol && r_k < r_best) {
                best_index = k;
                m_best = m_k;
                r_best = r_k;
            }
        }
        self.best_index = best_index;
    }

    /// Picks the interpolation point to discard when inserting a new one
    /// (spec §4.9). When `x_new` is `None`, the farthest point from
    /// `x_best` is targeted (a pure geometry improvement); otherwise the
    /// weighting trades distance against the predicted interpolation
    /// quality of swapping in `x_new`.
    pub fn index_to_remove(&self, x_new: Option<&DVector<f64>>) -> (usize, f64) {
        let xpt = self.models.interpolation().xpt();
        let npt = xpt.ncols();
        let best_col = xpt.column(self.best_index).clone_owned();
        let dist_sq: Vec<f64> = (0..npt).map(|k| (xpt.column(k) - &best_col).norm_squared()).collect();

        let (weights, sigma_abs): (Vec<f64>, Vec<f64>) = match x_new {
            None => (dist_sq.clone(), vec![1.0; npt]),
            Some(xn) => {
                let denom = (0.1 * self.radius).max(self.resolution).powi(2);
                let w: Vec<f64> = dist_sq.iter().map(|&d| (1.0_f64.max(d / denom)).powi(3)).collect();
                let sigmas = self.models.denominators_all(xn);
                (w, sigmas.iter().map(|v| v.abs()).collect())
            }
        };

        let (k_max, _) = weights
            .iter()
            .zip(sigma_abs.iter())
            .map(|(&w, &s)| w * s)
            .enumerate()
            .fold((0usize, f64::NEG_INFINITY), |(bi, bv), (i, v)| if v > bv { (i, v) } else { (bi, bv) });

        (k_max, dist_sq[k_max].sqrt())
    }

    // -- radius and resolution control (spec §4.12) ------------------------

    pub fn update_radius(&mut self, step: &DVector<f64>, ratio: f64) {
        let s_norm = step.norm();
        let new_radius = if ratio <= 0.1 {
            0.5 * self.radius
        } else if ratio <= 0.7 {
            (0.5 * self.radius).max(s_norm)
        } else {
            (std::f64::consts::SQRT_2 * self.radius).min((0.5 * self.radius).max(2.0 * s_norm))
        };
        self.set_radius(new_radius);
    }

    /// Shrinks the resolution floor, bypassing the radius snap-to-floor
    /// rule (spec §4.12: "then `radius <- max(radius/2, resolution)`
    /// directly, without the snap-to-floor rule").
    pub fn reduce_resolution(&mut self) {
        let radius_final = self.options.radius_final;
        self.resolution = if 250.0 * radius_final < self.resolution {
            self.resolution * 0.1
        } else if 16.0 * radius_final < self.resolution {
            (self.resolution * radius_final).sqrt()
        } else {
            radius_final
        };
        self.radius = (0.5 * self.radius).max(self.resolution);
    }

    pub fn shift_x_base(&mut self) -> Result<(), CoreError> {
        let x_best = self.x_best();
        self.models.shift_x_base(x_best)
    }

    // -- low-penalty estimate (spec §4.8, `_get_low_penalty`) ---------------

    fn low_penalty_estimate(&self) -> f64 {
        let npt = self.models.npt();
        let interp = self.models.interpolation();
        let points: Vec<DVector<f64>> = (0..npt).map(|k| interp.point(k)).collect();

        let mut columns: Vec<DVector<f64>> = Vec::new();

        if self.pb.m_linear_ub() > 0 {
            let a = &self.pb.linear_ub().a;
            let b = &self.pb.linear_ub().b;
            for i in 0..a.nrows() {
                let row = a.row(i).clone_owned().transpose();
                columns.push(DVector::from_iterator(npt, points.iter().map(|p| row.dot(p) - b[i])));
            }
        }
        for j in 0..self.pb.m_nonlinear_ub() {
            columns.push(self.models.cub_val().column(j).clone_owned());
        }

        let mut eq_columns: Vec<DVector<f64>> = Vec::new();
        if self.pb.m_linear_eq() > 0 {
            let a = &self.pb.linear_eq().a;
            let b = &self.pb.linear_eq().b;
            for i in 0..a.nrows() {
                let row = a.row(i).clone_owned().transpose();
                eq_columns.push(DVector::from_iterator(npt, points.iter().map(|p| row.dot(p) - b[i])));
            }
        }
        for j in 0..self.pb.m_nonlinear_eq() {
            eq_columns.push(self.models.ceq_val().column(j).clone_owned());
        }
        for col in eq_columns {
            columns.push(col.clone());
            columns.push(-col);
        }

        if columns.is_empty() {
            return 0.0;
        }

        let c_min: Vec<f64> = columns.iter().map(|c| c.iter().cloned().fold(f64::INFINITY, f64::min)).collect();
        let c_max: Vec<f64> = columns
            .iter()
            .map(|c| c.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
            .collect();
        let selected: Vec<usize> = (0..columns.len()).filter(|&j| c_min[j] < 2.0 * c_max[j]).collect();
        if selected.is_empty() {
            return 0.0;
        }

        let fun_val = self.models.fun_val();
        let f_min = fun_val.iter().cloned().fold(f64::INFINITY, f64::min);
        let f_max = fun_val.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let c_diff = selected
            .iter()
            .map(|&j| c_max[j] - c_min[j].min(0.0))
            .fold(f64::INFINITY, f64::min);

        if c_diff > f64::MIN_POSITIVE * (f_max - f_min) {
            (f_max - f_min) / c_diff
        } else {
            f64::INFINITY
        }
    }

    // -- Lagrange multiplier estimation (spec §4.11) ------------------------

    /// Re-estimates every multiplier by solving the bound-constrained least
    /// squares problem `min ||J^T lambda + g_best||` over the active-set
    /// Jacobian `J`, with nonnegativity enforced on the inequality rows
    /// (bounds, linear inequalities, nonlinear inequalities) and the
    /// equality rows left free.
    pub fn set_multipliers(&mut self) {
        let x_best = self.x_best();
        let n = self.pb.n();
        let bounds = self.pb.bounds();

        let incl_linear: Vec<bool> = if self.pb.m_linear_ub() > 0 {
            let v = &self.pb.linear_ub().a * &x_best - &self.pb.linear_ub().b;
            v.iter().map(|&vi| vi >= 0.0).collect()
        } else {
            vec![]
        };
        let cub_best = self.cub_best();
        let incl_nonlinear: Vec<bool> = cub_best.iter().map(|&vi| vi >= 0.0).collect();
        let incl_xl: Vec<bool> = (0..n).map(|i| bounds.xl[i] >= x_best[i]).collect();
        let incl_xu: Vec<bool> = (0..n).map(|i| bounds.xu[i] <= x_best[i]).collect();

        let m_xl = incl_xl.iter().filter(|&&b| b).count();
        let m_xu = incl_xu.iter().filter(|&&b| b).count();
        let m_linear = incl_linear.iter().filter(|&&b| b).count();
        let m_nonlinear = incl_nonlinear.iter().filter(|&&b| b).count();

        let mut columns: Vec<DVector<f64>> = Vec::new();
        for i in 0..n {
            if incl_xl[i] {
                let mut e = DVector::zeros(n);
                e[i] = -1.0;
                columns.push(e);
            }
        }
        for i in 0..n {
            if incl_xu[i] {
                let mut e = DVector::zeros(n);
                e[i] = 1.0;
                columns.push(e);
            }
        }
        if self.pb.m_linear_ub() > 0 {
            for i in 0..self.pb.linear_ub().a.nrows() {
                if incl_linear[i] {
                    columns.push(self.pb.linear_ub().a.row(i).clone_owned().transpose());
                }
            }
        }
        let cub_grad_active = self.models.cub_grad(&x_best, Some(&incl_nonlinear));
        for r in cub_grad_active.row_iter() {
            columns.push(r.clone_owned().transpose());
        }
        if self.pb.m_linear_eq() > 0 {
            for i in 0..self.pb.linear_eq().a.nrows() {
                columns.push(self.pb.linear_eq().a.row(i).clone_owned().transpose());
            }
        }
        let ceq_grad_all = self.models.ceq_grad(&x_best);
        for r in ceq_grad_all.row_iter() {
            columns.push(r.clone_owned().transpose());
        }

        self.lm_linear_ub = DVector::zeros(self.pb.m_linear_ub());
        self.lm_nonlinear_ub = DVector::zeros(self.pb.m_nonlinear_ub());
        self.lm_linear_eq = DVector::zeros(self.pb.m_linear_eq());
        self.lm_nonlinear_eq = DVector::zeros(self.pb.m_nonlinear_eq());

        if columns.is_empty() {
            return;
        }

        let jac_t = DMatrix::from_columns(&columns); // n x k, column j = gradient of active constraint j
        let g_best = self.models.fun_grad(&x_best);
        let rhs = -g_best;

        let k = columns.len();
        let n_inequality = m_xl + m_xu + m_linear + m_nonlinear;
        let nonneg: Vec<bool> = (0..k).map(|i| i < n_inequality).collect();

        let lambda = solve_bvls(&jac_t, &rhs, &nonneg);

        let mut idx = m_xl + m_xu;
        if self.pb.m_linear_ub() > 0 {
            let mut j = 0;
            for i in 0..self.pb.m_linear_ub() {
                if incl_linear[i] {
                    self.lm_linear_ub[i] = lambda[idx + j];
                    j += 1;
                }
            }
            idx += m_linear;
        }
        {
            let mut j = 0;
            for i in 0..self.pb.m_nonlinear_ub() {
                if incl_nonlinear[i] {
                    self.lm_nonlinear_ub[i] = lambda[idx + j];
                    j += 1;
                }
            }
            idx += m_nonlinear;
        }
        if self.pb.m_linear_eq() > 0 {
            self.lm_linear_eq = lambda.rows(idx, self.pb.m_linear_eq()).clone_owned();
            idx += self.pb.m_linear_eq();
        }
        if self.pb.m_nonlinear_eq() > 0 {
            self.lm_nonlinear_eq = lambda.rows(idx, self.pb.m_nonlinear_eq()).clone_owned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpolation::Interpolation;
    use crate::problem::{Bounds, LinearConstraintSet};

    fn simplex_interpolation(n: usize) -> Interpolation {
        let x_base = DVector::zeros(n);
        let mut cols = vec![DVector::zeros(n)];
        for i in 0..n {
            let mut e = DVector::zeros(n);
            e[i] = 1.0;
            cols.push(e);
        }
        for i in 0..n {
            let mut e = DVector::zeros(n);
            e[i] = -1.0;
            cols.push(e);
        }
        Interpolation::new(x_base, DMatrix::from_columns(&cols)).unwrap()
    }

    fn unconstrained_setup(n: usize) -> TrustRegion {
        let xl = DVector::from_element(n, f64::NEG_INFINITY);
        let xu = DVector::from_element(n, f64::INFINITY);
        let pb = Rc::new(
            Problem::new(
                Bounds::new(xl, xu).unwrap(),
                LinearConstraintSet::empty(n),
                LinearConstraintSet::empty(n),
                0,
                0,
                |x: &DVector<f64>| x.dot(x),
                |_: &DVector<f64>| DVector::zeros(0),
                |_: &DVector<f64>| DVector::zeros(0),
            )
            .unwrap(),
        );
        let interp = simplex_interpolation(n);
        let fun_val = DVector::from_iterator(interp.npt(), (0..interp.npt()).map(|k| {
            let p = interp.point(k);
            p.dot(&p)
        }));
        let cub_val = DMatrix::zeros(interp.npt(), 0);
        let ceq_val = DMatrix::zeros(interp.npt(), 0);
        let models = Models::new(&pb, interp, fun_val, cub_val, ceq_val).unwrap();
        TrustRegion::new(pb, models, Options::default())
    }

    #[test]
    fn best_index_picks_the_lowest_merit_point() {
        let tr = unconstrained_setup(2);
        let x_best = tr.x_best();
        assert!((x_best.dot(&x_best)).abs() < 1e-9);
    }

    #[test]
    fn trust_region_step_descends_the_quadratic_model() {
        let tr = unconstrained_setup(2);
        let (n, t) = tr.trust_region_step();
        let step = &n + &t;
        assert!(tr.sqp_fun(&step) <= 1e-9);
    }

    #[test]
    fn reduction_ratio_is_one_for_an_exact_quadratic() {
        let tr = unconstrained_setup(2);
        let (n, t) = tr.trust_region_step();
        let step = &n + &t;
        let x_new = &tr.x_best() + &step;
        let fun_new = x_new.dot(&x_new);
        let cub_new = DVector::zeros(0);
        let ceq_new = DVector::zeros(0);
        let ratio = tr.reduction_ratio(&step, fun_new, &cub_new, &ceq_new);
        assert!((ratio - 1.0).abs() < 1e-6 || step.norm() < 1e-9);
    }

    #[test]
    fn update_radius_shrinks_on_poor_ratio() {
        let mut tr = unconstrained_setup(2);
        let radius_before = tr.radius();
        let step = DVector::from_vec(vec![0.1, 0.0]);
        tr.update_radius(&step, 0.0);
        assert!(tr.radius() <= radius_before);
    }

    #[test]
    fn reduce_resolution_shrinks_resolution_and_radius() {
        let mut tr = unconstrained_setup(2);
        let resolution_before = tr.resolution();
        tr.reduce_resolution();
        assert!(tr.resolution() <= resolution_before);
        assert!(tr.radius() >= tr.resolution());
    }
}
