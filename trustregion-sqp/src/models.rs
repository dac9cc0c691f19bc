// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Models bundle: the objective's and every constraint's quadratic, the
//! cached values at every interpolation point, and the interpolation-system
//! factorization they share (spec §3, system overview component #3).
//!
//! The factorization depends only on the interpolation offsets `xpt`, not on
//! any of the values being interpolated, so it is built once per geometry
//! change and reused to solve for the objective quadratic, every
//! constraint-component quadratic, and the Lagrange cardinal polynomials
//! used by the geometry step and the denominator oracle (spec §4.4, §4.9).
//! This is the underdetermined-quadratic-interpolation system of Powell's
//! least-Frobenius-norm update (see SPEC_FULL.md §C.2).

use nalgebra::{DMatrix, DVector, Dyn};

use crate::error::CoreError;
use crate::interpolation::Interpolation;
use crate::problem::Problem;
use crate::quadratic::Quadratic;

pub struct Models {
    interpolation: Interpolation,
    fun_val: DVector<f64>,
    cub_val: DMatrix<f64>, // npt x m_nonlinear_ub, row k = values at point k
    ceq_val: DMatrix<f64>, // npt x m_nonlinear_eq
    fun_model: Quadratic,
    cub_models: Vec<Quadratic>,
    ceq_models: Vec<Quadratic>,
    kkt_lu: nalgebra::linalg::LU<f64, Dyn, Dyn>,
}

impl Models {
    pub fn new(
        pb: &Problem,
        interpolation: Interpolation,
        fun_val: DVector<f64>,
        cub_val: DMatrix<f64>,
        ceq_val: DMatrix<f64>,
    ) -> Result<Self, CoreError> {
        debug_assert_eq!(fun_val.len(), interpolation.npt());
        debug_assert_eq!(cub_val.nrows(), interpolation.npt());
        debug_assert_eq!(ceq_val.nrows(), interpolation.npt());
        debug_assert_eq!(cub_val.ncols(), pb.m_nonlinear_ub());
        debug_assert_eq!(ceq_val.ncols(), pb.m_nonlinear_eq());

        let kkt_lu = Self::factorize(&interpolation)?;
        let mut models = Models {
            interpolation,
            fun_val,
            cub_val,
            ceq_val,
            fun_model: Quadratic::zeros(pb.n()),
            cub_models: (0..pb.m_nonlinear_ub()).map(|_| Quadratic::zeros(pb.n())).collect(),
            ceq_models: (0..pb.m_nonlinear_eq()).map(|_| Quadratic::zeros(pb.n())).collect(),
            kkt_lu,
        };
        models.rebuild_models();
        Ok(models)
    }

    fn factorize(interp: &Interpolation) -> Result<nalgebra::linalg::LU<f64, Dyn, Dyn>, CoreError> {
        let xpt = interp.xpt();
        let npt = interp.npt();
        let n = interp.n();
        let dim = npt + n + 1;
        let mut kkt = DMatrix::<f64>::zeros(dim, dim);

        for i in 0..npt {
            for j in 0..npt {
                let d = xpt.column(i).dot(&xpt.column(j));
                kkt[(i, j)] = 0.5 * d * d;
            }
        }
        for k in 0..npt {
            for i in 0..n {
                let v = xpt[(i, k)];
                kkt[(k, npt + i)] = v;
                kkt[(npt + i, k)] = v;
            }
            kkt[(k, dim - 1)] = 1.0;
            kkt[(dim - 1, k)] = 1.0;
        }

        let lu = kkt.lu();
        if lu.determinant().abs() <= f64::EPSILON.sqrt() {
            return Err(CoreError::DegenerateInterpolationSystem { k: usize::MAX });
        }
        Ok(lu)
    }

    /// Solves the interpolation KKT system for the right-hand side `rhs`
    /// (length `npt`), returning the Lagrange multipliers, gradient, and
    /// constant of the interpolating quadratic.
    fn solve_rhs(&self, rhs: &DVector<f64>) -> (DVector<f64>, DVector<f64>, f64) {
        let npt = self.interpolation.npt();
        let n = self.interpolation.n();
        let dim = npt + n + 1;
        let mut full_rhs = DVector::<f64>::zeros(dim);
        full_rhs.rows_mut(0, npt).copy_from(rhs);

        let sol = self
            .kkt_lu
            .solve(&full_rhs)
            .expect("KKT factorization is cached only when non-singular");

        let lambda = sol.rows(0, npt).clone_owned();
        let g = sol.rows(npt, n).clone_owned();
        let c = sol[dim - 1];
        (lambda, g, c)
    }

    fn quadratic_from_rhs(&self, rhs: &DVector<f64>) -> Quadratic {
        let (lambda, g, c) = self.solve_rhs(rhs);
        let xpt = self.interpolation.xpt();
        let n = self.interpolation.n();
        let mut hess = DMatrix::<f64>::zeros(n, n);
        for k in 0..self.interpolation.npt() {
            let xk = xpt.column(k).clone_owned();
            hess += lambda[k] * (&xk * xk.transpose());
        }
        Quadratic::new(c, g, hess)
    }

    fn rebuild_models(&mut self) {
        self.fun_model = self.quadratic_from_rhs(&self.fun_val);
        for j in 0..self.cub_models.len() {
            let rhs = self.cub_val.column(j).clone_owned();
            self.cub_models[j] = self.quadratic_from_rhs(&rhs);
        }
        for j in 0..self.ceq_models.len() {
            let rhs = self.ceq_val.column(j).clone_owned();
            self.ceq_models[j] = self.quadratic_from_rhs(&rhs);
        }
    }

    pub fn interpolation(&self) -> &Interpolation {
        &self.interpolation
    }

    pub fn npt(&self) -> usize {
        self.interpolation.npt()
    }

    pub fn fun_val(&self) -> &DVector<f64> {
        &self.fun_val
    }

    pub fn cub_val(&self) -> &DMatrix<f64> {
        &self.cub_val
    }

    pub fn ceq_val(&self) -> &DMatrix<f64> {
        &self.ceq_val
    }

    pub fn fun(&self, x: &DVector<f64>) -> f64 {
        self.fun_model.val(x, &self.interpolation)
    }

    pub fn fun_grad(&self, x: &DVector<f64>) -> DVector<f64> {
        self.fun_model.grad(x, &self.interpolation)
    }

    pub fn fun_hess(&self) -> &DMatrix<f64> {
        self.fun_model.hess()
    }

    pub fn fun_hess_prod(&self, v: &DVector<f64>) -> DVector<f64> {
        self.fun_model.hess_prod(v)
    }

    pub fn fun_curv(&self, v: &DVector<f64>) -> f64 {
        self.fun_model.curv(v)
    }

    pub fn cub(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.cub_models.len(),
            self.cub_models.iter().map(|q| q.val(x, &self.interpolation)),
        )
    }

    pub fn ceq(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.ceq_models.len(),
            self.ceq_models.iter().map(|q| q.val(x, &self.interpolation)),
        )
    }

    /// Gradients of every nonlinear inequality constraint at `x`, stacked by
    /// row. When `mask` is `Some`, only the rows flagged `true` are included
    /// (spec §4.11's active-set selection).
    pub fn cub_grad(&self, x: &DVector<f64>, mask: Option<&[bool]>) -> DMatrix<f64> {
        Self::stack_grads(&self.cub_models, x, &self.interpolation, mask)
    }

    pub fn ceq_grad(&self, x: &DVector<f64>) -> DMatrix<f64> {
        Self::stack_grads(&self.ceq_models, x, &self.interpolation, None)
    }

    fn stack_grads(
        models: &[Quadratic],
        x: &DVector<f64>,
        interp: &Interpolation,
        mask: Option<&[bool]>,
    ) -> DMatrix<f64> {
        let n = interp.n();
        let rows: Vec<DVector<f64>> = models
            .iter()
            .enumerate()
            .filter(|(i, _)| mask.map(|m| m[*i]).unwrap_or(true))
            .map(|(_, q)| q.grad(x, interp))
            .collect();
        let mut out = DMatrix::<f64>::zeros(rows.len(), n);
        for (i, row) in rows.iter().enumerate() {
            out.set_row(i, &row.transpose());
        }
        out
    }

    pub fn cub_models(&self) -> &[Quadratic] {
        &self.cub_models
    }

    pub fn ceq_models(&self) -> &[Quadratic] {
        &self.ceq_models
    }

    /// `sigma` for every interpolation point at once: replacing point `k`
    /// with `x_trial`, for every `k` (spec §4.9 `get_index_to_remove`).
    pub fn denominators_all(&self, x_trial: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(self.npt(), (0..self.npt()).map(|k| self.denominators(x_trial, k)))
    }

    pub fn cub_hess_prod(&self, v: &DVector<f64>) -> Vec<DVector<f64>> {
        self.cub_models.iter().map(|q| q.hess_prod(v)).collect()
    }

    pub fn ceq_hess_prod(&self, v: &DVector<f64>) -> Vec<DVector<f64>> {
        self.ceq_models.iter().map(|q| q.hess_prod(v)).collect()
    }

    /// Returns the `k_new`-th Lagrange cardinal polynomial: the unique
    /// quadratic interpolant of the indicator `e_{k_new}` over the current
    /// point set (spec §4.4 step 1).
    pub fn lagrange_polynomial(&self, k_new: usize) -> Quadratic {
        let mut rhs = DVector::<f64>::zeros(self.npt());
        rhs[k_new] = 1.0;
        self.quadratic_from_rhs(&rhs)
    }

    /// Denominator `sigma` predicting the numerical quality of replacing
    /// point `k_new` with `x_trial` (spec GLOSSARY "Denominator").
    pub fn denominators(&self, x_trial: &DVector<f64>, k_new: usize) -> f64 {
        self.lagrange_polynomial(k_new).val(x_trial, &self.interpolation)
    }

    /// Replaces interpolation point `k_new` with `x_new`, recording the new
    /// function and constraint values there, and refactorizes the
    /// interpolation system and every quadratic from scratch (spec §3
    /// "mutated only by `update`... preserves interpolation at all other
    /// points").
    pub fn update(
        &mut self,
        k_new: usize,
        x_new: DVector<f64>,
        fun_new: f64,
        cub_new: DVector<f64>,
        ceq_new: DVector<f64>,
    ) -> Result<(), CoreError> {
        let offset = &x_new - self.interpolation.x_base();
        self.interpolation.set_point(k_new, offset);
        self.fun_val[k_new] = fun_new;
        self.cub_val.set_row(k_new, &cub_new.transpose());
        self.ceq_val.set_row(k_new, &ceq_new.transpose());

        self.kkt_lu = Self::factorize(&self.interpolation)
            .map_err(|_| CoreError::DegenerateInterpolationSystem { k: k_new })?;
        self.rebuild_models();
        Ok(())
    }

    /// Re-expresses the interpolation set relative to `new_base`, preserving
    /// every cached value and refactorizing (spec §4.12 `shift_x_base`).
    pub fn shift_x_base(&mut self, new_base: DVector<f64>) -> Result<(), CoreError> {
        self.interpolation.shift_base(new_base);
        self.kkt_lu = Self::factorize(&self.interpolation)?;
        self.rebuild_models();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::{Bounds, LinearConstraintSet};

    fn unconstrained_problem(n: usize) -> Problem {
        let xl = DVector::from_element(n, f64::NEG_INFINITY);
        let xu = DVector::from_element(n, f64::INFINITY);
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
        .unwrap()
    }

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
        let xpt = DMatrix::from_columns(&cols);
        Interpolation::new(x_base, xpt).unwrap()
    }

    #[test]
    fn interpolates_quadratic_exactly() {
        let n = 2;
        let pb = unconstrained_problem(n);
        let interp = simplex_interpolation(n);
        let fun_val = DVector::from_iterator(
            interp.npt(),
            (0..interp.npt()).map(|k| {
                let p = interp.point(k);
                p.dot(&p)
            }),
        );
        let cub_val = DMatrix::zeros(interp.npt(), 0);
        let ceq_val = DMatrix::zeros(interp.npt(), 0);
        let models = Models::new(&pb, interp.clone(), fun_val.clone(), cub_val, ceq_val).unwrap();
        for k in 0..interp.npt() {
            let p = interp.point(k);
            approx::assert_relative_eq!(models.fun(&p), fun_val[k], epsilon = 1e-8);
        }
    }

    #[test]
    fn shift_x_base_preserves_values() {
        let n = 2;
        let pb = unconstrained_problem(n);
        let interp = simplex_interpolation(n);
        let fun_val = DVector::from_iterator(
            interp.npt(),
            (0..interp.npt()).map(|k| {
                let p = interp.point(k);
                p.dot(&p)
            }),
        );
        let cub_val = DMatrix::zeros(interp.npt(), 0);
        let ceq_val = DMatrix::zeros(interp.npt(), 0);
        let mut models = Models::new(&pb, interp.clone(), fun_val, cub_val, ceq_val).unwrap();

        let probe = DVector::from_vec(vec![0.3, -0.2]);
        let before = models.fun(&probe);
        models.shift_x_base(DVector::from_vec(vec![0.1, 0.1])).unwrap();
        let after = models.fun(&probe);
        approx::assert_abs_diff_eq!(before, after, epsilon = 1e-6);
    }
}
