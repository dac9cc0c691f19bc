// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Quadratic surrogate model `q(x) = c + g^T (x - x_base) + 1/2 (x - x_base)^T H (x - x_base)`
//! (spec §3, system overview component #2).
//!
//! Spec §9 allows either "a tagged variant or a single explicit matrix plus
//! a list of update vectors"; this crate takes the single explicit matrix,
//! with [`crate::models::Models`] responsible for recomputing `(c, g, H)`
//! from the interpolation values whenever a point changes (see
//! `models.rs` for why that keeps the interpolation invariants exact).

use nalgebra::{DMatrix, DVector};

use crate::interpolation::Interpolation;

/// A quadratic model, explicit in `(c, g, H)`.
#[derive(Debug, Clone)]
pub struct Quadratic {
    c: f64,
    g: DVector<f64>,
    hess: DMatrix<f64>,
}

impl Quadratic {
    pub fn new(c: f64, g: DVector<f64>, hess: DMatrix<f64>) -> Self {
        debug_assert_eq!(g.len(), hess.nrows());
        debug_assert_eq!(hess.nrows(), hess.ncols());
        Quadratic { c, g, hess }
    }

    pub fn zeros(n: usize) -> Self {
        Quadratic {
            c: 0.0,
            g: DVector::zeros(n),
            hess: DMatrix::zeros(n, n),
        }
    }

    /// Value of the model at `x`.
    pub fn val(&self, x: &DVector<f64>, interp: &Interpolation) -> f64 {
        let d = x - interp.x_base();
        self.c + self.g.dot(&d) + 0.5 * d.dot(&(&self.hess * &d))
    }

    /// Gradient of the model at `x`.
    pub fn grad(&self, x: &DVector<f64>, interp: &Interpolation) -> DVector<f64> {
        let d = x - interp.x_base();
        &self.g + &self.hess * d
    }

    /// The (constant) Hessian of the model.
    pub fn hess(&self) -> &DMatrix<f64> {
        &self.hess
    }

    /// Hessian-vector product.
    pub fn hess_prod(&self, v: &DVector<f64>) -> DVector<f64> {
        &self.hess * v
    }

    /// Curvature `v^T H v` along `v`.
    pub fn curv(&self, v: &DVector<f64>) -> f64 {
        v.dot(&(&self.hess * v))
    }
}
