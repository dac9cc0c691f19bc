// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Interpolation set: a base point plus `npt` offsets (spec §3, system
//! overview component #1).

use nalgebra::{DMatrix, DVector};

use crate::error::CoreError;

/// `m = npt` points `{x_base + xpt[:, k]}`, poised for quadratic
/// interpolation. Poisedness itself is witnessed by [`crate::models::Models`]
/// via its cached KKT factorization, not by this struct.
#[derive(Debug, Clone)]
pub struct Interpolation {
    x_base: DVector<f64>,
    xpt: DMatrix<f64>,
}

impl Interpolation {
    pub fn new(x_base: DVector<f64>, xpt: DMatrix<f64>) -> Result<Self, CoreError> {
        let n = x_base.len();
        if xpt.nrows() != n {
            return Err(CoreError::InterpolationPointShapeMismatch {
                k: 0,
                len: xpt.nrows(),
                n,
            });
        }
        let min_npt = n + 2;
        if xpt.ncols() < min_npt {
            return Err(CoreError::TooFewInterpolationPoints {
                npt: xpt.ncols(),
                min_npt,
            });
        }
        Ok(Interpolation { x_base, xpt })
    }

    pub fn n(&self) -> usize {
        self.x_base.len()
    }

    pub fn npt(&self) -> usize {
        self.xpt.ncols()
    }

    pub fn x_base(&self) -> &DVector<f64> {
        &self.x_base
    }

    pub fn xpt(&self) -> &DMatrix<f64> {
        &self.xpt
    }

    /// Absolute position of interpolation point `k`.
    pub fn point(&self, k: usize) -> DVector<f64> {
        &self.x_base + self.xpt.column(k)
    }

    /// Replaces point `k` with `x_base + offset`.
    pub fn set_point(&mut self, k: usize, offset: DVector<f64>) {
        self.xpt.set_column(k, &offset);
    }

    /// Re-expresses every offset relative to `new_base`, preserving the
    /// absolute position of each interpolation point.
    pub fn shift_base(&mut self, new_base: DVector<f64>) {
        let delta = &new_base - &self.x_base;
        for mut col in self.xpt.column_iter_mut() {
            col -= &delta;
        }
        self.x_base = new_base;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn shift_base_preserves_absolute_points() {
        let x_base = DVector::from_vec(vec![0.0, 0.0]);
        let xpt = DMatrix::from_columns(&[
            DVector::from_vec(vec![1.0, 0.0]),
            DVector::from_vec(vec![0.0, 1.0]),
            DVector::from_vec(vec![-1.0, 0.0]),
            DVector::from_vec(vec![0.0, -1.0]),
        ]);
        let mut interp = Interpolation::new(x_base, xpt).unwrap();
        let before: Vec<_> = (0..interp.npt()).map(|k| interp.point(k)).collect();
        interp.shift_base(DVector::from_vec(vec![0.5, -0.25]));
        for (k, p) in before.iter().enumerate() {
            assert_abs_diff_eq!(interp.point(k).norm(), p.norm(), epsilon = 1e-12);
            assert!((interp.point(k) - p).norm() < 1e-12);
        }
    }
}
