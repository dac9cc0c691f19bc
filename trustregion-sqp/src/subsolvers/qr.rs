// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Active-set QR of the linearized constraints (spec §6
//! `qr_tangential_byrd_omojokun`), used by the projected-Cauchy geometry
//! candidate (spec §4.4 step 4).

use nalgebra::{DMatrix, DVector};

/// Builds an orthonormal basis `Q` of `R^n` whose first `n_act` columns span
/// the row space of the active constraints (every equality row, plus the
/// inequality and bound rows *not* flagged free), and whose remaining
/// `n - n_act` columns span their null space.
pub fn qr_tangential_byrd_omojokun(
    aub: &DMatrix<f64>,
    aeq: &DMatrix<f64>,
    free_xl: &[bool],
    free_xu: &[bool],
    free_ub: &[bool],
) -> (usize, DMatrix<f64>) {
    let n = if aeq.ncols() > 0 {
        aeq.ncols()
    } else if aub.ncols() > 0 {
        aub.ncols()
    } else {
        free_xl.len()
    };

    let mut rows: Vec<DVector<f64>> = Vec::new();
    for r in aeq.row_iter() {
        rows.push(r.transpose());
    }
    for (i, r) in aub.row_iter().enumerate() {
        if !free_ub[i] {
            rows.push(r.transpose());
        }
    }
    for i in 0..n {
        if !free_xl[i] || !free_xu[i] {
            let mut e = DVector::<f64>::zeros(n);
            e[i] = 1.0;
            rows.push(e);
        }
    }

    if rows.is_empty() {
        return (0, DMatrix::identity(n, n));
    }

    let active = DMatrix::from_columns(&rows); // n x n_rows, each column one active row
    let qr = active.qr();
    let q = qr.q();
    let r = qr.r();

    let tol = 1e-10 * r.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs())).max(1.0);
    let n_act = (0..r.nrows().min(r.ncols()))
        .filter(|&i| r[(i, i)].abs() > tol)
        .count();

    // `Q` from the QR of an n x k matrix (k < n) has only k columns in
    // nalgebra's thin decomposition; pad with an orthonormal complement so
    // callers always get a full n x n basis.
    let q_full = if q.ncols() == n {
        q
    } else {
        let mut full = DMatrix::<f64>::identity(n, n);
        full.columns_mut(0, q.ncols()).copy_from(&q);
        // Re-orthonormalize via a second QR pass so the padded identity
        // columns become a genuine complement of the active row space.
        let qr2 = full.qr();
        qr2.q()
    };

    (n_act, q_full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_active_constraints_returns_full_null_space() {
        let n = 3;
        let aub = DMatrix::<f64>::zeros(0, n);
        let aeq = DMatrix::<f64>::zeros(0, n);
        let free = vec![true; n];
        let (n_act, q) = qr_tangential_byrd_omojokun(&aub, &aeq, &free, &free, &[]);
        assert_eq!(n_act, 0);
        assert_eq!(q.nrows(), n);
        assert_eq!(q.ncols(), n);
    }

    #[test]
    fn one_active_bound_gives_rank_one() {
        let n = 2;
        let aub = DMatrix::<f64>::zeros(0, n);
        let aeq = DMatrix::<f64>::zeros(0, n);
        let free_xl = vec![false, true];
        let free_xu = vec![true, true];
        let (n_act, q) = qr_tangential_byrd_omojokun(&aub, &aeq, &free_xl, &free_xu, &[]);
        assert_eq!(n_act, 1);
        assert_eq!(q.ncols(), n);
    }
}
