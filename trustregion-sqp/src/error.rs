// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Error taxonomy for the trust-region core.
//!
//! Only contract violations (spec §7) are represented here: shape mismatches
//! in a [`crate::problem::Problem`] and interpolation systems that become
//! singular after a point replacement. Degenerate numerics (a collapsed
//! reduction ratio, a collapsed low-penalty estimate) are signaled through
//! sentinel return values, not errors, because the framework never retries
//! on its own — only the driver does.

use thiserror::Error;

/// Fatal, caller-facing errors raised by the trust-region core.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("bounds have length {xl_len} and {xu_len}, expected both to equal n = {n}")]
    BoundsShapeMismatch {
        n: usize,
        xl_len: usize,
        xu_len: usize,
    },

    #[error("linear {kind} constraint matrix has {rows}x{cols} shape, expected n = {n} columns")]
    LinearConstraintShapeMismatch {
        kind: &'static str,
        rows: usize,
        cols: usize,
        n: usize,
    },

    #[error(
        "linear {kind} constraint matrix has {rows} rows but the right-hand side has length {rhs_len}"
    )]
    LinearConstraintRhsMismatch {
        kind: &'static str,
        rows: usize,
        rhs_len: usize,
    },

    #[error("interpolation set must have at least n + 2 = {min_npt} points, got {npt}")]
    TooFewInterpolationPoints { npt: usize, min_npt: usize },

    #[error("interpolation point {k} has {len} coordinates, expected n = {n}")]
    InterpolationPointShapeMismatch { k: usize, len: usize, n: usize },

    #[error("the interpolation system is singular after updating point {k}; the point set is no longer poised")]
    DegenerateInterpolationSystem { k: usize },
}
