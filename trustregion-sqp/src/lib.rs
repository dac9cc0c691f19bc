// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A trust-region framework for derivative-free constrained nonlinear
//! optimization, built around interpolation-based quadratic surrogate
//! models and a composite-step SQP (Byrd-Omojokun decomposition).
//!
//! # Design goals
//!
//! The crate never evaluates derivatives of the objective or constraints:
//! every gradient and Hessian it uses comes from a quadratic model fitted
//! to function values sampled at a poised interpolation set. It solves
//! for a step by splitting the trust-region subproblem into a normal step
//! (reduce linearized constraint violation) and a tangential step (reduce
//! the Lagrangian model in the null space of the active constraints),
//! manages an exact-penalty merit function, estimates Lagrange multipliers
//! by bounded least squares, and controls both a trust-region radius and a
//! separate resolution floor that governs how tightly the interpolation
//! geometry is allowed to shrink.
//!
//! # Modules
//!
//! - [`problem`] — the immutable problem handle: bounds, linear
//!   constraints, and the black-box objective/constraint oracles.
//! - [`interpolation`] — the poised interpolation point set.
//! - [`quadratic`] — the explicit `(c, g, H)` quadratic surrogate.
//! - [`models`] — the objective's and every constraint's quadratic model,
//!   built from one shared interpolation-system factorization.
//! - [`trustregion`] — [`trustregion::TrustRegion`], the framework that
//!   drives the composite step, the merit function, penalty and
//!   multiplier updates, and radius/resolution control.
//! - [`subsolvers`] — the six external subproblem solvers the framework
//!   consumes (normal step, tangential step x2, geometry step x2,
//!   active-set QR).
//! - [`bvls`] — bounded-variable least squares, used internally by
//!   multiplier estimation.
//! - [`options`] — solver configuration.
//! - [`linalg`] — small dense-vector helpers shared across the crate.
//! - [`error`] — [`error::CoreError`], returned by the crate's fallible
//!   constructors.

pub mod bvls;
pub mod error;
pub mod interpolation;
pub mod linalg;
pub mod models;
pub mod options;
pub mod problem;
pub mod quadratic;
pub mod subsolvers;
pub mod trustregion;

pub use error::CoreError;
pub use options::Options;
pub use problem::{Bounds, LinearConstraintSet, Problem, ProblemType};
pub use trustregion::TrustRegion;
