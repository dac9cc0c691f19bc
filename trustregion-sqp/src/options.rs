// Copyright 2018-2022 argmin developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Solver configuration.
//!
//! The upstream algorithm threads a dynamically-typed options mapping
//! through every call; here it is a plain record with exactly the three
//! recognized fields (spec §9). `radius_init` seeds both the initial
//! trust-region radius and the initial resolution (they are tied together
//! by construction, per spec §9's second Open Question).

/// Configuration recognized by [`crate::trustregion::TrustRegion`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    /// Initial trust-region radius and initial resolution.
    pub radius_init: f64,
    /// Terminal resolution floor passed to [`crate::trustregion::TrustRegion::reduce_resolution`].
    pub radius_final: f64,
    /// Enables non-fatal invariant-violation warnings on subproblem post-conditions.
    pub debug: bool,
}

impl Options {
    /// Builds options, enforcing `0 < radius_final <= radius_init`.
    pub fn new(radius_init: f64, radius_final: f64, debug: bool) -> Self {
        debug_assert!(radius_final > 0.0, "radius_final must be positive");
        debug_assert!(
            radius_final <= radius_init,
            "radius_final must not exceed radius_init"
        );
        Options {
            radius_init,
            radius_final,
            debug,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Options {
            radius_init: 1.0,
            radius_final: 1e-6,
            debug: false,
        }
    }
}
