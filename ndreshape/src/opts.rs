/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::Deserialize;
use serde::Serialize;

/// `ReshapeOpts` controls how strictly [`crate::infer::verify_shapes`]
/// (and everything built on it) checks declared shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReshapeOpts {
    /// Reject a static collapsed extent whose expanded band contains
    /// a dynamic dimension. When off, the declared static extent is
    /// trusted and the band's dynamic factor is left to the runtime.
    pub disallow_static_over_dynamic_band: bool,
}

impl ReshapeOpts {
    // Every rule enforced.
    pub fn strict() -> Self {
        Self {
            disallow_static_over_dynamic_band: true,
        }
    }

    // Trust static declarations over dynamic bands.
    pub fn lenient() -> Self {
        Self {
            disallow_static_over_dynamic_band: false,
        }
    }
}

impl Default for ReshapeOpts {
    fn default() -> Self {
        Self::strict()
    }
}
