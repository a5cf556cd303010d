/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use crate::extent::Extent;
use crate::layout::ResultLayout;

/// The type of error for reshape inference and verification.
///
/// Every variant is a deterministic function of the inputs: none of
/// them is worth retrying. Hosts translate these into their own
/// diagnostics (attaching source locations and so on).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ReshapeError {
    #[error("expected reassociation group #{group} to be valid and contiguous: {reason}")]
    InvalidReassociation { group: usize, reason: String },

    #[error("rank mismatch: {reason}")]
    RankMismatch { reason: String },

    #[error(
        "invalid to reshape with non-unit extent {extent} (dimension {dim}) to a zero-rank shape"
    )]
    NonUnitToRankZero { dim: usize, extent: Extent },

    #[error(
        "invalid to have a single dimension ({group}) expanded into multiple dynamic dims ({first},{second})"
    )]
    AmbiguousDynamicSplit {
        group: usize,
        first: usize,
        second: usize,
    },

    #[error("expected dimension {dim} of collapsed shape to be {expected}, but got {actual}")]
    ShapeMismatch {
        dim: usize,
        expected: Extent,
        actual: Extent,
    },

    #[error(
        "expected dimension {dim} of collapsed shape to be dynamic since one or more of the corresponding dimensions in the expanded shape is dynamic"
    )]
    ExpectedDynamic { dim: usize },

    #[error("expected result layout {expected:?}, but got {actual:?}")]
    LayoutMismatch {
        expected: ResultLayout,
        actual: ResultLayout,
    },
}

impl ReshapeError {
    /// Shorthand for [`ReshapeError::RankMismatch`].
    pub(crate) fn rank_mismatch(reason: impl Into<String>) -> Self {
        ReshapeError::RankMismatch {
            reason: reason.into(),
        }
    }
}
