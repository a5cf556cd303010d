/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Reassociations: groupings of the expanded side of a reshape.
//!
//! A reassociation partitions the dimensions `0..n` of the
//! higher-rank (expanded) side of a reshape into ordered, contiguous
//! runs. Each run is one dimension on the lower-rank (collapsed)
//! side:
//!
//! ```text
//! expanded:   [ d0 d1 | d2 | d3 d4 ]      rank 5
//! groups:     [[0, 1], [2], [3, 4]]
//! collapsed:  [  c0   | c1 |  c2   ]      rank 3
//! ```
//!
//! Groups are plain dimension indices: a reassociation never permutes
//! dimensions and never refers to anything but dimensions.
//!
//! Every other component assumes its input reassociation has passed
//! [`Reassociation::validate`].

use std::fmt;
use std::ops::Range;

use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ReshapeError;
use crate::shape::Shape;

/// The expanded-side dimensions forming one collapsed dimension.
pub type ReassociationIndices = Vec<usize>;

/// An ordered list of groups of expanded-side dimension indices. See
/// the [module documentation](self) for the invariants.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct Reassociation {
    groups: Vec<ReassociationIndices>,
}

impl Reassociation {
    /// Create a reassociation over an expanded side of rank
    /// `expanded_rank`, validating the groups.
    ///
    /// # Example
    /// ```
    /// use ndreshape::Reassociation;
    ///
    /// let r = Reassociation::new(vec![vec![0, 1], vec![2]], 3).unwrap();
    /// assert_eq!(r.collapsed_rank(), 2);
    /// assert!(Reassociation::new(vec![vec![0], vec![2]], 3).is_err());
    /// ```
    pub fn new(
        groups: Vec<ReassociationIndices>,
        expanded_rank: usize,
    ) -> Result<Self, ReshapeError> {
        let reassociation = Self::from_groups(groups);
        reassociation.validate(expanded_rank)?;
        Ok(reassociation)
    }

    /// Wrap `groups` without validating them. Callers must run
    /// [`Reassociation::validate`] before using the result in shape
    /// or layout computations.
    pub fn from_groups(groups: Vec<ReassociationIndices>) -> Self {
        Self { groups }
    }

    /// Build the contiguous reassociation whose `i`th group spans
    /// `sizes[i]` dimensions. Always valid when no size is zero.
    ///
    /// ```
    /// use ndreshape::Reassociation;
    ///
    /// let r = Reassociation::from_group_sizes(&[2, 1, 2]);
    /// assert_eq!(r.groups(), &[vec![0, 1], vec![2], vec![3, 4]]);
    /// ```
    pub fn from_group_sizes(sizes: &[usize]) -> Self {
        let mut next = 0;
        let groups = sizes
            .iter()
            .map(|&n| {
                let group = (next..next + n).collect();
                next += n;
                group
            })
            .collect();
        Self { groups }
    }

    /// The reassociation mapping each of `rank` dimensions to itself.
    pub fn identity(rank: usize) -> Self {
        Self::from_group_sizes(&vec![1; rank])
    }

    /// The groups of this reassociation.
    pub fn groups(&self) -> &[ReassociationIndices] {
        &self.groups
    }

    /// The number of groups, which is the rank of the collapsed
    /// side.
    pub fn collapsed_rank(&self) -> usize {
        self.groups.len()
    }

    /// The number of dimensions referenced, which is the rank of the
    /// expanded side of a valid reassociation.
    pub fn expanded_rank(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Each group as the half-open range of expanded dimensions it
    /// spans. Only meaningful for a valid reassociation.
    pub fn spans(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.groups.iter().scan(0, |start, group| {
            let span = *start..*start + group.len();
            *start = span.end;
            Some(span)
        })
    }

    /// For each expanded dimension, the collapsed dimension (group)
    /// it belongs to.
    ///
    /// ```
    /// use ndreshape::Reassociation;
    ///
    /// let r = Reassociation::from_group_sizes(&[2, 1, 2]);
    /// assert_eq!(r.expanded_to_collapsed(), vec![0, 0, 1, 2, 2]);
    /// ```
    pub fn expanded_to_collapsed(&self) -> Vec<usize> {
        self.groups
            .iter()
            .enumerate()
            .flat_map(|(g, group)| std::iter::repeat_n(g, group.len()))
            .collect()
    }

    /// Check that the groups, concatenated in order, are exactly
    /// `0, 1, …, expanded_rank - 1`, and that no group is empty.
    ///
    /// On failure, the error names the first offending group. When
    /// the groups are individually well formed but cover the wrong
    /// number of dimensions, the last group is blamed (group 0 if
    /// there are none).
    pub fn validate(&self, expanded_rank: usize) -> Result<(), ReshapeError> {
        let mut next_expected = 0;
        for (index, group) in self.groups.iter().enumerate() {
            if group.is_empty() {
                return Err(ReshapeError::InvalidReassociation {
                    group: index,
                    reason: "group is empty".to_string(),
                });
            }
            for &dim in group {
                if dim != next_expected {
                    return Err(ReshapeError::InvalidReassociation {
                        group: index,
                        reason: format!("expected dimension {}, got {}", next_expected, dim),
                    });
                }
                next_expected += 1;
            }
        }
        if next_expected != expanded_rank {
            return Err(ReshapeError::InvalidReassociation {
                group: self.groups.len().saturating_sub(1),
                reason: format!(
                    "groups cover {} dimensions, expected {}",
                    next_expected, expanded_rank
                ),
            });
        }
        Ok(())
    }

    /// Validate against a concrete expanded shape.
    ///
    /// Like [`Reassociation::validate`], except that the degenerate
    /// empty reassociation (a collapse to rank 0) is accepted exactly
    /// when every expanded dimension is the static extent `1`.
    pub fn validate_shape(&self, expanded: &Shape) -> Result<(), ReshapeError> {
        if self.groups.is_empty() {
            return match expanded
                .iter()
                .enumerate()
                .find(|(_, extent)| !extent.is_unit())
            {
                Some((dim, &extent)) => Err(ReshapeError::NonUnitToRankZero { dim, extent }),
                None => Ok(()),
            };
        }
        self.validate(expanded.rank())
    }
}

impl From<Vec<ReassociationIndices>> for Reassociation {
    fn from(groups: Vec<ReassociationIndices>) -> Self {
        Self::from_groups(groups)
    }
}

impl fmt::Display for Reassociation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]",
            self.groups
                .iter()
                .map(|group| format!("[{}]", group.iter().join(", ")))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::extent::Extent;
    use crate::shape;
    use crate::strategy::gen_reassociation;

    fn reassoc(groups: &[&[usize]]) -> Reassociation {
        Reassociation::from_groups(groups.iter().map(|g| g.to_vec()).collect())
    }

    #[test]
    fn test_validate_ok() {
        assert!(reassoc(&[&[0, 1], &[2]]).validate(3).is_ok());
        assert!(reassoc(&[&[0], &[1], &[2]]).validate(3).is_ok());
        assert!(reassoc(&[&[0, 1, 2]]).validate(3).is_ok());
        assert!(reassoc(&[]).validate(0).is_ok());
    }

    #[test]
    fn test_validate_gap() {
        assert!(matches!(
            reassoc(&[&[0], &[2]]).validate(3),
            Err(ReshapeError::InvalidReassociation { group: 1, .. })
        ));
    }

    #[test]
    fn test_validate_overlap() {
        assert!(matches!(
            reassoc(&[&[0, 1], &[1, 2]]).validate(3),
            Err(ReshapeError::InvalidReassociation { group: 1, .. })
        ));
    }

    #[test]
    fn test_validate_out_of_order() {
        assert!(matches!(
            reassoc(&[&[1, 0], &[2]]).validate(3),
            Err(ReshapeError::InvalidReassociation { group: 0, .. })
        ));
        // A permutation across groups.
        assert!(matches!(
            reassoc(&[&[2], &[0, 1]]).validate(3),
            Err(ReshapeError::InvalidReassociation { group: 0, .. })
        ));
    }

    #[test]
    fn test_validate_wrong_count() {
        // Too few dimensions: blame the last group.
        assert!(matches!(
            reassoc(&[&[0], &[1]]).validate(3),
            Err(ReshapeError::InvalidReassociation { group: 1, .. })
        ));
        // Too many dimensions.
        assert!(matches!(
            reassoc(&[&[0], &[1, 2, 3]]).validate(3),
            Err(ReshapeError::InvalidReassociation { group: 1, .. })
        ));
        // No groups at all over a non-empty expanded side.
        assert!(matches!(
            reassoc(&[]).validate(2),
            Err(ReshapeError::InvalidReassociation { group: 0, .. })
        ));
    }

    #[test]
    fn test_validate_empty_group() {
        assert!(matches!(
            reassoc(&[&[0], &[], &[1]]).validate(2),
            Err(ReshapeError::InvalidReassociation { group: 1, .. })
        ));
    }

    #[test]
    fn test_validate_shape_rank_zero() {
        let r = reassoc(&[]);
        assert!(r.validate_shape(&shape![1, 1, 1]).is_ok());
        assert!(r.validate_shape(&shape![]).is_ok());
        assert_eq!(
            r.validate_shape(&shape![1, 2, 1]),
            Err(ReshapeError::NonUnitToRankZero {
                dim: 1,
                extent: Extent::Static(2)
            })
        );
        assert_eq!(
            r.validate_shape(&shape![1, ?]),
            Err(ReshapeError::NonUnitToRankZero {
                dim: 1,
                extent: Extent::Dynamic
            })
        );
        // Non-empty reassociations are validated by rank.
        assert!(reassoc(&[&[0, 1]]).validate_shape(&shape![2, ?]).is_ok());
        assert!(reassoc(&[&[0]]).validate_shape(&shape![2, ?]).is_err());
    }

    #[test]
    fn test_spans_and_inverse() {
        let r = reassoc(&[&[0, 1], &[2], &[3, 4, 5]]);
        assert_eq!(r.spans().collect::<Vec<_>>(), vec![0..2, 2..3, 3..6]);
        assert_eq!(r.expanded_to_collapsed(), vec![0, 0, 1, 2, 2, 2]);
        assert_eq!(r.expanded_rank(), 6);
        assert_eq!(r.collapsed_rank(), 3);
    }

    #[test]
    fn test_identity() {
        let r = Reassociation::identity(3);
        assert_eq!(r, reassoc(&[&[0], &[1], &[2]]));
        assert!(r.validate(3).is_ok());
        assert_eq!(Reassociation::identity(0), reassoc(&[]));
    }

    #[test]
    fn test_display() {
        assert_eq!(reassoc(&[&[0, 1], &[2]]).to_string(), "[[0, 1], [2]]");
        assert_eq!(reassoc(&[]).to_string(), "[]");
    }

    proptest! {
        #[test]
        fn validate_accepts_generated((rank, r) in gen_reassociation(8)) {
            prop_assert!(r.validate(rank).is_ok());
            prop_assert_eq!(r.expanded_rank(), rank);
        }

        // `validate` succeeds iff the concatenation of the groups is
        // exactly `0..n` and no group is empty.
        #[test]
        fn validate_iff_concatenation_is_iota(
            groups in prop::collection::vec(prop::collection::vec(0usize..6, 0..4), 0..4),
            n in 0usize..8,
        ) {
            let concatenated: Vec<usize> = groups.iter().flatten().copied().collect();
            let expected = concatenated == (0..n).collect::<Vec<_>>()
                && groups.iter().all(|g| !g.is_empty());
            let r = Reassociation::from_groups(groups);
            prop_assert_eq!(r.validate(n).is_ok(), expected);
        }
    }
}
