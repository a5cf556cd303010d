/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for shapes, reassociations and reshape
//! chains.
//!
//! Every generated [`Reassociation`] is valid over the rank it is
//! generated for; generated shapes have at least one dimension and no
//! zero-sized ones.
//!
//! This module is only included in test builds (`#[cfg(test)]`).

use proptest::prelude::*;

use crate::Extent;
use crate::Reassociation;
use crate::Shape;

/// Generates a valid reassociation over exactly `rank` expanded
/// dimensions (`rank >= 1`).
///
/// Each of the `rank - 1` gaps between adjacent dimensions is
/// independently either a group boundary or not.
pub fn gen_reassociation_over(rank: usize) -> impl Strategy<Value = Reassociation> {
    prop::collection::vec(any::<bool>(), rank.saturating_sub(1)).prop_map(move |cuts| {
        let mut sizes = vec![1];
        for cut in cuts {
            match sizes.last_mut() {
                Some(last) if !cut => *last += 1,
                _ => sizes.push(1),
            }
        }
        Reassociation::from_group_sizes(&sizes)
    })
}

/// Generates `(rank, reassociation)` with `rank` in `1..=max_rank`
/// and the reassociation valid over it.
pub fn gen_reassociation(max_rank: usize) -> impl Strategy<Value = (usize, Reassociation)> {
    (1..=max_rank).prop_flat_map(|rank| (Just(rank), gen_reassociation_over(rank)))
}

/// Generates a static shape of the given `rank` with sizes in
/// `1..=max_len`.
pub fn gen_static_shape(rank: usize, max_len: usize) -> impl Strategy<Value = Shape> {
    prop::collection::vec(1..=max_len, rank).prop_map(Shape::new_static)
}

/// Generates a shape of the given `rank` where roughly one dimension
/// in four is dynamic.
pub fn gen_shape(rank: usize, max_len: usize) -> impl Strategy<Value = Shape> {
    let extent = prop_oneof![
        3 => (1..=max_len).prop_map(Extent::Static),
        1 => Just(Extent::Dynamic),
    ];
    prop::collection::vec(extent, rank).prop_map(Shape::new)
}

/// Generates a static expanded shape with a reassociation that
/// collapses it.
pub fn gen_static_collapse(
    max_rank: usize,
    max_len: usize,
) -> impl Strategy<Value = (Shape, Reassociation)> {
    gen_reassociation(max_rank)
        .prop_flat_map(move |(rank, r)| (gen_static_shape(rank, max_len), Just(r)))
}

/// Like [`gen_static_collapse`], but dimensions may be dynamic.
pub fn gen_collapse(
    max_rank: usize,
    max_len: usize,
) -> impl Strategy<Value = (Shape, Reassociation)> {
    gen_reassociation(max_rank).prop_flat_map(move |(rank, r)| (gen_shape(rank, max_len), Just(r)))
}

/// Generates the reassociations of three chained collapses, starting
/// from a rank in `1..=max_rank`: the first groups the starting
/// dimensions, and each subsequent one groups the previous one's
/// collapsed dimensions. Returns the starting rank and the three
/// reassociations in chain order.
pub fn gen_collapse_chain(
    max_rank: usize,
) -> impl Strategy<Value = (usize, Reassociation, Reassociation, Reassociation)> {
    gen_reassociation(max_rank).prop_flat_map(|(rank, first)| {
        let second = gen_reassociation_over(first.collapsed_rank());
        (Just(rank), Just(first), second).prop_flat_map(|(rank, first, second)| {
            let third = gen_reassociation_over(second.collapsed_rank());
            (Just(rank), Just(first), Just(second), third)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_chains_are_valid((rank, a, b, c) in gen_collapse_chain(8)) {
            prop_assert!(a.validate(rank).is_ok());
            prop_assert!(b.validate(a.collapsed_rank()).is_ok());
            prop_assert!(c.validate(b.collapsed_rank()).is_ok());
        }

        #[test]
        fn generated_shapes_have_the_requested_rank(shape in gen_shape(5, 4)) {
            prop_assert_eq!(shape.rank(), 5);
            prop_assert!(shape.iter().all(|e| *e != Extent::Static(0)));
        }
    }
}
