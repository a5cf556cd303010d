/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Fusing chains of reshapes.
//!
//! Two reshapes moving the same way compose into one. For two
//! collapses
//!
//! ```text
//! [a, b, c, d] --[[0, 1], [2], [3]]--> [ab, c, d] --[[0], [1, 2]]--> [ab, cd]
//! ```
//!
//! the consumer's groups index the producer's result dimensions, and
//! substituting each index by the producer group it names gives the
//! fused grouping `[[0, 1], [2, 3]]` over the original dimensions.
//! For two expansions the chain runs the other way, so the producer's
//! groups index the consumer's.
//!
//! Reshapes that move in opposite directions do not fuse, but an
//! expansion undone by the matching collapse (or vice versa) folds
//! away entirely; see [`fold_pair`].

use serde::Deserialize;
use serde::Serialize;

use crate::error::ReshapeError;
use crate::infer::Direction;
use crate::infer::verify_ranks;
use crate::reassociation::Reassociation;
use crate::shape::Shape;

/// A reshape from `source` to `result`, grouping the dimensions of the
/// higher-rank side by `reassociation`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct Reshape {
    source: Shape,
    result: Shape,
    reassociation: Reassociation,
}

impl Reshape {
    /// Create a reshape after checking its ranks and reassociation.
    pub fn new(
        source: Shape,
        result: Shape,
        reassociation: Reassociation,
    ) -> Result<Self, ReshapeError> {
        match Direction::from_ranks(source.rank(), result.rank())? {
            Direction::Collapse => verify_ranks(&source, result.rank(), &reassociation)?,
            Direction::Expand => verify_ranks(&result, source.rank(), &reassociation)?,
        }
        Ok(Self {
            source,
            result,
            reassociation,
        })
    }

    pub fn source(&self) -> &Shape {
        &self.source
    }

    pub fn result(&self) -> &Shape {
        &self.result
    }

    pub fn reassociation(&self) -> &Reassociation {
        &self.reassociation
    }

    /// Whether this reshape collapses or expands. Ranks differ by
    /// construction.
    pub fn direction(&self) -> Direction {
        if self.source.rank() > self.result.rank() {
            Direction::Collapse
        } else {
            Direction::Expand
        }
    }
}

/// The outcome of fusing two reshapes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum Fusion {
    /// The single reshape equivalent to the pair.
    Fused(Reshape),
    /// One reshape collapses and the other expands. Both must be
    /// kept as they are.
    DirectionMismatch,
    /// The consumer does not consume the producer's result.
    Incompatible,
}

/// The outcome of folding a producer/consumer pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub enum Fold {
    /// The consumer undoes the producer: the pair can be replaced by
    /// the producer's source.
    Identity,
    /// The pair does not cancel; this is the result of [`fuse`].
    Fusion(Fusion),
}

/// Substitute each dimension named by `consumer` with the span of the
/// `producer` group at that index.
///
/// `consumer` must be a valid grouping of exactly the `producer`'s
/// collapsed dimensions, otherwise the two do not compose and the
/// result is `None`. An empty `consumer` composes with any
/// `producer` to the empty grouping.
///
/// ```
/// use ndreshape::Reassociation;
/// use ndreshape::fusion::fuse_reassociations;
///
/// let producer = Reassociation::from_group_sizes(&[2, 1, 1]);
/// let consumer = Reassociation::from_group_sizes(&[1, 2]);
/// assert_eq!(
///     fuse_reassociations(&producer, &consumer),
///     Some(Reassociation::from_group_sizes(&[2, 2]))
/// );
/// ```
pub fn fuse_reassociations(
    producer: &Reassociation,
    consumer: &Reassociation,
) -> Option<Reassociation> {
    if consumer.collapsed_rank() == 0 {
        return Some(Reassociation::default());
    }
    consumer.validate(producer.collapsed_rank()).ok()?;
    let groups = consumer
        .groups()
        .iter()
        .map(|group| {
            group
                .iter()
                .flat_map(|&dim| producer.groups()[dim].iter().copied())
                .collect()
        })
        .collect();
    Some(Reassociation::from_groups(groups))
}

/// Fuse `producer` followed by `consumer` into a single reshape.
///
/// Both must move the same way: two collapses fuse with the
/// producer's groups substituted into the consumer's, two expansions
/// with the consumer's substituted into the producer's. Mixed
/// directions yield [`Fusion::DirectionMismatch`].
pub fn fuse(producer: &Reshape, consumer: &Reshape) -> Fusion {
    if producer.result.rank() != consumer.source.rank() {
        tracing::debug!(
            producer_result = %producer.result,
            consumer_source = %consumer.source,
            "fusion declined: consumer does not consume the producer's result"
        );
        return Fusion::Incompatible;
    }
    let direction = match Direction::of_chain(
        producer.source.rank(),
        producer.result.rank(),
        consumer.result.rank(),
    ) {
        Some(direction) => direction,
        None => {
            tracing::debug!(
                producer = %producer.direction(),
                consumer = %consumer.direction(),
                "fusion declined: direction mismatch"
            );
            return Fusion::DirectionMismatch;
        }
    };

    let fused = match direction {
        Direction::Collapse => {
            fuse_reassociations(&producer.reassociation, &consumer.reassociation)
        }
        Direction::Expand => fuse_reassociations(&consumer.reassociation, &producer.reassociation),
    };
    match fused {
        Some(reassociation) => Fusion::Fused(Reshape {
            source: producer.source.clone(),
            result: consumer.result.clone(),
            reassociation,
        }),
        None => {
            tracing::debug!(
                producer = %producer.reassociation,
                consumer = %consumer.reassociation,
                "fusion declined: reassociations do not compose"
            );
            Fusion::Incompatible
        }
    }
}

/// Fold `producer` followed by `consumer`.
///
/// The pair is an identity when the consumer moves opposite to the
/// producer with the same grouping and lands back on the producer's
/// source shape. Otherwise the pair is handed to [`fuse`].
///
/// ```
/// use ndreshape::Reassociation;
/// use ndreshape::fusion::Fold;
/// use ndreshape::fusion::Reshape;
/// use ndreshape::fusion::fold_pair;
/// use ndreshape::shape;
///
/// let r = Reassociation::from_group_sizes(&[2]);
/// let expand = Reshape::new(shape![?], shape![?, 4], r.clone()).unwrap();
/// let collapse = Reshape::new(shape![?, 4], shape![?], r).unwrap();
/// assert_eq!(fold_pair(&expand, &collapse), Fold::Identity);
/// ```
pub fn fold_pair(producer: &Reshape, consumer: &Reshape) -> Fold {
    if producer.direction() != consumer.direction()
        && producer.reassociation == consumer.reassociation
        && producer.result == consumer.source
        && producer.source == consumer.result
    {
        return Fold::Identity;
    }
    Fold::Fusion(fuse(producer, consumer))
}
