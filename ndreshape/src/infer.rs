/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Shape algebra for reshapes.
//!
//! A reshape relates a higher-rank *expanded* shape and a lower-rank
//! *collapsed* shape through a [`Reassociation`]: collapsed dimension
//! `i` is the product of the expanded dimensions in group `i`.
//!
//! - **Collapsing** computes the collapsed shape from the expanded
//!   one: a group's extent is the product of its members, or dynamic
//!   if any member is dynamic.
//! - **Expanding** goes the other way. The split of a collapsed
//!   extent is not determined by the extent alone, so the result
//!   shape is *declared* by the caller and taken as ground truth. At
//!   most one position per group may be dynamic; with two, there is
//!   no way to tell how the collapsed extent divides between them.
//!
//! Both directions are checked with the same rule
//! ([`verify_shapes`]): per group, if the expanded band is fully
//! static, the collapsed extent must be the product; otherwise the
//! collapsed extent must be dynamic.
//!
//! [`infer`] is the entry point that combines validation, shape
//! algebra and layout checking (see [`crate::layout`]) and records,
//! for every result dimension, where its value comes from. That
//! provenance is what [`crate::reify`] turns into runtime arithmetic.

use std::fmt;
use std::ops::Range;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ReshapeError;
use crate::extent::Extent;
use crate::layout::Layout;
use crate::layout::ResultLayout;
use crate::layout::collapse_layout;
use crate::layout::expand_layout;
use crate::opts::ReshapeOpts;
use crate::reassociation::Reassociation;
use crate::shape::Shape;

/// Whether a reshape merges dimensions or splits them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Many dimensions to few.
    Collapse,
    /// Few dimensions to many.
    Expand,
}

impl Direction {
    /// The direction of a reshape from rank `source` to rank
    /// `result`. Equal ranks are not a reshape.
    pub fn from_ranks(source: usize, result: usize) -> Result<Self, ReshapeError> {
        match source.cmp(&result) {
            std::cmp::Ordering::Greater => Ok(Direction::Collapse),
            std::cmp::Ordering::Less => Ok(Direction::Expand),
            std::cmp::Ordering::Equal => Err(ReshapeError::rank_mismatch(
                "expected to collapse or expand dims",
            )),
        }
    }

    /// The common direction of a chain of two reshapes through ranks
    /// `source -> intermediate -> result`, if both move the same way.
    pub fn of_chain(source: usize, intermediate: usize, result: usize) -> Option<Self> {
        if source > intermediate && intermediate > result {
            Some(Direction::Collapse)
        } else if source < intermediate && intermediate < result {
            Some(Direction::Expand)
        } else {
            None
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Collapse => write!(f, "collapse"),
            Direction::Expand => write!(f, "expand"),
        }
    }
}

/// Everything needed to infer the result of one reshape.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct ReshapeDescriptor {
    pub direction: Direction,
    /// The shape being reshaped.
    pub source: Shape,
    /// The source layout; `None` is the identity (contiguous)
    /// layout.
    pub source_layout: Option<Layout>,
    /// Groups the dimensions of the expanded side: the source when
    /// collapsing, the result when expanding.
    pub reassociation: Reassociation,
    /// The declared result shape. Required when expanding; when
    /// collapsing it is cross-checked against the inferred shape.
    pub declared: Option<Shape>,
}

impl ReshapeDescriptor {
    /// A collapsing reshape of a contiguous `source`.
    pub fn collapse(source: Shape, reassociation: Reassociation) -> Self {
        Self {
            direction: Direction::Collapse,
            source,
            source_layout: None,
            reassociation,
            declared: None,
        }
    }

    /// An expanding reshape of a contiguous `source` into `declared`.
    pub fn expand(source: Shape, declared: Shape, reassociation: Reassociation) -> Self {
        Self {
            direction: Direction::Expand,
            source,
            source_layout: None,
            reassociation,
            declared: Some(declared),
        }
    }

    /// Use `layout` as the source layout.
    pub fn with_layout(self, layout: Layout) -> Self {
        Self {
            source_layout: Some(layout),
            ..self
        }
    }

    /// Declare the expected result shape.
    pub fn with_declared(self, declared: Shape) -> Self {
        Self {
            declared: Some(declared),
            ..self
        }
    }
}

/// How the runtime value of a result dimension is obtained.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimRule {
    /// The product of the source extents.
    Product,
    /// A declared static extent, used as is.
    Declared(usize),
    /// The source extent divided (floor) by the product of the static
    /// siblings in its group.
    Quotient { divisor: usize },
}

/// Where a result dimension comes from: a range of source dimensions
/// and the arithmetic that combines them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimProvenance {
    pub sources: Range<usize>,
    pub rule: DimRule,
}

/// The inferred result of a reshape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReshapeResult {
    pub shape: Shape,
    pub layout: ResultLayout,
    /// One entry per result dimension.
    pub provenance: Vec<DimProvenance>,
}

#[allow(dead_code)]
const _: () = {
    fn assert<T: Send + Sync + 'static>() {}
    let _ = assert::<ReshapeDescriptor>;
    let _ = assert::<ReshapeResult>;
};

/// Collapse `source` by `reassociation`: each result extent is the
/// product of its group, dynamic if any member is.
///
/// ```
/// use ndreshape::Reassociation;
/// use ndreshape::infer::collapse_shape;
/// use ndreshape::shape;
///
/// let r = Reassociation::from_group_sizes(&[2, 1]);
/// assert_eq!(collapse_shape(&shape![2, 3, 4], &r).unwrap(), shape![6, 4]);
/// assert_eq!(collapse_shape(&shape![2, ?, 4], &r).unwrap(), shape![?, 4]);
/// ```
pub fn collapse_shape(source: &Shape, reassociation: &Reassociation) -> Result<Shape, ReshapeError> {
    reassociation.validate_shape(source)?;
    Ok(reassociation
        .spans()
        .map(|span| source.band(span).iter().product())
        .collect())
}

/// Expand `source` into the `declared` shape by `reassociation`
/// (which groups the dimensions of `declared`).
///
/// Declared extents are ground truth; the result is `declared` once
/// it has been checked against `source` with [`verify_shapes`].
pub fn expand_shape(
    source: &Shape,
    declared: &Shape,
    reassociation: &Reassociation,
    opts: &ReshapeOpts,
) -> Result<Shape, ReshapeError> {
    verify_shapes(source, declared, reassociation, Direction::Expand, opts)?;
    Ok(declared.clone())
}

/// Check the rank structure of a reshape between `expanded` and a
/// collapsed side of rank `collapsed_rank`.
///
/// The expanded side must have nonzero rank strictly greater than the
/// collapsed side. A rank-0 collapsed side needs an empty
/// reassociation and an all-unit expanded shape; otherwise there must
/// be one valid group per collapsed dimension.
pub fn verify_ranks(
    expanded: &Shape,
    collapsed_rank: usize,
    reassociation: &Reassociation,
) -> Result<(), ReshapeError> {
    if expanded.rank() == 0 {
        return Err(ReshapeError::rank_mismatch("expected non-zero ranks"));
    }
    if expanded.rank() == collapsed_rank {
        return Err(ReshapeError::rank_mismatch(
            "expected to collapse or expand dims",
        ));
    }
    if expanded.rank() < collapsed_rank {
        return Err(ReshapeError::rank_mismatch(format!(
            "expected the expanded rank ({}) to exceed the collapsed rank ({})",
            expanded.rank(),
            collapsed_rank
        )));
    }
    if collapsed_rank != reassociation.collapsed_rank() {
        return Err(ReshapeError::rank_mismatch(format!(
            "expected rank of the collapsed shape ({}) to be the number of reassociation groups ({})",
            collapsed_rank,
            reassociation.collapsed_rank()
        )));
    }
    reassociation.validate_shape(expanded)
}

/// Verify that `collapsed` and `expanded` are related by
/// `reassociation`.
///
/// For each group `i`:
/// 1. if the expanded band is fully static, `collapsed[i]` must be
///    the static product of the band;
/// 2. if the band has a dynamic member, or its static product
///    overflows `usize`, `collapsed[i]` must be dynamic. With
///    [`ReshapeOpts::lenient`], a static `collapsed[i]` is accepted as
///    long as the band's static product divides it; a band with a
///    zero-size member only admits `0`.
///
/// When `direction` is [`Direction::Expand`], a band may have at most
/// one dynamic member.
pub fn verify_shapes(
    collapsed: &Shape,
    expanded: &Shape,
    reassociation: &Reassociation,
    direction: Direction,
    opts: &ReshapeOpts,
) -> Result<(), ReshapeError> {
    reassociation.validate_shape(expanded)?;
    if collapsed.rank() != reassociation.collapsed_rank() {
        return Err(ReshapeError::rank_mismatch(format!(
            "expected rank of the collapsed shape ({}) to be the number of reassociation groups ({})",
            collapsed.rank(),
            reassociation.collapsed_rank()
        )));
    }

    for (group, span) in reassociation.spans().enumerate() {
        let mut dynamic: Option<usize> = None;
        let mut linearized = Extent::Static(1);
        for (dim, &extent) in span.clone().zip(expanded.band(span.clone())) {
            match extent {
                Extent::Dynamic => {
                    if let (Direction::Expand, Some(first)) = (direction, dynamic) {
                        return Err(ReshapeError::AmbiguousDynamicSplit {
                            group,
                            first,
                            second: dim,
                        });
                    }
                    dynamic = Some(dim);
                }
                Extent::Static(n) => linearized = linearized * n,
            }
        }
        tracing::trace!(group, band = ?span, %linearized, dynamic = dynamic.is_some(), "checking group");

        // A static product too large for `usize` is as unknown as a
        // dynamic member.
        match (dynamic.is_some() || linearized.is_dynamic(), collapsed[group]) {
            (true, Extent::Dynamic) => {}
            (true, Extent::Static(_)) if opts.disallow_static_over_dynamic_band => {
                return Err(ReshapeError::ExpectedDynamic { dim: group });
            }
            (true, Extent::Static(n)) => {
                let divides = match linearized {
                    Extent::Static(0) => n == 0,
                    Extent::Static(l) => n % l == 0,
                    Extent::Dynamic => false,
                };
                if !divides {
                    return Err(ReshapeError::ShapeMismatch {
                        dim: group,
                        expected: Extent::Dynamic,
                        actual: Extent::Static(n),
                    });
                }
            }
            (false, actual) => {
                if !actual.provably_eq(linearized) {
                    return Err(ReshapeError::ShapeMismatch {
                        dim: group,
                        expected: linearized,
                        actual,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Compare a declared result shape with an inferred one. Static
/// extents must agree; a declared dynamic extent where a static one
/// was inferred is a mismatch; a declared static extent where a
/// dynamic one was inferred is only accepted in lenient mode. Returns
/// the declared shape.
fn check_declared(
    inferred: &Shape,
    declared: &Shape,
    opts: &ReshapeOpts,
) -> Result<Shape, ReshapeError> {
    if inferred.rank() != declared.rank() {
        return Err(ReshapeError::rank_mismatch(format!(
            "expected result rank {}, but got {}",
            inferred.rank(),
            declared.rank()
        )));
    }
    for (dim, (&expected, &actual)) in inferred.iter().zip(declared.iter()).enumerate() {
        match (expected, actual) {
            (Extent::Dynamic, Extent::Dynamic) => {}
            (Extent::Static(a), Extent::Static(b)) if a == b => {}
            (Extent::Dynamic, Extent::Static(_)) if !opts.disallow_static_over_dynamic_band => {}
            (Extent::Dynamic, Extent::Static(_)) => {
                return Err(ReshapeError::ExpectedDynamic { dim });
            }
            _ => {
                return Err(ReshapeError::ShapeMismatch {
                    dim,
                    expected,
                    actual,
                });
            }
        }
    }
    Ok(declared.clone())
}

/// Infer the result of the reshape described by `descriptor`.
///
/// Runs, in order: rank and reassociation validation, the shape
/// algebra of the reshape's direction, and the layout computation.
/// A declared result shape, if any, is checked against the inferred
/// one and then used as the result shape.
///
/// # Example
/// ```
/// use ndreshape::Reassociation;
/// use ndreshape::ReshapeDescriptor;
/// use ndreshape::ReshapeOpts;
/// use ndreshape::infer::infer;
/// use ndreshape::shape;
///
/// let d = ReshapeDescriptor::collapse(shape![?, 8], Reassociation::from_group_sizes(&[2]));
/// let r = infer(&d, &ReshapeOpts::strict()).unwrap();
/// assert_eq!(r.shape, shape![?]);
/// ```
pub fn infer(
    descriptor: &ReshapeDescriptor,
    opts: &ReshapeOpts,
) -> Result<ReshapeResult, ReshapeError> {
    let result = match descriptor.direction {
        Direction::Collapse => infer_collapse(descriptor, opts),
        Direction::Expand => infer_expand(descriptor, opts),
    };
    result.inspect_err(|error| {
        tracing::debug!(
            direction = %descriptor.direction,
            source = %descriptor.source,
            reassociation = %descriptor.reassociation,
            %error,
            "reshape rejected"
        )
    })
}

fn infer_collapse(
    descriptor: &ReshapeDescriptor,
    opts: &ReshapeOpts,
) -> Result<ReshapeResult, ReshapeError> {
    let ReshapeDescriptor {
        source,
        source_layout,
        reassociation,
        declared,
        ..
    } = descriptor;
    let collapsed_rank = declared
        .as_ref()
        .map_or(reassociation.collapsed_rank(), Shape::rank);
    verify_ranks(source, collapsed_rank, reassociation)?;

    let collapsed = collapse_layout(source, source_layout.as_ref(), reassociation)?;
    let shape = match declared {
        Some(declared) => {
            verify_shapes(declared, source, reassociation, Direction::Collapse, opts)?;
            check_declared(&collapsed.shape, declared, opts)?
        }
        None => collapsed.shape,
    };
    let provenance = reassociation
        .spans()
        .map(|sources| DimProvenance {
            sources,
            rule: DimRule::Product,
        })
        .collect();

    Ok(ReshapeResult {
        shape,
        layout: collapsed.layout,
        provenance,
    })
}

fn infer_expand(
    descriptor: &ReshapeDescriptor,
    opts: &ReshapeOpts,
) -> Result<ReshapeResult, ReshapeError> {
    let ReshapeDescriptor {
        source,
        source_layout,
        reassociation,
        declared,
        ..
    } = descriptor;
    let declared = declared.as_ref().ok_or_else(|| {
        ReshapeError::rank_mismatch("an expanding reshape needs a declared result shape")
    })?;
    verify_ranks(declared, source.rank(), reassociation)?;
    let shape = expand_shape(source, declared, reassociation, opts)?;
    let layout = expand_layout(source, source_layout.as_ref(), &shape, reassociation)?;

    let mut provenance = Vec::with_capacity(shape.rank());
    for (group, span) in reassociation.spans().enumerate() {
        let band = shape.band(span);
        // Saturating: a divisor beyond `usize` floors every runtime
        // size to zero, as does `usize::MAX`.
        let divisor = band
            .iter()
            .filter_map(|e| e.get())
            .fold(1, usize::saturating_mul);
        provenance.extend(band.iter().map(|extent| DimProvenance {
            sources: group..group + 1,
            rule: match extent {
                Extent::Static(n) => DimRule::Declared(*n),
                // At most one dynamic member per group, so the static
                // product of the band is the product of its siblings.
                Extent::Dynamic => DimRule::Quotient { divisor },
            },
        }));
    }

    Ok(ReshapeResult {
        shape,
        layout,
        provenance,
    })
}

/// Infer the result of `descriptor` and check it against a declared
/// result layout. The declared shape, if any, is carried by the
/// descriptor. A declared strided layout that is contiguous is
/// treated as [`ResultLayout::Identity`].
pub fn verify(
    descriptor: &ReshapeDescriptor,
    declared_layout: &ResultLayout,
    opts: &ReshapeOpts,
) -> Result<ReshapeResult, ReshapeError> {
    let result = infer(descriptor, opts)?;
    let declared_layout = match declared_layout {
        ResultLayout::Strided(layout) => ResultLayout::canonical(layout.clone(), &result.shape),
        other => other.clone(),
    };
    if declared_layout != result.layout {
        tracing::debug!(
            expected = ?result.layout,
            actual = ?declared_layout,
            "declared layout rejected"
        );
        return Err(ReshapeError::LayoutMismatch {
            expected: result.layout,
            actual: declared_layout,
        });
    }
    Ok(result)
}
