/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Strided layouts and their compatibility with reshapes.
//!
//! A [`Layout`] maps a coordinate `x ∈ ℕⁿ` to a linear memory
//! position through an affine map:
//!
//! ```text
//! offset_of(x) = offset + dot(strides, x)
//! ```
//!
//! where the offset and each stride are [`Extent`]s, possibly
//! dynamic.
//!
//! Collapsing a band of dimensions `[lo, hi]` into one is a zero-copy
//! reinterpretation only if the band is *mergeable*: each outer
//! dimension's stride is the next inner stride times the next inner
//! size,
//!
//! ```text
//! ∀ i = lo .. hi−1:
//!     stride[i] == stride[i+1] * size[i+1]
//! ```
//!
//! and the merged dimension then steps with the innermost stride,
//! `stride[hi]`. When this cannot be proven, no single stride
//! describes the merged dimension and the result layout is
//! [`ResultLayout::Unrepresentable`].
//!
//! Expanding is always representable: a dimension with stride `s`
//! split into sizes `[a, b]` has strides `[s * b, s]`.

use serde::Deserialize;
use serde::Serialize;

use crate::error::ReshapeError;
use crate::extent::Extent;
use crate::extent::Offset;
use crate::extent::Stride;
use crate::infer::collapse_shape;
use crate::reassociation::Reassociation;
use crate::shape::Shape;

/// A strided layout: a base offset plus one stride per dimension,
/// aligned positionally with a [`Shape`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct Layout {
    offset: Offset,
    strides: Vec<Stride>,
}

impl Layout {
    /// Create a new layout with the provided offset and strides.
    pub fn new(offset: Offset, strides: Vec<Stride>) -> Self {
        Self { offset, strides }
    }

    /// Create a fully static layout.
    pub fn new_static(offset: usize, strides: impl Into<Vec<usize>>) -> Self {
        Self {
            offset: Extent::Static(offset),
            strides: strides.into().into_iter().map(Extent::Static).collect(),
        }
    }

    /// The canonical dense row-major layout of `shape`: zero offset,
    /// each stride the product of the trailing sizes. A stride
    /// outside a dynamic dimension is dynamic.
    pub fn contiguous(shape: &Shape) -> Self {
        let mut strides = vec![Extent::Static(1); shape.rank()];
        for i in (0..shape.rank().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        Self {
            offset: Extent::Static(0),
            strides,
        }
    }

    /// The number of dimensions.
    pub fn rank(&self) -> usize {
        self.strides.len()
    }

    /// The base offset.
    pub fn offset(&self) -> Offset {
        self.offset
    }

    /// The strides, one per dimension.
    pub fn strides(&self) -> &[Stride] {
        &self.strides
    }

    /// Whether this is provably the canonical row-major layout of
    /// `shape`, with a static zero offset. Only such layouts are
    /// representable without an explicit stride annotation.
    pub fn is_contiguous(&self, shape: &Shape) -> bool {
        if self.rank() != shape.rank() || !self.offset.provably_eq(Extent::Static(0)) {
            return false;
        }
        let mut expected = Extent::Static(1);
        for (stride, size) in self.strides.iter().zip(shape.iter()).rev() {
            if !stride.provably_eq(expected) {
                return false;
            }
            expected = expected * *size;
        }
        true
    }

    /// Maps a coordinate to its linear position. The result is
    /// dynamic if the offset or any stride with a nonzero coordinate
    /// is dynamic, or if the position overflows `usize`.
    pub fn offset_of(&self, coord: &[usize]) -> Result<Extent, ReshapeError> {
        if coord.len() != self.rank() {
            return Err(ReshapeError::rank_mismatch(format!(
                "coordinate has {} dimensions, layout has {}",
                coord.len(),
                self.rank()
            )));
        }
        // offset + ∑ᵢ (strideᵢ × coordᵢ)
        Ok(self
            .strides
            .iter()
            .zip(coord)
            .filter(|&(_, &i)| i != 0)
            .fold(self.offset, |acc, (&stride, &i)| {
                match (acc, stride * i) {
                    (Extent::Static(a), Extent::Static(b)) => a.checked_add(b).into(),
                    _ => Extent::Dynamic,
                }
            }))
    }

    fn check_rank(&self, shape: &Shape) -> Result<(), ReshapeError> {
        if self.rank() != shape.rank() {
            return Err(ReshapeError::rank_mismatch(format!(
                "layout has {} strides for a shape of rank {}",
                self.rank(),
                shape.rank()
            )));
        }
        Ok(())
    }
}

/// The layout of a reshape result.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub enum ResultLayout {
    /// The canonical contiguous layout of the result shape; needs no
    /// explicit annotation.
    Identity,
    /// An explicit strided layout.
    Strided(Layout),
    /// No strided layout describes the result: the reshape cannot be
    /// a zero-copy reinterpretation and callers must treat the result
    /// as an opaque view.
    Unrepresentable,
}

impl ResultLayout {
    /// Whether the result can be described by a strided layout.
    pub fn is_representable(&self) -> bool {
        !matches!(self, ResultLayout::Unrepresentable)
    }

    /// The explicit layout of a result of shape `shape`, if
    /// representable.
    pub fn to_layout(&self, shape: &Shape) -> Option<Layout> {
        match self {
            ResultLayout::Identity => Some(Layout::contiguous(shape)),
            ResultLayout::Strided(layout) => Some(layout.clone()),
            ResultLayout::Unrepresentable => None,
        }
    }

    /// Canonicalize `layout` at `shape`: a contiguous layout becomes
    /// [`ResultLayout::Identity`].
    pub(crate) fn canonical(layout: Layout, shape: &Shape) -> Self {
        if layout.is_contiguous(shape) {
            ResultLayout::Identity
        } else {
            ResultLayout::Strided(layout)
        }
    }
}

/// The shape and layout obtained by collapsing a strided view.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct CollapsedLayout {
    pub shape: Shape,
    pub layout: ResultLayout,
}

/// Detect whether dimensions `[dim, dim + extent)` can be merged
/// without copies.
///
/// Only bands whose inner sizes are static are mergeable: a dynamic
/// size carries no relation to any stride, so the nesting condition
/// cannot be proven. A band reaching past the shape or the layout is
/// not mergeable.
pub fn is_mergeable_band(dim: usize, extent: usize, shape: &Shape, layout: &Layout) -> bool {
    let band = dim..dim.saturating_add(extent);
    let (Some(sizes), Some(strides)) = (
        shape.extents().get(band.clone()),
        layout.strides().get(band),
    ) else {
        return false;
    };
    sizes
        .iter()
        .zip(strides)
        .zip(sizes.iter().zip(strides).skip(1))
        .all(|((_, &outer), (&size, &inner))| {
            size.is_static() && outer.provably_eq(inner * size)
        })
}

/// Collapse a strided view by `reassociation`.
///
/// If `layout` is `None` (the identity layout) or provably
/// contiguous, the result is always contiguous and the stride path is
/// skipped. Otherwise each group is checked with
/// [`is_mergeable_band`]: a mergeable group gets the product of its
/// sizes and its innermost stride, a non-mergeable one a dynamic size
/// and an unrepresentable layout. The offset is carried over as is.
///
/// # Example
/// ```
/// use ndreshape::Layout;
/// use ndreshape::Reassociation;
/// use ndreshape::ResultLayout;
/// use ndreshape::layout::collapse_layout;
/// use ndreshape::shape;
///
/// let r = Reassociation::from_group_sizes(&[2, 1]);
///
/// // Row-major strides nest: collapses to [6, 4] without copies.
/// let row_major = Layout::new_static(0, [12, 4, 1]);
/// let c = collapse_layout(&shape![2, 3, 4], Some(&row_major), &r).unwrap();
/// assert_eq!(c.shape, shape![6, 4]);
/// assert_eq!(c.layout, ResultLayout::Identity);
///
/// // Column-major strides don't.
/// let col_major = Layout::new_static(0, [1, 2, 6]);
/// let c = collapse_layout(&shape![2, 3, 4], Some(&col_major), &r).unwrap();
/// assert_eq!(c.layout, ResultLayout::Unrepresentable);
/// ```
pub fn collapse_layout(
    shape: &Shape,
    layout: Option<&Layout>,
    reassociation: &Reassociation,
) -> Result<CollapsedLayout, ReshapeError> {
    reassociation.validate_shape(shape)?;
    let layout = match layout {
        Some(layout) => {
            layout.check_rank(shape)?;
            layout
        }
        None => {
            return Ok(CollapsedLayout {
                shape: collapse_shape(shape, reassociation)?,
                layout: ResultLayout::Identity,
            });
        }
    };
    // Early exit: a contiguous source always collapses to a
    // contiguous result.
    if layout.is_contiguous(shape) {
        return Ok(CollapsedLayout {
            shape: collapse_shape(shape, reassociation)?,
            layout: ResultLayout::Identity,
        });
    }

    let mut sizes = Vec::with_capacity(reassociation.collapsed_rank());
    let mut strides = Vec::with_capacity(reassociation.collapsed_rank());
    let mut representable = true;
    for (group, span) in reassociation.spans().enumerate() {
        if is_mergeable_band(span.start, span.len(), shape, layout) {
            sizes.push(shape.band(span.clone()).iter().product());
            strides.push(layout.strides()[span.end - 1]);
        } else {
            tracing::debug!(
                group,
                band = ?span,
                sizes = %Shape::new(shape.band(span.clone()).to_vec()),
                strides = ?&layout.strides()[span.clone()],
                "band is not mergeable without copies"
            );
            representable = false;
            sizes.push(Extent::Dynamic);
            strides.push(Extent::Dynamic);
        }
    }

    let shape = Shape::new(sizes);
    let layout = if representable {
        ResultLayout::canonical(Layout::new(layout.offset(), strides), &shape)
    } else {
        ResultLayout::Unrepresentable
    };
    Ok(CollapsedLayout { shape, layout })
}

/// Expand a strided view of shape `source` into `expanded` by
/// `reassociation` (which groups the dimensions of `expanded`).
///
/// Within each group the innermost dimension inherits the source
/// stride, and each outer dimension steps over the inner ones:
/// `stride[k] = stride[k + 1] * size[k + 1]`. A dynamic inner size
/// makes the outer strides dynamic. Contiguous sources stay
/// contiguous.
///
/// ```
/// use ndreshape::Layout;
/// use ndreshape::Reassociation;
/// use ndreshape::ResultLayout;
/// use ndreshape::layout::expand_layout;
/// use ndreshape::shape;
///
/// // Every other element of a [24] buffer, viewed as [3, 4].
/// let source = Layout::new_static(5, [2]);
/// let r = Reassociation::from_group_sizes(&[2]);
/// let expanded = expand_layout(&shape![12], Some(&source), &shape![3, 4], &r).unwrap();
/// assert_eq!(expanded, ResultLayout::Strided(Layout::new_static(5, [8, 2])));
/// ```
pub fn expand_layout(
    source: &Shape,
    layout: Option<&Layout>,
    expanded: &Shape,
    reassociation: &Reassociation,
) -> Result<ResultLayout, ReshapeError> {
    reassociation.validate_shape(expanded)?;
    if reassociation.collapsed_rank() != source.rank() {
        return Err(ReshapeError::rank_mismatch(format!(
            "expected rank of the collapsed shape ({}) to be the number of reassociation groups ({})",
            source.rank(),
            reassociation.collapsed_rank()
        )));
    }
    let layout = match layout {
        Some(layout) => {
            layout.check_rank(source)?;
            layout
        }
        None => return Ok(ResultLayout::Identity),
    };
    if layout.is_contiguous(source) {
        return Ok(ResultLayout::Identity);
    }

    let mut strides = Vec::with_capacity(expanded.rank());
    for (span, &source_stride) in reassociation.spans().zip(layout.strides()) {
        let mut sub_strides = Vec::with_capacity(span.len());
        let mut stride = source_stride;
        for &size in expanded.band(span).iter().rev() {
            sub_strides.push(stride);
            stride = stride * size;
        }
        sub_strides.reverse();
        strides.extend(sub_strides);
    }

    Ok(ResultLayout::canonical(
        Layout::new(layout.offset(), strides),
        expanded,
    ))
}

/// Whether `layout` over `shape` and `other` over `other_shape`
/// place every flat row-major index at the same position. Both
/// shapes must be static.
#[cfg(test)]
pub(crate) fn same_positions(
    shape: &Shape,
    layout: &Layout,
    other_shape: &Shape,
    other: &Layout,
) -> bool {
    let (Some(sizes), Some(other_sizes)) = (shape.static_sizes(), other_shape.static_sizes())
    else {
        return false;
    };
    let delinearize = |mut index: usize, sizes: &[usize]| {
        let mut coord = vec![0; sizes.len()];
        for (c, &n) in coord.iter_mut().zip(sizes).rev() {
            *c = index % n;
            index /= n;
        }
        coord
    };
    let total: usize = sizes.iter().product();
    total == other_sizes.iter().product::<usize>()
        && (0..total).all(|i| {
            layout.offset_of(&delinearize(i, &sizes)).ok()
                == other.offset_of(&delinearize(i, &other_sizes)).ok()
        })
}
