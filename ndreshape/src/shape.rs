/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;
use std::ops::Index;
use std::ops::Range;

use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

use crate::extent::Extent;

/// An ordered list of [`Extent`]s, one per dimension. The rank of a
/// shape is its length.
///
/// Shapes can also be constructed by way of the [`shape`] macro,
/// which accepts `?` for dynamic dimensions.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct Shape {
    extents: Vec<Extent>,
}

impl Shape {
    /// Creates a new shape from the provided extents.
    pub fn new(extents: Vec<Extent>) -> Self {
        Self { extents }
    }

    /// Creates a fully static shape.
    pub fn new_static(sizes: impl Into<Vec<usize>>) -> Self {
        Self {
            extents: sizes.into().into_iter().map(Extent::Static).collect(),
        }
    }

    /// The 0-dimensional shape.
    pub fn scalar() -> Self {
        Self::default()
    }

    /// The number of dimensions.
    pub fn rank(&self) -> usize {
        self.extents.len()
    }

    /// The extents of this shape.
    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    /// The extents of dimensions `band`.
    pub fn band(&self, band: Range<usize>) -> &[Extent] {
        &self.extents[band]
    }

    /// Whether every dimension is statically known.
    pub fn is_static(&self) -> bool {
        self.extents.iter().all(|e| e.is_static())
    }

    /// Whether every dimension is the static value `1`. Trivially
    /// true for the 0-dimensional shape.
    pub fn is_all_units(&self) -> bool {
        self.extents.iter().all(|e| e.is_unit())
    }

    /// The total number of elements, dynamic if any dimension is.
    pub fn num_elements(&self) -> Extent {
        self.extents.iter().product()
    }

    /// The static sizes, if the shape is fully static.
    pub fn static_sizes(&self) -> Option<Vec<usize>> {
        self.extents.iter().map(|e| e.get()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Extent> {
        self.extents.iter()
    }

    /// Deconstruct the shape into its extents.
    pub fn into_inner(self) -> Vec<Extent> {
        self.extents
    }
}

impl Index<usize> for Shape {
    type Output = Extent;

    fn index(&self, dim: usize) -> &Extent {
        &self.extents[dim]
    }
}

impl FromIterator<Extent> for Shape {
    fn from_iter<I: IntoIterator<Item = Extent>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl From<Vec<Extent>> for Shape {
    fn from(extents: Vec<Extent>) -> Self {
        Self::new(extents)
    }
}

impl<'a> IntoIterator for &'a Shape {
    type Item = &'a Extent;
    type IntoIter = std::slice::Iter<'a, Extent>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.extents.iter().join(", "))
    }
}

/// Construct a [`Shape`] from a list of extents, where `?` denotes a
/// dynamic dimension.
///
/// ```
/// use ndreshape::Extent;
///
/// let s = ndreshape::shape![2, ?, 4];
/// assert_eq!(s.rank(), 3);
/// assert_eq!(s[1], Extent::Dynamic);
/// assert_eq!(s.to_string(), "[2, ?, 4]");
/// ```
#[macro_export]
macro_rules! shape {
    (@extent ?) => {
        $crate::Extent::Dynamic
    };
    (@extent $size:expr) => {
        $crate::Extent::Static($size)
    };
    ( $( $size:tt ),* $(,)? ) => {
        $crate::shape::Shape::new(vec![ $( $crate::shape!(@extent $size) ),* ])
    };
}
