/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Static-or-dynamic integers.
//!
//! An [`Extent`] is either a known non-negative integer or the
//! sentinel [`Extent::Dynamic`], meaning the value is only known at
//! runtime. Sizes, strides and offsets all use this vocabulary.
//!
//! Arithmetic is absorbing: a product with a dynamic factor is
//! dynamic. So is a product that overflows `usize`, since no static
//! value describes it. Equality between extents is structural (`Dynamic ==
//! Dynamic`), which is what type comparison wants; when two values
//! must be *proven* equal at compile time, use
//! [`Extent::provably_eq`], which never holds for dynamic values.

use std::fmt;
use std::iter::Product;
use std::ops::Mul;

use enum_as_inner::EnumAsInner;
use serde::Deserialize;
use serde::Serialize;

/// A dimension size, stride or offset that is either statically
/// known or dynamic.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumAsInner
)]
pub enum Extent {
    /// A value known when the reshape is analyzed.
    Static(usize),
    /// A value known only at runtime.
    Dynamic,
}

/// Strides use the same static-or-dynamic vocabulary as sizes.
pub type Stride = Extent;

/// Offsets use the same static-or-dynamic vocabulary as sizes.
pub type Offset = Extent;

impl Extent {
    /// The static value, if any.
    pub fn get(self) -> Option<usize> {
        match self {
            Extent::Static(n) => Some(n),
            Extent::Dynamic => None,
        }
    }

    /// True only if both values are static and equal. Two dynamic
    /// values carry no relation to each other, so nothing about them
    /// can be proven.
    pub fn provably_eq(self, other: Extent) -> bool {
        matches!((self, other), (Extent::Static(a), Extent::Static(b)) if a == b)
    }

    /// Whether this is the static value `1`.
    pub fn is_unit(self) -> bool {
        self == Extent::Static(1)
    }
}

impl From<usize> for Extent {
    fn from(n: usize) -> Self {
        Extent::Static(n)
    }
}

impl From<Option<usize>> for Extent {
    fn from(n: Option<usize>) -> Self {
        n.map_or(Extent::Dynamic, Extent::Static)
    }
}

impl Mul for Extent {
    type Output = Extent;

    fn mul(self, rhs: Extent) -> Extent {
        match (self, rhs) {
            (Extent::Static(a), Extent::Static(b)) => a.checked_mul(b).into(),
            _ => Extent::Dynamic,
        }
    }
}

impl Mul<usize> for Extent {
    type Output = Extent;

    fn mul(self, rhs: usize) -> Extent {
        self * Extent::Static(rhs)
    }
}

impl Product for Extent {
    fn product<I: Iterator<Item = Extent>>(iter: I) -> Extent {
        iter.fold(Extent::Static(1), Mul::mul)
    }
}

impl<'a> Product<&'a Extent> for Extent {
    fn product<I: Iterator<Item = &'a Extent>>(iter: I) -> Extent {
        iter.copied().product()
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extent::Static(n) => write!(f, "{}", n),
            Extent::Dynamic => write!(f, "?"),
        }
    }
}
