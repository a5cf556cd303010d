/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Runtime sizes of reshape results.
//!
//! [`reify`] turns an inferred [`ReshapeResult`] into one
//! [`SizeExpr`] per result dimension: the arithmetic a host must emit
//! to compute that dimension's size at runtime. Dynamic source
//! dimensions appear as opaque handles supplied by the host through
//! [`SourceDims`]; everything static is folded away.
//!
//! - A collapsed dimension is the left-to-right product of its band.
//! - An expanded dimension is its declared extent if static, and
//!   otherwise the collapsed size divided (floor) by the product of
//!   its static siblings.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ReshapeError;
use crate::extent::Extent;
use crate::infer::DimRule;
use crate::infer::ReshapeResult;
use crate::shape::Shape;

/// Host access to the runtime sizes of source dimensions.
pub trait SourceDims {
    /// A handle for a runtime size (a value in the host's IR, say).
    type Value;

    /// The handle for the runtime size of source dimension `k`. Only
    /// called for dynamic dimensions.
    fn dim(&self, k: usize) -> Self::Value;
}

impl<V, F> SourceDims for F
where
    F: Fn(usize) -> V,
{
    type Value = V;

    fn dim(&self, k: usize) -> V {
        self(k)
    }
}

/// A size expression over runtime handles of type `V`.
///
/// Build expressions with [`SizeExpr::mul`] and
/// [`SizeExpr::floor_div`], which fold constants as they go.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeExpr<V> {
    Const(usize),
    Dim(V),
    Mul(Box<SizeExpr<V>>, Box<SizeExpr<V>>),
    FloorDiv(Box<SizeExpr<V>>, usize),
}

impl<V> SizeExpr<V> {
    /// `self * rhs`. Constant products that overflow `usize` are
    /// left unfolded.
    pub fn mul(self, rhs: SizeExpr<V>) -> Self {
        match (self, rhs) {
            (SizeExpr::Const(a), SizeExpr::Const(b)) if a.checked_mul(b).is_some() => {
                SizeExpr::Const(a * b)
            }
            (SizeExpr::Const(1), other) | (other, SizeExpr::Const(1)) => other,
            (lhs, rhs) => SizeExpr::Mul(Box::new(lhs), Box::new(rhs)),
        }
    }

    /// `self floordiv divisor`. Division by zero yields zero.
    pub fn floor_div(self, divisor: usize) -> Self {
        match self {
            SizeExpr::Const(n) => SizeExpr::Const(n.checked_div(divisor).unwrap_or(0)),
            expr if divisor == 1 => expr,
            expr => SizeExpr::FloorDiv(Box::new(expr), divisor),
        }
    }

    /// The value of the expression, if it folded to a constant.
    pub fn as_const(&self) -> Option<usize> {
        match self {
            SizeExpr::Const(n) => Some(*n),
            _ => None,
        }
    }

    /// Evaluate the expression, reading handles with `value`. Returns
    /// `None` if an intermediate product overflows `usize`.
    pub fn evaluate<F>(&self, value: F) -> Option<usize>
    where
        F: Fn(&V) -> usize,
    {
        self.evaluate_with(&value)
    }

    fn evaluate_with<F>(&self, value: &F) -> Option<usize>
    where
        F: Fn(&V) -> usize,
    {
        match self {
            SizeExpr::Const(n) => Some(*n),
            SizeExpr::Dim(v) => Some(value(v)),
            SizeExpr::Mul(lhs, rhs) => lhs
                .evaluate_with(value)?
                .checked_mul(rhs.evaluate_with(value)?),
            SizeExpr::FloorDiv(expr, divisor) => {
                Some(expr.evaluate_with(value)?.checked_div(*divisor).unwrap_or(0))
            }
        }
    }
}

impl<V: fmt::Display> fmt::Display for SizeExpr<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeExpr::Const(n) => write!(f, "{}", n),
            SizeExpr::Dim(v) => write!(f, "{}", v),
            SizeExpr::Mul(lhs, rhs) => write!(f, "{} * {}", lhs, rhs),
            SizeExpr::FloorDiv(expr, divisor) => write!(f, "({}) floordiv {}", expr, divisor),
        }
    }
}

fn source_expr<D: SourceDims>(source: &Shape, k: usize, dims: &D) -> SizeExpr<D::Value> {
    match source[k] {
        Extent::Static(n) => SizeExpr::Const(n),
        Extent::Dynamic => SizeExpr::Dim(dims.dim(k)),
    }
}

/// Compute the runtime size of every dimension of `result`, a reshape
/// of `source`, from the provenance recorded by inference.
///
/// # Example
/// ```
/// use ndreshape::Reassociation;
/// use ndreshape::ReshapeDescriptor;
/// use ndreshape::ReshapeOpts;
/// use ndreshape::infer::infer;
/// use ndreshape::reify::reify;
/// use ndreshape::shape;
///
/// let source = shape![?, 8];
/// let d = ReshapeDescriptor::collapse(source.clone(), Reassociation::from_group_sizes(&[2]));
/// let result = infer(&d, &ReshapeOpts::default()).unwrap();
///
/// let sizes = reify(&source, &result, &|k: usize| k).unwrap();
/// assert_eq!(sizes[0].to_string(), "0 * 8");
/// assert_eq!(sizes[0].evaluate(|_| 5), Some(40));
/// ```
pub fn reify<D: SourceDims>(
    source: &Shape,
    result: &ReshapeResult,
    dims: &D,
) -> Result<Vec<SizeExpr<D::Value>>, ReshapeError> {
    result
        .provenance
        .iter()
        .map(|provenance| {
            if provenance.sources.end > source.rank() {
                return Err(ReshapeError::rank_mismatch(format!(
                    "result refers to source dimensions {:?}, but the source has rank {}",
                    provenance.sources,
                    source.rank()
                )));
            }
            let band = || {
                provenance
                    .sources
                    .clone()
                    .map(|k| source_expr(source, k, dims))
                    .fold(SizeExpr::Const(1), SizeExpr::mul)
            };
            Ok(match provenance.rule {
                DimRule::Product => band(),
                DimRule::Declared(n) => SizeExpr::Const(n),
                DimRule::Quotient { divisor } => band().floor_div(divisor),
            })
        })
        .collect()
}
