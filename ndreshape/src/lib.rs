/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Reshape type inference and stride compatibility for
//! multidimensional views.
//!
//! A reshape regroups the dimensions of a view without moving data:
//! it either *collapses* runs of adjacent dimensions into one, or
//! *expands* dimensions into runs. Which dimensions form a run is
//! described by a [`Reassociation`].
//!
//! This crate answers, for a reshape over possibly dynamic shapes
//! and possibly strided layouts:
//!
//! - what the result [`Shape`] is, and which of its extents are still
//!   known statically ([`infer`]);
//! - whether the result can be described by a strided [`Layout`] at
//!   all ([`layout`]);
//! - whether two chained reshapes fuse into one ([`fusion`]);
//! - what arithmetic computes the runtime sizes of the result
//!   ([`reify`]).
//!
//! All functions are pure and operate on plain values; hosts bring
//! already-parsed shapes and reassociations and translate
//! [`ReshapeError`]s into their own diagnostics.

/// Static-or-dynamic sizes, strides and offsets.
pub mod extent;

/// Ordered lists of extents.
pub mod shape;

pub mod reassociation;

pub mod layout;

/// Result shapes, verification and provenance of reshapes.
pub mod infer;

pub mod fusion;

pub mod reify;

mod error;
mod opts;

pub use error::ReshapeError;
pub use extent::Extent;
pub use fusion::Fold;
pub use fusion::Fusion;
pub use fusion::Reshape;
pub use infer::Direction;
pub use infer::ReshapeDescriptor;
pub use infer::ReshapeResult;
pub use layout::Layout;
pub use layout::ResultLayout;
pub use opts::ReshapeOpts;
pub use reassociation::Reassociation;
pub use shape::Shape;

/// Property-based generators for randomized test input.
#[cfg(test)]
pub mod strategy;
