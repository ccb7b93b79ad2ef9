// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Damage-rect algebra over [`kurbo`] rectangles and affine transforms.
//!
//! Damage rects follow pixel conventions: a rect with zero width or height is
//! empty and contributes nothing to a union, and rects mapped between
//! coordinate spaces are rounded outward to whole pixels so damage is never
//! under-reported.

use kurbo::{Affine, Rect};

/// Unions two damage rects, ignoring empty ones.
///
/// Unlike [`Rect::union`], an empty operand does not stretch the result
/// towards its position.
#[must_use]
pub fn union_damage(a: Rect, b: Rect) -> Rect {
    if a.is_zero_area() {
        b
    } else if b.is_zero_area() {
        a
    } else {
        a.union(b)
    }
}

/// Returns `true` if the two rects overlap with a non-empty intersection.
#[must_use]
pub fn intersects(a: Rect, b: Rect) -> bool {
    !a.is_zero_area() && !b.is_zero_area() && !a.intersect(b).is_zero_area()
}

/// Maps `rect` through `transform` and returns the smallest pixel-aligned rect
/// enclosing the result.
///
/// Empty rects stay empty.
#[must_use]
pub fn map_enclosing_rect(transform: Affine, rect: Rect) -> Rect {
    if rect.is_zero_area() {
        return Rect::ZERO;
    }
    transform.transform_rect_bbox(rect).expand()
}

/// Maps `rect` backwards through `transform`, from its target space into its
/// source space.
///
/// Returns `None` if `transform` is not invertible.
#[must_use]
pub fn project_enclosing_rect(transform: Affine, rect: Rect) -> Option<Rect> {
    invert(transform).map(|inverse| map_enclosing_rect(inverse, rect))
}

/// Returns the inverse of `transform` if it has one.
#[must_use]
pub fn invert(transform: Affine) -> Option<Affine> {
    let det = transform.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inverse = transform.inverse();
    inverse.is_finite().then_some(inverse)
}
