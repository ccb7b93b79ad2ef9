// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transferable resource handles.

use alloc::vec::Vec;
use core::fmt;

use kurbo::Size;

/// An opaque handle to pixel data (a texture or a shared-memory bitmap).
///
/// Ids are chosen by whoever owns the namespace they live in: a producer for
/// ids inside its frames, the resource provider for the parent ids it hands
/// to the renderer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ResourceId(pub u32);

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

/// A resource a producer lends to the compositor with a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferableResource {
    /// Producer-side id.
    pub id: ResourceId,
    /// Pixel size of the backing store.
    pub size: Size,
    /// Whether the backing store is a shared-memory bitmap rather than a
    /// texture.
    pub is_software: bool,
}

impl TransferableResource {
    /// Creates a texture-backed resource description.
    #[must_use]
    pub const fn new(id: ResourceId, size: Size) -> Self {
        Self {
            id,
            size,
            is_software: false,
        }
    }

    /// Returns a single reference to this resource, as the consumer hands it
    /// back.
    #[must_use]
    pub const fn to_returned(&self) -> ReturnedResource {
        ReturnedResource {
            id: self.id,
            count: 1,
            lost: false,
        }
    }

    /// Converts a resource list into one returned reference per entry.
    #[must_use]
    pub fn return_resources(resources: &[Self]) -> Vec<ReturnedResource> {
        resources.iter().map(Self::to_returned).collect()
    }
}

/// References to a resource that the consumer gives back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReturnedResource {
    /// Id in the namespace of whoever receives the return.
    pub id: ResourceId,
    /// How many references are returned at once.
    pub count: u32,
    /// Whether the backing store was lost and must not be reused.
    pub lost: bool,
}

impl ReturnedResource {
    /// Creates a return of `count` references.
    #[must_use]
    pub const fn new(id: ResourceId, count: u32) -> Self {
        Self {
            id,
            count,
            lost: false,
        }
    }
}
