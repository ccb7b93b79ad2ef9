// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface identity and destruction-dependency tokens.

use core::fmt;

/// Identifies one surface for its whole lifetime.
///
/// A namespace and a namespace-local id packed into one 64-bit value, with the
/// namespace in the high half. Ordering and equality follow the packed value.
/// The all-zero id is the null id and never names a surface.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SurfaceId(pub u64);

impl SurfaceId {
    /// The null surface id.
    pub const NULL: Self = Self(0);

    /// Packs a namespace and a local id.
    #[inline]
    #[must_use]
    pub const fn new(namespace: u32, local_id: u32) -> Self {
        Self(((namespace as u64) << 32) | local_id as u64)
    }

    /// Returns the id namespace (the high 32 bits).
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "the shifted value fits in 32 bits"
    )]
    pub const fn namespace(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the namespace-local id (the low 32 bits).
    #[inline]
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "keeps the low half")]
    pub const fn local_id(self) -> u32 {
        self.0 as u32
    }

    /// Returns `true` for [`SurfaceId::NULL`].
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceId({}:{})", self.namespace(), self.local_id())
    }
}

/// A destruction-dependency token.
///
/// A surface carrying a dependency on a sequence is kept alive until some
/// frame from the sequence's namespace reports it in
/// [`CompositorFrameMetadata::satisfies_sequences`], or until that namespace
/// is invalidated.
///
/// [`CompositorFrameMetadata::satisfies_sequences`]: crate::frame::CompositorFrameMetadata::satisfies_sequences
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SurfaceSequence {
    /// Namespace of the client that will satisfy the token.
    pub namespace: u32,
    /// Client-chosen sequence number.
    pub sequence: u32,
}

impl SurfaceSequence {
    /// Creates a token.
    #[inline]
    #[must_use]
    pub const fn new(namespace: u32, sequence: u32) -> Self {
        Self {
            namespace,
            sequence,
        }
    }
}

impl fmt::Debug for SurfaceSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SurfaceSequence({}:{})", self.namespace, self.sequence)
    }
}

/// Hands out never-reused [`SurfaceId`]s within one namespace.
#[derive(Debug)]
pub struct SurfaceIdAllocator {
    namespace: u32,
    next_id: u32,
}

impl SurfaceIdAllocator {
    /// Creates an allocator for `namespace`.
    ///
    /// Register the namespace with
    /// [`SurfaceManager::register_surface_id_namespace`](super::SurfaceManager::register_surface_id_namespace)
    /// so dependencies on it are honored.
    #[must_use]
    pub const fn new(namespace: u32) -> Self {
        Self {
            namespace,
            next_id: 1,
        }
    }

    /// Returns the namespace this allocator serves.
    #[inline]
    #[must_use]
    pub const fn namespace(&self) -> u32 {
        self.namespace
    }

    /// Returns a fresh id.
    ///
    /// # Panics
    ///
    /// Panics if the namespace's local ids are exhausted.
    pub fn generate_id(&mut self) -> SurfaceId {
        let id = SurfaceId::new(self.namespace, self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .unwrap_or_else(|| panic!("surface ids exhausted in namespace {}", self.namespace));
        id
    }
}
