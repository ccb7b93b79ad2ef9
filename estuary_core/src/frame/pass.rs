// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render passes.

use alloc::vec::Vec;
use core::fmt;

use kurbo::{Affine, Rect};

use crate::surface::SurfaceId;

use super::copy::CopyOutputRequest;
use super::quad::{DrawQuad, Material, SharedQuadState};

/// Identifies a render pass within one frame.
///
/// Producers choose their own ids and reuse them across frames; the
/// aggregator remaps them into one id space per aggregated frame.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RenderPassId(pub u64);

impl fmt::Debug for RenderPassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RenderPassId({})", self.0)
    }
}

/// An ordered list of quads drawn into one output target.
///
/// The last pass of a frame is its root pass: it draws to the frame's own
/// output. Earlier passes draw offscreen and are consumed by
/// [`Material::RenderPass`] quads of later passes.
#[derive(Debug)]
pub struct RenderPass {
    /// Producer-chosen id.
    pub id: RenderPassId,
    /// Extent of the pass's output.
    pub output_rect: Rect,
    /// Part of `output_rect` that changed since the producer's previous frame.
    pub damage_rect: Rect,
    /// Maps the pass's output space into the frame's root target space.
    pub transform_to_root_target: Affine,
    /// Whether pixels outside drawn quads are transparent.
    pub has_transparent_background: bool,
    /// Quads in draw order.
    pub quad_list: Vec<DrawQuad>,
    /// State referenced by index from `quad_list`.
    pub shared_quad_state_list: Vec<SharedQuadState>,
    /// Pending output captures of this pass.
    pub copy_requests: Vec<CopyOutputRequest>,
    /// Surfaces embedded by this pass.
    pub referenced_surfaces: Vec<SurfaceId>,
}

impl RenderPass {
    /// Creates an empty pass.
    #[must_use]
    pub fn new(
        id: RenderPassId,
        output_rect: Rect,
        damage_rect: Rect,
        transform_to_root_target: Affine,
    ) -> Self {
        Self {
            id,
            output_rect,
            damage_rect,
            transform_to_root_target,
            has_transparent_background: false,
            quad_list: Vec::new(),
            shared_quad_state_list: Vec::new(),
            copy_requests: Vec::new(),
            referenced_surfaces: Vec::new(),
        }
    }

    /// Creates an empty pass with the same geometry as `self` but a new id and
    /// no quads, copy requests, or surface references.
    #[must_use]
    pub fn copy_without_quads(&self, id: RenderPassId) -> Self {
        let mut pass = Self::new(
            id,
            self.output_rect,
            self.damage_rect,
            self.transform_to_root_target,
        );
        pass.has_transparent_background = self.has_transparent_background;
        pass
    }

    /// Appends shared quad state and returns its index.
    pub fn push_shared_quad_state(&mut self, state: SharedQuadState) -> usize {
        self.shared_quad_state_list.push(state);
        self.shared_quad_state_list.len() - 1
    }

    /// Appends a quad.
    ///
    /// Surface-content quads also record their surface in
    /// [`referenced_surfaces`](Self::referenced_surfaces).
    ///
    /// # Panics
    ///
    /// Panics if the quad refers to shared quad state the pass does not have.
    pub fn push_quad(&mut self, quad: DrawQuad) {
        assert!(
            quad.shared_quad_state < self.shared_quad_state_list.len(),
            "quad refers to shared quad state {} but the pass has {}",
            quad.shared_quad_state,
            self.shared_quad_state_list.len()
        );
        if let Material::SurfaceContent { surface_id } = quad.material
            && !self.referenced_surfaces.contains(&surface_id)
        {
            self.referenced_surfaces.push(surface_id);
        }
        self.quad_list.push(quad);
    }

    /// Returns the shared quad state of `quad`.
    #[must_use]
    pub fn shared_quad_state_of(&self, quad: &DrawQuad) -> &SharedQuadState {
        &self.shared_quad_state_list[quad.shared_quad_state]
    }
}
