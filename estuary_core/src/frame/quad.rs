// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Draw quads and the state they share.

use kurbo::{Affine, Point, Rect, Size};

use crate::surface::SurfaceId;

use super::pass::RenderPassId;
use super::resource::ResourceId;

/// Blend mode for compositing a quad onto its target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Standard source-over alpha compositing.
    #[default]
    SourceOver,
    /// Multiply blend.
    Multiply,
    /// Screen blend.
    Screen,
}

/// State shared by a run of quads in one render pass.
///
/// Quads refer to their shared state by index into the pass's
/// [`shared_quad_state_list`](super::RenderPass::shared_quad_state_list).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SharedQuadState {
    /// Maps quad space into the pass's target space.
    pub quad_to_target_transform: Affine,
    /// Bounds of the producing layer, in quad space.
    pub quad_layer_bounds: Size,
    /// Visible part of the producing layer, in quad space.
    pub visible_quad_layer_rect: Rect,
    /// Clip in target space, honored when `is_clipped` is set.
    pub clip_rect: Rect,
    /// Whether `clip_rect` applies.
    pub is_clipped: bool,
    /// Opacity in `0.0..=1.0`.
    pub opacity: f32,
    /// How the quads blend onto the target.
    pub blend_mode: BlendMode,
    /// 3D sorting context, 0 for none.
    pub sorting_context_id: i32,
}

impl SharedQuadState {
    /// Creates unclipped, opaque state with the given transform and layer
    /// bounds.
    #[must_use]
    pub fn new(quad_to_target_transform: Affine, quad_layer_bounds: Size) -> Self {
        Self {
            quad_to_target_transform,
            quad_layer_bounds,
            visible_quad_layer_rect: quad_layer_bounds.to_rect(),
            clip_rect: Rect::ZERO,
            is_clipped: false,
            opacity: 1.0,
            blend_mode: BlendMode::SourceOver,
            sorting_context_id: 0,
        }
    }

    /// Sets the clip.
    #[must_use]
    pub fn with_clip(mut self, clip_rect: Rect) -> Self {
        self.clip_rect = clip_rect;
        self.is_clipped = true;
        self
    }

    /// Sets the opacity.
    #[must_use]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }
}

/// What a [`DrawQuad`] draws.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Material {
    /// A flat color.
    SolidColor {
        /// Non-premultiplied RGBA.
        color: [f32; 4],
    },
    /// A textured rectangle backed by a transferable resource.
    Texture {
        /// The resource providing the pixels.
        resource_id: ResourceId,
        /// Whether the texels have premultiplied alpha.
        premultiplied_alpha: bool,
        /// Texture coordinate of the quad's top-left corner.
        uv_top_left: Point,
        /// Texture coordinate of the quad's bottom-right corner.
        uv_bottom_right: Point,
        /// Whether the texture is stored upside down.
        flipped: bool,
    },
    /// The output of another render pass in the same frame.
    RenderPass {
        /// The referenced pass.
        render_pass_id: RenderPassId,
        /// Optional mask applied to the referenced output.
        mask_resource_id: Option<ResourceId>,
    },
    /// The content of another surface, resolved during aggregation.
    SurfaceContent {
        /// The embedded surface.
        surface_id: SurfaceId,
    },
}

/// One drawable rectangle of a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawQuad {
    /// Index of this quad's state in the pass's shared-quad-state list.
    pub shared_quad_state: usize,
    /// Extent of the quad, in quad space.
    pub rect: Rect,
    /// Part of `rect` known to be fully opaque.
    pub opaque_rect: Rect,
    /// Part of `rect` that is not occluded.
    pub visible_rect: Rect,
    /// Whether blending must be enabled regardless of opacity.
    pub needs_blending: bool,
    /// What the quad draws.
    pub material: Material,
}

impl DrawQuad {
    /// Creates a fully visible quad.
    #[must_use]
    pub fn new(shared_quad_state: usize, rect: Rect, material: Material) -> Self {
        Self {
            shared_quad_state,
            rect,
            opaque_rect: Rect::ZERO,
            visible_rect: rect,
            needs_blending: false,
            material,
        }
    }

    /// A solid-color quad.
    #[must_use]
    pub fn solid_color(shared_quad_state: usize, rect: Rect, color: [f32; 4]) -> Self {
        Self::new(shared_quad_state, rect, Material::SolidColor { color })
    }

    /// A texture quad sampling the whole of `resource_id`.
    #[must_use]
    pub fn texture(shared_quad_state: usize, rect: Rect, resource_id: ResourceId) -> Self {
        Self::new(
            shared_quad_state,
            rect,
            Material::Texture {
                resource_id,
                premultiplied_alpha: true,
                uv_top_left: Point::ZERO,
                uv_bottom_right: Point::new(1.0, 1.0),
                flipped: false,
            },
        )
    }

    /// A quad embedding another surface.
    #[must_use]
    pub fn surface(shared_quad_state: usize, rect: Rect, surface_id: SurfaceId) -> Self {
        Self::new(shared_quad_state, rect, Material::SurfaceContent { surface_id })
    }

    /// A quad drawing the output of another render pass.
    #[must_use]
    pub fn render_pass(shared_quad_state: usize, rect: Rect, render_pass_id: RenderPassId) -> Self {
        Self::new(
            shared_quad_state,
            rect,
            Material::RenderPass {
                render_pass_id,
                mask_resource_id: None,
            },
        )
    }

    /// Calls `f` for every resource this quad samples.
    pub fn for_each_resource(&self, mut f: impl FnMut(ResourceId)) {
        match self.material {
            Material::Texture { resource_id, .. } => f(resource_id),
            Material::RenderPass {
                mask_resource_id: Some(mask),
                ..
            } => f(mask),
            _ => {}
        }
    }

    /// Calls `f` with mutable access to every resource id this quad samples.
    pub fn for_each_resource_mut(&mut self, mut f: impl FnMut(&mut ResourceId)) {
        match &mut self.material {
            Material::Texture { resource_id, .. } => f(resource_id),
            Material::RenderPass {
                mask_resource_id: Some(mask),
                ..
            } => f(mask),
            _ => {}
        }
    }
}
