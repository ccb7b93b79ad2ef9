// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Copying producer passes into the aggregated pass list.

use hashbrown::HashMap;
use kurbo::{Affine, Rect};

use crate::frame::{CompositorFrame, DrawQuad, Material, RenderPass, ResourceId, SharedQuadState};
use crate::geometry::{intersects, map_enclosing_rect, project_enclosing_rect};
use crate::resource_provider::{ChildId, ResourceProvider};
use crate::surface::{Surface, SurfaceId, SurfaceManager};

use super::AggregationContext;
use super::pass_ids::PassIdRemapper;

/// A clip in the destination pass's target space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(super) struct ClipData {
    pub(super) is_clipped: bool,
    pub(super) rect: Rect,
}

impl ClipData {
    fn clipped(rect: Rect) -> Self {
        Self {
            is_clipped: true,
            rect,
        }
    }
}

/// Combines the clip of the enclosing surface with a quad's own clip, which
/// is mapped into the destination space through `target` first.
pub(super) fn calculate_clip_rect(surface_clip: ClipData, quad_clip: ClipData, target: Affine) -> ClipData {
    let mut out = if surface_clip.is_clipped {
        surface_clip
    } else {
        ClipData::default()
    };
    if quad_clip.is_clipped {
        let mapped = map_enclosing_rect(target, quad_clip.rect);
        out.rect = if out.is_clipped {
            out.rect.intersect(mapped)
        } else {
            mapped
        };
        out.is_clipped = true;
    }
    out
}

/// Appends a copy of `source` moved into the destination space and returns
/// its index.
fn copy_shared_quad_state(
    source: &SharedQuadState,
    target: Affine,
    clip: ClipData,
    dest: &mut RenderPass,
) -> usize {
    let mut copy = *source;
    copy.quad_to_target_transform = target * source.quad_to_target_transform;
    let clip = calculate_clip_rect(
        clip,
        ClipData {
            is_clipped: source.is_clipped,
            rect: source.clip_rect,
        },
        target,
    );
    copy.is_clipped = clip.is_clipped;
    copy.clip_rect = clip.rect;
    dest.push_shared_quad_state(copy)
}

/// The copy phase of one aggregation.
///
/// Reads frames straight out of the manager; everything it produces goes
/// into the context's destination pass list.
pub(super) struct PassCopier<'a> {
    pub(super) manager: &'a SurfaceManager,
    pub(super) provider: &'a dyn ResourceProvider,
    pub(super) children: &'a HashMap<SurfaceId, ChildId>,
    pub(super) pass_ids: &'a mut PassIdRemapper,
    /// Whether quads outside the root damage are skipped.
    pub(super) cull: bool,
    pub(super) ctx: &'a mut AggregationContext,
}

impl PassCopier<'_> {
    /// Copies every pass of the root surface's frame.
    pub(super) fn copy_root(&mut self, root: SurfaceId) {
        let manager = self.manager;
        let Some(frame) = manager.surface_for_id(root).and_then(Surface::eligible_frame) else {
            return;
        };
        let mut requests = self.ctx.copy_requests.remove(&root).unwrap_or_default();
        if !self.ctx.valid.contains(&root) {
            return;
        }
        let embedding = self.ctx.next_embedding(root);
        self.ctx.stack.insert(root);
        for source in &frame.render_pass_list {
            let id = self.pass_ids.remap(root, embedding, source.id);
            let mut pass = source.copy_without_quads(id);
            pass.damage_rect = source.output_rect;
            if let Some(matching) = requests.remove(&source.id) {
                pass.copy_requests = matching;
            }
            self.copy_quads(
                frame,
                source,
                root,
                embedding,
                Affine::IDENTITY,
                ClipData::default(),
                &mut pass,
            );
            self.ctx.dest_passes.push(pass);
        }
        self.ctx.stack.remove(&root);
    }

    fn copy_quads(
        &mut self,
        frame: &CompositorFrame,
        source: &RenderPass,
        surface: SurfaceId,
        embedding: u32,
        target: Affine,
        clip: ClipData,
        dest: &mut RenderPass,
    ) {
        let children = self.children;
        let provider = self.provider;
        let child_to_parent: Option<&HashMap<ResourceId, ResourceId>> = children
            .get(&surface)
            .map(|&child| provider.child_to_parent_map(child));

        let mut last_copied: Option<usize> = None;
        let mut dest_sqs = 0;
        let mut damage_in_quad_space = None;
        for quad in &source.quad_list {
            let sqs = source.shared_quad_state_of(quad);
            if let Material::SurfaceContent { surface_id } = quad.material {
                if self.cull
                    && let Some(damage) = self.damage_in_quad_space(
                        target * sqs.quad_to_target_transform,
                        dest.transform_to_root_target,
                    )
                    && !intersects(damage, quad.visible_rect)
                {
                    continue;
                }
                let before = dest.shared_quad_state_list.len();
                self.handle_surface_quad(surface_id, quad, sqs, target, clip, dest);
                if dest.shared_quad_state_list.len() != before {
                    last_copied = None;
                }
                continue;
            }

            if last_copied != Some(quad.shared_quad_state) {
                dest_sqs = copy_shared_quad_state(sqs, target, clip, dest);
                last_copied = Some(quad.shared_quad_state);
                if self.cull {
                    damage_in_quad_space = self.damage_in_quad_space(
                        dest.shared_quad_state_list[dest_sqs].quad_to_target_transform,
                        dest.transform_to_root_target,
                    );
                }
            }
            if self.cull
                && let Some(damage) = damage_in_quad_space
                && !intersects(damage, quad.visible_rect)
            {
                continue;
            }

            let mut copied = *quad;
            copied.shared_quad_state = dest_sqs;
            if let Material::RenderPass { render_pass_id, .. } = &mut copied.material {
                if !frame
                    .render_pass_list
                    .iter()
                    .any(|pass| pass.id == *render_pass_id)
                {
                    continue;
                }
                *render_pass_id = self.pass_ids.remap(surface, embedding, *render_pass_id);
            }
            if let Some(map) = child_to_parent {
                copied.for_each_resource_mut(|id| {
                    if let Some(parent) = map.get(id) {
                        *id = *parent;
                    }
                });
            }
            dest.push_quad(copied);
        }
    }

    /// Expands a surface-content quad in place, either by merging the
    /// embedded surface's root pass into `dest` or by drawing it through a
    /// render-pass quad.
    fn handle_surface_quad(
        &mut self,
        id: SurfaceId,
        quad: &DrawQuad,
        sqs: &SharedQuadState,
        target: Affine,
        clip: ClipData,
        dest: &mut RenderPass,
    ) {
        if self.ctx.stack.contains(&id) {
            return;
        }
        let manager = self.manager;
        let Some(frame) = manager.surface_for_id(id).and_then(Surface::eligible_frame) else {
            return;
        };
        let Some(last_pass) = frame.render_pass_list.last() else {
            return;
        };
        let mut requests = self.ctx.copy_requests.remove(&id).unwrap_or_default();
        if !self.ctx.valid.contains(&id) {
            for request in requests.into_values().flatten() {
                request.send_empty_result();
            }
            return;
        }

        let embedding = self.ctx.next_embedding(id);
        self.ctx.stack.insert(id);

        let merge = sqs.opacity == 1.0 && requests.is_empty();
        let passes_to_copy = if merge {
            frame.render_pass_list.len() - 1
        } else {
            frame.render_pass_list.len()
        };
        for source in &frame.render_pass_list[..passes_to_copy] {
            let remapped = self.pass_ids.remap(id, embedding, source.id);
            let mut pass = source.copy_without_quads(remapped);
            pass.damage_rect = source.output_rect;
            pass.transform_to_root_target = dest.transform_to_root_target
                * target
                * sqs.quad_to_target_transform
                * source.transform_to_root_target;
            if let Some(matching) = requests.remove(&source.id) {
                pass.copy_requests = matching;
            }
            self.copy_quads(
                frame,
                source,
                id,
                embedding,
                Affine::IDENTITY,
                ClipData::default(),
                &mut pass,
            );
            self.ctx.dest_passes.push(pass);
        }

        if merge {
            let mut surface_clip =
                ClipData::clipped(map_enclosing_rect(sqs.quad_to_target_transform, quad.visible_rect));
            if sqs.is_clipped {
                surface_clip.rect = surface_clip.rect.intersect(sqs.clip_rect);
            }
            let quads_clip = calculate_clip_rect(clip, surface_clip, target);
            self.copy_quads(
                frame,
                last_pass,
                id,
                embedding,
                target * sqs.quad_to_target_transform,
                quads_clip,
                dest,
            );
        } else {
            let remapped = self.pass_ids.remap(id, embedding, last_pass.id);
            let index = copy_shared_quad_state(sqs, target, clip, dest);
            let mut pass_quad = DrawQuad::render_pass(index, quad.rect, remapped);
            pass_quad.visible_rect = quad.visible_rect;
            dest.push_quad(pass_quad);
        }

        self.ctx.stack.remove(&id);
    }

    /// Projects the root damage into the space of quads drawn with
    /// `quad_to_target` into a pass with `target_to_root`.
    ///
    /// `None` if the combined transform has no inverse, in which case
    /// nothing is culled.
    fn damage_in_quad_space(&self, quad_to_target: Affine, target_to_root: Affine) -> Option<Rect> {
        project_enclosing_rect(target_to_root * quad_to_target, self.ctx.root_damage)
    }
}
