// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surfaces, their factories, and the global surface directory.
//!
//! A [`Surface`] holds the latest [`CompositorFrame`] of one producer-owned
//! drawing target. Producers create and feed surfaces through a
//! [`SurfaceFactory`]; every surface lives in the shared [`SurfaceManager`],
//! which frees destroyed surfaces once their destruction dependencies are
//! satisfied and no live surface embeds them.

mod factory;
mod id;
mod manager;
mod resources;

pub use factory::SurfaceFactory;
pub use id::{SurfaceId, SurfaceIdAllocator, SurfaceSequence};
pub use manager::{SurfaceDamageObserver, SurfaceManager};
pub use resources::{SurfaceFactoryClient, SurfaceResourceHolder};

pub(crate) use resources::FactoryHandle;
#[cfg(test)]
pub(crate) use resources::testing;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use hashbrown::{HashMap, HashSet};

use crate::frame::{
    CompositorFrame, CopyOutputRequest, LatencyMarker, RenderPassId, TransferableResource,
};

/// How a queued frame left the compositor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceDrawStatus {
    /// The frame was aggregated into a drawn display frame.
    Drawn,
    /// The frame was superseded, discarded, or not visible.
    DrawSkipped,
}

/// Runs exactly once per queued frame.
///
/// Callbacks may run while the compositor is mid-operation; they must not
/// call back into the surface manager or the display synchronously.
pub type DrawCallback = Box<dyn FnOnce(SurfaceDrawStatus)>;

/// What a [`Surface::queue_frame`] call means for garbage collection.
#[derive(Debug, Default)]
pub(crate) struct QueuedFrame {
    /// Sequence numbers the new frame satisfies, in the surface's namespace.
    pub(crate) satisfies_sequences: Vec<u32>,
    /// Whether the set of embedded surfaces changed.
    pub(crate) referenced_surfaces_changed: bool,
}

impl QueuedFrame {
    pub(crate) fn needs_collection(&self) -> bool {
        self.referenced_surfaces_changed || !self.satisfies_sequences.is_empty()
    }
}

/// The latest frame of one drawing target, plus its lifetime bookkeeping.
pub struct Surface {
    id: SurfaceId,
    factory: FactoryHandle,
    current_frame: Option<CompositorFrame>,
    frame_index: u32,
    destroyed: bool,
    destruction_dependencies: Vec<SurfaceSequence>,
    referenced_surfaces: Vec<SurfaceId>,
    draw_callback: Option<DrawCallback>,
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("frame_index", &self.frame_index)
            .field("has_frame", &self.current_frame.is_some())
            .field("destroyed", &self.destroyed)
            .field("destruction_dependencies", &self.destruction_dependencies)
            .field("referenced_surfaces", &self.referenced_surfaces)
            .finish_non_exhaustive()
    }
}

impl Surface {
    /// Frame index of a surface that never received a frame with passes.
    pub const INITIAL_FRAME_INDEX: u32 = 2;

    pub(crate) fn new(id: SurfaceId, factory: FactoryHandle) -> Self {
        Self {
            id,
            factory,
            current_frame: None,
            frame_index: Self::INITIAL_FRAME_INDEX,
            destroyed: false,
            destruction_dependencies: Vec::new(),
            referenced_surfaces: Vec::new(),
            draw_callback: None,
        }
    }

    /// Returns the surface's id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// Replaces the current frame.
    ///
    /// Copy requests on the previous frame are answered empty and its latency
    /// markers move to the front of the new frame's. The previous draw
    /// callback runs as skipped and `callback` takes its place; only then are
    /// the previous frame's resources released. The frame index advances only
    /// if the new frame has at least one pass.
    pub(crate) fn queue_frame(
        &mut self,
        mut frame: CompositorFrame,
        callback: Option<DrawCallback>,
    ) -> QueuedFrame {
        self.clear_copy_requests();
        let mut latency_info = Vec::new();
        self.take_latency_info(&mut latency_info);
        latency_info.append(&mut frame.metadata.latency_info);
        frame.metadata.latency_info = latency_info;

        let previous = self.current_frame.take();
        self.factory.receive_from_child(&frame.resource_list);
        if !frame.render_pass_list.is_empty() {
            self.frame_index += 1;
        }

        let mut referenced = Vec::new();
        for pass in &frame.render_pass_list {
            referenced.extend_from_slice(&pass.referenced_surfaces);
        }
        let satisfies_sequences = core::mem::take(&mut frame.metadata.satisfies_sequences);
        self.current_frame = Some(frame);

        if let Some(previous_callback) = self.draw_callback.take() {
            previous_callback(SurfaceDrawStatus::DrawSkipped);
        }
        self.draw_callback = callback;
        if let Some(previous) = previous {
            self.factory
                .unref_resources(&TransferableResource::return_resources(&previous.resource_list));
        }

        let referenced_surfaces_changed = referenced != self.referenced_surfaces;
        self.referenced_surfaces = referenced;
        QueuedFrame {
            satisfies_sequences,
            referenced_surfaces_changed,
        }
    }

    /// Attaches a copy request to the root pass of the current frame.
    ///
    /// Without a frame with passes the request is answered empty at once. A
    /// pending request with the same [`source`](CopyOutputRequest::source) is
    /// replaced and answered empty.
    pub fn request_copy_of_output(&mut self, request: CopyOutputRequest) {
        let Some(root) = self
            .current_frame
            .as_mut()
            .and_then(|frame| frame.render_pass_list.last_mut())
        else {
            request.send_empty_result();
            return;
        };
        if let Some(source) = request.source() {
            let (replaced, kept): (Vec<_>, Vec<_>) = core::mem::take(&mut root.copy_requests)
                .into_iter()
                .partition(|pending| pending.source() == Some(source));
            root.copy_requests = kept;
            for pending in replaced {
                pending.send_empty_result();
            }
        }
        root.copy_requests.push(request);
    }

    /// Moves every pending copy request of the current frame into `out`,
    /// keyed by the pass it was attached to.
    pub fn take_copy_output_requests(
        &mut self,
        out: &mut HashMap<RenderPassId, Vec<CopyOutputRequest>>,
    ) {
        let Some(frame) = &mut self.current_frame else {
            return;
        };
        for pass in &mut frame.render_pass_list {
            if !pass.copy_requests.is_empty() {
                out.entry(pass.id)
                    .or_default()
                    .append(&mut pass.copy_requests);
            }
        }
    }

    /// Returns the frame to draw, if any.
    #[must_use]
    pub fn eligible_frame(&self) -> Option<&CompositorFrame> {
        self.current_frame.as_ref()
    }

    /// Moves the current frame's latency markers to the end of `out`.
    pub fn take_latency_info(&mut self, out: &mut Vec<LatencyMarker>) {
        if let Some(frame) = &mut self.current_frame {
            out.append(&mut frame.metadata.latency_info);
        }
    }

    /// Runs and clears the pending draw callback.
    pub fn run_draw_callbacks(&mut self, status: SurfaceDrawStatus) {
        if let Some(callback) = self.draw_callback.take() {
            callback(status);
        }
    }

    /// Removes the pending draw callback so the caller can run it later.
    #[must_use]
    pub fn take_draw_callback(&mut self) -> Option<DrawCallback> {
        self.draw_callback.take()
    }

    /// Returns how often a frame with passes was queued, starting at
    /// [`INITIAL_FRAME_INDEX`](Self::INITIAL_FRAME_INDEX).
    #[inline]
    #[must_use]
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Returns the surfaces the current frame embeds, in first-seen order.
    #[must_use]
    pub fn referenced_surfaces(&self) -> &[SurfaceId] {
        &self.referenced_surfaces
    }

    /// Keeps the surface alive after destruction until `sequence` is
    /// satisfied or its namespace is invalidated.
    pub fn add_destruction_dependency(&mut self, sequence: SurfaceSequence) {
        self.destruction_dependencies.push(sequence);
    }

    /// Drops dependencies that appear in `satisfied` (consuming them from the
    /// set) or whose namespace is not in `valid_namespaces`.
    pub fn satisfy_destruction_dependencies(
        &mut self,
        satisfied: &mut HashSet<SurfaceSequence>,
        valid_namespaces: &HashSet<u32>,
    ) {
        self.destruction_dependencies.retain(|sequence| {
            !satisfied.remove(sequence) && valid_namespaces.contains(&sequence.namespace)
        });
    }

    /// Returns the number of outstanding destruction dependencies.
    #[must_use]
    pub fn destruction_dependency_count(&self) -> usize {
        self.destruction_dependencies.len()
    }

    /// Returns `true` once the owning factory destroyed the surface.
    #[inline]
    #[must_use]
    pub fn destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn set_destroyed(&mut self) {
        self.destroyed = true;
    }

    pub(crate) fn factory(&self) -> &FactoryHandle {
        &self.factory
    }

    fn clear_copy_requests(&mut self) {
        if let Some(frame) = &mut self.current_frame {
            for pass in &mut frame.render_pass_list {
                for request in pass.copy_requests.drain(..) {
                    request.send_empty_result();
                }
            }
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.clear_copy_requests();
        if let Some(callback) = self.draw_callback.take() {
            callback(SurfaceDrawStatus::DrawSkipped);
        }
        if let Some(frame) = self.current_frame.take() {
            self.factory
                .unref_resources(&TransferableResource::return_resources(&frame.resource_list));
        }
    }
}
