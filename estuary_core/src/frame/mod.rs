// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor frames and their parts.
//!
//! A [`CompositorFrame`] is one producer's complete output for one update: a
//! metadata block, an ordered list of [`RenderPass`]es whose last entry is the
//! root pass, and the [`TransferableResource`]s its quads sample.
//!
//! Frames are moved, never shared. A surface owns its current frame outright;
//! the aggregator builds fresh passes rather than aliasing a producer's, and
//! copy requests travel by value until they are answered.

mod copy;
mod pass;
mod quad;
mod resource;

pub use copy::{CopyOutputCallback, CopyOutputRequest, CopyOutputResult};
pub use pass::{RenderPass, RenderPassId};
pub use quad::{BlendMode, DrawQuad, Material, SharedQuadState};
pub use resource::{ResourceId, ReturnedResource, TransferableResource};

use alloc::vec::Vec;

/// An input-to-display latency tracking marker.
///
/// Markers ride along with frames until the frame that carries them is
/// swapped, so the embedder can measure input latency end to end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LatencyMarker {
    /// Embedder-chosen trace id.
    pub trace_id: u64,
}

/// Per-frame metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositorFrameMetadata {
    /// Ratio of physical pixels to layout units.
    pub device_scale_factor: f32,
    /// Latency markers, oldest first.
    pub latency_info: Vec<LatencyMarker>,
    /// Sequence numbers this frame satisfies, in the submitting surface's
    /// namespace.
    pub satisfies_sequences: Vec<u32>,
}

impl Default for CompositorFrameMetadata {
    fn default() -> Self {
        Self {
            device_scale_factor: 1.0,
            latency_info: Vec::new(),
            satisfies_sequences: Vec::new(),
        }
    }
}

/// One producer's output for one update.
#[derive(Debug, Default)]
pub struct CompositorFrame {
    /// Metadata.
    pub metadata: CompositorFrameMetadata,
    /// Passes in dependency order; the last is the root pass.
    pub render_pass_list: Vec<RenderPass>,
    /// Resources sampled by the passes' quads.
    pub resource_list: Vec<TransferableResource>,
}

impl CompositorFrame {
    /// Creates a frame from a pass list, with default metadata and no
    /// resources.
    #[must_use]
    pub fn new(render_pass_list: Vec<RenderPass>) -> Self {
        Self {
            metadata: CompositorFrameMetadata::default(),
            render_pass_list,
            resource_list: Vec::new(),
        }
    }

    /// Returns the root pass, if the frame has any passes.
    #[must_use]
    pub fn root_pass(&self) -> Option<&RenderPass> {
        self.render_pass_list.last()
    }

    /// Returns `true` if any pass carries a copy request.
    #[must_use]
    pub fn has_copy_requests(&self) -> bool {
        self.render_pass_list
            .iter()
            .any(|pass| !pass.copy_requests.is_empty())
    }
}
