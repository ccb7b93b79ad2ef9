// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Output contract for platform integrations.
//!
//! A [`Display`](super::Display) draws through two embedder-provided pieces:
//!
//! - **Output surface** implements [`OutputSurface`]: the window or
//!   offscreen target that swaps. It reports its capabilities, creates the
//!   renderer and the resource provider, and may be suspended or lost.
//!
//! - **Renderer** implements [`Renderer`]: it draws an aggregated pass list
//!   and issues the swap. GPU and software renderers both fit here, as do
//!   test doubles that only record what they were handed.
//!
//! The embedder also implements [`DisplayClient`] to hear about lost output
//! surfaces and about each draw.
//!
//! # Frame loop pseudocode
//!
//! ```rust,ignore
//! loop {
//!     let now = clock.now();
//!     source.pump(now);                 // may begin a frame on the display
//!     if timer.take_due() {
//!         display.borrow_mut().on_begin_frame_deadline();
//!     }
//!     if renderer_reports_swap_complete() {
//!         display.borrow_mut().did_swap_buffers_complete();
//!     }
//!     sleep_until(min(source.next_wakeup(), timer.scheduled_at()));
//! }
//! ```

use alloc::boxed::Box;

use kurbo::Rect;

use crate::frame::{CompositorFrameMetadata, RenderPass};
use crate::resource_provider::{ChildResourceProvider, ResourceProvider};

/// What an output surface supports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutputSurfaceCapabilities {
    /// Swaps allowed in flight; zero means the default.
    pub max_frames_pending: u32,
}

/// The target a display swaps to.
pub trait OutputSurface {
    /// Binds the surface to its display. Returns `false` if the surface
    /// cannot be used, in which case the display never draws.
    fn bind_to_client(&mut self) -> bool {
        true
    }

    /// Returns the surface's capabilities.
    fn capabilities(&self) -> OutputSurfaceCapabilities;

    /// Returns `true` if the surface draws through a GPU context.
    ///
    /// Surfaces without one hold no resources between frames.
    fn has_context_provider(&self) -> bool;

    /// Returns `true` while the surface is suspended and its resources are
    /// likely gone, in which case draws are skipped.
    fn surface_is_suspend_for_recycle(&self) -> bool {
        false
    }

    /// Blocks until previously issued work is done. Called before a resize
    /// when the display is configured to finish rendering first.
    fn finish(&mut self) {}

    /// Creates the renderer for this surface.
    fn create_renderer(&mut self) -> Box<dyn Renderer>;

    /// Creates the resource provider that imports producer resources.
    fn create_resource_provider(&mut self) -> Box<dyn ResourceProvider> {
        Box::new(ChildResourceProvider::new())
    }
}

/// What a renderer supports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RendererCapabilities {
    /// Whether the renderer can swap a sub-rectangle, in which case only
    /// damaged quads need to be aggregated.
    pub using_partial_swap: bool,
}

/// Draws aggregated frames.
pub trait Renderer {
    /// Returns the renderer's capabilities.
    fn capabilities(&self) -> RendererCapabilities;

    /// Called before [`draw_frame`](Self::draw_frame) so the renderer can
    /// free or allocate intermediate targets for the coming passes.
    fn decide_render_pass_allocations_for_frame(&mut self, passes: &[RenderPass]);

    /// Draws `passes`, last pass to the output.
    ///
    /// Copy requests on the passes are the renderer's to answer; any left
    /// in place are answered empty when the passes drop.
    fn draw_frame(
        &mut self,
        passes: &mut [RenderPass],
        device_scale_factor: f32,
        viewport: Rect,
        clip: Rect,
        disable_quad_filtering: bool,
    );

    /// Presents the last drawn frame.
    fn swap_buffers(&mut self, metadata: CompositorFrameMetadata);

    /// Shows or hides the output.
    fn set_visible(&mut self, visible: bool);
}

/// Hears about a display's output.
pub trait DisplayClient {
    /// The output surface was lost; the display will not draw again.
    fn output_surface_lost(&mut self) {}

    /// A draw is about to happen, or was skipped if `will_draw` is `false`.
    fn will_draw_and_swap(&mut self, will_draw: bool, passes: &[RenderPass]) {
        _ = (will_draw, passes);
    }

    /// A draw attempt finished.
    fn did_draw_and_swap(&mut self) {}
}
