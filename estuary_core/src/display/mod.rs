// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The display: one output drawing one root surface.
//!
//! A [`Display`] ties the pieces together. It observes begin frames from a
//! [`BeginFrameSource`] and damage from the [`SurfaceManager`], lets its
//! [`DisplayScheduler`] pick the moment to draw, then aggregates the root
//! surface with a [`SurfaceAggregator`] and hands the result to the
//! embedder's [`Renderer`].
//!
//! ```text
//!  SurfaceFactory ──submit──▶ SurfaceManager ──damage──▶ Display
//!                                                         │  ▲
//!  BeginFrameSource ─────────begin frame────────────────▶ │  │ deadline
//!                                                         ▼  │
//!                                              DisplayScheduler ─▶ DeadlineTimer
//!                                                         │
//!                                                 draw_and_swap
//!                                                         ▼
//!                                 SurfaceAggregator ─▶ Renderer ─▶ OutputSurface
//! ```
//!
//! The display is shared as `Rc<RefCell<Display>>` so the begin-frame source
//! and the surface manager can both reach it; [`Display::attach`] registers
//! it with both. Callbacks it runs (draw callbacks, copy results, renderer
//! and client methods) must not call back into the display or mutate the
//! surface manager synchronously.

mod backend;
mod scheduler;

pub use backend::{
    DisplayClient, OutputSurface, OutputSurfaceCapabilities, Renderer, RendererCapabilities,
};
pub use scheduler::{
    DEFAULT_MAX_FRAMES_PENDING, DisplayScheduler, DisplaySchedulerClient, DisplaySchedulerConfig,
    DrawAndSwapResult,
};

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use kurbo::{Rect, Size};

use crate::aggregator::{AggregatorSettings, SurfaceAggregator};
use crate::begin_frame::{BeginFrameArgs, BeginFrameControl, BeginFrameObserver, BeginFrameSource};
use crate::frame::LatencyMarker;
use crate::surface::{
    DrawCallback, Surface, SurfaceDamageObserver, SurfaceDrawStatus, SurfaceId, SurfaceManager,
};
use crate::timer::DeadlineTimer;
use crate::trace::{SkipReason, Tracer};

/// Display configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplaySettings {
    /// Draw any pending frame and wait for the output to finish before a
    /// resize takes effect.
    pub finish_rendering_on_resize: bool,
    /// Passed through to [`Renderer::draw_frame`].
    pub disable_quad_filtering: bool,
    /// Overrides the renderer's partial-swap capability when deciding
    /// whether to aggregate only damaged quads.
    pub partial_swap_override: Option<bool>,
}

impl DisplaySettings {
    /// Renderer capabilities decide; no finish on resize.
    pub const DEFAULT: Self = Self {
        finish_rendering_on_resize: false,
        disable_quad_filtering: false,
        partial_swap_override: None,
    };

    /// Settings for an offscreen output: full swaps, no filtering.
    #[must_use]
    pub const fn headless() -> Self {
        Self {
            finish_rendering_on_resize: false,
            disable_quad_filtering: true,
            partial_swap_override: Some(false),
        }
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The half of a display the scheduler calls into.
struct DisplayOutput {
    manager: Rc<RefCell<SurfaceManager>>,
    client: Rc<RefCell<dyn DisplayClient>>,
    settings: DisplaySettings,
    output_surface: Option<Box<dyn OutputSurface>>,
    renderer: Option<Box<dyn Renderer>>,
    aggregator: Option<SurfaceAggregator>,
    current_surface_id: Option<SurfaceId>,
    device_scale_factor: f32,
    current_surface_size: Size,
    external_clip: Rect,
    swapped_since_resize: bool,
    stored_latency_info: Vec<LatencyMarker>,
    visible: bool,
    tracer: Tracer,
}

impl DisplayOutput {
    /// Creates the resource provider, renderer and aggregator on first use.
    fn initialize_renderer(&mut self) {
        if self.aggregator.is_some() {
            return;
        }
        let Some(output_surface) = self.output_surface.as_mut() else {
            return;
        };
        let provider = output_surface.create_resource_provider();
        let mut renderer = output_surface.create_renderer();
        renderer.set_visible(self.visible);
        let aggregate_only_damaged = self
            .settings
            .partial_swap_override
            .unwrap_or(renderer.capabilities().using_partial_swap);
        let mut aggregator = SurfaceAggregator::new(
            provider,
            AggregatorSettings {
                aggregate_only_damaged,
            },
        );
        aggregator.set_tracer(self.tracer.clone());
        self.renderer = Some(renderer);
        self.aggregator = Some(aggregator);
    }
}

/// Runs the draw callbacks of every surface the last aggregation used.
fn run_draw_callbacks(manager: &RefCell<SurfaceManager>, aggregator: &SurfaceAggregator) {
    let mut contained: Vec<SurfaceId> =
        aggregator.previous_contained_surfaces().keys().copied().collect();
    contained.sort_unstable();
    let callbacks: Vec<DrawCallback> = {
        let mut manager = manager.borrow_mut();
        contained
            .iter()
            .filter_map(|&id| manager.surface_for_id_mut(id)?.take_draw_callback())
            .collect()
    };
    for callback in callbacks {
        callback(SurfaceDrawStatus::Drawn);
    }
}

impl DisplaySchedulerClient for DisplayOutput {
    fn draw_and_swap(&mut self) -> DrawAndSwapResult {
        let Some(root) = self.current_surface_id else {
            return DrawAndSwapResult::failed(SkipReason::NoRootSurface);
        };
        self.initialize_renderer();
        let (Some(output_surface), Some(renderer), Some(aggregator)) = (
            self.output_surface.as_deref(),
            self.renderer.as_deref_mut(),
            self.aggregator.as_mut(),
        ) else {
            return DrawAndSwapResult::failed(SkipReason::NoOutputSurface);
        };
        // The resources the draw would sample are likely gone.
        if output_surface.surface_is_suspend_for_recycle() {
            return DrawAndSwapResult::failed(SkipReason::SuspendedForRecycle);
        }

        let Some(mut frame) = aggregator.aggregate(&mut self.manager.borrow_mut(), root) else {
            return DrawAndSwapResult::failed(SkipReason::NothingAggregated);
        };

        // Producers may start on their next frame while this one draws.
        run_draw_callbacks(&self.manager, aggregator);

        frame.metadata.latency_info.append(&mut self.stored_latency_info);
        let have_copy_requests = frame.has_copy_requests();
        let (surface_size, damage) = frame
            .root_pass()
            .map(|pass| (pass.output_rect.size(), pass.damage_rect))
            .unwrap_or_default();
        let have_damage = !damage.is_zero_area();
        let size_matches = surface_size == self.current_surface_size;
        let should_draw = !frame.metadata.latency_info.is_empty()
            || have_copy_requests
            || (have_damage && size_matches);

        self.client
            .borrow_mut()
            .will_draw_and_swap(should_draw, &frame.render_pass_list);

        let mut skip = None;
        if should_draw {
            let viewport = self.current_surface_size.to_rect();
            let clip = if self.external_clip.is_zero_area() {
                viewport
            } else {
                self.external_clip
            };
            renderer.decide_render_pass_allocations_for_frame(&frame.render_pass_list);
            renderer.draw_frame(
                &mut frame.render_pass_list,
                self.device_scale_factor,
                viewport,
                clip,
                self.settings.disable_quad_filtering,
            );
        } else {
            skip = Some(SkipReason::NothingToDraw);
        }

        let should_swap = should_draw && size_matches;
        if should_swap {
            self.swapped_since_resize = true;
            renderer.swap_buffers(core::mem::take(&mut frame.metadata));
        } else {
            self.stored_latency_info
                .append(&mut frame.metadata.latency_info);
            if should_draw {
                skip = Some(SkipReason::SizeMismatch);
            }
        }

        self.client.borrow_mut().did_draw_and_swap();
        DrawAndSwapResult {
            success: true,
            drawn: should_draw,
            swapped: should_swap,
            damage,
            skip,
        }
    }
}

/// Draws one root surface to one output surface.
pub struct Display {
    scheduler: DisplayScheduler,
    output: DisplayOutput,
}

impl fmt::Debug for Display {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Display")
            .field("scheduler", &self.scheduler)
            .field("settings", &self.output.settings)
            .field("current_surface_id", &self.output.current_surface_id)
            .field("current_surface_size", &self.output.current_surface_size)
            .field("has_output_surface", &self.output.output_surface.is_some())
            .finish_non_exhaustive()
    }
}

impl Display {
    /// Creates a display drawing to `output_surface`.
    ///
    /// `control` must be the control of the source the display will be
    /// [attached](Self::attach) to. If the output surface refuses to bind,
    /// the display never draws.
    #[must_use]
    pub fn new(
        manager: Rc<RefCell<SurfaceManager>>,
        client: Rc<RefCell<dyn DisplayClient>>,
        settings: DisplaySettings,
        mut output_surface: Box<dyn OutputSurface>,
        control: BeginFrameControl,
        timer: Box<dyn DeadlineTimer>,
    ) -> Self {
        let bound = output_surface.bind_to_client();
        let config =
            DisplaySchedulerConfig::default_for(output_surface.capabilities().max_frames_pending);
        Self {
            scheduler: DisplayScheduler::new(config, control, timer),
            output: DisplayOutput {
                manager,
                client,
                settings,
                output_surface: bound.then_some(output_surface),
                renderer: None,
                aggregator: None,
                current_surface_id: None,
                device_scale_factor: 1.0,
                current_surface_size: Size::ZERO,
                external_clip: Rect::ZERO,
                swapped_since_resize: false,
                stored_latency_info: Vec::new(),
                visible: true,
                tracer: Tracer::none(),
            },
        }
    }

    /// Registers `this` as the damage observer of its manager and as the
    /// observer of `source`.
    ///
    /// # Panics
    ///
    /// Panics if `source` already has an observer.
    pub fn attach(this: &Rc<RefCell<Self>>, source: &mut dyn BeginFrameSource) {
        let damage: Rc<RefCell<dyn SurfaceDamageObserver>> = this.clone();
        let manager = this.borrow().output.manager.clone();
        manager.borrow_mut().add_observer(&damage);
        source.add_observer(this.clone());
    }

    /// Undoes [`attach`](Self::attach).
    ///
    /// # Panics
    ///
    /// Panics if `this` is not the observer of `source`.
    pub fn detach(this: &Rc<RefCell<Self>>, source: &mut dyn BeginFrameSource) {
        let damage: Rc<RefCell<dyn SurfaceDamageObserver>> = this.clone();
        let manager = this.borrow().output.manager.clone();
        manager.borrow_mut().remove_observer(&damage);
        let frames: Rc<RefCell<dyn BeginFrameObserver>> = this.clone();
        source.remove_observer(&frames);
    }

    /// Installs a tracer on the display, its scheduler and its aggregator.
    pub fn set_tracer(&mut self, tracer: Tracer) {
        self.scheduler.set_tracer(tracer.clone());
        if let Some(aggregator) = self.output.aggregator.as_mut() {
            aggregator.set_tracer(tracer.clone());
        }
        self.output.tracer = tracer;
    }

    /// Selects the root surface and its device scale factor.
    pub fn set_surface_id(&mut self, id: SurfaceId, device_scale_factor: f32) {
        self.output.current_surface_id = Some(id);
        self.output.device_scale_factor = device_scale_factor;
        self.update_root_surface_resources_locked();
        self.scheduler.set_new_root_surface(id);
    }

    /// Changes the output size.
    ///
    /// With [`DisplaySettings::finish_rendering_on_resize`] a pending frame
    /// is drawn at the old size and the output is finished first.
    pub fn resize(&mut self, size: Size) {
        if size == self.output.current_surface_size {
            return;
        }
        if self.output.settings.finish_rendering_on_resize {
            if !self.output.swapped_since_resize {
                self.scheduler
                    .force_immediate_swap_if_possible(&mut self.output);
            }
            if self.output.swapped_since_resize
                && let Some(output_surface) = self.output.output_surface.as_mut()
                && output_surface.has_context_provider()
            {
                output_surface.finish();
            }
        }
        self.output.swapped_since_resize = false;
        self.output.current_surface_size = size;
        if let (Some(aggregator), Some(root)) =
            (self.output.aggregator.as_mut(), self.output.current_surface_id)
        {
            aggregator.set_full_damage_for_surface(root);
        }
        self.scheduler.display_resized();
    }

    /// Overrides the clip passed to the renderer. An empty rectangle means
    /// the whole viewport.
    pub fn set_external_clip(&mut self, clip: Rect) {
        self.output.external_clip = clip;
    }

    /// Shows or hides the output.
    pub fn set_visible(&mut self, visible: bool) {
        self.output.visible = visible;
        if let Some(renderer) = self.output.renderer.as_mut() {
            renderer.set_visible(visible);
        }
    }

    /// Runs the begin-frame deadline. The host calls this when the timer
    /// given to [`new`](Self::new) fires.
    pub fn on_begin_frame_deadline(&mut self) {
        self.scheduler.on_begin_frame_deadline(&mut self.output);
    }

    /// Draws now if anything is pending, without waiting for the deadline.
    pub fn force_immediate_draw_and_swap_if_possible(&mut self) {
        self.scheduler
            .force_immediate_swap_if_possible(&mut self.output);
    }

    /// Reports that the oldest pending swap reached the screen.
    pub fn did_swap_buffers_complete(&mut self) {
        self.scheduler.did_swap_buffers_complete();
    }

    /// Reports that the output surface is gone. The display stops drawing
    /// and tells its client.
    pub fn did_lose_output_surface(&mut self) {
        self.scheduler.output_surface_lost();
        self.output.client.borrow_mut().output_surface_lost();
    }

    /// Returns the root surface.
    #[must_use]
    pub fn current_surface_id(&self) -> Option<SurfaceId> {
        self.output.current_surface_id
    }

    /// Returns the output size.
    #[must_use]
    pub fn current_surface_size(&self) -> Size {
        self.output.current_surface_size
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> DisplaySettings {
        self.output.settings
    }

    /// Returns the scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &DisplayScheduler {
        &self.scheduler
    }

    /// Returns the aggregator, once the first draw created it.
    #[must_use]
    pub fn surface_aggregator(&self) -> Option<&SurfaceAggregator> {
        self.output.aggregator.as_ref()
    }

    /// Locks drawing while the root surface has no frame.
    fn update_root_surface_resources_locked(&mut self) {
        let locked = self.output.current_surface_id.is_none_or(|id| {
            self.output
                .manager
                .borrow()
                .surface_for_id(id)
                .and_then(Surface::eligible_frame)
                .is_none()
        });
        self.scheduler.set_root_surface_resources_locked(locked);
    }
}

impl BeginFrameObserver for Display {
    fn on_begin_frame(&mut self, args: &BeginFrameArgs) {
        self.scheduler.on_begin_frame(args, &mut self.output);
    }

    fn last_used_begin_frame_args(&self) -> Option<BeginFrameArgs> {
        self.scheduler.last_used_begin_frame_args()
    }
}

impl SurfaceDamageObserver for Display {
    fn on_surface_damaged(&mut self, id: SurfaceId, changed: &mut bool) {
        let contained = self
            .output
            .aggregator
            .as_ref()
            .is_some_and(|aggregator| aggregator.previous_contained_surfaces().contains_key(&id));
        if contained {
            // A frame without resources lets go of everything the last one
            // lent us.
            let release = self
                .output
                .manager
                .borrow()
                .surface_for_id(id)
                .is_some_and(|surface| {
                    surface
                        .eligible_frame()
                        .is_none_or(|frame| frame.resource_list.is_empty())
                });
            if release && let Some(aggregator) = self.output.aggregator.as_mut() {
                aggregator.release_resources(id);
            }
            self.scheduler.surface_damaged(id);
            *changed = true;
        } else if self.output.current_surface_id == Some(id) {
            self.scheduler.surface_damaged(id);
            *changed = true;
        }
        if self.output.current_surface_id == Some(id) {
            self.update_root_surface_resources_locked();
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use core::cell::Cell;

    use kurbo::Affine;

    use super::*;
    use crate::begin_frame::BackToBackBeginFrameSource;
    use crate::frame::{
        CompositorFrame, CompositorFrameMetadata, DrawQuad, RenderPass, RenderPassId, ResourceId,
        SharedQuadState,
    };
    use crate::surface::testing::{RecordingClient, resources};
    use crate::surface::{SurfaceFactory, SurfaceFactoryClient};
    use crate::time::HostTime;
    use crate::timer::{Clock, ManualClock, ManualTimer};

    const BOUNDS: Rect = Rect::new(0.0, 0.0, 100.0, 100.0);

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct DrawRecord {
        passes: usize,
        root_damage: Rect,
        viewport: Rect,
        clip: Rect,
    }

    #[derive(Debug, Default)]
    struct RendererLog {
        visible: Option<bool>,
        allocations: u32,
        draws: Vec<DrawRecord>,
        swaps: Vec<CompositorFrameMetadata>,
    }

    struct RecordingRenderer {
        log: Rc<RefCell<RendererLog>>,
    }

    impl Renderer for RecordingRenderer {
        fn capabilities(&self) -> RendererCapabilities {
            RendererCapabilities::default()
        }

        fn decide_render_pass_allocations_for_frame(&mut self, _passes: &[RenderPass]) {
            self.log.borrow_mut().allocations += 1;
        }

        fn draw_frame(
            &mut self,
            passes: &mut [RenderPass],
            _device_scale_factor: f32,
            viewport: Rect,
            clip: Rect,
            _disable_quad_filtering: bool,
        ) {
            self.log.borrow_mut().draws.push(DrawRecord {
                passes: passes.len(),
                root_damage: passes.last().map(|pass| pass.damage_rect).unwrap_or_default(),
                viewport,
                clip,
            });
        }

        fn swap_buffers(&mut self, metadata: CompositorFrameMetadata) {
            self.log.borrow_mut().swaps.push(metadata);
        }

        fn set_visible(&mut self, visible: bool) {
            self.log.borrow_mut().visible = Some(visible);
        }
    }

    struct RecordingOutputSurface {
        log: Rc<RefCell<RendererLog>>,
        suspended: Rc<Cell<bool>>,
    }

    impl OutputSurface for RecordingOutputSurface {
        fn capabilities(&self) -> OutputSurfaceCapabilities {
            OutputSurfaceCapabilities::default()
        }

        fn has_context_provider(&self) -> bool {
            false
        }

        fn surface_is_suspend_for_recycle(&self) -> bool {
            self.suspended.get()
        }

        fn create_renderer(&mut self) -> Box<dyn Renderer> {
            Box::new(RecordingRenderer {
                log: self.log.clone(),
            })
        }
    }

    #[derive(Debug, Default)]
    struct RecordingDisplayClient {
        lost: bool,
        will_draw: Vec<bool>,
        did_draw: u32,
    }

    impl DisplayClient for RecordingDisplayClient {
        fn output_surface_lost(&mut self) {
            self.lost = true;
        }

        fn will_draw_and_swap(&mut self, will_draw: bool, _passes: &[RenderPass]) {
            self.will_draw.push(will_draw);
        }

        fn did_draw_and_swap(&mut self) {
            self.did_draw += 1;
        }
    }

    struct Fixture {
        clock: ManualClock,
        timer: ManualTimer,
        source: BackToBackBeginFrameSource,
        producer: Rc<RefCell<RecordingClient>>,
        factory: SurfaceFactory,
        renderer: Rc<RefCell<RendererLog>>,
        suspended: Rc<Cell<bool>>,
        client: Rc<RefCell<RecordingDisplayClient>>,
        display: Rc<RefCell<Display>>,
        root: SurfaceId,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(HostTime(1_000_000));
        let timer = ManualTimer::new(clock.clone());
        let mut source = BackToBackBeginFrameSource::new();

        let manager = Rc::new(RefCell::new(SurfaceManager::new()));
        manager.borrow_mut().register_surface_id_namespace(1);
        let producer = Rc::new(RefCell::new(RecordingClient::default()));
        let mut factory = SurfaceFactory::new(
            manager.clone(),
            producer.clone() as Rc<RefCell<dyn SurfaceFactoryClient>>,
        );
        let root = SurfaceId::new(1, 1);
        factory.create(root);

        let renderer = Rc::new(RefCell::new(RendererLog::default()));
        let suspended = Rc::new(Cell::new(false));
        let client = Rc::new(RefCell::new(RecordingDisplayClient::default()));
        let display = Rc::new(RefCell::new(Display::new(
            manager,
            client.clone() as Rc<RefCell<dyn DisplayClient>>,
            DisplaySettings::DEFAULT,
            Box::new(RecordingOutputSurface {
                log: renderer.clone(),
                suspended: suspended.clone(),
            }),
            source.control(),
            Box::new(timer.clone()),
        )));
        Display::attach(&display, &mut source);
        display.borrow_mut().resize(BOUNDS.size());
        display.borrow_mut().set_surface_id(root, 1.0);

        Fixture {
            clock,
            timer,
            source,
            producer,
            factory,
            renderer,
            suspended,
            client,
            display,
            root,
        }
    }

    fn frame(damage: Rect) -> CompositorFrame {
        let mut pass = RenderPass::new(RenderPassId(1), BOUNDS, damage, Affine::IDENTITY);
        let sqs = pass.push_shared_quad_state(SharedQuadState::new(Affine::IDENTITY, BOUNDS.size()));
        pass.push_quad(DrawQuad::solid_color(sqs, BOUNDS, [0.0, 0.0, 1.0, 1.0]));
        CompositorFrame::new(vec![pass])
    }

    impl Fixture {
        fn submit(&mut self, frame: CompositorFrame, callback: Option<DrawCallback>) {
            self.factory
                .submit_compositor_frame(self.root, frame, callback);
        }

        /// Delivers a begin frame and runs its deadline.
        fn run_frame(&mut self) {
            assert!(self.source.pump(self.clock.now()), "begin frame delivered");
            let at = self
                .timer
                .scheduled_at()
                .unwrap_or_else(|| panic!("no deadline armed"));
            if at > self.clock.now() {
                self.clock.set(at);
            }
            assert!(self.timer.take_due(), "deadline is due");
            self.display.borrow_mut().on_begin_frame_deadline();
        }
    }

    #[test]
    fn first_draw_is_full_then_damage_only() {
        let mut f = fixture();
        let status = Rc::new(Cell::new(None));
        let sink = status.clone();
        f.submit(
            frame(Rect::new(10.0, 10.0, 20.0, 20.0)),
            Some(Box::new(move |s: SurfaceDrawStatus| sink.set(Some(s)))),
        );
        f.run_frame();
        {
            let log = f.renderer.borrow();
            assert_eq!(log.draws.len(), 1, "one draw");
            assert_eq!(log.draws[0].root_damage, BOUNDS, "first draw is fully damaged");
            assert_eq!(log.draws[0].viewport, BOUNDS);
            assert_eq!(log.draws[0].clip, BOUNDS, "no external clip");
            assert_eq!(log.swaps.len(), 1, "one swap");
            assert_eq!(log.visible, Some(true), "renderer starts visible");
        }
        assert_eq!(status.get(), Some(SurfaceDrawStatus::Drawn), "draw callback ran");
        assert_eq!(f.display.borrow().scheduler().pending_swaps(), 1);
        assert_eq!(f.client.borrow().will_draw, [true]);
        assert_eq!(f.client.borrow().did_draw, 1);

        f.display.borrow_mut().did_swap_buffers_complete();
        f.submit(frame(Rect::new(10.0, 10.0, 11.0, 11.0)), None);
        f.run_frame();
        let log = f.renderer.borrow();
        assert_eq!(log.draws.len(), 2, "second draw");
        assert_eq!(
            log.draws[1].root_damage,
            Rect::new(10.0, 10.0, 11.0, 11.0),
            "only the new damage"
        );
    }

    #[test]
    fn resize_redraws_the_whole_root() {
        let mut f = fixture();
        f.submit(frame(BOUNDS), None);
        f.run_frame();
        f.display.borrow_mut().did_swap_buffers_complete();

        f.display.borrow_mut().resize(Size::new(50.0, 50.0));
        f.display.borrow_mut().resize(BOUNDS.size());
        f.submit(frame(Rect::new(10.0, 10.0, 11.0, 11.0)), None);
        f.run_frame();
        let log = f.renderer.borrow();
        assert_eq!(log.draws.len(), 2, "redrawn after the resize");
        assert_eq!(
            log.draws[1].root_damage, BOUNDS,
            "a resize damages the whole root even if the producer reports less"
        );
    }

    #[test]
    fn latency_from_an_unswapped_frame_rides_the_next_swap() {
        let mut f = fixture();
        let mut first = frame(BOUNDS);
        first.metadata.latency_info.push(LatencyMarker { trace_id: 7 });
        f.submit(first, None);
        f.display.borrow_mut().resize(Size::new(80.0, 80.0));
        f.run_frame();
        {
            let log = f.renderer.borrow();
            assert_eq!(log.draws.len(), 1, "latency forces a draw");
            assert!(log.swaps.is_empty(), "size mismatch blocks the swap");
        }

        f.display.borrow_mut().resize(BOUNDS.size());
        f.submit(frame(BOUNDS), None);
        f.run_frame();
        let log = f.renderer.borrow();
        assert_eq!(log.swaps.len(), 1, "swapped at the matching size");
        assert_eq!(
            log.swaps[0].latency_info,
            [LatencyMarker { trace_id: 7 }],
            "stashed marker delivered"
        );
    }

    #[test]
    fn external_clip_reaches_the_renderer() {
        let mut f = fixture();
        let clip = Rect::new(0.0, 0.0, 50.0, 20.0);
        f.display.borrow_mut().set_external_clip(clip);
        f.submit(frame(BOUNDS), None);
        f.run_frame();
        assert_eq!(f.renderer.borrow().draws[0].clip, clip);
    }

    #[test]
    fn suspended_output_skips_the_draw() {
        let mut f = fixture();
        f.suspended.set(true);
        f.submit(frame(BOUNDS), None);
        f.run_frame();
        assert!(f.renderer.borrow().draws.is_empty(), "nothing drawn");
        assert!(f.client.borrow().will_draw.is_empty(), "client not told");
        assert!(
            f.display.borrow().scheduler().needs_draw(),
            "damage survives a failed draw"
        );
    }

    #[test]
    fn frames_without_resources_release_the_previous_ones() {
        let mut f = fixture();
        let mut first = frame(BOUNDS);
        first.resource_list = resources(&[1]);
        let pass = &mut first.render_pass_list[0];
        pass.push_quad(DrawQuad::texture(0, BOUNDS, ResourceId(1)));
        f.submit(first, None);
        f.run_frame();
        assert!(f.producer.borrow().returned.is_empty(), "still in use");

        f.submit(frame(BOUNDS), None);
        assert_eq!(
            f.producer.borrow().returned.get(&ResourceId(1)),
            Some(&1),
            "returned without waiting for the next draw"
        );
    }

    #[test]
    fn root_without_a_frame_is_locked() {
        let f = fixture();
        assert_eq!(
            f.display
                .borrow()
                .scheduler()
                .desired_begin_frame_deadline_time()
                .1,
            crate::trace::DeadlineReason::RootResourcesLocked
        );
    }

    #[test]
    fn lost_output_surface_stops_begin_frames() {
        let mut f = fixture();
        f.submit(frame(BOUNDS), None);
        f.display.borrow_mut().did_lose_output_surface();
        assert!(f.client.borrow().lost, "client told");
        assert!(!f.source.control().needs_begin_frames(), "no more begin frames");
        assert!(!f.source.pump(f.clock.now()), "nothing delivered");
    }

    #[test]
    fn visibility_reaches_the_renderer() {
        let mut f = fixture();
        f.display.borrow_mut().set_visible(false);
        f.submit(frame(BOUNDS), None);
        f.run_frame();
        assert_eq!(f.renderer.borrow().visible, Some(false), "created hidden");
        f.display.borrow_mut().set_visible(true);
        assert_eq!(f.renderer.borrow().visible, Some(true));
    }
}
