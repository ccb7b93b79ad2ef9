// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Headless frame loop over simulated time.
//!
//! A root surface embeds a child surface that slides across the output. A
//! 60 Hz synthetic source drives a [`Display`] whose renderer only counts
//! what it is handed; swaps complete one millisecond after they are issued.
//! Events go to a [`PrettyPrintSink`] on stdout and to a [`ChromeTraceSink`]
//! exported to `estuary_trace.json`.
//!
//! Run with: `cargo run -p headless_compositor`

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;
use std::rc::Rc;

use kurbo::{Affine, Rect, Size, Vec2};

use estuary_core::begin_frame::{BeginFrameSource, SyntheticBeginFrameSource, SyntheticSourceConfig};
use estuary_core::display::{
    Display, DisplayClient, DisplaySettings, OutputSurface, OutputSurfaceCapabilities, Renderer,
    RendererCapabilities,
};
use estuary_core::frame::{
    CompositorFrame, CompositorFrameMetadata, DrawQuad, RenderPass, RenderPassId, ResourceId,
    ReturnedResource, SharedQuadState, TransferableResource,
};
use estuary_core::surface::{
    SurfaceFactory, SurfaceFactoryClient, SurfaceId, SurfaceIdAllocator, SurfaceManager,
};
use estuary_core::time::{Duration, HostTime, Timebase};
use estuary_core::timer::{Clock, DeadlineTimer, ManualClock, ManualTimer};
use estuary_core::trace::{
    AggregateEvent, BeginFrameEvent, DeadlineEvent, DrawAndSwapEvent, SurfaceCollectedEvent,
    SurfaceDamageEvent, SwapEvent, TraceSink, Tracer,
};

use estuary_debug::chrome::ChromeTraceSink;
use estuary_debug::pretty::PrettyPrintSink;

const FRAME_COUNT: u32 = 30;
/// Upper bound on loop iterations, so a stalled pipeline cannot spin.
const MAX_STEPS: u32 = FRAME_COUNT * 8;
const SWAP_LATENCY: Duration = Duration::from_millis(1);
const OUTPUT: Size = Size::new(320.0, 240.0);
const CHILD: Size = Size::new(64.0, 64.0);
const CHILD_STEP: f64 = 8.0;

// -- trace fan-out ---------------------------------------------------------

/// Forwards every event to several sinks.
struct Tee {
    sinks: Vec<Rc<RefCell<dyn TraceSink>>>,
}

impl Tee {
    fn each(&self, f: impl Fn(&mut dyn TraceSink)) {
        for sink in &self.sinks {
            f(&mut *sink.borrow_mut());
        }
    }
}

impl TraceSink for Tee {
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        self.each(|sink| sink.on_begin_frame(e));
    }

    fn on_deadline(&mut self, e: &DeadlineEvent) {
        self.each(|sink| sink.on_deadline(e));
    }

    fn on_draw_and_swap(&mut self, e: &DrawAndSwapEvent) {
        self.each(|sink| sink.on_draw_and_swap(e));
    }

    fn on_aggregate(&mut self, e: &AggregateEvent) {
        self.each(|sink| sink.on_aggregate(e));
    }

    fn on_surfaces_collected(&mut self, e: &SurfaceCollectedEvent) {
        self.each(|sink| sink.on_surfaces_collected(e));
    }

    fn on_swap(&mut self, e: &SwapEvent) {
        self.each(|sink| sink.on_swap(e));
    }

    fn on_surface_damage(&mut self, e: &SurfaceDamageEvent) {
        self.each(|sink| sink.on_surface_damage(e));
    }
}

// -- headless output -------------------------------------------------------

#[derive(Default)]
struct Stats {
    draws: u32,
    quads: usize,
    swaps: u32,
    /// Completion times of swaps in flight, oldest first.
    in_flight: VecDeque<HostTime>,
}

struct HeadlessRenderer {
    stats: Rc<RefCell<Stats>>,
    clock: ManualClock,
}

impl Renderer for HeadlessRenderer {
    fn capabilities(&self) -> RendererCapabilities {
        RendererCapabilities {
            using_partial_swap: true,
        }
    }

    fn decide_render_pass_allocations_for_frame(&mut self, _passes: &[RenderPass]) {}

    fn draw_frame(
        &mut self,
        passes: &mut [RenderPass],
        _device_scale_factor: f32,
        _viewport: Rect,
        _clip: Rect,
        _disable_quad_filtering: bool,
    ) {
        let mut stats = self.stats.borrow_mut();
        stats.draws += 1;
        stats.quads += passes.iter().map(|pass| pass.quad_list.len()).sum::<usize>();
    }

    fn swap_buffers(&mut self, _metadata: CompositorFrameMetadata) {
        let mut stats = self.stats.borrow_mut();
        stats.swaps += 1;
        stats.in_flight.push_back(self.clock.now() + SWAP_LATENCY);
    }

    fn set_visible(&mut self, _visible: bool) {}
}

struct HeadlessOutput {
    stats: Rc<RefCell<Stats>>,
    clock: ManualClock,
}

impl OutputSurface for HeadlessOutput {
    fn capabilities(&self) -> OutputSurfaceCapabilities {
        OutputSurfaceCapabilities {
            max_frames_pending: 2,
        }
    }

    fn has_context_provider(&self) -> bool {
        false
    }

    fn create_renderer(&mut self) -> Box<dyn Renderer> {
        Box::new(HeadlessRenderer {
            stats: self.stats.clone(),
            clock: self.clock.clone(),
        })
    }
}

struct QuietClient;

impl DisplayClient for QuietClient {}

// -- producers -------------------------------------------------------------

#[derive(Default)]
struct Producer {
    returned: u32,
}

impl SurfaceFactoryClient for Producer {
    fn return_resources(&mut self, resources: &[ReturnedResource]) {
        self.returned += resources.iter().map(|r| r.count).sum::<u32>();
    }
}

fn child_x(step: u32) -> f64 {
    (f64::from(step) * CHILD_STEP) % (OUTPUT.width - CHILD.width)
}

/// The root frame: a background and the child at its position for `step`.
fn root_frame(child: SurfaceId, step: u32) -> CompositorFrame {
    let bounds = OUTPUT.to_rect();
    let at = |s: u32| Vec2::new(child_x(s), 88.0);
    let damage = if step == 0 {
        bounds
    } else {
        let before = CHILD.to_rect() + at(step - 1);
        let after = CHILD.to_rect() + at(step);
        before.union(after)
    };

    let mut pass = RenderPass::new(RenderPassId(1), bounds, damage, Affine::IDENTITY);
    let child_sqs =
        pass.push_shared_quad_state(SharedQuadState::new(Affine::translate(at(step)), CHILD));
    pass.push_quad(DrawQuad::surface(child_sqs, CHILD.to_rect(), child));
    let background = pass.push_shared_quad_state(SharedQuadState::new(Affine::IDENTITY, OUTPUT));
    pass.push_quad(DrawQuad::solid_color(background, bounds, [0.1, 0.1, 0.12, 1.0]));
    pass.referenced_surfaces.push(child);
    CompositorFrame::new(vec![pass])
}

/// The child frame: one texture, cycling through three buffers.
fn child_frame(step: u32) -> CompositorFrame {
    let bounds = CHILD.to_rect();
    let buffer = ResourceId(step % 3 + 1);
    let mut pass = RenderPass::new(RenderPassId(1), bounds, bounds, Affine::IDENTITY);
    let sqs = pass.push_shared_quad_state(SharedQuadState::new(Affine::IDENTITY, CHILD));
    pass.push_quad(DrawQuad::texture(sqs, bounds, buffer));
    let mut frame = CompositorFrame::new(vec![pass]);
    frame.resource_list = vec![TransferableResource::new(buffer, CHILD)];
    frame
}

/// Pops swaps that completed by `now` and returns how many.
fn take_completed(stats: &RefCell<Stats>, now: HostTime) -> u32 {
    let mut stats = stats.borrow_mut();
    let mut completed = 0;
    while stats.in_flight.front().is_some_and(|&at| at <= now) {
        stats.in_flight.pop_front();
        completed += 1;
    }
    completed
}

fn main() {
    let timebase = Timebase::NANOS;

    // -- sinks -------------------------------------------------------------
    let chrome = Rc::new(RefCell::new(ChromeTraceSink::new(timebase)));
    let pretty: Rc<RefCell<dyn TraceSink>> = Rc::new(RefCell::new(PrettyPrintSink::with_writer(
        std::io::stdout(),
        timebase,
    )));
    let chrome_sink: Rc<RefCell<dyn TraceSink>> = chrome.clone();
    let tee = Tee {
        sinks: vec![pretty, chrome_sink],
    };
    let tracer = Tracer::new(Rc::new(RefCell::new(tee)));

    // -- compositor --------------------------------------------------------
    let clock = ManualClock::new(HostTime(1_000_000_000));
    let timer = ManualTimer::new(clock.clone());
    let stats = Rc::new(RefCell::new(Stats::default()));

    let manager = Rc::new(RefCell::new(SurfaceManager::new()));
    manager.borrow_mut().set_tracer(tracer.clone());

    let mut source = SyntheticBeginFrameSource::new(SyntheticSourceConfig::hz(60));
    source.set_tracer(tracer.clone());

    let display = Rc::new(RefCell::new(Display::new(
        manager.clone(),
        Rc::new(RefCell::new(QuietClient)),
        DisplaySettings::headless(),
        Box::new(HeadlessOutput {
            stats: stats.clone(),
            clock: clock.clone(),
        }),
        source.control(),
        Box::new(timer.clone()),
    )));
    display.borrow_mut().set_tracer(tracer.clone());
    Display::attach(&display, &mut source);

    // -- producers ---------------------------------------------------------
    let mut root_ids = SurfaceIdAllocator::new(1);
    let mut child_ids = SurfaceIdAllocator::new(2);
    manager.borrow_mut().register_surface_id_namespace(1);
    manager.borrow_mut().register_surface_id_namespace(2);

    let root_client = Rc::new(RefCell::new(Producer::default()));
    let child_client = Rc::new(RefCell::new(Producer::default()));
    let mut root_factory = SurfaceFactory::new(manager.clone(), root_client.clone());
    let mut child_factory = SurfaceFactory::new(manager.clone(), child_client.clone());

    let root = root_ids.generate_id();
    let child = child_ids.generate_id();
    root_factory.create(root);
    child_factory.create(child);

    display.borrow_mut().resize(OUTPUT);
    display.borrow_mut().set_surface_id(root, 1.0);
    child_factory.submit_compositor_frame(child, child_frame(0), None);
    root_factory.submit_compositor_frame(root, root_frame(child, 0), None);

    // -- simulated loop ----------------------------------------------------
    let mut frames = 0;
    for _ in 0..MAX_STEPS {
        if frames >= FRAME_COUNT {
            break;
        }
        let in_flight = stats.borrow().in_flight.front().copied();
        let Some(next) = [source.next_wakeup(), timer.scheduled_at(), in_flight]
            .into_iter()
            .flatten()
            .min()
        else {
            break;
        };
        if next > clock.now() {
            clock.set(next);
        }
        let now = clock.now();

        for _ in 0..take_completed(&stats, now) {
            display.borrow_mut().did_swap_buffers_complete();
        }

        if source.pump(now) {
            frames += 1;
            child_factory.submit_compositor_frame(child, child_frame(frames), None);
            root_factory.submit_compositor_frame(root, root_frame(child, frames), None);
        }

        if timer.take_due() {
            display.borrow_mut().on_begin_frame_deadline();
        }
    }

    // -- teardown ----------------------------------------------------------
    child_factory.destroy(child);
    root_factory.submit_compositor_frame(root, CompositorFrame::default(), None);
    manager.borrow_mut().garbage_collect_surfaces();

    let stats = stats.borrow();
    println!(
        "\n{frames} begin frames, {} draws, {} swaps, {} quads",
        stats.draws, stats.swaps, stats.quads
    );
    println!(
        "resources returned: root={} child={}; surfaces alive: {}",
        root_client.borrow().returned,
        child_client.borrow().returned,
        manager.borrow().surface_count()
    );

    let path = "estuary_trace.json";
    let file = File::create(path).expect("failed to create trace file");
    let mut writer = BufWriter::new(file);
    chrome
        .borrow()
        .export(&mut writer)
        .expect("failed to write trace");
    println!("Chrome trace written to {path}");
}
