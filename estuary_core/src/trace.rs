// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the compositing pipeline.
//!
//! This module provides a [`TraceSink`] trait with one method per compositor
//! event. All method bodies default to no-ops, so implementing only the
//! events you care about is fine.
//!
//! [`Tracer`] is a cloneable handle to an optional shared sink. Every
//! component that emits events (begin-frame sources, the surface manager, the
//! aggregator, the display scheduler, and the display) holds its own clone,
//! installed with `set_tracer`. When the `trace` feature is **off**, every
//! `Tracer` method compiles to nothing. When **on**, each method performs a
//! single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`) gates [`SurfaceDamageEvent`], emitted for
//!   every surface the aggregator visits.

#[cfg(feature = "trace")]
use alloc::rc::Rc;
#[cfg(feature = "trace")]
use core::cell::RefCell;

use kurbo::Rect;

use crate::surface::SurfaceId;
use crate::time::{Duration, HostTime};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which kind of begin-frame source produced a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BeginFrameSourceKind {
    /// Issues the next frame as soon as the previous one finished.
    BackToBack,
    /// Ticks on a fixed, vsync-aligned interval.
    Synthetic,
    /// Forwards from whichever child source is active.
    Multiplexer,
}

/// Which rule chose the display scheduler's begin-frame deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeadlineReason {
    /// The output surface is lost; run the deadline at once.
    OutputSurfaceLost,
    /// Too many swaps are in flight; wait a full interval.
    SwapThrottled,
    /// Nothing to draw; wait a full interval.
    NoDamage,
    /// The root surface's resources are not available yet.
    RootResourcesLocked,
    /// Every expected surface has reported damage; draw at once.
    AllSurfacesReady,
    /// A resize happened and the root has not redrawn at the new size.
    WaitingForResize,
    /// Children are ready but the root is not; draw a little early.
    RootAdjusted,
    /// Still expecting damage; use the full deadline.
    FullDeadline,
}

/// Why a draw-and-swap did not draw, or drew without swapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// No root surface is set.
    NoRootSurface,
    /// No output surface is bound.
    NoOutputSurface,
    /// Aggregation produced no frame.
    NothingAggregated,
    /// The output surface's backing is being recycled.
    SuspendedForRecycle,
    /// No damage, copy request, or latency marker asked for a draw.
    NothingToDraw,
    /// The aggregated frame was not sized for the current viewport.
    SizeMismatch,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// An axis-aligned damage rectangle in whole pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DamageRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl From<Rect> for DamageRect {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "damage rects are pixel aligned and well within i32 range"
    )]
    fn from(rect: Rect) -> Self {
        let rect = rect.abs().expand();
        Self {
            x: rect.x0 as i32,
            y: rect.y0 as i32,
            width: rect.width() as u32,
            height: rect.height() as u32,
        }
    }
}

/// Emitted when a begin-frame source delivers a notification.
#[derive(Clone, Copy, Debug)]
pub struct BeginFrameEvent {
    /// Which kind of source delivered it.
    pub source: BeginFrameSourceKind,
    /// Frame time of the notification.
    pub frame_time: HostTime,
    /// Deadline carried by the notification.
    pub deadline: HostTime,
    /// Frame interval carried by the notification.
    pub interval: Duration,
    /// Whether this notification stands in for a tick missed while inactive.
    pub missed: bool,
    /// Whether the observer used the notification.
    pub used: bool,
}

/// Emitted when the display scheduler arms its begin-frame deadline.
#[derive(Clone, Copy, Debug)]
pub struct DeadlineEvent {
    /// Host time when the deadline was armed.
    pub now: HostTime,
    /// The chosen deadline; [`HostTime::ZERO`] means "immediately".
    pub deadline: HostTime,
    /// The rule that chose it.
    pub reason: DeadlineReason,
}

/// Emitted after every draw-and-swap attempt.
#[derive(Clone, Copy, Debug)]
pub struct DrawAndSwapEvent {
    /// Host time of the attempt.
    pub now: HostTime,
    /// Root surface at the time of the attempt.
    pub root: SurfaceId,
    /// Whether the renderer drew.
    pub drawn: bool,
    /// Whether the renderer swapped.
    pub swapped: bool,
    /// Damage of the aggregated root pass.
    pub damage: DamageRect,
    /// Why nothing was drawn or swapped, if so.
    pub skip: Option<SkipReason>,
}

/// Emitted after every aggregation that produced a frame.
#[derive(Clone, Copy, Debug)]
pub struct AggregateEvent {
    /// Root of the aggregated tree.
    pub root: SurfaceId,
    /// Number of surfaces reached from the root.
    pub surfaces: u32,
    /// Number of passes in the aggregated frame.
    pub passes: u32,
    /// Root damage.
    pub damage: DamageRect,
    /// Whether any pass carries a copy request.
    pub has_copy_requests: bool,
}

/// Emitted after a garbage collection pass that freed surfaces.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceCollectedEvent {
    /// Surfaces freed by this pass.
    pub freed: u32,
    /// Surfaces still registered.
    pub remaining: u32,
}

/// Emitted when a swap starts or completes.
#[derive(Clone, Copy, Debug)]
pub struct SwapEvent {
    /// Host time of the transition.
    pub now: HostTime,
    /// `false` when a swap was issued, `true` when one completed.
    pub complete: bool,
    /// Swaps in flight after the transition.
    pub pending_swaps: u32,
}

/// Per-surface damage seen during aggregation.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct SurfaceDamageEvent {
    /// The surface.
    pub surface: SurfaceId,
    /// Its frame index.
    pub frame_index: u32,
    /// Its own damage, before children are folded in.
    pub damage: DamageRect,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the compositor.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a begin-frame notification is delivered.
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        _ = e;
    }

    /// Called when the scheduler arms its deadline.
    fn on_deadline(&mut self, e: &DeadlineEvent) {
        _ = e;
    }

    /// Called after a draw-and-swap attempt.
    fn on_draw_and_swap(&mut self, e: &DrawAndSwapEvent) {
        _ = e;
    }

    /// Called after an aggregation produced a frame.
    fn on_aggregate(&mut self, e: &AggregateEvent) {
        _ = e;
    }

    /// Called after garbage collection freed surfaces.
    fn on_surfaces_collected(&mut self, e: &SurfaceCollectedEvent) {
        _ = e;
    }

    /// Called when a swap starts or completes.
    fn on_swap(&mut self, e: &SwapEvent) {
        _ = e;
    }

    /// Called for each surface visited by aggregation (requires `trace-rich`).
    #[cfg(feature = "trace-rich")]
    fn on_surface_damage(&mut self, e: &SurfaceDamageEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer handle
// ---------------------------------------------------------------------------

/// Cloneable handle to an optional shared [`TraceSink`].
///
/// When the `trace` feature is **off**, the handle is empty and every method
/// compiles to nothing.
#[derive(Clone, Default)]
pub struct Tracer {
    #[cfg(feature = "trace")]
    sink: Option<Rc<RefCell<dyn TraceSink>>>,
}

impl core::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident, $e:ident) => {{
        #[cfg(feature = "trace")]
        if let Some(sink) = &$self.sink {
            sink.borrow_mut().$method($e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = $e;
        }
    }};
}

impl Tracer {
    /// Creates a tracer that dispatches to the given sink.
    ///
    /// Without the `trace` feature the sink is dropped and nothing is
    /// dispatched.
    #[cfg(feature = "trace")]
    #[must_use]
    pub fn new(sink: Rc<RefCell<dyn TraceSink>>) -> Self {
        Self { sink: Some(sink) }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Returns `true` if events reach a sink.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "trace")]
        {
            self.sink.is_some()
        }
        #[cfg(not(feature = "trace"))]
        {
            false
        }
    }

    /// Emits a [`BeginFrameEvent`].
    #[inline]
    pub fn begin_frame(&self, e: &BeginFrameEvent) {
        dispatch!(self, on_begin_frame, e);
    }

    /// Emits a [`DeadlineEvent`].
    #[inline]
    pub fn deadline(&self, e: &DeadlineEvent) {
        dispatch!(self, on_deadline, e);
    }

    /// Emits a [`DrawAndSwapEvent`].
    #[inline]
    pub fn draw_and_swap(&self, e: &DrawAndSwapEvent) {
        dispatch!(self, on_draw_and_swap, e);
    }

    /// Emits an [`AggregateEvent`].
    #[inline]
    pub fn aggregate(&self, e: &AggregateEvent) {
        dispatch!(self, on_aggregate, e);
    }

    /// Emits a [`SurfaceCollectedEvent`].
    #[inline]
    pub fn surfaces_collected(&self, e: &SurfaceCollectedEvent) {
        dispatch!(self, on_surfaces_collected, e);
    }

    /// Emits a [`SwapEvent`].
    #[inline]
    pub fn swap(&self, e: &SwapEvent) {
        dispatch!(self, on_swap, e);
    }

    /// Emits a [`SurfaceDamageEvent`] (requires `trace-rich`).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn surface_damage(&self, e: &SurfaceDamageEvent) {
        if let Some(sink) = &self.sink {
            sink.borrow_mut().on_surface_damage(e);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
