// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deadline scheduling for a display.
//!
//! The [`DisplayScheduler`] decides, within each begin-frame interval, when
//! the display should draw. It waits for damage from the root surface and
//! from the child surfaces that drew in the previous frames, but never
//! longer than the interval's deadline, and it stops drawing while too many
//! swaps are in flight.
//!
//! The expectation of which children will draw lags by one frame: the
//! children expected in frame *n* are those that damaged both frame *n - 1*
//! and frame *n - 2*. This settles on the set of children that redraw every
//! frame, at the cost of occasionally waiting for a child that went idle or
//! drawing without one that just woke up.

use alloc::boxed::Box;
use core::fmt;

use hashbrown::HashSet;
use kurbo::Rect;

use crate::begin_frame::{BeginFrameArgs, BeginFrameControl, BeginFrameObserverState};
use crate::surface::SurfaceId;
use crate::time::{Duration, HostTime};
use crate::timer::DeadlineTimer;
use crate::trace::{DeadlineEvent, DeadlineReason, DrawAndSwapEvent, SkipReason, SwapEvent, Tracer};

/// Swaps allowed in flight when the output surface does not say.
pub const DEFAULT_MAX_FRAMES_PENDING: u32 = 2;

/// Scheduler configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplaySchedulerConfig {
    /// Draws stop while this many swaps have not completed.
    pub max_pending_swaps: u32,
    /// Subtracted from every begin-frame deadline, and once more when only
    /// the root surface is still expected.
    pub estimated_parent_draw_time: Duration,
}

impl DisplaySchedulerConfig {
    /// Configuration for an output surface allowing `max_frames_pending`
    /// swaps in flight, zero meaning [`DEFAULT_MAX_FRAMES_PENDING`].
    #[must_use]
    pub const fn default_for(max_frames_pending: u32) -> Self {
        Self {
            max_pending_swaps: if max_frames_pending == 0 {
                DEFAULT_MAX_FRAMES_PENDING
            } else {
                max_frames_pending
            },
            estimated_parent_draw_time: BeginFrameArgs::DEFAULT_ESTIMATED_PARENT_DRAW_TIME,
        }
    }
}

impl Default for DisplaySchedulerConfig {
    fn default() -> Self {
        Self::default_for(DEFAULT_MAX_FRAMES_PENDING)
    }
}

/// What one draw-and-swap attempt did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DrawAndSwapResult {
    /// Whether a frame was aggregated and handled. Only successful attempts
    /// roll the damage expectations forward.
    pub success: bool,
    /// Whether the renderer drew.
    pub drawn: bool,
    /// Whether a swap was issued.
    pub swapped: bool,
    /// Root damage of the aggregated frame.
    pub damage: Rect,
    /// Why nothing was drawn or swapped, if so.
    pub skip: Option<SkipReason>,
}

impl DrawAndSwapResult {
    /// A failed attempt.
    #[must_use]
    pub fn failed(reason: SkipReason) -> Self {
        Self {
            skip: Some(reason),
            ..Self::default()
        }
    }
}

/// The side of the display that actually draws.
pub trait DisplaySchedulerClient {
    /// Aggregates, draws, and swaps the current root surface.
    fn draw_and_swap(&mut self) -> DrawAndSwapResult;
}

/// Decides when a display draws.
///
/// The scheduler observes begin frames through its owner and steers the
/// begin-frame source through a [`BeginFrameControl`]. The deadline of each
/// interval is armed on a [`DeadlineTimer`]; the host calls
/// [`on_begin_frame_deadline`](Self::on_begin_frame_deadline) when it fires.
pub struct DisplayScheduler {
    config: DisplaySchedulerConfig,
    control: BeginFrameControl,
    timer: Box<dyn DeadlineTimer>,
    observer: BeginFrameObserverState,
    current_args: BeginFrameArgs,
    root_surface_id: SurfaceId,

    output_surface_lost: bool,
    root_surface_resources_locked: bool,
    inside_begin_frame_deadline_interval: bool,
    needs_draw: bool,
    expecting_root_surface_damage_because_of_resize: bool,
    all_active_child_surfaces_ready_to_draw: bool,
    pending_swaps: u32,
    root_surface_damaged: bool,
    expect_damage_from_root_surface: bool,

    child_surface_ids_damaged: HashSet<SurfaceId>,
    child_surface_ids_damaged_prev: HashSet<SurfaceId>,
    child_surface_ids_to_expect_damage_from: HashSet<SurfaceId>,

    deadline: Option<HostTime>,
    tracer: Tracer,
}

impl fmt::Debug for DisplayScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayScheduler")
            .field("config", &self.config)
            .field("root_surface_id", &self.root_surface_id)
            .field("inside_interval", &self.inside_begin_frame_deadline_interval)
            .field("needs_draw", &self.needs_draw)
            .field("pending_swaps", &self.pending_swaps)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl DisplayScheduler {
    /// Creates an idle scheduler.
    ///
    /// Root surface resources start out locked: nothing is drawn until the
    /// owner reports that the root has a frame.
    #[must_use]
    pub fn new(
        config: DisplaySchedulerConfig,
        control: BeginFrameControl,
        timer: Box<dyn DeadlineTimer>,
    ) -> Self {
        Self {
            config,
            control,
            timer,
            observer: BeginFrameObserverState::default(),
            current_args: BeginFrameArgs::normal(
                HostTime::ZERO,
                HostTime::ZERO,
                BeginFrameArgs::DEFAULT_INTERVAL,
            ),
            root_surface_id: SurfaceId::default(),
            output_surface_lost: false,
            root_surface_resources_locked: true,
            inside_begin_frame_deadline_interval: false,
            needs_draw: false,
            expecting_root_surface_damage_because_of_resize: false,
            all_active_child_surfaces_ready_to_draw: false,
            pending_swaps: 0,
            root_surface_damaged: false,
            expect_damage_from_root_surface: false,
            child_surface_ids_damaged: HashSet::new(),
            child_surface_ids_damaged_prev: HashSet::new(),
            child_surface_ids_to_expect_damage_from: HashSet::new(),
            deadline: None,
            tracer: Tracer::none(),
        }
    }

    /// Installs a tracer.
    pub fn set_tracer(&mut self, tracer: Tracer) {
        self.tracer = tracer;
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> DisplaySchedulerConfig {
        self.config
    }

    /// Returns the handle steering the begin-frame source.
    #[must_use]
    pub fn control(&self) -> &BeginFrameControl {
        &self.control
    }

    /// Returns the current host time.
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.timer.now()
    }

    /// Marks whether the root surface's resources are unavailable, which
    /// blocks drawing.
    pub fn set_root_surface_resources_locked(&mut self, locked: bool) {
        self.root_surface_resources_locked = locked;
        self.schedule_begin_frame_deadline();
    }

    /// Draws at once if anything is pending, without waiting for the
    /// deadline. Used before a resize.
    pub fn force_immediate_swap_if_possible(&mut self, client: &mut dyn DisplaySchedulerClient) {
        let inside = self.inside_begin_frame_deadline_interval;
        self.attempt_draw_and_swap(client);
        if inside {
            self.control.did_finish_frame(0);
        }
    }

    /// Notes a resize: the root surface is expected to redraw at the new
    /// size before the display draws.
    pub fn display_resized(&mut self) {
        self.expecting_root_surface_damage_because_of_resize = true;
        self.expect_damage_from_root_surface = true;
        self.schedule_begin_frame_deadline();
    }

    /// Switches to a new root surface, treating it as damaged.
    pub fn set_new_root_surface(&mut self, id: SurfaceId) {
        self.root_surface_id = id;
        self.surface_damaged(id);
    }

    /// Records damage to a surface drawn by the display.
    pub fn surface_damaged(&mut self, id: SurfaceId) {
        self.needs_draw = true;
        if id == self.root_surface_id {
            self.root_surface_damaged = true;
            self.expecting_root_surface_damage_because_of_resize = false;
        } else {
            self.child_surface_ids_damaged.insert(id);
            self.all_active_child_surfaces_ready_to_draw = self
                .child_surface_ids_to_expect_damage_from
                .is_subset(&self.child_surface_ids_damaged);
        }
        self.control.set_needs_begin_frames(!self.output_surface_lost);
        self.schedule_begin_frame_deadline();
    }

    /// Stops all drawing. Sticky for the life of the scheduler.
    pub fn output_surface_lost(&mut self) {
        self.output_surface_lost = true;
        self.control.set_needs_begin_frames(false);
        self.schedule_begin_frame_deadline();
    }

    /// Starts a begin-frame interval.
    ///
    /// An interval that is still open has its deadline run first, so
    /// intervals never overlap.
    pub fn on_begin_frame(&mut self, args: &BeginFrameArgs, client: &mut dyn DisplaySchedulerClient) {
        if self.inside_begin_frame_deadline_interval {
            self.on_begin_frame_deadline(client);
        }
        self.observer.record(args, true);
        self.current_args = *args;
        self.current_args.deadline = args
            .deadline
            .saturating_sub(self.config.estimated_parent_draw_time);
        self.inside_begin_frame_deadline_interval = true;
        self.schedule_begin_frame_deadline();
    }

    /// Runs the deadline of the current interval.
    ///
    /// Does nothing outside an interval, as a cancelled deadline would.
    pub fn on_begin_frame_deadline(&mut self, client: &mut dyn DisplaySchedulerClient) {
        if !self.inside_begin_frame_deadline_interval {
            return;
        }
        self.attempt_draw_and_swap(client);
        self.control.did_finish_frame(0);
    }

    /// Records that a swap completed, which may unblock a throttled draw.
    pub fn did_swap_buffers_complete(&mut self) {
        debug_assert!(self.pending_swaps > 0, "swap completed that was never issued");
        self.pending_swaps = self.pending_swaps.saturating_sub(1);
        self.tracer.swap(&SwapEvent {
            now: self.timer.now(),
            complete: true,
            pending_swaps: self.pending_swaps,
        });
        self.schedule_begin_frame_deadline();
    }

    /// Returns when the current interval's deadline should run, and why.
    ///
    /// [`HostTime::ZERO`] means "immediately".
    #[must_use]
    pub fn desired_begin_frame_deadline_time(&self) -> (HostTime, DeadlineReason) {
        let full_interval = self.current_args.frame_time + self.current_args.interval;
        if self.output_surface_lost {
            return (HostTime::ZERO, DeadlineReason::OutputSurfaceLost);
        }
        if self.pending_swaps >= self.config.max_pending_swaps {
            return (full_interval, DeadlineReason::SwapThrottled);
        }
        if !self.needs_draw {
            return (full_interval, DeadlineReason::NoDamage);
        }
        if self.root_surface_resources_locked {
            return (full_interval, DeadlineReason::RootResourcesLocked);
        }
        let root_ready_to_draw = !self.expect_damage_from_root_surface || self.root_surface_damaged;
        if self.all_active_child_surfaces_ready_to_draw && root_ready_to_draw {
            return (HostTime::ZERO, DeadlineReason::AllSurfacesReady);
        }
        if self.expecting_root_surface_damage_because_of_resize {
            return (full_interval, DeadlineReason::WaitingForResize);
        }
        // Draw a little early in case the root is not going to redraw.
        if self.all_active_child_surfaces_ready_to_draw && self.expect_damage_from_root_surface {
            return (
                self.current_args
                    .deadline
                    .saturating_sub(self.config.estimated_parent_draw_time),
                DeadlineReason::RootAdjusted,
            );
        }
        (self.current_args.deadline, DeadlineReason::FullDeadline)
    }

    fn schedule_begin_frame_deadline(&mut self) {
        if !self.inside_begin_frame_deadline_interval {
            return;
        }
        let (desired, reason) = self.desired_begin_frame_deadline_time();
        if self.deadline == Some(desired) && self.timer.scheduled_at().is_some() {
            return;
        }
        let now = self.timer.now();
        self.deadline = Some(desired);
        self.timer.cancel();
        self.timer.schedule(desired.max(now));
        self.tracer.deadline(&DeadlineEvent {
            now,
            deadline: desired,
            reason,
        });
    }

    fn attempt_draw_and_swap(&mut self, client: &mut dyn DisplaySchedulerClient) {
        self.inside_begin_frame_deadline_interval = false;
        self.timer.cancel();
        self.deadline = None;

        if self.needs_draw && !self.output_surface_lost {
            if self.pending_swaps < self.config.max_pending_swaps && !self.root_surface_resources_locked {
                self.draw_and_swap(client);
            }
        } else {
            // Going idle: forget what was expected.
            self.child_surface_ids_to_expect_damage_from.clear();
            self.child_surface_ids_damaged_prev.clear();
            self.child_surface_ids_damaged.clear();
            self.all_active_child_surfaces_ready_to_draw = true;
            self.expect_damage_from_root_surface = false;
            self.control.set_needs_begin_frames(false);
        }
    }

    fn draw_and_swap(&mut self, client: &mut dyn DisplaySchedulerClient) {
        let result = client.draw_and_swap();
        let now = self.timer.now();
        self.tracer.draw_and_swap(&DrawAndSwapEvent {
            now,
            root: self.root_surface_id,
            drawn: result.drawn,
            swapped: result.swapped,
            damage: result.damage.into(),
            skip: result.skip,
        });
        if result.swapped {
            self.pending_swaps += 1;
            self.tracer.swap(&SwapEvent {
                now,
                complete: false,
                pending_swaps: self.pending_swaps,
            });
        }
        if !result.success {
            return;
        }

        self.child_surface_ids_to_expect_damage_from = self
            .child_surface_ids_damaged
            .intersection(&self.child_surface_ids_damaged_prev)
            .copied()
            .collect();
        core::mem::swap(
            &mut self.child_surface_ids_damaged_prev,
            &mut self.child_surface_ids_damaged,
        );
        self.child_surface_ids_damaged.clear();

        self.needs_draw = false;
        self.all_active_child_surfaces_ready_to_draw =
            self.child_surface_ids_to_expect_damage_from.is_empty();
        self.expect_damage_from_root_surface = self.root_surface_damaged;
        self.root_surface_damaged = false;
    }

    /// Returns the most recent begin frame the scheduler used.
    #[must_use]
    pub fn last_used_begin_frame_args(&self) -> Option<BeginFrameArgs> {
        self.observer.last_used()
    }

    /// Returns the root surface.
    #[must_use]
    pub fn root_surface_id(&self) -> SurfaceId {
        self.root_surface_id
    }

    /// Returns the number of swaps in flight.
    #[must_use]
    pub fn pending_swaps(&self) -> u32 {
        self.pending_swaps
    }

    /// Returns `true` if damage is waiting to be drawn.
    #[must_use]
    pub fn needs_draw(&self) -> bool {
        self.needs_draw
    }

    /// Returns `true` between a begin frame and its deadline.
    #[must_use]
    pub fn inside_begin_frame_deadline_interval(&self) -> bool {
        self.inside_begin_frame_deadline_interval
    }

    /// Returns the armed deadline, [`HostTime::ZERO`] meaning "immediately".
    #[must_use]
    pub fn scheduled_deadline(&self) -> Option<HostTime> {
        self.deadline
    }

    /// Returns `true` once the output surface was lost.
    #[must_use]
    pub fn is_output_surface_lost(&self) -> bool {
        self.output_surface_lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{Clock, ManualClock, ManualTimer};

    const INTERVAL: Duration = Duration(1_000);
    const PARENT: Duration = Duration(100);

    #[derive(Default)]
    struct Client {
        draws: u32,
        swap: bool,
    }

    impl DisplaySchedulerClient for Client {
        fn draw_and_swap(&mut self) -> DrawAndSwapResult {
            self.draws += 1;
            DrawAndSwapResult {
                success: true,
                drawn: true,
                swapped: self.swap,
                damage: Rect::new(0.0, 0.0, 1.0, 1.0),
                skip: None,
            }
        }
    }

    struct Fixture {
        clock: ManualClock,
        timer: ManualTimer,
        control: BeginFrameControl,
        scheduler: DisplayScheduler,
        client: Client,
    }

    const ROOT: SurfaceId = SurfaceId::new(1, 1);
    const CHILD: SurfaceId = SurfaceId::new(2, 1);

    fn fixture(max_pending_swaps: u32) -> Fixture {
        let clock = ManualClock::new(HostTime(10_000));
        let timer = ManualTimer::new(clock.clone());
        let control = BeginFrameControl::new();
        let scheduler = DisplayScheduler::new(
            DisplaySchedulerConfig {
                max_pending_swaps,
                estimated_parent_draw_time: PARENT,
            },
            control.clone(),
            Box::new(timer.clone()),
        );
        Fixture {
            clock,
            timer,
            control,
            scheduler,
            client: Client::default(),
        }
    }

    impl Fixture {
        fn begin_frame(&mut self) -> BeginFrameArgs {
            let now = self.clock.now();
            let args = BeginFrameArgs::normal(now, now + INTERVAL, INTERVAL);
            self.scheduler.on_begin_frame(&args, &mut self.client);
            args
        }

        /// Advances the clock to the armed deadline and runs it.
        fn fire_deadline(&mut self) {
            let at = self
                .timer
                .scheduled_at()
                .unwrap_or_else(|| panic!("no deadline armed"));
            if at > self.clock.now() {
                self.clock.set(at);
            }
            assert!(self.timer.take_due(), "deadline is due");
            self.scheduler.on_begin_frame_deadline(&mut self.client);
        }
    }

    #[test]
    fn all_surfaces_ready_draws_immediately() {
        let mut f = fixture(2);
        f.scheduler.set_root_surface_resources_locked(false);
        f.scheduler.set_new_root_surface(ROOT);
        f.scheduler.surface_damaged(CHILD);
        assert!(f.control.needs_begin_frames(), "damage asks for begin frames");

        f.begin_frame();
        f.fire_deadline();
        assert_eq!(f.client.draws, 1);

        f.clock.advance(INTERVAL);
        let args = f.begin_frame();
        assert_eq!(
            f.scheduler.desired_begin_frame_deadline_time(),
            (args.frame_time + INTERVAL, DeadlineReason::NoDamage)
        );
        f.scheduler.surface_damaged(CHILD);
        assert_eq!(
            f.scheduler.desired_begin_frame_deadline_time(),
            (args.deadline - PARENT - PARENT, DeadlineReason::RootAdjusted),
            "the root drew last frame and is still expected"
        );
        f.scheduler.surface_damaged(ROOT);
        assert_eq!(
            f.scheduler.desired_begin_frame_deadline_time(),
            (HostTime::ZERO, DeadlineReason::AllSurfacesReady)
        );
        assert_eq!(f.timer.scheduled_at(), Some(f.clock.now()), "armed for now");
        f.fire_deadline();
        assert_eq!(f.client.draws, 2);
    }

    #[test]
    fn locked_root_waits_a_full_interval() {
        let mut f = fixture(2);
        f.scheduler.set_new_root_surface(ROOT);
        let args = f.begin_frame();
        assert_eq!(
            f.scheduler.desired_begin_frame_deadline_time(),
            (args.frame_time + INTERVAL, DeadlineReason::RootResourcesLocked)
        );
        f.scheduler.set_root_surface_resources_locked(false);
        assert_eq!(
            f.scheduler.desired_begin_frame_deadline_time(),
            (args.deadline - PARENT, DeadlineReason::FullDeadline),
            "no children have drawn yet"
        );
        assert_eq!(
            f.timer.scheduled_at(),
            Some(args.deadline - PARENT),
            "unlocking re-arms the deadline"
        );
    }

    #[test]
    fn idle_deadline_stops_begin_frames() {
        let mut f = fixture(2);
        f.scheduler.set_root_surface_resources_locked(false);
        f.control.set_needs_begin_frames(true);
        f.begin_frame();
        f.fire_deadline();
        assert_eq!(f.client.draws, 0, "nothing to draw");
        assert!(!f.control.needs_begin_frames(), "going idle");
        assert_eq!(f.control.peek_finished_frame(), Some(0), "frame reported finished");
    }

    #[test]
    fn overlapping_begin_frames_run_the_previous_deadline() {
        let mut f = fixture(2);
        f.scheduler.set_root_surface_resources_locked(false);
        f.scheduler.set_new_root_surface(ROOT);
        f.scheduler.surface_damaged(CHILD);
        f.begin_frame();
        f.clock.advance(INTERVAL);
        f.begin_frame();
        assert_eq!(f.client.draws, 1, "the first interval drew before the second began");
        assert!(
            f.scheduler.inside_begin_frame_deadline_interval(),
            "second interval is open"
        );
    }

    #[test]
    fn swap_throttling_defers_until_completion() {
        let mut f = fixture(1);
        f.client.swap = true;
        f.scheduler.set_root_surface_resources_locked(false);
        f.scheduler.set_new_root_surface(ROOT);
        f.begin_frame();
        f.fire_deadline();
        assert_eq!(f.scheduler.pending_swaps(), 1);

        f.clock.advance(INTERVAL);
        f.scheduler.surface_damaged(ROOT);
        let args = f.begin_frame();
        assert_eq!(
            f.scheduler.desired_begin_frame_deadline_time(),
            (args.frame_time + INTERVAL, DeadlineReason::SwapThrottled)
        );
        f.scheduler.did_swap_buffers_complete();
        assert_eq!(
            f.scheduler.desired_begin_frame_deadline_time().1,
            DeadlineReason::AllSurfacesReady,
            "completion unblocks the draw"
        );
        f.fire_deadline();
        assert_eq!(f.client.draws, 2);
    }

    #[test]
    fn resize_waits_for_the_root() {
        let mut f = fixture(2);
        f.scheduler.set_root_surface_resources_locked(false);
        f.scheduler.set_new_root_surface(ROOT);
        f.begin_frame();
        f.fire_deadline();

        f.clock.advance(INTERVAL);
        f.scheduler.display_resized();
        f.scheduler.surface_damaged(CHILD);
        let args = f.begin_frame();
        assert_eq!(
            f.scheduler.desired_begin_frame_deadline_time(),
            (args.frame_time + INTERVAL, DeadlineReason::WaitingForResize)
        );
        f.scheduler.surface_damaged(ROOT);
        assert_eq!(
            f.scheduler.desired_begin_frame_deadline_time().1,
            DeadlineReason::AllSurfacesReady
        );
    }

    #[test]
    fn lost_output_surface_runs_the_deadline_at_once() {
        let mut f = fixture(2);
        f.scheduler.set_root_surface_resources_locked(false);
        f.scheduler.set_new_root_surface(ROOT);
        f.begin_frame();
        f.scheduler.output_surface_lost();
        assert_eq!(
            f.scheduler.desired_begin_frame_deadline_time(),
            (HostTime::ZERO, DeadlineReason::OutputSurfaceLost)
        );
        assert!(!f.control.needs_begin_frames(), "no more begin frames");
        f.fire_deadline();
        assert_eq!(f.client.draws, 0, "a lost surface never draws");
        f.scheduler.surface_damaged(ROOT);
        assert!(!f.control.needs_begin_frames(), "loss is sticky");
    }

    #[test]
    fn force_immediate_swap_draws_outside_the_deadline() {
        let mut f = fixture(2);
        f.scheduler.set_root_surface_resources_locked(false);
        f.scheduler.set_new_root_surface(ROOT);
        f.begin_frame();
        f.scheduler.force_immediate_swap_if_possible(&mut f.client);
        assert_eq!(f.client.draws, 1);
        assert_eq!(f.timer.scheduled_at(), None, "deadline cancelled");
        assert_eq!(f.control.take_finished_frame(), Some(0));
    }
}
