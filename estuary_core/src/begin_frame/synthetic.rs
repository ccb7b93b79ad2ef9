// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed-interval begin-frame source.

use alloc::rc::Rc;
use core::cell::RefCell;

use super::{
    BeginFrameArgs, BeginFrameArgsType, BeginFrameControl, BeginFrameObserver, BeginFrameSource,
    DelayBasedTimeSource, ObserverSlot,
};
use crate::time::{Duration, HostTime};
use crate::trace::{BeginFrameSourceKind, Tracer};

/// Configuration for a [`SyntheticBeginFrameSource`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyntheticSourceConfig {
    /// Tick interval until the first vsync update.
    pub initial_interval: Duration,
    /// Subtracted from the next tick time to form each notification's
    /// deadline.
    pub estimated_parent_draw_time: Duration,
}

impl SyntheticSourceConfig {
    /// 60 Hz with the default parent draw time.
    pub const DEFAULT: Self = Self {
        initial_interval: BeginFrameArgs::DEFAULT_INTERVAL,
        estimated_parent_draw_time: BeginFrameArgs::DEFAULT_ESTIMATED_PARENT_DRAW_TIME,
    };

    /// A refresh rate of `rate` Hz at a nanosecond timebase, budgeting a third
    /// of the interval for the parent draw.
    ///
    /// # Panics
    ///
    /// Panics if `rate` is zero.
    #[must_use]
    pub const fn hz(rate: u64) -> Self {
        assert!(rate != 0, "refresh rate must not be zero");
        let interval = Duration(1_000_000_000 / rate);
        Self {
            initial_interval: interval,
            estimated_parent_draw_time: Duration(interval.0 / 3),
        }
    }
}

impl Default for SyntheticSourceConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Ticks on a fixed interval aligned to a vsync timebase.
///
/// Each tick produces one notification whose frame time is the tick time and
/// whose deadline is the next tick time minus the configured parent draw
/// time. Starting to need begin frames after a pause delivers the most recent
/// missed tick at once as a [`BeginFrameArgsType::Missed`] notification.
///
/// Finish reports are accepted and ignored: the pace is set by the clock, not
/// by the observer.
#[derive(Debug)]
pub struct SyntheticBeginFrameSource {
    control: BeginFrameControl,
    observers: ObserverSlot,
    time_source: DelayBasedTimeSource,
    config: SyntheticSourceConfig,
    needs_begin_frames: bool,
    tracer: Tracer,
}

impl SyntheticBeginFrameSource {
    /// Creates an idle source.
    #[must_use]
    pub fn new(config: SyntheticSourceConfig) -> Self {
        Self {
            control: BeginFrameControl::new(),
            observers: ObserverSlot::default(),
            time_source: DelayBasedTimeSource::new(config.initial_interval),
            config,
            needs_begin_frames: false,
            tracer: Tracer::none(),
        }
    }

    /// Realigns the tick grid to a new vsync timebase and interval.
    pub fn on_update_vsync_parameters(&mut self, timebase: HostTime, interval: Duration, now: HostTime) {
        self.time_source
            .set_timebase_and_interval(timebase, interval, now);
    }

    /// Returns the underlying tick generator.
    #[must_use]
    pub fn time_source(&self) -> &DelayBasedTimeSource {
        &self.time_source
    }

    fn args_for(&self, frame_time: HostTime, kind: BeginFrameArgsType) -> BeginFrameArgs {
        let interval = self.time_source.interval();
        let next_tick = self
            .time_source
            .next_tick_time()
            .unwrap_or(frame_time + interval);
        let deadline = next_tick
            .saturating_sub(self.config.estimated_parent_draw_time)
            .max(frame_time);
        BeginFrameArgs::new(frame_time, deadline, interval, kind)
    }
}

impl BeginFrameSource for SyntheticBeginFrameSource {
    fn add_observer(&mut self, observer: Rc<RefCell<dyn BeginFrameObserver>>) {
        self.observers.add(observer);
    }

    fn remove_observer(&mut self, observer: &Rc<RefCell<dyn BeginFrameObserver>>) {
        self.observers.remove(observer);
    }

    fn control(&self) -> BeginFrameControl {
        self.control.clone()
    }

    fn poll_begin_frame(&mut self, now: HostTime) -> Option<BeginFrameArgs> {
        _ = self.control.take_finished_frame();
        let needs = self.control.needs_begin_frames();
        if needs != self.needs_begin_frames {
            self.needs_begin_frames = needs;
            if let Some(missed) = self.time_source.set_active(needs, now) {
                return Some(self.args_for(missed, BeginFrameArgsType::Missed));
            }
        }
        match self.time_source.pending_task_time() {
            Some(due) if due <= now && self.time_source.active() => {
                let tick = self.time_source.on_timer_fired(now);
                Some(self.args_for(tick, BeginFrameArgsType::Normal))
            }
            _ => None,
        }
    }

    fn pump(&mut self, now: HostTime) -> bool {
        match self.poll_begin_frame(now) {
            Some(args) => self
                .observers
                .deliver(&args, BeginFrameSourceKind::Synthetic, &self.tracer),
            None => false,
        }
    }

    fn next_wakeup(&self) -> Option<HostTime> {
        let needs = self.control.needs_begin_frames();
        if needs != self.needs_begin_frames {
            return needs.then_some(HostTime::ZERO);
        }
        self.time_source.pending_task_time()
    }

    fn set_tracer(&mut self, tracer: Tracer) {
        self.tracer = tracer;
    }
}
