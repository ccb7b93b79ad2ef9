// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vsync-aligned periodic tick generation.

use crate::time::{Duration, HostTime};

/// Ticks closer than `interval / DOUBLE_TICK_DIVISOR` to the previous tick are
/// pushed out by one interval.
const DOUBLE_TICK_DIVISOR: u64 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TickParameters {
    interval: Duration,
    tick_target: HostTime,
}

/// A periodic tick generator aligned to a timebase.
///
/// Ticks fall on the grid `timebase + k * interval`. The source never ticks
/// twice within half an interval, which absorbs jitter in timebase updates
/// and quick deactivate/activate cycles.
///
/// This is a pure state machine: it records the time of the next tick task
/// ([`pending_task_time`](Self::pending_task_time)) and the owner calls
/// [`on_timer_fired`](Self::on_timer_fired) once that time is reached.
#[derive(Clone, Debug)]
pub struct DelayBasedTimeSource {
    active: bool,
    current: TickParameters,
    next: TickParameters,
    last_tick_time: Option<HostTime>,
    task_time: Option<HostTime>,
}

impl DelayBasedTimeSource {
    /// Creates an inactive source with a zero timebase.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        assert!(!interval.is_zero(), "tick interval must not be zero");
        let parameters = TickParameters {
            interval,
            tick_target: HostTime::ZERO,
        };
        Self {
            active: false,
            current: parameters,
            next: parameters,
            last_tick_time: None,
            task_time: None,
        }
    }

    /// Starts or stops ticking.
    ///
    /// Activating returns the time of a tick missed while inactive, if one
    /// elapsed more than half an interval after the last delivered tick. The
    /// caller delivers it as a missed notification.
    pub fn set_active(&mut self, active: bool, now: HostTime) -> Option<HostTime> {
        if active == self.active {
            return None;
        }
        self.active = active;
        if !active {
            self.task_time = None;
            return None;
        }

        self.post_next_tick_task(now);

        let last_if_always_active = self
            .current
            .tick_target
            .checked_sub(self.current.interval)?;
        let qualifies = match self.last_tick_time {
            Some(last) => {
                last_if_always_active > last + self.current.interval / DOUBLE_TICK_DIVISOR
            }
            None => true,
        };
        if qualifies {
            self.last_tick_time = Some(last_if_always_active);
            Some(last_if_always_active)
        } else {
            None
        }
    }

    /// Returns whether the source is ticking.
    #[inline]
    #[must_use]
    pub fn active(&self) -> bool {
        self.active
    }

    /// Updates the tick grid.
    ///
    /// The new parameters take effect at the next tick. If the interval
    /// changed by more than a quarter, or the phase moved by more than a
    /// quarter interval in either direction, the source restarts at once so
    /// the next tick lands on the new grid.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn set_timebase_and_interval(&mut self, timebase: HostTime, interval: Duration, now: HostTime) {
        assert!(!interval.is_zero(), "tick interval must not be zero");
        self.next = TickParameters {
            interval,
            tick_target: timebase,
        };
        if !self.active {
            return;
        }

        let interval_ticks = u128::from(interval.ticks());
        let interval_delta = u128::from(interval.abs_diff(self.current.interval).ticks());
        if interval_delta * 4 > interval_ticks {
            self.restart(now);
            return;
        }

        let target_delta = u128::from(timebase.ticks().abs_diff(self.current.tick_target.ticks()));
        let phase = target_delta % interval_ticks;
        if phase * 4 > interval_ticks && phase * 4 < interval_ticks * 3 {
            self.restart(now);
        }
    }

    /// Returns the interval that applies from the next tick on.
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.next.interval
    }

    /// Returns the time of the most recent tick.
    #[inline]
    #[must_use]
    pub fn last_tick_time(&self) -> Option<HostTime> {
        self.last_tick_time
    }

    /// Returns when the next tick is expected, or `None` while inactive.
    #[inline]
    #[must_use]
    pub fn next_tick_time(&self) -> Option<HostTime> {
        self.active.then_some(self.current.tick_target)
    }

    /// Returns when the owner should call [`on_timer_fired`](Self::on_timer_fired).
    #[inline]
    #[must_use]
    pub fn pending_task_time(&self) -> Option<HostTime> {
        self.task_time
    }

    /// Fires the pending tick and schedules the next one.
    ///
    /// Returns the time of the tick that fired.
    ///
    /// # Panics
    ///
    /// Panics if the source is inactive.
    pub fn on_timer_fired(&mut self, now: HostTime) -> HostTime {
        assert!(self.active, "tick fired on an inactive time source");
        let tick = self.current.tick_target;
        self.last_tick_time = Some(tick);
        self.post_next_tick_task(now);
        tick
    }

    fn restart(&mut self, now: HostTime) {
        self.set_active(false, now);
        self.set_active(true, now);
    }

    fn post_next_tick_task(&mut self, now: HostTime) {
        let target = self.next_tick_target(now);
        self.task_time = Some(target);
        self.next.tick_target = target;
        self.current = self.next;
    }

    fn next_tick_target(&self, now: HostTime) -> HostTime {
        let interval = self.next.interval;
        let mut target = now.snapped_to_next_tick(self.next.tick_target, interval);
        if let Some(last) = self.last_tick_time
            && target.saturating_duration_since(last) <= interval / DOUBLE_TICK_DIVISOR
        {
            target = target + interval;
        }
        target
    }
}
