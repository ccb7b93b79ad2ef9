// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Clock and single-slot deadline timer abstractions.
//!
//! The display scheduler's begin-frame deadline is the one asynchronous
//! boundary of the compositor. It is expressed through [`DeadlineTimer`]: the
//! scheduler arms or cancels a single wake-up, and the host's event loop calls
//! back into the [`Display`](crate::display::Display) when the armed time
//! passes.
//!
//! [`ManualClock`] and [`ManualTimer`] implement these traits over a shared
//! simulated clock so tests and headless hosts can drive time explicitly:
//!
//! ```
//! use estuary_core::time::{Duration, HostTime};
//! use estuary_core::timer::{DeadlineTimer, ManualClock, ManualTimer};
//!
//! let clock = ManualClock::new(HostTime(1_000));
//! let mut timer = ManualTimer::new(clock.clone());
//! timer.schedule(HostTime(1_500));
//! assert!(!timer.take_due());
//! clock.advance(Duration(500));
//! assert!(timer.take_due());
//! assert_eq!(timer.scheduled_at(), None);
//! ```

use alloc::rc::Rc;
use core::cell::Cell;

use crate::time::{Duration, HostTime};

/// A monotonic time source.
pub trait Clock {
    /// Returns the current host time.
    fn now(&self) -> HostTime;
}

/// A single-slot, cancelable delayed task.
///
/// At most one wake-up is armed at a time; scheduling again replaces it.
pub trait DeadlineTimer {
    /// Returns the current host time.
    fn now(&self) -> HostTime;

    /// Arms the slot so the owner is woken at or after `at`, replacing any
    /// previously armed wake-up.
    fn schedule(&mut self, at: HostTime);

    /// Disarms the slot. Does nothing if nothing is armed.
    fn cancel(&mut self);

    /// Returns the armed wake-up time, if any.
    fn scheduled_at(&self) -> Option<HostTime>;
}

/// A simulated clock shared by clones.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<HostTime>>,
}

impl ManualClock {
    /// Creates a clock starting at `now`.
    #[must_use]
    pub fn new(now: HostTime) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Moves the clock to `now`.
    ///
    /// # Panics
    ///
    /// Panics if `now` is earlier than the current time.
    pub fn set(&self, now: HostTime) {
        assert!(now >= self.now.get(), "clock must not run backwards");
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> HostTime {
        self.now.get()
    }
}

/// A [`DeadlineTimer`] over a [`ManualClock`].
///
/// Clones share both the clock and the armed slot, so a host can keep one
/// clone to poll while the scheduler owns another.
#[derive(Clone, Debug)]
pub struct ManualTimer {
    clock: ManualClock,
    slot: Rc<Cell<Option<HostTime>>>,
}

impl ManualTimer {
    /// Creates a disarmed timer reading the given clock.
    #[must_use]
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            slot: Rc::new(Cell::new(None)),
        }
    }

    /// Returns `true` if the armed wake-up time has been reached.
    #[must_use]
    pub fn is_due(&self) -> bool {
        self.slot.get().is_some_and(|at| at <= self.clock.now())
    }

    /// Disarms and returns `true` if the armed wake-up time has been reached.
    ///
    /// The host calls this from its event loop and, when it returns `true`,
    /// delivers the deadline to the timer's owner.
    pub fn take_due(&self) -> bool {
        if self.is_due() {
            self.slot.set(None);
            true
        } else {
            false
        }
    }

    /// Returns the clock this timer reads.
    #[must_use]
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }
}

impl DeadlineTimer for ManualTimer {
    fn now(&self) -> HostTime {
        self.clock.now()
    }

    fn schedule(&mut self, at: HostTime) {
        self.slot.set(Some(at));
    }

    fn cancel(&mut self) {
        self.slot.set(None);
    }

    fn scheduled_at(&self) -> Option<HostTime> {
        self.slot.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_time() {
        let clock = ManualClock::new(HostTime(10));
        let other = clock.clone();
        other.advance(Duration(5));
        assert_eq!(clock.now(), HostTime(15), "clones must observe the same time");
    }

    #[test]
    fn reschedule_replaces_slot() {
        let clock = ManualClock::new(HostTime(0));
        let mut timer = ManualTimer::new(clock.clone());
        timer.schedule(HostTime(100));
        timer.schedule(HostTime(50));
        assert_eq!(timer.scheduled_at(), Some(HostTime(50)));
        clock.set(HostTime(60));
        assert!(timer.take_due(), "replaced slot fires at the new time");
        assert!(!timer.take_due(), "a fired slot is disarmed");
    }

    #[test]
    fn cancel_disarms() {
        let clock = ManualClock::new(HostTime(0));
        let mut timer = ManualTimer::new(clock.clone());
        timer.schedule(HostTime(0));
        timer.cancel();
        assert!(!timer.is_due(), "cancelled slot never fires");
    }

    #[test]
    #[should_panic(expected = "clock must not run backwards")]
    fn clock_rejects_going_backwards() {
        let clock = ManualClock::new(HostTime(10));
        clock.set(HostTime(9));
    }
}
