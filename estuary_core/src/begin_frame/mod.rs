// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Begin-frame pacing: sources, observers, and their control handle.
//!
//! A [`BeginFrameSource`] produces timed [`BeginFrameArgs`] notifications for
//! exactly one [`BeginFrameObserver`]. Three sources are provided:
//!
//! - [`BackToBackBeginFrameSource`] issues the next frame as soon as the
//!   observer reports the previous one finished. Used for unthrottled and
//!   headless output.
//! - [`SyntheticBeginFrameSource`] ticks on a fixed interval aligned to an
//!   externally updatable vsync timebase.
//! - [`BeginFrameSourceMultiplexer`] forwards from one of several child
//!   sources, keeping frame times strictly increasing across switches.
//!
//! # Control flow
//!
//! Observers steer their source through a [`BeginFrameControl`], a cheap
//! shared handle holding the "needs begin frames" flag and the most recent
//! "did finish frame" report. Sources never call into their observer while
//! the observer could be calling into them: the host pumps each source from
//! its event loop, and the source applies pending control changes, fires any
//! due tick, and delivers at most one notification per pump.
//!
//! ```text
//!   host loop ──► source.pump(now) ──► observer.on_begin_frame(args)
//!       ▲                ▲                        │
//!       │                └── BeginFrameControl ◄──┘ set_needs / did_finish
//!       └── source.next_wakeup()
//! ```

mod back_to_back;
mod multiplexer;
mod synthetic;
mod time_source;

pub use back_to_back::BackToBackBeginFrameSource;
pub use multiplexer::{BeginFrameSourceMultiplexer, SourceKey};
pub use synthetic::{SyntheticBeginFrameSource, SyntheticSourceConfig};
pub use time_source::DelayBasedTimeSource;

use alloc::rc::Rc;
use core::cell::{Cell, RefCell};

use crate::time::{Duration, HostTime};
use crate::trace::{BeginFrameEvent, BeginFrameSourceKind, Tracer};

/// Whether a notification is a regular tick or stands in for a missed one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BeginFrameArgsType {
    /// A regular tick.
    #[default]
    Normal,
    /// A tick that elapsed while the observer was not listening, delivered
    /// late so the observer can catch up.
    Missed,
}

/// Timing of one begin-frame notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeginFrameArgs {
    /// When the frame nominally starts.
    pub frame_time: HostTime,
    /// When the observer should have finished its work.
    pub deadline: HostTime,
    /// Expected time until the next notification.
    pub interval: Duration,
    /// Regular or missed tick.
    pub kind: BeginFrameArgsType,
}

impl BeginFrameArgs {
    /// 60 Hz at a nanosecond timebase.
    pub const DEFAULT_INTERVAL: Duration = Duration(16_666_667);

    /// Time budgeted for a parent compositor to draw after its children,
    /// one third of the default interval.
    pub const DEFAULT_ESTIMATED_PARENT_DRAW_TIME: Duration =
        Duration(Self::DEFAULT_INTERVAL.0 / 3);

    /// Creates args.
    #[inline]
    #[must_use]
    pub const fn new(
        frame_time: HostTime,
        deadline: HostTime,
        interval: Duration,
        kind: BeginFrameArgsType,
    ) -> Self {
        Self {
            frame_time,
            deadline,
            interval,
            kind,
        }
    }

    /// Creates args for a regular tick.
    #[inline]
    #[must_use]
    pub const fn normal(frame_time: HostTime, deadline: HostTime, interval: Duration) -> Self {
        Self::new(frame_time, deadline, interval, BeginFrameArgsType::Normal)
    }
}

/// Receives begin-frame notifications.
pub trait BeginFrameObserver {
    /// Handles one notification.
    ///
    /// The observer decides whether it uses the notification; only used
    /// notifications may change [`last_used_begin_frame_args`].
    ///
    /// [`last_used_begin_frame_args`]: Self::last_used_begin_frame_args
    fn on_begin_frame(&mut self, args: &BeginFrameArgs);

    /// Returns the most recent notification this observer used, or `None` if
    /// it has not used any.
    fn last_used_begin_frame_args(&self) -> Option<BeginFrameArgs>;
}

/// Bookkeeping every [`BeginFrameObserver`] needs.
///
/// Observers record each notification with whether they used it, and answer
/// [`BeginFrameObserver::last_used_begin_frame_args`] from here.
#[derive(Clone, Copy, Debug, Default)]
pub struct BeginFrameObserverState {
    last_used: Option<BeginFrameArgs>,
    dropped: u64,
}

impl BeginFrameObserverState {
    /// Records a notification.
    ///
    /// Used notifications become the last used args; dropped ones only bump
    /// the dropped counter.
    pub fn record(&mut self, args: &BeginFrameArgs, used: bool) {
        if let Some(last) = self.last_used {
            debug_assert!(
                args.frame_time > last.frame_time,
                "begin-frame time did not advance: {:?} after {:?}",
                args.frame_time,
                last.frame_time
            );
        }
        if used {
            self.last_used = Some(*args);
        } else {
            self.dropped += 1;
        }
    }

    /// Returns the last used args.
    #[inline]
    #[must_use]
    pub fn last_used(&self) -> Option<BeginFrameArgs> {
        self.last_used
    }

    /// Returns how many notifications were dropped.
    #[inline]
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

#[derive(Debug, Default)]
struct ControlState {
    needs_begin_frames: Cell<bool>,
    finished_frame: Cell<Option<usize>>,
}

/// Shared handle through which an observer steers its source.
///
/// Clones refer to the same state. Changes take effect the next time the
/// source is pumped.
#[derive(Clone, Debug, Default)]
pub struct BeginFrameControl {
    state: Rc<ControlState>,
}

impl BeginFrameControl {
    /// Creates a control with begin frames not needed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the source to start or stop delivering notifications.
    pub fn set_needs_begin_frames(&self, needs: bool) {
        self.state.needs_begin_frames.set(needs);
    }

    /// Returns whether notifications are requested.
    #[must_use]
    pub fn needs_begin_frames(&self) -> bool {
        self.state.needs_begin_frames.get()
    }

    /// Reports that the observer finished a frame with `remaining_frames`
    /// still outstanding. Zero lets a back-to-back source issue the next
    /// frame.
    pub fn did_finish_frame(&self, remaining_frames: usize) {
        self.state.finished_frame.set(Some(remaining_frames));
    }

    /// Returns the latest unconsumed finish report without consuming it.
    #[must_use]
    pub fn peek_finished_frame(&self) -> Option<usize> {
        self.state.finished_frame.get()
    }

    /// Consumes the latest finish report.
    pub fn take_finished_frame(&self) -> Option<usize> {
        self.state.finished_frame.take()
    }
}

/// Produces begin-frame notifications for a single observer.
pub trait BeginFrameSource {
    /// Attaches the observer.
    ///
    /// # Panics
    ///
    /// Panics if an observer is already attached.
    fn add_observer(&mut self, observer: Rc<RefCell<dyn BeginFrameObserver>>);

    /// Detaches the observer.
    ///
    /// # Panics
    ///
    /// Panics if `observer` is not the attached observer.
    fn remove_observer(&mut self, observer: &Rc<RefCell<dyn BeginFrameObserver>>);

    /// Returns the handle the observer steers this source with.
    fn control(&self) -> BeginFrameControl;

    /// Applies pending control changes and returns the notification due at
    /// `now`, if any, without delivering it.
    fn poll_begin_frame(&mut self, now: HostTime) -> Option<BeginFrameArgs>;

    /// Polls and delivers at most one notification to the observer.
    ///
    /// Returns `true` if a notification was delivered.
    fn pump(&mut self, now: HostTime) -> bool;

    /// Returns the earliest time at which [`pump`](Self::pump) may deliver,
    /// or `None` if the source is idle. A time in the past means "now".
    fn next_wakeup(&self) -> Option<HostTime>;

    /// Installs a tracer.
    fn set_tracer(&mut self, tracer: Tracer);

    /// Shorthand for `self.control().set_needs_begin_frames(needs)`.
    fn set_needs_begin_frames(&mut self, needs: bool) {
        self.control().set_needs_begin_frames(needs);
    }

    /// Shorthand for `self.control().did_finish_frame(remaining_frames)`.
    fn did_finish_frame(&mut self, remaining_frames: usize) {
        self.control().did_finish_frame(remaining_frames);
    }
}

/// The single observer slot every source carries.
#[derive(Default)]
pub(crate) struct ObserverSlot {
    observer: Option<Rc<RefCell<dyn BeginFrameObserver>>>,
}

impl core::fmt::Debug for ObserverSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObserverSlot")
            .field("attached", &self.observer.is_some())
            .finish()
    }
}

impl ObserverSlot {
    pub(crate) fn add(&mut self, observer: Rc<RefCell<dyn BeginFrameObserver>>) {
        assert!(
            self.observer.is_none(),
            "begin-frame source already has an observer"
        );
        self.observer = Some(observer);
    }

    pub(crate) fn remove(&mut self, observer: &Rc<RefCell<dyn BeginFrameObserver>>) {
        assert!(
            self.observer
                .as_ref()
                .is_some_and(|current| Rc::ptr_eq(current, observer)),
            "removing an observer that is not attached"
        );
        self.observer = None;
    }

    pub(crate) fn last_used(&self) -> Option<BeginFrameArgs> {
        self.observer
            .as_ref()
            .and_then(|observer| observer.borrow().last_used_begin_frame_args())
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.observer.is_some()
    }

    /// Delivers `args` and traces whether the observer used them.
    pub(crate) fn deliver(
        &self,
        args: &BeginFrameArgs,
        source: BeginFrameSourceKind,
        tracer: &Tracer,
    ) -> bool {
        let Some(observer) = &self.observer else {
            return false;
        };
        observer.borrow_mut().on_begin_frame(args);
        if tracer.is_enabled() {
            let used = observer.borrow().last_used_begin_frame_args() == Some(*args);
            tracer.begin_frame(&BeginFrameEvent {
                source,
                frame_time: args.frame_time,
                deadline: args.deadline,
                interval: args.interval,
                missed: args.kind == BeginFrameArgsType::Missed,
                used,
            });
        }
        true
    }
}
