// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Unthrottled begin-frame source.

use alloc::rc::Rc;
use core::cell::RefCell;

use super::{BeginFrameArgs, BeginFrameControl, BeginFrameObserver, BeginFrameSource, ObserverSlot};
use crate::time::{Duration, HostTime};
use crate::trace::{BeginFrameSourceKind, Tracer};

/// Issues the next notification as soon as the previous frame finished.
///
/// A notification becomes pending when begin frames start being needed, and
/// again whenever the observer reports [`did_finish_frame(0)`]. Pending sends
/// coalesce: many finish reports between two pumps still yield one
/// notification.
///
/// [`did_finish_frame(0)`]: BeginFrameControl::did_finish_frame
#[derive(Debug)]
pub struct BackToBackBeginFrameSource {
    control: BeginFrameControl,
    observers: ObserverSlot,
    needs_begin_frames: bool,
    send_pending: bool,
    last_frame_time: Option<HostTime>,
    interval: Duration,
    tracer: Tracer,
}

impl Default for BackToBackBeginFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BackToBackBeginFrameSource {
    /// Creates an idle source using [`BeginFrameArgs::DEFAULT_INTERVAL`] as
    /// the advertised interval.
    #[must_use]
    pub fn new() -> Self {
        Self {
            control: BeginFrameControl::new(),
            observers: ObserverSlot::default(),
            needs_begin_frames: false,
            send_pending: false,
            last_frame_time: None,
            interval: BeginFrameArgs::DEFAULT_INTERVAL,
            tracer: Tracer::none(),
        }
    }

    fn apply_control(&mut self) {
        let needs = self.control.needs_begin_frames();
        if needs != self.needs_begin_frames {
            self.needs_begin_frames = needs;
            if needs {
                self.send_pending = true;
            }
        }
        if self.control.take_finished_frame() == Some(0) && needs {
            self.send_pending = true;
        }
    }
}

impl BeginFrameSource for BackToBackBeginFrameSource {
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
        self.apply_control();
        if !core::mem::take(&mut self.send_pending) || !self.needs_begin_frames {
            return None;
        }
        // Keep frame times strictly increasing even if the clock has not moved.
        let frame_time = match self.last_frame_time {
            Some(last) if now <= last => last + Duration(1),
            _ => now,
        };
        self.last_frame_time = Some(frame_time);
        Some(BeginFrameArgs::normal(
            frame_time,
            frame_time + self.interval,
            self.interval,
        ))
    }

    fn pump(&mut self, now: HostTime) -> bool {
        match self.poll_begin_frame(now) {
            Some(args) => {
                self.observers
                    .deliver(&args, BeginFrameSourceKind::BackToBack, &self.tracer)
            }
            None => false,
        }
    }

    fn next_wakeup(&self) -> Option<HostTime> {
        let needs = self.control.needs_begin_frames();
        let pending = self.send_pending
            || (needs && !self.needs_begin_frames)
            || self.control.peek_finished_frame() == Some(0);
        (needs && pending).then_some(HostTime::ZERO)
    }

    fn set_tracer(&mut self, tracer: Tracer) {
        self.tracer = tracer;
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::attach;
    use super::*;

    #[test]
    fn first_frame_after_needs() {
        let mut source = BackToBackBeginFrameSource::new();
        let (observer, _) = attach(&mut source);
        assert!(!source.pump(HostTime(10)), "idle until begin frames are needed");
        assert_eq!(source.next_wakeup(), None);

        source.control().set_needs_begin_frames(true);
        assert_eq!(source.next_wakeup(), Some(HostTime::ZERO), "send is due at once");
        assert!(source.pump(HostTime(10)), "first frame is sent");
        let args = observer.borrow().received[0];
        assert_eq!(args.frame_time, HostTime(10));
        assert_eq!(args.deadline, HostTime(10) + BeginFrameArgs::DEFAULT_INTERVAL);
    }

    #[test]
    fn waits_for_finish_before_next_frame() {
        let mut source = BackToBackBeginFrameSource::new();
        let (observer, _) = attach(&mut source);
        let control = source.control();
        control.set_needs_begin_frames(true);
        assert!(source.pump(HostTime(10)), "first frame is sent");
        assert!(!source.pump(HostTime(20)), "no frame until the observer finishes");

        control.did_finish_frame(1);
        assert!(!source.pump(HostTime(25)), "frames still outstanding");

        control.did_finish_frame(0);
        control.did_finish_frame(0);
        assert!(source.pump(HostTime(30)), "finish(0) releases the next frame");
        assert!(!source.pump(HostTime(31)), "finish reports coalesce into one frame");
        assert_eq!(observer.borrow().received.len(), 2);
    }

    #[test]
    fn frame_times_strictly_increase_on_a_frozen_clock() {
        let mut source = BackToBackBeginFrameSource::new();
        let (observer, _) = attach(&mut source);
        let control = source.control();
        control.set_needs_begin_frames(true);
        for _ in 0..3 {
            assert!(source.pump(HostTime(50)), "one frame per finish report");
            control.did_finish_frame(0);
        }
        let times: alloc::vec::Vec<_> = observer
            .borrow()
            .received
            .iter()
            .map(|a| a.frame_time)
            .collect();
        assert_eq!(times, [HostTime(50), HostTime(51), HostTime(52)]);
    }

    #[test]
    fn stopping_cancels_pending_send() {
        let mut source = BackToBackBeginFrameSource::new();
        let (_observer, _) = attach(&mut source);
        let control = source.control();
        control.set_needs_begin_frames(true);
        control.set_needs_begin_frames(false);
        assert!(!source.pump(HostTime(5)), "a cancelled request sends nothing");
        assert_eq!(source.next_wakeup(), None);
    }
}
