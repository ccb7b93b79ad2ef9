// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Switching between several begin-frame sources.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use super::{BeginFrameArgs, BeginFrameControl, BeginFrameObserver, BeginFrameSource, ObserverSlot};
use crate::time::{Duration, HostTime};
use crate::trace::{BeginFrameSourceKind, Tracer};

/// Identifies a child source of a [`BeginFrameSourceMultiplexer`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceKey(u32);

impl fmt::Debug for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceKey({})", self.0)
    }
}

/// Forwards notifications from one of several owned child sources.
///
/// Only the active child is asked for begin frames; finish reports are
/// forwarded to it. A notification is forwarded only if its frame time is
/// later than the observer's last used frame time plus the minimum interval,
/// which keeps frame times strictly increasing when switching between
/// sources with unrelated clocks.
pub struct BeginFrameSourceMultiplexer {
    control: BeginFrameControl,
    observers: ObserverSlot,
    sources: Vec<(SourceKey, Box<dyn BeginFrameSource>)>,
    active: Option<SourceKey>,
    next_key: u32,
    minimum_interval: Duration,
    needs_begin_frames: bool,
    tracer: Tracer,
}

impl fmt::Debug for BeginFrameSourceMultiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeginFrameSourceMultiplexer")
            .field("sources", &self.sources.len())
            .field("active", &self.active)
            .field("minimum_interval", &self.minimum_interval)
            .finish_non_exhaustive()
    }
}

impl Default for BeginFrameSourceMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl BeginFrameSourceMultiplexer {
    /// Creates a multiplexer with no children.
    #[must_use]
    pub fn new() -> Self {
        Self {
            control: BeginFrameControl::new(),
            observers: ObserverSlot::default(),
            sources: Vec::new(),
            active: None,
            next_key: 0,
            minimum_interval: Duration::ZERO,
            needs_begin_frames: false,
            tracer: Tracer::none(),
        }
    }

    /// Takes ownership of a child source.
    pub fn add_source(&mut self, source: Box<dyn BeginFrameSource>) -> SourceKey {
        let key = SourceKey(self.next_key);
        self.next_key += 1;
        source.control().set_needs_begin_frames(false);
        self.sources.push((key, source));
        key
    }

    /// Gives back a child source.
    ///
    /// # Panics
    ///
    /// Panics if `key` is unknown or names the active source.
    pub fn remove_source(&mut self, key: SourceKey) -> Box<dyn BeginFrameSource> {
        assert!(self.active != Some(key), "cannot remove the active source {key:?}");
        let index = self.index_of(key);
        self.sources.remove(index).1
    }

    /// Makes `key` the active source, or deactivates all with `None`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is unknown.
    pub fn set_active_source(&mut self, key: Option<SourceKey>) {
        if let Some(key) = key {
            _ = self.index_of(key);
        }
        self.active = key;
    }

    /// Returns the active source.
    #[must_use]
    pub fn active_source(&self) -> Option<SourceKey> {
        self.active
    }

    /// Sets the minimum spacing between forwarded frame times.
    pub fn set_minimum_interval(&mut self, interval: Duration) {
        self.minimum_interval = interval;
    }

    fn index_of(&self, key: SourceKey) -> usize {
        self.sources
            .iter()
            .position(|(k, _)| *k == key)
            .unwrap_or_else(|| panic!("unknown begin-frame source {key:?}"))
    }

    fn is_increasing(&self, args: &BeginFrameArgs) -> bool {
        if !self.observers.is_attached() {
            return false;
        }
        match self.observers.last_used() {
            None => true,
            Some(last) => args.frame_time > last.frame_time + self.minimum_interval,
        }
    }
}

impl BeginFrameSource for BeginFrameSourceMultiplexer {
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
        let needs = self.control.needs_begin_frames();
        self.needs_begin_frames = needs;
        let finished = self.control.take_finished_frame();

        let mut forwarded = None;
        for (key, source) in &mut self.sources {
            let is_active = self.active == Some(*key);
            let child = source.control();
            child.set_needs_begin_frames(is_active && needs);
            if is_active && let Some(remaining) = finished {
                child.did_finish_frame(remaining);
            }
            let args = source.poll_begin_frame(now);
            if is_active {
                forwarded = args;
            }
        }
        forwarded.filter(|args| self.is_increasing(args))
    }

    fn pump(&mut self, now: HostTime) -> bool {
        match self.poll_begin_frame(now) {
            Some(args) => self
                .observers
                .deliver(&args, BeginFrameSourceKind::Multiplexer, &self.tracer),
            None => false,
        }
    }

    fn next_wakeup(&self) -> Option<HostTime> {
        if self.control.needs_begin_frames() != self.needs_begin_frames
            || self.control.peek_finished_frame().is_some()
        {
            return Some(HostTime::ZERO);
        }
        self.sources
            .iter()
            .filter_map(|(_, source)| source.next_wakeup())
            .min()
    }

    fn set_tracer(&mut self, tracer: Tracer) {
        self.tracer = tracer;
    }
}
