// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Host times
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use estuary_core::time::{HostTime, Timebase};
use estuary_core::trace::{
    AggregateEvent, BeginFrameEvent, DamageRect, DeadlineEvent, DrawAndSwapEvent,
    SurfaceCollectedEvent, SurfaceDamageEvent, SwapEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns its writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.timebase.ticks_to_nanos(t.ticks()) as f64 / 1000.0
    }
}

fn rect(d: &DamageRect) -> String {
    format!("{}x{}+{}+{}", d.width, d.height, d.x, d.y)
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        let _ = writeln!(
            self.writer,
            "[begin-frame] {:?} frame={:.1}µs deadline={:.1}µs{}{}",
            e.source,
            self.host_us(e.frame_time),
            self.host_us(e.deadline),
            if e.missed { " missed" } else { "" },
            if e.used { "" } else { " dropped" },
        );
    }

    fn on_deadline(&mut self, e: &DeadlineEvent) {
        let at = if e.deadline == HostTime::ZERO {
            "now".to_string()
        } else {
            format!("{:.1}µs", self.host_us(e.deadline))
        };
        let _ = writeln!(
            self.writer,
            "[deadline] at={at} armed={:.1}µs reason={:?}",
            self.host_us(e.now),
            e.reason,
        );
    }

    fn on_draw_and_swap(&mut self, e: &DrawAndSwapEvent) {
        let outcome = match (e.drawn, e.swapped) {
            (true, true) => "swapped",
            (true, false) => "drawn",
            _ => "skipped",
        };
        let _ = write!(
            self.writer,
            "[draw] {:?} {outcome} damage={} at {:.1}µs",
            e.root,
            rect(&e.damage),
            self.host_us(e.now),
        );
        let _ = match e.skip {
            Some(reason) => writeln!(self.writer, " ({reason:?})"),
            None => writeln!(self.writer),
        };
    }

    fn on_aggregate(&mut self, e: &AggregateEvent) {
        let _ = writeln!(
            self.writer,
            "[aggregate] {:?} surfaces={} passes={} damage={}{}",
            e.root,
            e.surfaces,
            e.passes,
            rect(&e.damage),
            if e.has_copy_requests { " copy" } else { "" },
        );
    }

    fn on_surfaces_collected(&mut self, e: &SurfaceCollectedEvent) {
        let _ = writeln!(
            self.writer,
            "[gc] freed={} remaining={}",
            e.freed, e.remaining,
        );
    }

    fn on_swap(&mut self, e: &SwapEvent) {
        let _ = writeln!(
            self.writer,
            "[swap:{}] pending={} at {:.1}µs",
            if e.complete { "complete" } else { "issued" },
            e.pending_swaps,
            self.host_us(e.now),
        );
    }

    fn on_surface_damage(&mut self, e: &SurfaceDamageEvent) {
        let _ = writeln!(
            self.writer,
            "  [surface] {:?} index={} damage={}",
            e.surface,
            e.frame_index,
            rect(&e.damage),
        );
    }
}
