// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format export.
//!
//! [`ChromeTraceSink`] buffers events as [Chrome Trace Event Format][spec]
//! objects and [`export`](ChromeTraceSink::export)s them as one JSON array,
//! suitable for loading into `chrome://tracing` or
//! [Perfetto](https://ui.perfetto.dev/).
//!
//! Events without a timestamp of their own (aggregation, collection, surface
//! damage) are stamped with the latest time seen.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use estuary_core::time::{HostTime, Timebase};
use estuary_core::trace::{
    AggregateEvent, BeginFrameEvent, DamageRect, DeadlineEvent, DrawAndSwapEvent,
    SurfaceCollectedEvent, SurfaceDamageEvent, SwapEvent, TraceSink,
};

/// Buffers trace events in Chrome Trace Event Format.
#[derive(Debug)]
pub struct ChromeTraceSink {
    events: Vec<Value>,
    timebase: Timebase,
    last_us: f64,
}

impl ChromeTraceSink {
    /// Creates an empty sink converting host times with `timebase`.
    #[must_use]
    pub fn new(timebase: Timebase) -> Self {
        Self {
            events: Vec::new(),
            timebase,
            last_us: 0.0,
        }
    }

    /// Returns the buffered events.
    #[must_use]
    pub fn events(&self) -> &[Value] {
        &self.events
    }

    /// Writes the buffered events as a JSON array.
    pub fn export(&self, writer: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(writer, &self.events)?;
        Ok(())
    }

    fn stamp(&mut self, t: HostTime) -> f64 {
        self.last_us = self.timebase.ticks_to_nanos(t.ticks()) as f64 / 1000.0;
        self.last_us
    }

    fn instant(&mut self, name: &str, cat: &str, ts: f64, args: Value) {
        self.events.push(json!({
            "ph": "i",
            "name": name,
            "cat": cat,
            "ts": ts,
            "pid": 0,
            "tid": 0,
            "s": "t",
            "args": args,
        }));
    }
}

fn rect(d: &DamageRect) -> Value {
    json!([d.x, d.y, d.width, d.height])
}

impl TraceSink for ChromeTraceSink {
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        let ts = self.stamp(e.frame_time);
        let deadline_us = self.timebase.ticks_to_nanos(e.deadline.ticks()) as f64 / 1000.0;
        self.instant(
            "BeginFrame",
            "BeginFrame",
            ts,
            json!({
                "source": format!("{:?}", e.source),
                "deadline_us": deadline_us,
                "interval_ticks": e.interval.ticks(),
                "missed": e.missed,
                "used": e.used,
            }),
        );
    }

    fn on_deadline(&mut self, e: &DeadlineEvent) {
        let ts = self.stamp(e.now);
        let deadline = if e.deadline == HostTime::ZERO {
            Value::from("now")
        } else {
            Value::from(self.timebase.ticks_to_nanos(e.deadline.ticks()) as f64 / 1000.0)
        };
        self.instant(
            "Deadline",
            "Scheduler",
            ts,
            json!({
                "deadline_us": deadline,
                "reason": format!("{:?}", e.reason),
            }),
        );
    }

    fn on_draw_and_swap(&mut self, e: &DrawAndSwapEvent) {
        let ts = self.stamp(e.now);
        self.instant(
            "DrawAndSwap",
            "Display",
            ts,
            json!({
                "root": format!("{:?}", e.root),
                "drawn": e.drawn,
                "swapped": e.swapped,
                "damage": rect(&e.damage),
                "skip": e.skip.map(|reason| format!("{reason:?}")),
            }),
        );
    }

    fn on_aggregate(&mut self, e: &AggregateEvent) {
        let ts = self.last_us;
        self.instant(
            "Aggregate",
            "Aggregator",
            ts,
            json!({
                "root": format!("{:?}", e.root),
                "surfaces": e.surfaces,
                "passes": e.passes,
                "damage": rect(&e.damage),
                "copy_requests": e.has_copy_requests,
            }),
        );
    }

    fn on_surfaces_collected(&mut self, e: &SurfaceCollectedEvent) {
        let ts = self.last_us;
        self.instant(
            "GarbageCollect",
            "Surfaces",
            ts,
            json!({
                "freed": e.freed,
                "remaining": e.remaining,
            }),
        );
    }

    fn on_swap(&mut self, e: &SwapEvent) {
        let ts = self.stamp(e.now);
        self.events.push(json!({
            "ph": "C",
            "name": "PendingSwaps",
            "ts": ts,
            "pid": 0,
            "tid": 0,
            "args": {
                "pending": e.pending_swaps,
            }
        }));
    }

    fn on_surface_damage(&mut self, e: &SurfaceDamageEvent) {
        let ts = self.last_us;
        self.instant(
            "SurfaceDamage",
            "Rich",
            ts,
            json!({
                "surface": format!("{:?}", e.surface),
                "frame_index": e.frame_index,
                "damage": rect(&e.damage),
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estuary_core::surface::SurfaceId;
    use estuary_core::time::Duration;
    use estuary_core::trace::{BeginFrameSourceKind, DeadlineReason};

    fn exported(sink: &ChromeTraceSink) -> Vec<Value> {
        let mut out = Vec::new();
        sink.export(&mut out).unwrap();
        serde_json::from_str(&String::from_utf8(out).unwrap()).unwrap()
    }

    #[test]
    fn export_produces_valid_json() {
        let mut sink = ChromeTraceSink::new(Timebase::NANOS);
        sink.on_begin_frame(&BeginFrameEvent {
            source: BeginFrameSourceKind::Synthetic,
            frame_time: HostTime(1_000_000),
            deadline: HostTime(1_011_111),
            interval: Duration(16_666_667),
            missed: false,
            used: true,
        });
        sink.on_deadline(&DeadlineEvent {
            now: HostTime(1_000_000),
            deadline: HostTime::ZERO,
            reason: DeadlineReason::AllSurfacesReady,
        });
        sink.on_aggregate(&AggregateEvent {
            root: SurfaceId::new(1, 1),
            surfaces: 2,
            passes: 3,
            damage: DamageRect {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            },
            has_copy_requests: false,
        });
        sink.on_swap(&SwapEvent {
            now: HostTime(1_002_000),
            complete: false,
            pending_swaps: 1,
        });

        let parsed = exported(&sink);
        assert_eq!(parsed.len(), 4, "one object per event");
        assert_eq!(parsed[0]["name"], "BeginFrame");
        assert_eq!(parsed[0]["ts"], 1000.0);
        assert_eq!(parsed[1]["args"]["deadline_us"], "now", "immediate deadline");
        assert_eq!(parsed[2]["ts"], 1000.0, "aggregation takes the latest time");
        assert_eq!(parsed[2]["args"]["damage"], json!([0, 0, 10, 10]));
        assert_eq!(parsed[3]["ph"], "C", "swaps are a counter");
        assert_eq!(parsed[3]["args"]["pending"], 1);
    }

    #[test]
    fn export_empty_sink() {
        let sink = ChromeTraceSink::new(Timebase::NANOS);
        assert!(exported(&sink).is_empty(), "no events");
    }
}
