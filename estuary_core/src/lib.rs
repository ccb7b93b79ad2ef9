// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface aggregation and frame scheduling for display compositors.
//!
//! `estuary_core` merges frames submitted independently by many producers
//! (*surfaces*) into one flattened pass list per display, tracks the
//! resources those frames lend to the compositor, and paces redraws against a
//! vsync-like begin-frame signal with back-pressure on in-flight swaps. It is
//! `no_std` compatible (with `alloc`) and single-threaded: every component
//! lives on one compositing thread and shares state through `Rc<RefCell<_>>`.
//!
//! # Architecture
//!
//! ```text
//!   SurfaceFactory ──submit──► Surface ──► SurfaceManager ──damage──► Display
//!                                                                      │
//!   BeginFrameSource ──begin frame──► DisplayScheduler ◄───────────────┤
//!                                           │ deadline                 │
//!                                           ▼                          │
//!                                     draw_and_swap ──► SurfaceAggregator
//!                                                             │
//!                                                             ▼
//!                                                  Renderer / OutputSurface
//! ```
//!
//! **[`surface`]**: Surface ids, per-surface frame queues, the factory that
//! owns a producer's surfaces and resource ledger, and the manager that
//! garbage-collects destroyed surfaces by mark and sweep.
//!
//! **[`frame`]**: Compositor frames, render passes, quads, copy requests,
//! and transferable resources.
//!
//! **[`aggregator`]**: Flattens a surface tree into one frame: damage
//! propagation, pass-id remapping, resource remapping, and culling.
//!
//! **[`resource_provider`]**: The consumer side of resource transfer.
//!
//! **[`begin_frame`]**: Begin-frame arguments, observers, and the
//! back-to-back, synthetic and multiplexing sources.
//!
//! **[`display`]**: The [`Display`](display::Display), its deadline
//! [`DisplayScheduler`](display::DisplayScheduler), and the output contract
//! embedders implement.
//!
//! **[`time`]** / **[`timer`]**: Tick-based host time and the single-slot
//! deadline timer the scheduler arms.
//!
//! **[`geometry`]**: Damage-rect helpers over `kurbo` transforms.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types
//! with a zero-overhead [`Tracer`](trace::Tracer) handle.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-surface
//!   damage events emitted during aggregation.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod aggregator;
pub mod begin_frame;
pub mod display;
pub mod frame;
pub mod geometry;
pub mod resource_provider;
pub mod surface;
pub mod time;
pub mod timer;
pub mod trace;
