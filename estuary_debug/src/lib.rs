// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pretty-printing and Chrome trace export for estuary diagnostics.
//!
//! This crate provides [`TraceSink`](estuary_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output.
//! - [`chrome::ChromeTraceSink`]: buffers Chrome Trace Event Format objects
//!   and exports them as JSON.

pub mod chrome;
pub mod pretty;
