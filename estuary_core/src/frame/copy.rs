// Copyright 2026 the Estuary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One-shot output capture requests.
//!
//! A [`CopyOutputRequest`] asks for the pixels of a render pass. It carries a
//! callback that is invoked exactly once: with the captured pixels when the
//! renderer serves it, or with an empty [`CopyOutputResult`] when the request
//! is superseded, lands on a surface that cannot be drawn, or is simply
//! dropped. Dropping an unanswered request answers it with an empty result,
//! so ownership can move freely through the aggregator without a request
//! ever going silent.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use kurbo::{Rect, Size};

/// The answer to a [`CopyOutputRequest`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CopyOutputResult {
    /// Size of the captured area, zero for an empty result.
    pub size: Size,
    /// Captured pixels, `None` for an empty result.
    pub pixels: Option<Vec<u8>>,
}

impl CopyOutputResult {
    /// A result carrying no pixels.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            size: Size::ZERO,
            pixels: None,
        }
    }

    /// A result carrying captured pixels.
    #[must_use]
    pub fn with_pixels(size: Size, pixels: Vec<u8>) -> Self {
        Self {
            size,
            pixels: Some(pixels),
        }
    }

    /// Returns `true` if no pixels were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_none()
    }
}

/// Callback receiving the result of a [`CopyOutputRequest`].
pub type CopyOutputCallback = Box<dyn FnOnce(CopyOutputResult)>;

/// A request to capture the output of a render pass.
pub struct CopyOutputRequest {
    callback: Option<CopyOutputCallback>,
    source: Option<u64>,
    area: Option<Rect>,
}

impl CopyOutputRequest {
    /// Creates a request answered through `callback`.
    #[must_use]
    pub fn new(callback: impl FnOnce(CopyOutputResult) + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            source: None,
            area: None,
        }
    }

    /// Tags the request with an opaque source id.
    ///
    /// A surface holds at most one pending request per source; a newer one
    /// replaces an older one, which is answered with an empty result.
    #[must_use]
    pub fn with_source(mut self, source: u64) -> Self {
        self.source = Some(source);
        self
    }

    /// Restricts the capture to `area`, in the pass's output space.
    #[must_use]
    pub fn with_area(mut self, area: Rect) -> Self {
        self.area = Some(area);
        self
    }

    /// Returns the source tag, if any.
    #[must_use]
    pub fn source(&self) -> Option<u64> {
        self.source
    }

    /// Returns the requested capture area, if restricted.
    #[must_use]
    pub fn area(&self) -> Option<Rect> {
        self.area
    }

    /// Answers the request with `result`.
    pub fn send_result(mut self, result: CopyOutputResult) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }

    /// Answers the request with an empty result.
    pub fn send_empty_result(self) {
        self.send_result(CopyOutputResult::empty());
    }
}

impl Drop for CopyOutputRequest {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback(CopyOutputResult::empty());
        }
    }
}

impl fmt::Debug for CopyOutputRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyOutputRequest")
            .field("source", &self.source)
            .field("area", &self.area)
            .field("answered", &self.callback.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use core::cell::RefCell;

    fn recording() -> (Rc<RefCell<Vec<CopyOutputResult>>>, CopyOutputRequest) {
        let results = Rc::new(RefCell::new(Vec::new()));
        let sink = results.clone();
        let request = CopyOutputRequest::new(move |r| sink.borrow_mut().push(r));
        (results, request)
    }

    #[test]
    fn drop_answers_empty() {
        let (results, request) = recording();
        drop(request);
        let results = results.borrow();
        assert_eq!(results.len(), 1, "dropped request is answered once");
        assert!(results[0].is_empty(), "dropped request gets an empty result");
    }

    #[test]
    fn send_result_answers_once() {
        let (results, request) = recording();
        request.send_result(CopyOutputResult::with_pixels(Size::new(1.0, 1.0), alloc::vec![1, 2, 3, 4]));
        let results = results.borrow();
        assert_eq!(results.len(), 1, "no second answer from Drop");
        assert!(!results[0].is_empty(), "pixels delivered");
    }
}
