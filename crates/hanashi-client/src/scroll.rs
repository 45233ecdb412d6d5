// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scroll position preservation across history prepends.

/// A scroll position captured before older messages are prepended.
///
/// Prepending grows the scroll height above the viewport; restoring adds
/// that growth to the old scroll top so the visible content stays put.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    scroll_height: f64,
    scroll_top: f64,
}

impl ScrollAnchor {
    /// Captures the container's current scroll geometry.
    pub fn capture(scroll_height: f64, scroll_top: f64) -> Self {
        Self {
            scroll_height,
            scroll_top,
        }
    }

    /// The adjusted scroll top after the container grew to
    /// `new_scroll_height`.
    pub fn restore(&self, new_scroll_height: f64) -> f64 {
        new_scroll_height - self.scroll_height + self.scroll_top
    }
}
