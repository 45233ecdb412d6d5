// SPDX-FileCopyrightText: 2026 Hanashi Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Variable-height list virtualization.
//!
//! Maintains a prefix-sum offset index over per-row heights so a renderer
//! can mount only the rows near the viewport. Rows start at a configured
//! height estimate and are corrected by [`VirtualList::measure`] as they
//! render; spacer heights keep the total scroll height exact either way.
//!
//! Rows are positional: the caller keeps indices aligned with its message
//! window, calling [`VirtualList::prepend`] when a history page lands and
//! [`VirtualList::set_len`] after appends or evictions.

/// The rows a renderer should mount, plus spacers standing in for the rest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleRange {
    /// First row to mount.
    pub start: usize,
    /// One past the last row to mount.
    pub end: usize,
    /// Height of everything above `start`.
    pub leading: f64,
    /// Height of everything at and below `end`.
    pub trailing: f64,
}

/// Prefix-sum offset index over measured row heights.
#[derive(Debug, Clone)]
pub struct VirtualList {
    heights: Vec<f64>,
    measured: Vec<bool>,
    /// `offsets[i]` is the top of row `i`; one extra entry holds the total.
    offsets: Vec<f64>,
    estimate: f64,
    buffer: usize,
}

impl VirtualList {
    /// An empty list assuming `estimate` pixels per unmeasured row, with
    /// `buffer` extra rows mounted on each side of the viewport.
    pub fn new(estimate: f64, buffer: usize) -> Self {
        Self {
            heights: Vec::new(),
            measured: Vec::new(),
            offsets: vec![0.0],
            estimate: estimate.max(1.0),
            buffer,
        }
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    /// Grows with estimated rows at the end, or truncates from the end.
    pub fn set_len(&mut self, len: usize) {
        if len < self.heights.len() {
            self.heights.truncate(len);
            self.measured.truncate(len);
            self.offsets.truncate(len + 1);
        } else {
            while self.heights.len() < len {
                let total = *self.offsets.last().unwrap_or(&0.0);
                self.heights.push(self.estimate);
                self.measured.push(false);
                self.offsets.push(total + self.estimate);
            }
        }
    }

    /// Inserts `count` estimated rows at the front, shifting existing
    /// measurements down. Called when older history is prepended.
    pub fn prepend(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.heights.splice(0..0, std::iter::repeat(self.estimate).take(count));
        self.measured.splice(0..0, std::iter::repeat(false).take(count));
        self.offsets.resize(self.heights.len() + 1, 0.0);
        self.rebuild_from(0);
    }

    /// Records the rendered height of one row. Out-of-range indexes are
    /// ignored; the row set may have changed since the renderer measured.
    pub fn measure(&mut self, index: usize, height: f64) {
        if index >= self.heights.len() {
            return;
        }
        let height = height.max(0.0);
        if self.measured[index] && (self.heights[index] - height).abs() < 0.5 {
            return;
        }
        self.heights[index] = height;
        self.measured[index] = true;
        self.rebuild_from(index);
    }

    pub fn total_height(&self) -> f64 {
        *self.offsets.last().unwrap_or(&0.0)
    }

    /// Top of the given row; the total height when `index` is past the end.
    pub fn offset_of(&self, index: usize) -> f64 {
        let index = index.min(self.heights.len());
        self.offsets[index]
    }

    /// The row containing vertical position `y`. Boundaries belong to the
    /// row starting there.
    fn row_at(&self, y: f64) -> usize {
        // offsets is monotone; count entries at or below y.
        let at_or_below = self.offsets.partition_point(|&offset| offset <= y);
        at_or_below
            .saturating_sub(1)
            .min(self.heights.len().saturating_sub(1))
    }

    /// Rows intersecting the viewport, extended by the buffer row count on
    /// both sides, with exact leading and trailing spacer heights.
    pub fn visible_range(&self, scroll_top: f64, viewport_height: f64) -> VisibleRange {
        let len = self.heights.len();
        if len == 0 {
            return VisibleRange {
                start: 0,
                end: 0,
                leading: 0.0,
                trailing: 0.0,
            };
        }

        let top = scroll_top.max(0.0);
        let bottom = top + viewport_height.max(0.0);

        let first = self.row_at(top);
        // Rows whose top sits above the viewport bottom are visible.
        let past_bottom = self.offsets[..len].partition_point(|&offset| offset < bottom);
        let end = past_bottom.max(first + 1).min(len);

        let start = first.saturating_sub(self.buffer);
        let end = (end + self.buffer).min(len);

        VisibleRange {
            start,
            end,
            leading: self.offsets[start],
            trailing: self.total_height() - self.offsets[end],
        }
    }

    fn rebuild_from(&mut self, index: usize) {
        for i in index..self.heights.len() {
            self.offsets[i + 1] = self.offsets[i] + self.heights[i];
        }
    }
}
