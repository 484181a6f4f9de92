//! # Zero-Crossing Module
//!
//! Scans the samples written since the previous analysis cycle and keeps a
//! bounded, newest-first history of sign changes. Each event remembers the
//! extreme of the half-wave that the crossing closed.
//!
//! Crossings strictly alternate in direction, so every other slot of the
//! history belongs to the same polarity: even offsets share the polarity of
//! the newest event, odd offsets the opposite one.

use crate::ring::{RingIndex, SampleRing};

/// Number of crossing events retained.
pub const HISTORY_LEN: usize = 32;

/// One recorded sign change of the filtered signal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ZeroCrossing {
    /// Ring position of the first sample with the new sign.
    pub crossing: RingIndex,
    /// Ring position of the extreme of the half-wave that just ended.
    pub extreme: RingIndex,
    /// Signed value at `extreme`.
    pub extreme_value: f32,
}

/// Fixed-capacity event history, index 0 is the newest event.
#[derive(Debug, Clone)]
pub struct CrossingHistory {
    events: [ZeroCrossing; HISTORY_LEN],
    len: usize,
}

impl CrossingHistory {
    pub fn new() -> Self {
        Self {
            events: [ZeroCrossing::default(); HISTORY_LEN],
            len: 0,
        }
    }

    /// Inserts at the front, shifting older events down and dropping the oldest.
    pub fn push(&mut self, event: ZeroCrossing) {
        self.events.copy_within(0..HISTORY_LEN - 1, 1);
        self.events[0] = event;
        self.len = (self.len + 1).min(HISTORY_LEN);
    }

    pub fn get(&self, age: usize) -> Option<&ZeroCrossing> {
        self.events[..self.len].get(age)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZeroCrossing> {
        self.events[..self.len].iter()
    }
}

impl Default for CrossingHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of scanning one analysis window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowScan {
    /// Cursor snapshot; the window scanned was `[previous, end)`.
    pub end: RingIndex,
    /// Number of samples in the window.
    pub samples: u16,
    /// Largest absolute sample value in the window.
    pub max_amplitude: f32,
}

/// Incremental sign-change detector over the ring.
#[derive(Debug, Clone, Default)]
pub struct ZeroCrossingTracker {
    history: CrossingHistory,
    previous_cursor: RingIndex,
    extreme_index: RingIndex,
    extreme_value: f32,
}

impl ZeroCrossingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots the ring cursor once and scans everything written since the
    /// previous call.
    pub fn update(&mut self, ring: &SampleRing) -> WindowScan {
        let end = ring.cursor();
        self.scan(ring, end)
    }

    /// Scans `[previous_cursor, end)`. Zero counts as non-negative.
    pub fn scan(&mut self, ring: &SampleRing, end: RingIndex) -> WindowScan {
        let samples = end.distance_from(self.previous_cursor);
        let mut max_amplitude = 0.0_f32;
        let mut index = self.previous_cursor;

        for _ in 0..samples {
            let x = ring.get(index);
            max_amplitude = max_amplitude.max(x.abs());

            let positive = x >= 0.0;
            if positive != (self.extreme_value >= 0.0) {
                self.history.push(ZeroCrossing {
                    crossing: index,
                    extreme: self.extreme_index,
                    extreme_value: self.extreme_value,
                });
                self.extreme_index = index;
                self.extreme_value = x;
            } else if x.abs() > self.extreme_value.abs() {
                self.extreme_index = index;
                self.extreme_value = x;
            }
            index = index + 1;
        }

        self.previous_cursor = end;
        WindowScan {
            end,
            samples,
            max_amplitude,
        }
    }

    pub fn history(&self) -> &CrossingHistory {
        &self.history
    }

    /// Forgets all recorded events. The cursor position is kept.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}
