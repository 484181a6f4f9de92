//! # Ring Buffer Module
//!
//! The shared store between the audio callback and the analysis task.
//! Every incoming sample passes through a fixed two-pole low-pass
//! filter and lands in a 65536-slot circular buffer.
//!
//! ## Concurrency
//! - Exactly one writer (the audio path) stores samples and then publishes
//!   the cursor with `Release` ordering.
//! - Exactly one reader (the analysis path) snapshots the cursor once per
//!   cycle with `Acquire` ordering and only reads slots behind it.
//! - Slots older than `RING_SIZE` samples are overwritten; readers must not
//!   look further back than that.

use std::fmt;
use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};

/// Number of slots in the ring. Equal to the full range of [`RingIndex`].
pub const RING_SIZE: usize = 1 << 16;

/// A position in the ring.
///
/// All arithmetic wraps modulo [`RING_SIZE`] (65536), so the index itself
/// is the modulo operation and no separate masking is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RingIndex(u16);

impl RingIndex {
    pub const ZERO: RingIndex = RingIndex(0);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Wraps an arbitrary position into the ring.
    pub const fn wrapping(raw: usize) -> Self {
        Self((raw % RING_SIZE) as u16)
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    pub const fn slot(self) -> usize {
        self.0 as usize
    }

    /// Forward distance from `earlier` to `self`, in samples.
    pub const fn distance_from(self, earlier: RingIndex) -> u16 {
        self.0.wrapping_sub(earlier.0)
    }
}

impl Add<u16> for RingIndex {
    type Output = RingIndex;

    fn add(self, rhs: u16) -> RingIndex {
        RingIndex(self.0.wrapping_add(rhs))
    }
}

impl Sub<u16> for RingIndex {
    type Output = RingIndex;

    fn sub(self, rhs: u16) -> RingIndex {
        RingIndex(self.0.wrapping_sub(rhs))
    }
}

/// Fixed second-order IIR low-pass applied before the ring.
///
/// `y[n] = x[n] + 1.8 y[n-1] - 0.82 y[n-2]`, scaled by 0.02 for unity DC gain.
/// The corner sits near 0.018 of the sample rate, well below a quarter of it,
/// which strips the upper partials that would add spurious zero crossings.
#[derive(Debug, Clone, Default)]
pub struct PreFilter {
    y1: f32,
    y2: f32,
}

impl PreFilter {
    const A1: f32 = 1.8;
    const A2: f32 = -0.82;
    const GAIN: f32 = 0.02;

    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = x + Self::A1 * self.y1 + Self::A2 * self.y2;
        self.y2 = self.y1;
        self.y1 = y;
        Self::GAIN * y
    }

    pub fn reset(&mut self) {
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// The circular store of filtered samples.
pub struct SampleRing {
    slots: Box<[AtomicU32]>,
    cursor: AtomicU16,
    written: AtomicU64,
}

impl SampleRing {
    pub fn new() -> Self {
        let slots = (0..RING_SIZE)
            .map(|_| AtomicU32::new(0.0_f32.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            cursor: AtomicU16::new(0),
            written: AtomicU64::new(0),
        }
    }

    /// Filters `samples` and appends them, advancing the cursor by one per sample.
    ///
    /// Only the single writer may call this.
    pub fn write_samples(&self, filter: &mut PreFilter, samples: &[f32]) {
        let mut cursor = self.cursor();
        for &x in samples {
            let y = filter.process(x);
            self.slots[cursor.slot()].store(y.to_bits(), Ordering::Relaxed);
            cursor = cursor + 1;
        }
        self.cursor.store(cursor.get(), Ordering::Release);
        self.written.fetch_add(samples.len() as u64, Ordering::Relaxed);
    }

    /// The next slot to be written. Everything before it is published.
    pub fn cursor(&self) -> RingIndex {
        RingIndex(self.cursor.load(Ordering::Acquire))
    }

    #[inline]
    pub fn get(&self, index: RingIndex) -> f32 {
        f32::from_bits(self.slots[index.slot()].load(Ordering::Relaxed))
    }

    /// Total number of samples ever written, for diagnostics.
    pub fn samples_written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for SampleRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleRing")
            .field("cursor", &self.cursor())
            .field("written", &self.samples_written())
            .finish_non_exhaustive()
    }
}

impl Default for SampleRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_arithmetic_wraps_at_ring_size() {
        let end = RingIndex::new(u16::MAX);
        assert_eq!((end + 1), RingIndex::ZERO);
        assert_eq!((RingIndex::ZERO - 1), end);
        assert_eq!(RingIndex::new(5).distance_from(end), 6);
        assert_eq!(RingIndex::wrapping(RING_SIZE + 7), RingIndex::new(7));
    }

    #[test]
    fn prefilter_has_unity_dc_gain() {
        let mut filter = PreFilter::new();
        let mut y = 0.0;
        for _ in 0..2000 {
            y = filter.process(0.5);
        }
        assert!((y - 0.5).abs() < 1e-3, "settled at {y}");
    }

    #[test]
    fn prefilter_attenuates_high_frequencies() {
        let mut filter = PreFilter::new();
        let mut peak = 0.0_f32;
        for n in 0..4000 {
            // Alternating signal at half the sample rate
            let x = if n % 2 == 0 { 1.0 } else { -1.0 };
            let y = filter.process(x);
            if n > 2000 {
                peak = peak.max(y.abs());
            }
        }
        assert!(peak < 0.01, "nyquist leaked through at {peak}");
    }

    #[test]
    fn write_advances_cursor_and_wraps() {
        let ring = SampleRing::new();
        let mut filter = PreFilter::new();
        let block = vec![0.0; 1000];
        for _ in 0..70 {
            ring.write_samples(&mut filter, &block);
        }
        assert_eq!(ring.samples_written(), 70_000);
        assert_eq!(ring.cursor(), RingIndex::wrapping(70_000));
    }

    #[test]
    fn written_samples_are_filtered_values() {
        let ring = SampleRing::new();
        let mut filter = PreFilter::new();
        ring.write_samples(&mut filter, &[1.0, 0.0]);
        assert!((ring.get(RingIndex::new(0)) - 0.02).abs() < 1e-6);
        assert!((ring.get(RingIndex::new(1)) - 0.036).abs() < 1e-6);
    }
}
