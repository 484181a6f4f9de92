//! # Tracker Module
//!
//! One analysis cycle: scan the new samples, decide silence and onsets,
//! estimate and refine the period, and build the message for the
//! synthesizer.
//!
//! ## Features
//! - Silence gate relative to the trigger level
//! - Onset detection from the window peak, held until a pitched message goes out
//! - Lock tracking, so octave corrections only run against a trusted period
//! - Optional volume compression

use std::f32::consts::FRAC_1_SQRT_2;

use tracing::debug;

use crate::estimate::{PeriodRange, estimate_raw};
use crate::message::{Message, MessageKind};
use crate::refine::{CONFIDENCE_CEILING, Refinement, refine};
use crate::ring::{RingIndex, SampleRing};
use crate::settings::Settings;
use crate::zero_crossing::ZeroCrossingTracker;

/// A refinement below this metric locks the tracker.
pub const LOCK_CONFIDENCE: f32 = 0.05;
/// Refining the locked period alone is enough below this metric.
pub const WEAK_CONFIDENCE: f32 = 0.1;
/// A window peaking below this fraction of the trigger level is always silent.
pub const SILENCE_FRACTION: f32 = 0.25;
/// An onset is a window peak that, scaled by this, still exceeds the previous peak.
pub const ONSET_RISE: f32 = 0.75;
/// Gain applied to volumes below the compression threshold.
pub const COMPRESSION_GAIN: f32 = 5.0;

/// Soft compression: volumes under `threshold` are raised five-fold, up to
/// the threshold itself. A threshold of 0 disables compression.
pub fn compress(volume: f32, threshold: f32) -> f32 {
    if threshold <= 0.0 || volume >= threshold {
        volume
    } else {
        (volume * COMPRESSION_GAIN).min(threshold)
    }
}

/// Analysis state carried between cycles.
#[derive(Debug, Clone)]
pub struct Tracker {
    crossings: ZeroCrossingTracker,
    range: PeriodRange,
    prev_max: f32,
    prev_volume: f32,
    /// Last accepted period.
    lambda: f32,
    locked: bool,
    lambda_raw: i32,
    lambda_refined: f32,
    confidence: f32,
    energy: f32,
    window: u16,
    trigger_pending: bool,
}

impl Tracker {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            crossings: ZeroCrossingTracker::new(),
            range: PeriodRange::for_rate(sample_rate),
            prev_max: 0.0,
            prev_volume: 0.0,
            lambda: 0.0,
            locked: false,
            lambda_raw: 0,
            lambda_refined: 0.0,
            confidence: CONFIDENCE_CEILING,
            energy: 0.0,
            window: 0,
            trigger_pending: false,
        }
    }

    pub fn lambda(&self) -> f32 {
        self.lambda
    }

    pub fn lambda_raw(&self) -> i32 {
        self.lambda_raw
    }

    /// Refined period of the last cycle, 0 if refinement failed.
    pub fn lambda_refined(&self) -> f32 {
        self.lambda_refined
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn energy(&self) -> f32 {
        self.energy
    }

    /// Refiner window of the last cycle, in samples.
    pub fn window(&self) -> u16 {
        self.window
    }

    pub fn range(&self) -> PeriodRange {
        self.range
    }

    /// Runs one cycle over everything written to `ring` since the last one.
    ///
    /// Classifies the window as silent or sounding, flags onsets, refines the
    /// period and builds the message the synthesizer picks up next.
    ///
    /// # Arguments
    /// * `ring` - Filtered input; only samples after the previous cursor are scanned
    /// * `settings` - Trigger level, compression and verbosity for this cycle
    ///
    /// # Returns
    /// * `Message` - The finished message, or one of kind `None` when nothing
    ///   was written since the previous cycle (the tracker state is untouched)
    pub fn analyze(&mut self, ring: &SampleRing, settings: &Settings) -> Message {
        let scan = self.crossings.update(ring);
        if scan.samples == 0 {
            return Message::default();
        }
        let this_max = scan.max_amplitude;
        let trigger_level = settings.trigger_level();

        let onset = ONSET_RISE * this_max > self.prev_max
            || (self.prev_volume == 0.0 && this_max > trigger_level);
        let silent = this_max < SILENCE_FRACTION * trigger_level
            || (self.lambda == 0.0 && this_max < trigger_level);
        self.prev_max = this_max;

        if silent {
            self.go_silent();
            return Message::silence();
        }
        if onset {
            self.trigger_pending = true;
        }

        let previous = self.lambda;
        let best = self.best_refinement(ring, scan.end, previous);
        // Lock is only dropped on silence.
        if best.is_some_and(|r| r.confidence < LOCK_CONFIDENCE) {
            self.set_locked(true);
        }

        let (refined, volume) = match best {
            Some(r) => {
                self.confidence = r.confidence;
                self.energy = r.energy;
                self.window = r.window;
                (r.lambda, r.volume)
            }
            None => {
                self.confidence = CONFIDENCE_CEILING;
                (0.0, this_max * FRAC_1_SQRT_2)
            }
        };
        self.lambda_refined = refined;

        // Hold the last period while the note is still sounding.
        let lambda = if refined == 0.0 && volume > 0.0 {
            previous
        } else {
            refined
        };
        self.lambda = lambda;
        self.prev_volume = volume;

        let kind = if self.trigger_pending {
            MessageKind::Trigger
        } else {
            MessageKind::Continue
        };
        if lambda > 0.0 {
            self.trigger_pending = false;
        }

        let message = Message {
            kind,
            lambda,
            volume: compress(volume, settings.compression()),
            volume_raw: volume,
        };
        if settings.verbose() {
            debug!(
                kind = ?message.kind,
                lambda = message.lambda,
                raw = self.lambda_raw,
                confidence = self.confidence,
                volume = message.volume_raw,
                locked = self.locked,
                "analyze"
            );
        }
        message
    }

    /// Tries the locked period first and falls back to a fresh raw estimate
    /// when that is missing or weak. Returns the more confident valid result.
    fn best_refinement(
        &mut self,
        ring: &SampleRing,
        end: RingIndex,
        previous: f32,
    ) -> Option<Refinement> {
        let mut best = None;
        if self.locked && previous > 0.0 {
            let locked = refine(ring, end, previous.round() as u16);
            if locked.is_valid() {
                best = Some(locked);
            }
        }

        if best.is_none_or(|r: Refinement| r.confidence > WEAK_CONFIDENCE) {
            self.lambda_raw = estimate_raw(
                self.crossings.history(),
                previous.round() as i32,
                self.locked,
                self.range,
            );
            if self.lambda_raw > 0 {
                let fresh = refine(ring, end, self.lambda_raw as u16);
                if fresh.is_valid() && best.is_none_or(|r| fresh.confidence < r.confidence) {
                    best = Some(fresh);
                }
            }
        }
        best
    }

    fn set_locked(&mut self, locked: bool) {
        if locked != self.locked {
            debug!(locked, lambda = self.lambda, "lock changed");
        }
        self.locked = locked;
    }

    fn go_silent(&mut self) {
        self.crossings.clear_history();
        self.set_locked(false);
        self.lambda = 0.0;
        self.lambda_raw = 0;
        self.lambda_refined = 0.0;
        self.confidence = CONFIDENCE_CEILING;
        self.energy = 0.0;
        self.window = 0;
        self.prev_volume = 0.0;
        self.trigger_pending = false;
    }
}
