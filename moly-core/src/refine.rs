//! # Autocorrelation Refinement Module
//!
//! Refines an integer period estimate to sub-sample precision.
//!
//! The metric is a normalized squared difference: the energy of
//! `x[n] - x[n - lag]` over an analysis window divided by the energy of the
//! window itself. A perfectly periodic signal scores 0 at its period.
//!
//! ## Features
//! - Cycle-adaptive window: grows one period at a time while the signal
//!   stays stable, stops at transients
//! - Parabolic interpolation through the metric at `lM - delta`, `lM`, `lM + delta`
//! - Guarded numerics: zero energy and non-positive curvature never produce NaN

use crate::ring::{RING_SIZE, RingIndex, SampleRing};

/// Longest analysis window, in periods.
pub const MAX_CYCLES: u16 = 16;
/// A later cycle extends the window while its error is below this multiple of the first cycle's.
pub const ERROR_GROWTH: f32 = 3.0;
/// ...or while its error is below this fraction of the first cycle's energy.
pub const ERROR_FLOOR: f32 = 0.3;
/// A later cycle must carry at least this fraction of the first cycle's energy.
pub const ENERGY_FLOOR: f32 = 0.5;
/// Center metrics above this are not trusted; also the figure reported on failure.
pub const CONFIDENCE_CEILING: f32 = 0.5;
/// Largest lag the refiner accepts. A full window plus the lagged period
/// before it, and the `delta` probes, must fit inside the ring.
pub const MAX_LAG: u16 = (RING_SIZE / (MAX_CYCLES as usize + 2)) as u16;

/// Center metric and the window it was measured over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterFit {
    /// Normalized squared difference at the center lag.
    pub metric: f32,
    /// Number of periods in the window.
    pub cycles: u16,
    /// Window length in samples.
    pub window: u16,
    /// Signal energy over the window, 1.0 if the window was silent.
    pub energy: f32,
    /// RMS of the window.
    pub volume: f32,
}

/// Outcome of one refinement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refinement {
    /// Refined period, 0 if refinement failed.
    pub lambda: f32,
    /// Metric at the parabola's vertex, lower is better. [`CONFIDENCE_CEILING`] on failure.
    pub confidence: f32,
    /// RMS of the analysis window.
    pub volume: f32,
    pub energy: f32,
    pub window: u16,
}

impl Refinement {
    pub fn failed(volume: f32) -> Self {
        Self {
            lambda: 0.0,
            confidence: CONFIDENCE_CEILING,
            volume,
            energy: 0.0,
            window: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lambda > 0.0
    }
}

/// Squared-difference error and energy of period number `cycle` counted
/// back from `end`, compared against the period before it.
fn cycle_sums(ring: &SampleRing, end: RingIndex, lag: u16, cycle: u16) -> (f32, f32) {
    let newest = end - 1 - cycle * lag;
    let mut error = 0.0;
    let mut energy = 0.0;
    for j in 0..lag {
        let index = newest - j;
        let x = ring.get(index);
        let d = x - ring.get(index - lag);
        error += d * d;
        energy += x * x;
    }
    (error, energy)
}

/// Metric at the center lag `lm`, with the window adapted to the signal.
///
/// Starts from the newest period and walks back one period at a time, up to
/// [`MAX_CYCLES`], while each added period is both stable and loud enough.
pub fn meandiff2mid(ring: &SampleRing, end: RingIndex, lm: u16) -> CenterFit {
    let (first_error, reference) = cycle_sums(ring, end, lm, 0);
    let mut error = first_error;
    let mut energy = reference;
    let mut cycles = 1;

    while cycles < MAX_CYCLES {
        let (e, en) = cycle_sums(ring, end, lm, cycles);
        let stable = e < ERROR_GROWTH * first_error || e < ERROR_FLOOR * reference;
        if !stable || en < ENERGY_FLOOR * reference {
            break;
        }
        error += e;
        energy += en;
        cycles += 1;
    }

    let window = cycles * lm;
    let volume = (energy / window as f32).sqrt();
    let energy = if energy > 0.0 { energy } else { 1.0 };
    CenterFit {
        metric: error / energy,
        cycles,
        window,
        energy,
        volume,
    }
}

/// Metric at `lag` over the newest `window` samples, normalized by `energy`.
pub fn meandiff2(ring: &SampleRing, end: RingIndex, lag: u16, window: u16, energy: f32) -> f32 {
    let mut error = 0.0;
    let mut index = end - 1;
    for _ in 0..window {
        let d = ring.get(index) - ring.get(index - lag);
        error += d * d;
        index = index - 1;
    }
    error / energy
}

/// Refines the raw estimate `lm` against the samples before `end`.
///
/// Measures the metric at `lm` over an adaptive window, then at `lm - delta`
/// and `lm + delta` over the same window, and fits a parabola through the
/// three points. `delta` is 2% of `lm`, at least 2 samples.
///
/// # Arguments
/// * `ring` - Filtered input samples
/// * `end` - Cursor one past the newest sample to analyze
/// * `lm` - Integer period estimate, at most [`MAX_LAG`]
///
/// # Returns
/// * `Refinement` - The sub-sample period and its confidence, or a failed
///   refinement (period 0) carrying the window's volume when the metric is
///   too high or the parabola opens downward
pub fn refine(ring: &SampleRing, end: RingIndex, lm: u16) -> Refinement {
    let delta = (lm / 50).max(2);
    if lm <= delta || lm > MAX_LAG {
        return Refinement::failed(0.0);
    }

    let center = meandiff2mid(ring, end, lm);
    let failed = Refinement {
        energy: center.energy,
        window: center.window,
        ..Refinement::failed(center.volume)
    };
    if center.metric > CONFIDENCE_CEILING {
        return failed;
    }

    let below = meandiff2(ring, end, lm - delta, center.window, center.energy);
    let above = meandiff2(ring, end, lm + delta, center.window, center.energy);
    let curvature = below + above - 2.0 * center.metric;
    if curvature <= 0.0 {
        return failed;
    }

    // Vertex offset in units of delta
    let shift = (below - above) / (2.0 * curvature);
    if !shift.is_finite() || shift.abs() > 1.0 {
        return failed;
    }

    let vertex = center.metric - (above - below) * (above - below) / (8.0 * curvature);
    Refinement {
        lambda: lm as f32 + shift * delta as f32,
        confidence: vertex.max(0.0),
        volume: center.volume,
        energy: center.energy,
        window: center.window,
    }
}
