//! # Raw Pitch Estimation Module
//!
//! Derives a coarse integer period from the zero-crossing history.
//!
//! Each polarity is handled separately: consecutive same-polarity half-waves
//! ("bumps") are compared until two of comparable height are found, and the
//! distance between them is measured three ways. The two polarities are then
//! reconciled and, once the tracker is locked, checked for octave errors.
//!
//! The thresholds here are empirically tuned policy. They are exposed as
//! constants and exercised against synthetic waveforms rather than derived.

use crate::refine::MAX_LAG;
use crate::ring::RingIndex;
use crate::zero_crossing::CrossingHistory;

/// Shortest admissible period at [`REFERENCE_RATE`], in samples.
pub const LAMBDA_MIN: f32 = 30.0;
/// Longest admissible period at [`REFERENCE_RATE`], in samples.
pub const LAMBDA_MAX: f32 = 550.0;
/// Sample rate at which [`LAMBDA_MIN`] and [`LAMBDA_MAX`] are defined.
pub const REFERENCE_RATE: f32 = 44100.0;

/// A bump is feasible if its height is at least this fraction of the last accepted one.
pub const HEIGHT_LIMIT: f32 = 0.75;
/// The initial height limit is seeded from the tallest of this many recent bumps.
pub const SEED_BUMPS: usize = 4;
/// A third bump replaces the second when its shape mismatch is below this
/// fraction of the second bump's.
pub const FIT_RATIO: f32 = 1.0 / 16.0;
/// Shape mismatch below which the second bump is always kept.
pub const FIT_FLOOR: f32 = 0.01;
/// `lambdas_are_close` shift used between the two polarities and for octave checks (1/8).
pub const CLOSE_SHIFT: u32 = 3;

/// Admissible period range for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodRange {
    pub min: i32,
    pub max: i32,
}

impl PeriodRange {
    /// Scales the reference range to `sample_rate`. The upper end never
    /// exceeds the longest lag the refiner can measure.
    pub fn for_rate(sample_rate: u32) -> Self {
        let scale = sample_rate as f32 / REFERENCE_RATE;
        Self {
            min: (LAMBDA_MIN * scale).round() as i32,
            max: ((LAMBDA_MAX * scale).round() as i32).min(i32::from(MAX_LAG)),
        }
    }

    pub fn contains(&self, lambda: i32) -> bool {
        (self.min..=self.max).contains(&lambda)
    }
}

impl Default for PeriodRange {
    fn default() -> Self {
        Self::for_rate(REFERENCE_RATE as u32)
    }
}

/// Middle value of three. Always returns one of its inputs.
pub fn median3<T: PartialOrd + Copy>(a: T, b: T, c: T) -> T {
    if a < b {
        if b < c {
            b
        } else if a < c {
            c
        } else {
            a
        }
    } else if a < c {
        a
    } else if b < c {
        c
    } else {
        b
    }
}

/// True iff `|a - b| <= b >> shift`.
pub fn lambdas_are_close(a: i32, b: i32, shift: u32) -> bool {
    (a - b).abs() <= b >> shift
}

/// One half-wave, bounded by two consecutive crossings.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bump {
    start: RingIndex,
    peak: RingIndex,
    end: RingIndex,
    height: f32,
}

impl Bump {
    /// The half-wave closed by the event at `age`. Needs the next older event
    /// for its start.
    fn at(history: &CrossingHistory, age: usize) -> Option<Self> {
        let closing = history.get(age)?;
        let opening = history.get(age + 1)?;
        Some(Self {
            start: opening.crossing,
            peak: closing.extreme,
            end: closing.crossing,
            height: closing.extreme_value.abs(),
        })
    }

    fn rise(&self) -> f32 {
        self.peak.distance_from(self.start) as f32
    }

    fn fall(&self) -> f32 {
        self.end.distance_from(self.peak) as f32
    }

    /// Squared mismatch in timing (left and right of the peak, relative to
    /// this bump's width) and height (relative to this bump's height).
    fn mismatch(&self, other: &Bump) -> f32 {
        let width = (self.rise() + self.fall()).max(1.0);
        let rise = (self.rise() - other.rise()) / width;
        let fall = (self.fall() - other.fall()) / width;
        let height = (self.height - other.height) / self.height.max(f32::EPSILON);
        rise * rise + fall * fall + height * height
    }
}

/// Whether bump `c` repeats `a` far more faithfully than `b` does.
fn bump_fits_much_better(a: &Bump, b: &Bump, c: &Bump) -> bool {
    let second = a.mismatch(b);
    second > FIT_FLOOR && a.mismatch(c) < second * FIT_RATIO
}

/// Period estimate from one polarity of the history, or 0 if none.
///
/// Walks the bumps of one polarity from the newest back. The first bump at
/// least [`HEIGHT_LIMIT`] times the seed height starts the walk, and each
/// following bump must clear the same fraction of the last accepted one. A
/// third bump replaces the second when it matches the first much better.
/// The period is the median of the distances between the two bumps' start,
/// end and peak.
///
/// # Arguments
/// * `history` - Zero-crossing events, newest first
/// * `side` - 0 uses the bumps closed by the even-aged events, 1 the odd-aged ones
///
/// # Returns
/// * `i32` - Period in samples, or 0 when fewer than two comparable bumps exist
pub fn estimate_one_side(history: &CrossingHistory, side: usize) -> i32 {
    let bumps = || {
        (side..history.len())
            .step_by(2)
            .map_while(|age| Bump::at(history, age))
    };

    let seed = bumps()
        .take(SEED_BUMPS)
        .map(|bump| bump.height)
        .fold(0.0_f32, f32::max);
    if seed <= 0.0 {
        return 0;
    }

    let mut walk = bumps();
    let mut limit = HEIGHT_LIMIT * seed;
    let Some(first) = walk.find(|bump| bump.height >= limit) else {
        return 0;
    };
    limit = HEIGHT_LIMIT * first.height;
    let Some(mut second) = walk.find(|bump| bump.height >= limit) else {
        return 0;
    };
    limit = HEIGHT_LIMIT * second.height;
    if let Some(third) = walk.find(|bump| bump.height >= limit) {
        if bump_fits_much_better(&first, &second, &third) {
            second = third;
        }
    }

    let right = first.end.distance_from(second.end) as i32;
    let left = first.start.distance_from(second.start) as i32;
    let peak = first.peak.distance_from(second.peak) as i32;
    median3(right, left, peak)
}

/// Combines the two polarities' estimates into one raw period, or 0.
///
/// `previous` is the last accepted period (0 if none). The octave corrections
/// only run while `locked`.
pub fn pick_lambda_raw(
    even: i32,
    odd: i32,
    previous: i32,
    locked: bool,
    range: PeriodRange,
) -> i32 {
    let lambda = match (range.contains(even), range.contains(odd)) {
        (false, false) => return 0,
        (true, false) => even,
        (false, true) => odd,
        (true, true) if lambdas_are_close(even, odd, CLOSE_SHIFT) => (even + odd) / 2,
        (true, true) if previous > 0 && lambdas_are_close(even, previous, CLOSE_SHIFT) => even,
        (true, true) if previous > 0 && lambdas_are_close(odd, previous, CLOSE_SHIFT) => odd,
        (true, true) => return 0,
    };

    if !locked || previous <= 0 {
        return lambda;
    }
    // Half the locked period: an overtone won, keep the locked octave.
    if lambdas_are_close(2 * lambda, previous, CLOSE_SHIFT) {
        return 2 * lambda;
    }
    // Twice the locked period: fall back to the locked period.
    if lambdas_are_close(lambda, 2 * previous, CLOSE_SHIFT) {
        return previous;
    }
    lambda
}

/// Full raw estimate from the history.
pub fn estimate_raw(
    history: &CrossingHistory,
    previous: i32,
    locked: bool,
    range: PeriodRange,
) -> i32 {
    let even = estimate_one_side(history, 0);
    let odd = estimate_one_side(history, 1);
    pick_lambda_raw(even, odd, previous, locked, range)
}
