//! # Autotune Module
//!
//! Snaps a tracked period to the nearest equal-tempered note in the guitar
//! range, E2 to E6.
//!
//! The table holds periods at 44100 Hz, the rate the pedal runs at. Other
//! session rates are handled by rescaling on the way in and out.

use once_cell::sync::Lazy;

use crate::estimate::REFERENCE_RATE;

/// Lowest note in the table, E2.
pub const LOWEST_FREQUENCY: f32 = 82.4069;
/// Four octaves plus the closing E.
pub const NOTE_COUNT: usize = 49;

/// One equal-tempered note.
#[derive(Debug, Clone)]
pub struct Note {
    /// Note name, e.g. "E2", "C#4"
    pub name: String,
    /// Period in samples at 44100 Hz
    pub period: f32,
}

impl Note {
    pub fn frequency(&self) -> f32 {
        REFERENCE_RATE / self.period
    }
}

/// Notes from E2 up, so periods are strictly decreasing.
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    const NOTE_NAMES: [&str; 12] = [
        "E", "F", "F#", "G", "G#", "A", "A#", "B", "C", "C#", "D", "D#",
    ];
    (0..NOTE_COUNT)
        .map(|i| {
            let frequency = LOWEST_FREQUENCY * 2.0_f32.powf(i as f32 / 12.0);
            // Octave numbers change at C, four semitones above E.
            let octave = 2 + (i + 4) / 12;
            Note {
                name: format!("{}{}", NOTE_NAMES[i % 12], octave),
                period: REFERENCE_RATE / frequency,
            }
        })
        .collect()
});

pub fn notes() -> &'static [Note] {
    &NOTES
}

/// Index of the table entry closest to `period`, given at 44100 Hz.
fn nearest_index(period: f32) -> usize {
    let notes = notes();
    // First note at or above the pitch, i.e. with a period no longer than `period`.
    let above = notes.partition_point(|note| note.period > period);
    if above == 0 {
        return 0;
    }
    if above == notes.len() {
        return notes.len() - 1;
    }
    let below = above - 1;
    if notes[below].period - period < period - notes[above].period {
        below
    } else {
        above
    }
}

/// Snaps `lambda` (samples at `sample_rate`) to the nearest note's period.
/// Periods outside the table clamp to its ends. Zero stays zero.
pub fn snap(lambda: f32, sample_rate: u32) -> f32 {
    if lambda <= 0.0 || sample_rate == 0 {
        return lambda;
    }
    let scale = sample_rate as f32 / REFERENCE_RATE;
    notes()[nearest_index(lambda / scale)].period * scale
}

/// The note nearest to `lambda` at `sample_rate`.
pub fn nearest_note(lambda: f32, sample_rate: u32) -> Option<&'static Note> {
    if lambda <= 0.0 || sample_rate == 0 {
        return None;
    }
    let scale = sample_rate as f32 / REFERENCE_RATE;
    Some(&notes()[nearest_index(lambda / scale)])
}

/// Deviation of `frequency` from `target` in cents, positive when sharp.
pub fn cents_deviation(frequency: f32, target: f32) -> f32 {
    1200.0 * (frequency / target).log2()
}
