//! # Spectrum Module
//!
//! Offline FFT analysis used to cross-check the tracker: the processing
//! report prints the dominant frequency of the input next to the tracked
//! one. Nothing here runs in the audio or analysis paths.
//!
//! ## Features
//! - DC offset removal and Hann windowing before the transform
//! - Magnitude spectrum up to Nyquist
//! - Dominant peak with parabolic interpolation on log magnitudes

use rustfft::{FftPlanner, num_complex::Complex};

/// Removes the DC offset from a signal by making its average value zero.
pub fn remove_dc_offset(signal: &mut [f32]) {
    if signal.is_empty() {
        return;
    }
    let mean = signal.iter().sum::<f32>() / signal.len() as f32;
    for sample in signal.iter_mut() {
        *sample -= mean;
    }
}

/// Applies a Hann window in place.
pub fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Magnitudes of bins `0..len/2` of the windowed, DC-free signal.
pub fn magnitude_spectrum(signal: &[f32]) -> Vec<f32> {
    let mut processed = signal.to_vec();
    remove_dc_offset(&mut processed);
    apply_hann_window(&mut processed);

    let mut buffer: Vec<Complex<f32>> = processed
        .into_iter()
        .map(|sample| Complex { re: sample, im: 0.0 })
        .collect();
    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(buffer.len()).process(&mut buffer);

    buffer.iter().take(signal.len() / 2).map(|c| c.norm()).collect()
}

/// Frequency in Hz of the strongest bin above `min_frequency`, refined
/// between bins. `None` for silence or a signal too short to analyze.
pub fn dominant_frequency(signal: &[f32], sample_rate: u32, min_frequency: f32) -> Option<f32> {
    if signal.len() < 4 || sample_rate == 0 {
        return None;
    }
    let magnitudes = magnitude_spectrum(signal);
    let bin_width = sample_rate as f32 / signal.len() as f32;
    let first = ((min_frequency / bin_width).ceil() as usize).max(1);

    let (peak, &height) = magnitudes
        .iter()
        .enumerate()
        .skip(first)
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    if height <= f32::EPSILON {
        return None;
    }

    let mut bin = peak as f32;
    if peak > 0 && peak + 1 < magnitudes.len() {
        let floor = f32::MIN_POSITIVE;
        let left = magnitudes[peak - 1].max(floor).ln();
        let center = height.ln();
        let right = magnitudes[peak + 1].max(floor).ln();
        let curvature = left - 2.0 * center + right;
        if curvature < 0.0 {
            bin += 0.5 * (left - right) / curvature;
        }
    }
    Some(bin * bin_width)
}
