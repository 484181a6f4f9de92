//! Off-line processing: the host loop of the pedal, driven from a file.

use std::fmt;
use std::path::Path;

use anyhow::Result;
use moly_core::autotune;
use moly_core::spectrum::dominant_frequency;
use moly_core::{Message, MessageKind, Molysynth, Preset, Settings};
use tracing::info;

use crate::wav;

/// Samples per audio block.
pub const BLOCK_SIZE: usize = 48;
/// Blocks between two analysis cycles.
pub const ANALYZE_EVERY: usize = 10;
/// Longest stretch of input handed to the FFT for the report.
const SPECTRUM_LIMIT: usize = 1 << 18;
/// Lowest frequency considered by the report's spectrum peak.
const SPECTRUM_FLOOR: f32 = 60.0;

/// Summary printed after a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub sample_rate: u32,
    pub blocks: usize,
    pub cycles: usize,
    /// Trigger messages that started a note.
    pub notes: usize,
    /// Median of the tracked frequencies over all pitched cycles.
    pub tracked_frequency: Option<f32>,
    /// Strongest frequency in the input spectrum.
    pub dominant_frequency: Option<f32>,
}

impl Report {
    fn from_messages(
        messages: &[Message],
        sample_rate: u32,
        blocks: usize,
        dominant_frequency: Option<f32>,
    ) -> Self {
        let mut lambdas: Vec<f32> = messages
            .iter()
            .filter(|m| m.lambda > 0.0)
            .map(|m| m.lambda)
            .collect();
        lambdas.sort_by(f32::total_cmp);
        let tracked_frequency = lambdas
            .get(lambdas.len() / 2)
            .map(|lambda| sample_rate as f32 / lambda);

        Self {
            sample_rate,
            blocks,
            cycles: messages.len(),
            notes: messages
                .iter()
                .filter(|m| m.kind == MessageKind::Trigger && m.lambda > 0.0)
                .count(),
            tracked_frequency,
            dominant_frequency,
        }
    }
}

fn describe_frequency(f: &mut fmt::Formatter<'_>, frequency: Option<f32>, sample_rate: u32) -> fmt::Result {
    let Some(frequency) = frequency else {
        return writeln!(f, "-");
    };
    match autotune::nearest_note(sample_rate as f32 / frequency, sample_rate) {
        Some(note) => writeln!(
            f,
            "{frequency:.2} Hz ({} {:+.0} cents)",
            note.name,
            autotune::cents_deviation(frequency, note.frequency())
        ),
        None => writeln!(f, "{frequency:.2} Hz"),
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Blocks processed:   {}", self.blocks)?;
        writeln!(f, "Analysis cycles:    {}", self.cycles)?;
        writeln!(f, "Notes triggered:    {}", self.notes)?;
        write!(f, "Tracked frequency:  ")?;
        describe_frequency(f, self.tracked_frequency, self.sample_rate)?;
        write!(f, "Dominant frequency: ")?;
        describe_frequency(f, self.dominant_frequency, self.sample_rate)
    }
}

/// Runs `samples` through a fresh engine and returns the output and every
/// message the analysis produced.
pub fn run_engine(engine: &mut Molysynth, samples: &[f32]) -> (Vec<f32>, Vec<Message>) {
    let mut output = vec![0.0; samples.len()];
    let mut messages = Vec::with_capacity(samples.len() / (BLOCK_SIZE * ANALYZE_EVERY) + 1);

    for (index, (input, rendered)) in samples
        .chunks(BLOCK_SIZE)
        .zip(output.chunks_mut(BLOCK_SIZE))
        .enumerate()
    {
        engine.add_samples(input);
        engine.run_synth(input, rendered);
        if index % ANALYZE_EVERY == ANALYZE_EVERY - 1 {
            messages.push(engine.analyze());
        }
    }
    (output, messages)
}

/// Processes the WAV at `input` into `output` and reports on the run.
pub fn run(
    input: &Path,
    output: &Path,
    print_info: bool,
    preset: &Preset,
    configure: impl FnOnce(&Settings),
) -> Result<Report> {
    let wav = wav::read_mono(input)?;
    if print_info {
        println!("{}: {}", input.display(), wav.describe());
    }
    let sample_rate = wav.spec.sample_rate;

    let mut engine = Molysynth::with_preset(sample_rate, preset);
    configure(engine.settings());
    info!(input = %input.display(), sample_rate, "processing");

    let (rendered, messages) = run_engine(&mut engine, &wav.samples);
    wav::write_mono(output, &rendered, sample_rate)?;
    info!(output = %output.display(), "written");

    let spectrum_len = wav.samples.len().min(SPECTRUM_LIMIT);
    let dominant = dominant_frequency(&wav.samples[..spectrum_len], sample_rate, SPECTRUM_FLOOR);
    Ok(Report::from_messages(
        &messages,
        sample_rate,
        wav.samples.len().div_ceil(BLOCK_SIZE),
        dominant,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn pluck(frequency: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        let silence = (sample_rate / 10) as usize;
        let len = (seconds * sample_rate as f32) as usize;
        std::iter::repeat(0.0)
            .take(silence)
            .chain((0..len).map(|n| {
                let t = n as f32 / sample_rate as f32;
                0.5 * (2.0 * PI * frequency * t).sin() + 0.1 * (4.0 * PI * frequency * t).sin()
            }))
            .collect()
    }

    #[test]
    fn engine_loop_analyzes_every_tenth_block() {
        let mut engine = Molysynth::init(44100);
        let samples = vec![0.0; BLOCK_SIZE * 95];
        let (output, messages) = run_engine(&mut engine, &samples);
        assert_eq!(output.len(), samples.len());
        assert_eq!(messages.len(), 9);
        assert!(messages.iter().all(|m| m.kind == MessageKind::Continue && m.lambda == 0.0));
    }

    #[test]
    fn file_round_trip_tracks_the_note() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("a2.wav");
        let output = dir.path().join("out.wav");
        wav::write_mono(&input, &pluck(110.0, 44100, 1.0), 44100).unwrap();

        let report = run(&input, &output, false, &Preset::default(), |_| {}).unwrap();
        assert_eq!(report.notes, 1);
        let tracked = report.tracked_frequency.unwrap();
        assert!((tracked - 110.0).abs() < 1.0, "{tracked}");
        let dominant = report.dominant_frequency.unwrap();
        assert!((dominant - 110.0).abs() < 1.0, "{dominant}");

        let written = wav::read_mono(&output).unwrap();
        assert_eq!(written.samples.len(), 44100 + 4410);
        assert!(written.samples.iter().any(|&x| x.abs() > 0.1));
        assert!(report.to_string().contains("A2"));
    }

    #[test]
    fn report_without_pitch() {
        let report = Report::from_messages(&[Message::silence()], 44100, 10, None);
        assert_eq!(report.tracked_frequency, None);
        assert_eq!(report.notes, 0);
        assert!(report.to_string().contains("Tracked frequency:  -"));
    }
}
