//! # Synthesizer Module
//!
//! A single oscillator voice shaped by the envelope and mixed with the dry
//! input.
//!
//! The voice only changes in response to messages from the analysis task.
//! Between messages it keeps running with the last period and envelope
//! target, so the output stays continuous however late the analysis runs.
//!
//! ## Features
//! - Square and sawtooth with box-filtered discontinuities, naive triangle
//! - Optional autotune applied as messages arrive
//! - Dry/wet mix read from the shared settings every block

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::autotune;
use crate::envelope::{Envelope, EnvelopeTimes};
use crate::message::{Message, MessageKind};
use crate::settings::Settings;

/// Largest phase step per sample. Keeps at most one discontinuity inside a sample.
const MAX_PHASE_STEP: f32 = 0.5;

/// Oscillator shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    pub fn from_setting(value: f32) -> Self {
        match value.round() as i32 {
            1 => Waveform::Sawtooth,
            2 => Waveform::Triangle,
            _ => Waveform::Square,
        }
    }

    pub fn to_setting(self) -> f32 {
        match self {
            Waveform::Square => 0.0,
            Waveform::Sawtooth => 1.0,
            Waveform::Triangle => 2.0,
        }
    }
}

/// Phase accumulator producing unit-amplitude waveforms.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Oscillator {
    phase: f32,
}

impl Oscillator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase in `[0, 1)`.
    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Advances by `step` cycles and returns the waveform averaged over the
    /// sample, so a jump that falls inside the sample is split between its
    /// two levels.
    pub fn next(&mut self, step: f32, waveform: Waveform) -> f32 {
        let step = step.clamp(f32::MIN_POSITIVE, MAX_PHASE_STEP);
        let start = self.phase;
        let mut end = start + step;
        let wrapped = end >= 1.0;
        if wrapped {
            end -= 1.0;
        }

        let value = match waveform {
            Waveform::Square => {
                if wrapped {
                    // -1 until the wrap, +1 after it
                    (end - (1.0 - start)) / step
                } else if end < 0.5 {
                    1.0
                } else if start < 0.5 {
                    // +1 until the half-cycle, -1 after it
                    ((0.5 - start) - (end - 0.5)) / step
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => {
                if wrapped {
                    // Ramp 2p - 1 averaged on each side of the reset
                    (start * (1.0 - start) + (end - 1.0) * end) / step
                } else {
                    start + end - 1.0
                }
            }
            Waveform::Triangle => 1.0 - 4.0 * (end - 0.5).abs(),
        };

        self.phase = end;
        value
    }
}

/// The synthesizer voice.
#[derive(Debug)]
pub struct Synthesizer {
    settings: Arc<Settings>,
    oscillator: Oscillator,
    envelope: Envelope,
    /// Period being played, 0 when the voice is silent.
    lambda: f32,
}

impl Synthesizer {
    pub fn new(settings: Arc<Settings>) -> Self {
        // Build the note table here; `receive` runs in the audio callback.
        autotune::notes();
        Self {
            settings,
            oscillator: Oscillator::new(),
            envelope: Envelope::new(),
            lambda: 0.0,
        }
    }

    pub fn lambda(&self) -> f32 {
        self.lambda
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn oscillator(&self) -> &Oscillator {
        &self.oscillator
    }

    /// Applies one message from the analysis task.
    pub fn receive(&mut self, message: Message) {
        let times = EnvelopeTimes::from_settings(&self.settings);
        let lambda = if self.settings.autotune() {
            autotune::snap(message.lambda, self.settings.sample_rate())
        } else {
            message.lambda
        };

        match message.kind {
            MessageKind::None => {}
            MessageKind::Trigger if lambda > 0.0 => {
                self.lambda = lambda;
                self.envelope
                    .trigger(message.volume, self.settings.envelope_mix(), &times);
            }
            _ if lambda <= 0.0 || message.volume <= 0.0 => self.envelope.release(&times),
            _ => {
                if !self.envelope.is_silent() {
                    self.lambda = lambda;
                }
                self.envelope.follow(message.volume, &times);
            }
        }
    }

    /// Renders one block: `output[n] = wet * voice[n] + dry * input[n]`.
    ///
    /// Processes as many samples as the shorter of the two slices holds.
    pub fn render(&mut self, input: &[f32], output: &mut [f32]) {
        let times = EnvelopeTimes::from_settings(&self.settings);
        let waveform = self.settings.waveform();
        let wet = self.settings.wet_volume();
        let dry = self.settings.dry_volume();

        for (x, y) in input.iter().zip(output.iter_mut()) {
            let level = self.envelope.next(&times);
            let voice = if self.envelope.is_silent() {
                self.lambda = 0.0;
                self.oscillator.reset();
                0.0
            } else {
                level * self.oscillator.next(1.0 / self.lambda, waveform)
            };
            *y = wet * voice + dry * x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeStage;
    use crate::settings::Param;

    fn message(kind: MessageKind, lambda: f32, volume: f32) -> Message {
        Message {
            kind,
            lambda,
            volume,
            volume_raw: volume,
        }
    }

    fn synth(sample_rate: u32) -> Synthesizer {
        Synthesizer::new(Arc::new(Settings::defaults_for(sample_rate)))
    }

    fn render(synth: &mut Synthesizer, samples: usize) -> Vec<f32> {
        let input = vec![0.0; samples];
        let mut output = vec![0.0; samples];
        synth.render(&input, &mut output);
        output
    }

    #[test]
    fn square_is_symmetric_and_averaged_at_edges() {
        let mut osc = Oscillator::new();
        let samples: Vec<f32> = (0..100).map(|_| osc.next(0.1, Waveform::Square)).collect();
        assert!(samples.iter().all(|x| x.abs() <= 1.0 + 1e-6));
        let mean: f32 = samples.iter().sum::<f32>() / samples.len() as f32;
        assert!(mean.abs() < 0.05, "{mean}");

        let mut osc = Oscillator { phase: 0.48 };
        assert!(osc.next(0.04, Waveform::Square).abs() < 1e-5);
        let mut osc = Oscillator { phase: 0.98 };
        assert!(osc.next(0.04, Waveform::Square).abs() < 1e-5);
        assert!((osc.phase() - 0.02).abs() < 1e-6);
    }

    #[test]
    fn sawtooth_ramps_and_resets() {
        let mut osc = Oscillator::new();
        let first = osc.next(0.01, Waveform::Sawtooth);
        let second = osc.next(0.01, Waveform::Sawtooth);
        assert!((second - first - 0.02).abs() < 1e-5);

        let mut osc = Oscillator { phase: 0.98 };
        assert!(osc.next(0.04, Waveform::Sawtooth).abs() < 1e-5);
    }

    #[test]
    fn triangle_peaks_mid_cycle() {
        let mut osc = Oscillator::new();
        let samples: Vec<f32> = (0..4).map(|_| osc.next(0.25, Waveform::Triangle)).collect();
        assert_eq!(samples, vec![0.0, 1.0, 0.0, -1.0]);
    }

    #[test]
    fn waveform_setting_codes() {
        for waveform in [Waveform::Square, Waveform::Sawtooth, Waveform::Triangle] {
            assert_eq!(Waveform::from_setting(waveform.to_setting()), waveform);
        }
    }

    #[test]
    fn silent_voice_outputs_exact_zero() {
        let mut synth = synth(44100);
        synth.receive(Message::silence());
        assert!(render(&mut synth, 480).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn dry_signal_is_mixed_in() {
        let mut synth = synth(44100);
        synth.settings.set(Param::DryVolume, 0.5);
        let input = [0.2, -0.4, 0.6];
        let mut output = [0.0; 3];
        synth.render(&input, &mut output);
        assert_eq!(output, [0.1, -0.2, 0.3]);
    }

    #[test]
    fn trigger_without_period_does_not_start_a_note() {
        let mut synth = synth(44100);
        synth.receive(message(MessageKind::Trigger, 0.0, 0.3));
        assert!(synth.envelope().is_silent());
        assert!(render(&mut synth, 48).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn attack_reaches_the_trigger_volume() {
        let mut synth = synth(44100);
        synth.settings.set(Param::Waveform, Waveform::Square.to_setting());
        synth.receive(message(MessageKind::Trigger, 100.0, 0.4));
        // 5 ms attack at 44.1 kHz
        let attack = synth.settings.attack_samples() as usize;
        let output = render(&mut synth, attack + 10);
        let peak = output.iter().fold(0.0_f32, |m, x| m.max(x.abs()));
        assert!((peak - 0.4).abs() < 0.02, "{peak}");
        assert!(output[..attack / 2].iter().all(|x| x.abs() <= 0.21));
    }

    #[test]
    fn output_period_follows_lambda() {
        let mut synth = synth(44100);
        synth.settings.set(Param::Waveform, Waveform::Sawtooth.to_setting());
        synth.receive(message(MessageKind::Trigger, 123.4, 0.5));
        for _ in 0..200 {
            synth.receive(message(MessageKind::Continue, 123.4, 0.5));
            render(&mut synth, 48);
        }
        let output = render(&mut synth, 4800);
        // The ramp only crosses from positive to negative at its reset.
        let resets: Vec<usize> = output
            .windows(2)
            .enumerate()
            .filter(|(_, pair)| pair[0] >= 0.0 && pair[1] < 0.0)
            .map(|(i, _)| i)
            .collect();
        let span = (resets[resets.len() - 1] - resets[0]) as f32;
        let period = span / (resets.len() - 1) as f32;
        assert!((period - 123.4).abs() < 0.5, "{period}");
    }

    #[test]
    fn envelope_never_jumps() {
        let mut synth = synth(44100);
        synth.settings.set(Param::Waveform, Waveform::Triangle.to_setting());
        synth.settings.set(Param::EnvelopeMix, 2.0);
        let follow = 44;
        let volumes = [0.5, 0.1, 0.9, 0.0, 0.6, 0.6, 0.05];
        let mut previous = 0.0_f32;
        for (i, &volume) in volumes.iter().enumerate() {
            let kind = if i == 0 || i == 4 { MessageKind::Trigger } else { MessageKind::Continue };
            let lambda = if volume > 0.0 { 200.0 } else { 0.0 };
            synth.receive(message(kind, lambda, volume));
            for _ in 0..100 {
                render(&mut synth, 1);
                let level = synth.envelope().level();
                assert!((level - previous).abs() <= 1.0 / follow as f32 + 1e-4);
                previous = level;
            }
        }
    }

    #[test]
    fn adsr_never_jumps() {
        let mut synth = synth(44100);
        synth.settings.set(Param::Attack, 0.005);
        synth.settings.set(Param::Decay, 0.01);
        synth.settings.set(Param::Sustain, 0.5);
        synth.settings.set(Param::Release, 0.02);
        let follow = 44;
        let steps = [
            (message(MessageKind::Trigger, 200.0, 0.8), 1500),
            (message(MessageKind::Continue, 200.0, 0.7), 300),
            (Message::silence(), 1200),
            (message(MessageKind::Trigger, 180.0, 0.6), 100),
            // Retrigger in the middle of the attack
            (message(MessageKind::Trigger, 180.0, 0.9), 1500),
            (Message::silence(), 300),
        ];
        let mut stages = Vec::new();
        let mut previous = 0.0_f32;
        for (message, samples) in steps {
            synth.receive(message);
            for _ in 0..samples {
                render(&mut synth, 1);
                let level = synth.envelope().level();
                assert!(
                    (level - previous).abs() <= 1.0 / follow as f32 + 1e-4,
                    "{previous} -> {level} in {:?}",
                    synth.envelope().stage()
                );
                previous = level;
                if stages.last() != Some(&synth.envelope().stage()) {
                    stages.push(synth.envelope().stage());
                }
            }
        }
        for stage in [
            EnvelopeStage::Attack,
            EnvelopeStage::Decay,
            EnvelopeStage::Sustain,
            EnvelopeStage::Release,
            EnvelopeStage::Silence,
        ] {
            assert!(stages.contains(&stage), "{stage:?} never reached: {stages:?}");
        }
    }

    #[test]
    fn release_keeps_the_period_then_collapses() {
        let mut synth = synth(44100);
        synth.settings.set(Param::Release, 0.01);
        synth.receive(message(MessageKind::Trigger, 200.0, 0.5));
        render(&mut synth, 2000);
        synth.receive(Message::silence());
        assert_eq!(synth.lambda(), 200.0);
        let tail = render(&mut synth, 441);
        assert!(tail[..200].iter().any(|&x| x != 0.0));
        assert_eq!(synth.lambda(), 0.0);
        assert!(render(&mut synth, 100).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn autotune_snaps_incoming_periods() {
        let mut synth = synth(44100);
        synth.settings.set(Param::Autotune, 1.0);
        synth.receive(message(MessageKind::Trigger, 395.0, 0.5));
        assert!((synth.lambda() - 44100.0 / 110.0).abs() < 0.01);
    }
}
