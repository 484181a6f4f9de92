//! ADSR and instrument-follow envelope.
//!
//! Every level change is a linear ramp over a known number of samples, so
//! the envelope never jumps. The shortest ramp is the follow ramp (1 ms).

use serde::{Deserialize, Serialize};

use crate::settings::Settings;

/// How the envelope reacts to the tracked volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeMix {
    /// Fixed attack, decay, sustain and release shape.
    #[default]
    Adsr,
    /// Fixed attack, then chase the instrument's volume.
    AttackThenFollow,
    /// Chase the instrument's volume from the trigger on.
    Follow,
}

impl EnvelopeMix {
    pub fn from_setting(value: f32) -> Self {
        match value.round() as i32 {
            1 => EnvelopeMix::AttackThenFollow,
            2 => EnvelopeMix::Follow,
            _ => EnvelopeMix::Adsr,
        }
    }

    pub fn to_setting(self) -> f32 {
        match self {
            EnvelopeMix::Adsr => 0.0,
            EnvelopeMix::AttackThenFollow => 1.0,
            EnvelopeMix::Follow => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeStage {
    #[default]
    Silence,
    Attack,
    Decay,
    Sustain,
    Release,
    InstrumentFollow,
}

/// Stage lengths in samples, read from the settings once per block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeTimes {
    pub attack: u32,
    pub decay: u32,
    /// Fraction of the attack peak.
    pub sustain: f32,
    pub release: u32,
    pub follow: u32,
}

impl EnvelopeTimes {
    pub fn from_settings(settings: &Settings) -> Self {
        let follow = (settings.sample_rate() / 1000).max(1);
        Self {
            attack: settings.attack_samples().max(follow),
            decay: settings.decay_samples().max(follow),
            sustain: settings.sustain(),
            release: settings.release_samples().max(follow),
            follow,
        }
    }
}

/// Linear approach to a target over a fixed number of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Ramp {
    value: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl Ramp {
    fn start(&mut self, target: f32, samples: u32) {
        let samples = samples.max(1);
        self.target = target;
        self.step = (target - self.value) / samples as f32;
        self.remaining = samples;
    }

    fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.value = if self.remaining == 0 {
                self.target
            } else {
                self.value + self.step
            };
        }
        self.value
    }

    fn is_done(&self) -> bool {
        self.remaining == 0
    }
}

/// Envelope state for the single voice.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    stage: EnvelopeStage,
    mix: EnvelopeMix,
    ramp: Ramp,
    peak: f32,
    counter: u32,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.ramp.value
    }

    /// Samples spent in the current stage.
    pub fn samples_in_stage(&self) -> u32 {
        self.counter
    }

    pub fn is_silent(&self) -> bool {
        self.stage == EnvelopeStage::Silence
    }

    fn enter(&mut self, stage: EnvelopeStage) {
        self.stage = stage;
        self.counter = 0;
    }

    /// Starts a note that peaks at `peak`. The attack ramps from the current
    /// level, which is 0 unless a note is still sounding.
    pub fn trigger(&mut self, peak: f32, mix: EnvelopeMix, times: &EnvelopeTimes) {
        self.mix = mix;
        self.peak = peak;
        match mix {
            EnvelopeMix::Follow => {
                self.enter(EnvelopeStage::InstrumentFollow);
                self.ramp.start(peak, times.follow);
            }
            EnvelopeMix::Adsr | EnvelopeMix::AttackThenFollow => {
                self.enter(EnvelopeStage::Attack);
                self.ramp.start(peak, times.attack);
            }
        }
    }

    /// Tracks a new volume while following the instrument. Other stages ignore it.
    pub fn follow(&mut self, volume: f32, times: &EnvelopeTimes) {
        if self.stage == EnvelopeStage::InstrumentFollow {
            self.ramp.start(volume, times.follow);
        }
    }

    /// Note off.
    pub fn release(&mut self, times: &EnvelopeTimes) {
        let samples = match (self.stage, self.mix) {
            (EnvelopeStage::Silence | EnvelopeStage::Release, _) => return,
            (_, EnvelopeMix::Adsr) => times.release,
            (_, EnvelopeMix::AttackThenFollow | EnvelopeMix::Follow) => times.follow,
        };
        self.enter(EnvelopeStage::Release);
        self.ramp.start(0.0, samples);
    }

    /// Advances one sample and returns the level.
    pub fn next(&mut self, times: &EnvelopeTimes) -> f32 {
        let level = self.ramp.next();
        self.counter = self.counter.saturating_add(1);
        if !self.ramp.is_done() {
            return level;
        }

        match self.stage {
            EnvelopeStage::Attack if self.mix == EnvelopeMix::Adsr => {
                self.enter(EnvelopeStage::Decay);
                self.ramp.start(times.sustain * self.peak, times.decay);
            }
            EnvelopeStage::Attack => self.enter(EnvelopeStage::InstrumentFollow),
            EnvelopeStage::Decay => self.enter(EnvelopeStage::Sustain),
            EnvelopeStage::Release => {
                self.enter(EnvelopeStage::Silence);
                self.ramp = Ramp::default();
            }
            EnvelopeStage::Silence
            | EnvelopeStage::Sustain
            | EnvelopeStage::InstrumentFollow => {}
        }
        level
    }
}
