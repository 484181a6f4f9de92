//! # Settings Module
//!
//! User-adjustable parameters shared by both tasks.
//!
//! Each value is an `f32` stored as atomic bits with relaxed ordering. The
//! control layer may write at any time; readers may see a value one block
//! late, which is all the engine requires.
//!
//! ## Features
//! - Named parameters with the single-letter codes used by the pedal firmware
//! - Range clamping on every write
//! - JSON presets for saving and loading a full configuration

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::envelope::EnvelopeMix;
use crate::synth::Waveform;

/// Number of settable options.
pub const PARAM_COUNT: usize = 12;

/// A settable engine option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    DryVolume,
    WetVolume,
    TriggerLevel,
    Compression,
    Attack,
    Decay,
    Sustain,
    Release,
    Waveform,
    Autotune,
    EnvelopeMix,
    Verbose,
}

impl Param {
    pub const ALL: [Param; PARAM_COUNT] = [
        Param::DryVolume,
        Param::WetVolume,
        Param::TriggerLevel,
        Param::Compression,
        Param::Attack,
        Param::Decay,
        Param::Sustain,
        Param::Release,
        Param::Waveform,
        Param::Autotune,
        Param::EnvelopeMix,
        Param::Verbose,
    ];

    /// Single-letter code, as sent by the pedal's control layer.
    pub fn code(self) -> char {
        match self {
            Param::DryVolume => 'y',
            Param::WetVolume => 'e',
            Param::TriggerLevel => 'i',
            Param::Compression => 'c',
            Param::Attack => 'a',
            Param::Decay => 'd',
            Param::Sustain => 's',
            Param::Release => 'r',
            Param::Waveform => 'w',
            Param::Autotune => 't',
            Param::EnvelopeMix => 'x',
            Param::Verbose => 'v',
        }
    }

    pub fn from_code(code: char) -> Option<Param> {
        Param::ALL.into_iter().find(|param| param.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Param::DryVolume => "dry_volume",
            Param::WetVolume => "wet_volume",
            Param::TriggerLevel => "trigger_level",
            Param::Compression => "compression",
            Param::Attack => "attack",
            Param::Decay => "decay",
            Param::Sustain => "sustain",
            Param::Release => "release",
            Param::Waveform => "waveform",
            Param::Autotune => "autotune",
            Param::EnvelopeMix => "envelope_mix",
            Param::Verbose => "verbose",
        }
    }

    /// Valid range; writes are clamped into it.
    pub fn range(self) -> (f32, f32) {
        match self {
            Param::DryVolume | Param::WetVolume => (0.0, 4.0),
            Param::TriggerLevel | Param::Compression => (0.0, 1.0),
            Param::Attack | Param::Decay | Param::Release => (0.0, 10.0),
            Param::Sustain => (0.0, 1.0),
            Param::Waveform | Param::EnvelopeMix => (0.0, 2.0),
            Param::Autotune | Param::Verbose => (0.0, 1.0),
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Param {
    type Err = anyhow::Error;

    /// Accepts either the single-letter code or the full name.
    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        if let (Some(code), None) = (chars.next(), chars.next()) {
            if let Some(param) = Param::from_code(code) {
                return Ok(param);
            }
        }
        Param::ALL
            .into_iter()
            .find(|param| param.name() == s)
            .ok_or_else(|| anyhow!("There is no option {s}"))
    }
}

#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Live settings for one session.
#[derive(Debug)]
pub struct Settings {
    sample_rate: u32,
    values: [AtomicF32; PARAM_COUNT],
}

impl Settings {
    /// Default settings for a session running at `sample_rate`.
    pub fn defaults_for(sample_rate: u32) -> Self {
        let settings = Self {
            sample_rate,
            values: std::array::from_fn(|_| AtomicF32::new(0.0)),
        };
        settings.apply(&Preset::default());
        settings
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Sets `param`, clamping `value` into its range. NaN is ignored.
    pub fn set(&self, param: Param, value: f32) {
        if value.is_nan() {
            return;
        }
        let (low, high) = param.range();
        self.values[param.slot()].store(value.clamp(low, high));
    }

    pub fn get(&self, param: Param) -> f32 {
        self.values[param.slot()].load()
    }

    pub fn dry_volume(&self) -> f32 {
        self.get(Param::DryVolume)
    }

    pub fn wet_volume(&self) -> f32 {
        self.get(Param::WetVolume)
    }

    pub fn trigger_level(&self) -> f32 {
        self.get(Param::TriggerLevel)
    }

    /// Compression threshold, 0 when compression is off.
    pub fn compression(&self) -> f32 {
        self.get(Param::Compression)
    }

    pub fn sustain(&self) -> f32 {
        self.get(Param::Sustain)
    }

    pub fn attack_samples(&self) -> u32 {
        self.seconds_to_samples(self.get(Param::Attack))
    }

    pub fn decay_samples(&self) -> u32 {
        self.seconds_to_samples(self.get(Param::Decay))
    }

    pub fn release_samples(&self) -> u32 {
        self.seconds_to_samples(self.get(Param::Release))
    }

    pub fn waveform(&self) -> Waveform {
        Waveform::from_setting(self.get(Param::Waveform))
    }

    pub fn envelope_mix(&self) -> EnvelopeMix {
        EnvelopeMix::from_setting(self.get(Param::EnvelopeMix))
    }

    pub fn autotune(&self) -> bool {
        self.get(Param::Autotune) != 0.0
    }

    pub fn verbose(&self) -> bool {
        self.get(Param::Verbose) != 0.0
    }

    pub fn seconds_to_samples(&self, seconds: f32) -> u32 {
        (seconds * self.sample_rate as f32).round() as u32
    }

    /// Writes every value of `preset`.
    pub fn apply(&self, preset: &Preset) {
        self.set(Param::DryVolume, preset.dry_volume);
        self.set(Param::WetVolume, preset.wet_volume);
        self.set(Param::TriggerLevel, preset.trigger_level);
        self.set(Param::Compression, preset.compression);
        self.set(Param::Attack, preset.attack);
        self.set(Param::Decay, preset.decay);
        self.set(Param::Sustain, preset.sustain);
        self.set(Param::Release, preset.release);
        self.set(Param::Waveform, preset.waveform.to_setting());
        self.set(Param::Autotune, if preset.autotune { 1.0 } else { 0.0 });
        self.set(Param::EnvelopeMix, preset.envelope_mix.to_setting());
        self.set(Param::Verbose, if preset.verbose { 1.0 } else { 0.0 });
    }

    /// Current values as a preset.
    pub fn snapshot(&self) -> Preset {
        Preset {
            dry_volume: self.dry_volume(),
            wet_volume: self.wet_volume(),
            trigger_level: self.trigger_level(),
            compression: self.compression(),
            attack: self.get(Param::Attack),
            decay: self.get(Param::Decay),
            sustain: self.sustain(),
            release: self.get(Param::Release),
            waveform: self.waveform(),
            autotune: self.autotune(),
            envelope_mix: self.envelope_mix(),
            verbose: self.verbose(),
        }
    }
}

/// A complete, serializable configuration.
///
/// Missing fields in a preset file take their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preset {
    pub dry_volume: f32,
    pub wet_volume: f32,
    /// Amplitude of the filtered input that starts a note.
    pub trigger_level: f32,
    /// Compression threshold, 0 disables.
    pub compression: f32,
    /// Seconds.
    pub attack: f32,
    /// Seconds.
    pub decay: f32,
    /// Fraction of the attack peak.
    pub sustain: f32,
    /// Seconds.
    pub release: f32,
    pub waveform: Waveform,
    pub autotune: bool,
    pub envelope_mix: EnvelopeMix,
    pub verbose: bool,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            dry_volume: 0.0,
            wet_volume: 1.0,
            // 2048 on the 16-bit scale
            trigger_level: 0.0625,
            compression: 0.0,
            attack: 0.005,
            decay: 0.2,
            sustain: 0.7,
            release: 0.15,
            waveform: Waveform::Square,
            autotune: false,
            envelope_mix: EnvelopeMix::Adsr,
            verbose: false,
        }
    }
}

impl Preset {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading preset {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing preset {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("writing preset {}", path.display()))
    }
}
