//! # Engine Module
//!
//! The owning context for one session and its split into the two tasks.
//!
//! `Molysynth` is what a single-threaded host drives directly (the off-line
//! processor). A real-time host calls [`Molysynth::into_parts`] and moves
//! the [`AudioPath`] into the audio callback and the [`AnalysisPath`] onto a
//! low-priority thread. The halves share the sample ring and the settings
//! and talk through the message slot.

use std::sync::Arc;

use crate::message::{Inbox, Message, MessageKind, Outbox, mailbox};
use crate::ring::{PreFilter, SampleRing};
use crate::settings::{Param, Preset, Settings};
use crate::synth::Synthesizer;
use crate::tracker::Tracker;

/// High-priority half: feeds the ring and renders the voice.
///
/// Never blocks, allocates or logs.
#[derive(Debug)]
pub struct AudioPath {
    ring: Arc<SampleRing>,
    filter: PreFilter,
    synth: Synthesizer,
    inbox: Inbox,
}

impl AudioPath {
    /// Filters `input` into the ring.
    pub fn add_samples(&mut self, input: &[f32]) {
        self.ring.write_samples(&mut self.filter, input);
    }

    /// Picks up the latest message, if any, and renders one block.
    pub fn run_synth(&mut self, input: &[f32], output: &mut [f32]) {
        if let Some(message) = self.inbox.take() {
            self.synth.receive(message);
        }
        self.synth.render(input, output);
    }

    /// One audio block: [`add_samples`](Self::add_samples) then
    /// [`run_synth`](Self::run_synth).
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        self.add_samples(input);
        self.run_synth(input, output);
    }

    pub fn synth(&self) -> &Synthesizer {
        &self.synth
    }
}

/// Low-priority half: runs the tracker and publishes its messages.
#[derive(Debug)]
pub struct AnalysisPath {
    ring: Arc<SampleRing>,
    tracker: Tracker,
    outbox: Outbox,
    settings: Arc<Settings>,
}

impl AnalysisPath {
    /// Analyzes everything written since the previous call and publishes the result.
    ///
    /// A call that finds no new samples publishes nothing, so an unread
    /// message stays in the slot.
    pub fn analyze(&mut self) -> Message {
        let message = self.tracker.analyze(&self.ring, &self.settings);
        if message.kind != MessageKind::None {
            self.outbox.publish(message);
        }
        message
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn samples_written(&self) -> u64 {
        self.ring.samples_written()
    }
}

/// One pitch-tracking synthesizer session.
#[derive(Debug)]
pub struct Molysynth {
    audio: AudioPath,
    analysis: AnalysisPath,
    settings: Arc<Settings>,
}

impl Molysynth {
    /// Sets up a session with default settings for `sample_rate`.
    pub fn init(sample_rate: u32) -> Self {
        let settings = Arc::new(Settings::defaults_for(sample_rate));
        let ring = Arc::new(SampleRing::new());
        let (outbox, inbox) = mailbox();

        let audio = AudioPath {
            ring: Arc::clone(&ring),
            filter: PreFilter::new(),
            synth: Synthesizer::new(Arc::clone(&settings)),
            inbox,
        };
        let analysis = AnalysisPath {
            ring,
            tracker: Tracker::new(sample_rate),
            outbox,
            settings: Arc::clone(&settings),
        };
        Self {
            audio,
            analysis,
            settings,
        }
    }

    /// Same as [`init`](Self::init), then applies `preset`.
    pub fn with_preset(sample_rate: u32, preset: &Preset) -> Self {
        let engine = Self::init(sample_rate);
        engine.settings.apply(preset);
        engine
    }

    pub fn sample_rate(&self) -> u32 {
        self.settings.sample_rate()
    }

    pub fn add_samples(&mut self, input: &[f32]) {
        self.audio.add_samples(input);
    }

    pub fn run_synth(&mut self, input: &[f32], output: &mut [f32]) {
        self.audio.run_synth(input, output);
    }

    pub fn analyze(&mut self) -> Message {
        self.analysis.analyze()
    }

    /// Sets one option. Values are clamped into the option's range.
    pub fn set(&self, param: Param, value: f32) {
        self.settings.set(param, value);
    }

    /// Shared settings handle; writes take effect on the next block.
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn audio(&self) -> &AudioPath {
        &self.audio
    }

    pub fn analysis(&self) -> &AnalysisPath {
        &self.analysis
    }

    /// Splits the session for hosts that run the two tasks on different threads.
    pub fn into_parts(self) -> (AudioPath, AnalysisPath) {
        (self.audio, self.analysis)
    }
}
