// moly-core/src/lib.rs

//! The core of the Molysynth guitar synthesizer.
//! This crate tracks the pitch of a monophonic guitar signal in real time
//! and drives a small oscillator and envelope from it. It is headless:
//! hosts feed it audio blocks and call `analyze` periodically, either
//! directly through [`Molysynth`] or on two threads via [`Molysynth::into_parts`].

pub mod audio;
pub mod autotune;
pub mod engine;
pub mod envelope;
pub mod estimate;
pub mod message;
pub mod refine;
pub mod ring;
pub mod settings;
pub mod spectrum;
pub mod synth;
pub mod tracker;
pub mod zero_crossing;

pub use engine::{AnalysisPath, AudioPath, Molysynth};
pub use message::{Message, MessageKind};
pub use settings::{Param, Preset, Settings};
