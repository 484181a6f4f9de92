//! # Live Audio Module
//!
//! Runs a session against the default audio devices using CPAL.
//!
//! The input callback is the high-priority task: it feeds each block through
//! [`AudioPath::process`] and queues the rendered samples on a lock-free
//! `ringbuf` queue that the output callback drains. A dedicated thread plays
//! the low-priority task, calling [`AnalysisPath::analyze`] every 10 ms
//! until it is told to stop.
//!
//! ## Features
//! - Mono f32 input at the supported rate closest to 44.1 kHz
//! - Output mirrored to every channel of the default output device
//! - Clean shutdown over a crossbeam channel

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender, select};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use tracing::{debug, info, warn};

use crate::engine::{AnalysisPath, AudioPath, Molysynth};
use crate::settings::{Preset, Settings};

/// Samples per high-priority block.
pub const BLOCK_SIZE: usize = 48;
/// Period of the analysis task.
pub const ANALYSIS_INTERVAL: Duration = Duration::from_millis(10);
/// Preferred session rate.
pub const TARGET_RATE: u32 = 44100;

/// A running live session. Dropping it also ends the analysis thread, but
/// only [`stop`](Self::stop) waits for it.
pub struct LiveSession {
    input: cpal::Stream,
    output: cpal::Stream,
    shutdown: Sender<()>,
    analysis: JoinHandle<()>,
    settings: Arc<Settings>,
}

impl LiveSession {
    pub fn sample_rate(&self) -> u32 {
        self.settings.sample_rate()
    }

    /// Live settings; writes take effect on the next block.
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Stops both streams and joins the analysis thread.
    pub fn stop(self) -> Result<()> {
        self.input.pause().context("pausing input stream")?;
        self.output.pause().context("pausing output stream")?;
        let _ = self.shutdown.send(());
        self.analysis
            .join()
            .map_err(|_| anyhow!("analysis thread panicked"))?;
        info!("live session stopped");
        Ok(())
    }
}

/// Opens the default input and output devices and starts a session with `preset`.
///
/// The input stream runs the engine's audio half in its callback and queues
/// the rendered samples for the output stream. The analysis half runs on its
/// own thread until [`LiveSession::stop`].
///
/// # Arguments
/// * `preset` - Initial settings; the session's [`Settings`](crate::Settings) can be changed afterwards
///
/// # Returns
/// * `Result<LiveSession>` - The running session, or an error if no device
///   offers a mono f32 configuration or a stream fails to start
pub fn start_live(preset: &Preset) -> Result<LiveSession> {
    let host = cpal::default_host();
    let input_device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;
    let output_device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;
    info!(
        input = %input_device.name()?,
        output = %output_device.name()?,
        "using audio devices"
    );

    let configs = input_device.supported_input_configs()?.collect::<Vec<_>>();
    let (supported, sample_rate) = find_supported_config(configs, TARGET_RATE)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;
    let input_config: StreamConfig = supported.with_sample_rate(SampleRate(sample_rate)).into();
    let output_channels = output_device
        .default_output_config()
        .context("querying output config")?
        .channels();
    let output_config = StreamConfig {
        channels: output_channels,
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    info!(sample_rate, output_channels, "selected stream format");

    let engine = Molysynth::with_preset(sample_rate, preset);
    let settings = Arc::clone(engine.settings());
    let (audio, analysis) = engine.into_parts();

    // A quarter second of slack between the two device clocks
    let queue = HeapRb::<f32>::new(sample_rate as usize / 4);
    let (producer, mut consumer) = queue.split();

    let input = input_device
        .build_input_stream(
            &input_config,
            input_callback(audio, producer),
            |err| warn!(%err, "input stream error"),
            None,
        )
        .context("building input stream")?;

    let channels = usize::from(output_channels.max(1));
    let output = output_device
        .build_output_stream(
            &output_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    frame.fill(consumer.try_pop().unwrap_or(0.0));
                }
            },
            |err| warn!(%err, "output stream error"),
            None,
        )
        .context("building output stream")?;

    let (shutdown, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let analysis = thread::Builder::new()
        .name("moly-analysis".into())
        .spawn(move || run_analysis(analysis, shutdown_rx))
        .context("spawning analysis thread")?;

    output.play().context("starting output stream")?;
    input.play().context("starting input stream")?;

    Ok(LiveSession {
        input,
        output,
        shutdown,
        analysis,
        settings,
    })
}

fn input_callback(
    mut audio: AudioPath,
    mut producer: HeapProd<f32>,
) -> impl FnMut(&[f32], &cpal::InputCallbackInfo) + Send + 'static {
    let mut block = [0.0_f32; BLOCK_SIZE];
    move |data: &[f32], _: &cpal::InputCallbackInfo| {
        for chunk in data.chunks(BLOCK_SIZE) {
            let rendered = &mut block[..chunk.len()];
            audio.process(chunk, rendered);
            // On overflow the newest samples are dropped; the output side catches up.
            producer.push_slice(rendered);
        }
    }
}

fn run_analysis(mut analysis: AnalysisPath, shutdown: Receiver<()>) {
    debug!("analysis thread started");
    loop {
        select! {
            recv(shutdown) -> _ => break,
            default(ANALYSIS_INTERVAL) => {
                analysis.analyze();
            }
        }
    }
    debug!(
        samples = analysis.samples_written(),
        "analysis thread finished"
    );
}

/// Picks the mono f32 configuration whose supported range comes closest to
/// `target_rate`, and the rate to run it at.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<(SupportedStreamConfigRange, u32)> {
    configs
        .into_iter()
        .filter(|c| c.channels() == 1 && c.sample_format() == cpal::SampleFormat::F32)
        .map(|c| {
            let rate = target_rate.clamp(c.min_sample_rate().0, c.max_sample_rate().0);
            (c, rate)
        })
        .min_by_key(|&(_, rate)| rate.abs_diff(target_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpal::{SampleFormat, SupportedBufferSize};

    fn range(channels: u16, min: u32, max: u32, format: SampleFormat) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn prefers_a_range_containing_the_target() {
        let configs = vec![
            range(1, 8000, 22050, SampleFormat::F32),
            range(1, 32000, 96000, SampleFormat::F32),
        ];
        let (config, rate) = find_supported_config(configs, TARGET_RATE).unwrap();
        assert_eq!(rate, 44100);
        assert_eq!(config.max_sample_rate(), SampleRate(96000));
    }

    #[test]
    fn clamps_to_the_nearest_supported_rate() {
        let configs = vec![range(1, 48000, 48000, SampleFormat::F32)];
        let (_, rate) = find_supported_config(configs, TARGET_RATE).unwrap();
        assert_eq!(rate, 48000);
    }

    #[test]
    fn skips_stereo_and_integer_formats() {
        let configs = vec![
            range(2, 44100, 44100, SampleFormat::F32),
            range(1, 44100, 44100, SampleFormat::I16),
        ];
        assert!(find_supported_config(configs, TARGET_RATE).is_none());
    }
}
