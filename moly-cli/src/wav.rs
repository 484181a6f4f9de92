//! WAV file boundary: mono f32 samples in, 16-bit PCM out.

use std::path::Path;

use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Samples of channel 0, normalized to [-1, 1).
pub struct MonoWav {
    pub spec: WavSpec,
    pub samples: Vec<f32>,
}

impl MonoWav {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.spec.sample_rate as f32
    }

    /// One-paragraph format summary for `--print-info`.
    pub fn describe(&self) -> String {
        let format = match self.spec.sample_format {
            SampleFormat::Int => "integer PCM",
            SampleFormat::Float => "float PCM",
        };
        format!(
            "{} channel(s), {} Hz, {}-bit {}, {} frames ({:.3} s)",
            self.spec.channels,
            self.spec.sample_rate,
            self.spec.bits_per_sample,
            format,
            self.samples.len(),
            self.duration_secs()
        )
    }
}

/// Reads channel 0 of `path`.
pub fn read_mono(path: &Path) -> Result<MonoWav> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let samples = match spec.sample_format {
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                bail!("unsupported sample width {}", spec.bits_per_sample);
            }
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .step_by(channels)
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<Result<Vec<_>, _>>()
        }
        SampleFormat::Float => reader.samples::<f32>().step_by(channels).collect(),
    }
    .with_context(|| format!("decoding {}", path.display()))?;

    Ok(MonoWav { spec, samples })
}

/// Writes `samples` as mono 16-bit PCM, clipping to [-1, 1].
pub fn write_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer =
        WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
    }
    writer
        .finalize()
        .with_context(|| format!("finalizing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_channel_zero_of_a_stereo_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for (left, right) in [(16384_i16, -1), (-16384, -1), (0, -1)] {
            writer.write_sample(left).unwrap();
            writer.write_sample(right).unwrap();
        }
        writer.finalize().unwrap();

        let wav = read_mono(&path).unwrap();
        assert_eq!(wav.samples, vec![0.5, -0.5, 0.0]);
        assert_eq!(wav.spec.sample_rate, 44100);
        assert!(wav.describe().starts_with("2 channel(s), 44100 Hz, 16-bit integer PCM"));
    }

    #[test]
    fn written_file_is_mono_16_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        write_mono(&path, &[0.0, 0.5, 2.0, -2.0], 48000).unwrap();

        let reader = WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.spec().sample_rate, 48000);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, 32767, -32767]);
    }

    #[test]
    fn missing_file_names_the_path() {
        let error = read_mono(Path::new("/nonexistent/in.wav")).err().unwrap();
        assert!(format!("{error:#}").contains("/nonexistent/in.wav"));
    }
}
