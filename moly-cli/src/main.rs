//! moly: drives the Molysynth engine from the command line.
//!
//! - `process`: run a recorded WAV through the engine and write the result
//! - `live`: run the engine between the default input and output devices

mod process;
mod wav;

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use moly_core::{Param, Preset, Settings, audio};
use tracing::{Level, info};

/// Monophonic guitar pitch-tracking synthesizer
#[derive(Parser)]
#[command(name = "moly")]
#[command(version)]
struct Cli {
    /// Log every analysis cycle (also turns on the verbose setting)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a WAV file off-line
    Process {
        /// Input WAV file; channel 0 is used
        input: PathBuf,

        /// Output WAV file (mono, 16-bit)
        #[arg(short, long, default_value = "tmp.wav")]
        output: PathBuf,

        /// Print the input's format before processing
        #[arg(long)]
        print_info: bool,

        #[command(flatten)]
        options: EngineOptions,
    },

    /// Play live from the default input to the default output until Enter is pressed
    Live {
        #[command(flatten)]
        options: EngineOptions,
    },
}

#[derive(Args)]
struct EngineOptions {
    /// JSON preset to start from
    #[arg(long)]
    preset: Option<PathBuf>,

    /// Override one option, e.g. `--set w=1` or `--set release=0.5` (repeatable)
    #[arg(long = "set", value_name = "OPTION=VALUE", value_parser = parse_override)]
    overrides: Vec<(Param, f32)>,
}

impl EngineOptions {
    fn load_preset(&self, verbose: bool) -> Result<Preset> {
        let mut preset = match &self.preset {
            Some(path) => Preset::load(path)?,
            None => Preset::default(),
        };
        preset.verbose |= verbose;
        Ok(preset)
    }

    fn apply_overrides(&self, settings: &Settings) {
        for &(param, value) in &self.overrides {
            settings.set(param, value);
            info!(%param, value = settings.get(param), "option set");
        }
    }
}

fn parse_override(s: &str) -> Result<(Param, f32), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected OPTION=VALUE, got {s}"))?;
    let param: Param = name.trim().parse().map_err(|e| format!("{e}"))?;
    let value: f32 = value
        .trim()
        .parse()
        .map_err(|e| format!("bad value for {param}: {e}"))?;
    Ok((param, value))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Process {
            input,
            output,
            print_info,
            options,
        } => {
            let preset = options.load_preset(cli.verbose)?;
            let report = process::run(&input, &output, print_info, &preset, |settings| {
                options.apply_overrides(settings)
            })?;
            println!("{report}");
        }
        Commands::Live { options } => {
            let preset = options.load_preset(cli.verbose)?;
            let session = audio::start_live(&preset)?;
            options.apply_overrides(session.settings());
            println!(
                "Running at {} Hz. Press Enter to stop.",
                session.sample_rate()
            );
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .context("reading stdin")?;
            session.stop()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_accept_codes_and_names() {
        assert_eq!(parse_override("w=1").unwrap(), (Param::Waveform, 1.0));
        assert_eq!(parse_override("release = 0.5").unwrap(), (Param::Release, 0.5));
        assert!(parse_override("q=1").unwrap_err().contains("There is no option q"));
        assert!(parse_override("w").is_err());
        assert!(parse_override("w=loud").is_err());
    }

    #[test]
    fn cli_parses_process_options() {
        let cli = Cli::try_parse_from([
            "moly", "-v", "process", "in.wav", "-o", "out.wav", "--set", "y=0.5", "--set", "t=1",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Process {
                input,
                output,
                print_info,
                options,
            } => {
                assert_eq!(input, PathBuf::from("in.wav"));
                assert_eq!(output, PathBuf::from("out.wav"));
                assert!(!print_info);
                assert_eq!(
                    options.overrides,
                    vec![(Param::DryVolume, 0.5), (Param::Autotune, 1.0)]
                );
            }
            Commands::Live { .. } => panic!("expected process"),
        }
    }
}
