// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Args, Parser, Subcommand};
use duration_string::DurationString;
use tracing_subscriber::EnvFilter;

use steploop::audio;
use steploop::config::EngineConfig;
use steploop::util::{duration_minutes_seconds, filename_display};
use steploop::{LoopEvent, Project};

/// The presets every project starts with, as (name, beat offsets).
const STANDARD_PRESETS: [(&str, &[f64]); 4] = [
    ("Single", &[0.0]),
    ("Last", &[0.75]),
    ("Double", &[0.0, 0.5]),
    ("Triple", &[0.0, 0.25, 0.5]),
];

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A step-sequencer loop engine."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LoopArgs {
    /// The path to an engine config file (YAML).
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// A sample to load as a track, in the form <NAME>=<PATH>. May be repeated.
    #[arg(short, long = "sample", value_name = "NAME=PATH")]
    samples: Vec<String>,
    /// A step to set, in the form <TRACK>:<POSITION>:<PRESET>. May be repeated.
    /// Presets are Single, Last, Double and Triple.
    #[arg(long = "step", value_name = "TRACK:POS:PRESET")]
    steps: Vec<String>,
    /// The tempo in beats per minute. Overrides the config.
    #[arg(short, long)]
    bpm: Option<f64>,
    /// The loop length in positions. Overrides the config.
    #[arg(short, long)]
    length: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays the loop through the configured output device.
    Play {
        #[command(flatten)]
        args: LoopArgs,
        /// How long to play for, e.g. 30s or 2m.
        #[arg(short, long, default_value = "8s")]
        duration: String,
    },
    /// Renders the loop to a WAV file.
    Export {
        #[command(flatten)]
        args: LoopArgs,
        /// The WAV file to write.
        output: PathBuf,
    },
}

/// Builds a project from the command line: config, overrides, standard presets, tracks and steps.
/// Live projects open the configured output device. Offline projects never play, so they get a
/// mock sink and need no audio hardware.
fn build_project(args: LoopArgs, live: bool) -> Result<Project, Box<dyn Error>> {
    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(bpm) = args.bpm {
        config.set_bpm(bpm);
    }
    if let Some(length) = args.length {
        config.set_length(length);
    }

    let mut project = if live {
        Project::new(config)?
    } else {
        Project::with_sink(config, Arc::new(audio::mock::Device::get("mock-offline")))?
    };
    for (name, offsets) in STANDARD_PRESETS {
        project.presets_mut().add_preset(offsets.to_vec(), name);
    }

    for sample in args.samples.iter() {
        let (name, path) = sample
            .split_once('=')
            .ok_or_else(|| format!("malformed sample {}, expected NAME=PATH", sample))?;
        project.add_sample_track(name, path)?;
    }

    for step in args.steps.iter() {
        let parts: Vec<&str> = step.split(':').collect();
        if parts.len() != 3 {
            return Err(format!("malformed step {}, expected TRACK:POS:PRESET", step).into());
        }
        let position: usize = parts[1]
            .parse()
            .map_err(|e| format!("bad position in step {}: {}", step, e))?;
        project.set_step(parts[0], position, parts[2])?;
    }

    Ok(project)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play { args, duration } => {
            let duration: Duration = DurationString::from_string(duration)?.into();
            let project = build_project(args, true)?;
            let loop_system = project.loop_system().clone();
            let mut events = loop_system.subscribe();

            println!("{}", loop_system.overview(&project.tracks().read()));
            loop_system.play();

            let deadline = tokio::time::sleep(duration);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = events.recv() => match event {
                        Some(LoopEvent::PositionChanged { playing: true, .. }) => {
                            println!("{}", loop_system.overview(&project.tracks().read()));
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            loop_system.stop();
            println!("Played for {}.", duration_minutes_seconds(duration));
        }
        Commands::Export { args, output } => {
            let project = build_project(args, false)?;
            let duration = project.handler().full_render_to_file(&output)?;
            println!(
                "Wrote {} ({}).",
                filename_display(&output),
                duration_minutes_seconds(duration)
            );
        }
    }

    Ok(())
}
