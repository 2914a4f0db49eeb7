// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::{error::Error, path::Path, str::FromStr};

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::debug;

use crate::audio::{SampleFormat, TargetFormat, WaveFormat};
use crate::loop_system::{DEFAULT_BPM, DEFAULT_LENGTH};

mod error;

pub use error::ConfigError;

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_BITS_PER_SAMPLE: u16 = 16;
const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Prefix of environment variables that override the file, e.g. `STEPLOOP_BPM=90`.
pub const ENV_PREFIX: &str = "STEPLOOP";

/// Engine configuration. Every field is optional; the accessors apply defaults.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EngineConfig {
    /// Project sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Project channel count (default: 2)
    channels: Option<u16>,

    /// Export sample format, "int" or "float" (default: "int")
    sample_format: Option<String>,

    /// Export bits per sample (default: 16)
    bits_per_sample: Option<u16>,

    /// Initial tempo in beats per minute (default: 130)
    bpm: Option<f64>,

    /// Initial loop length in positions (default: 4)
    length: Option<usize>,

    /// Output device name. Names starting with "mock" select the mock sink.
    device: Option<String>,

    /// Frames decoded per chunk when loading samples (default: 4096)
    buffer_size: Option<usize>,
}

impl EngineConfig {
    /// Loads the configuration from an optional YAML file, then applies `STEPLOOP_` environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "Loading config file.");
            builder = builder.add_source(File::from(path));
        }
        Ok(builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize::<EngineConfig>()?)
    }

    /// A default configuration that plays through the given device.
    pub fn with_device(device: &str) -> EngineConfig {
        EngineConfig {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    /// Returns the export sample format (default: Int)
    pub fn sample_format(&self) -> Result<SampleFormat, Box<dyn Error>> {
        match self.sample_format.as_deref() {
            Some(format) => SampleFormat::from_str(format),
            None => Ok(SampleFormat::Int),
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE)
    }

    pub fn bpm(&self) -> f64 {
        self.bpm.unwrap_or(DEFAULT_BPM)
    }

    pub fn length(&self) -> usize {
        self.length.unwrap_or(DEFAULT_LENGTH)
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Frames per decode chunk. Never 0.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE).max(1)
    }

    /// The project PCM layout.
    pub fn format(&self) -> WaveFormat {
        WaveFormat::new(self.sample_rate(), self.channels()).unwrap_or_default()
    }

    /// The export file layout: the project layout at the configured sample format and depth.
    pub fn export_format(&self) -> Result<TargetFormat, Box<dyn Error>> {
        TargetFormat::new(self.format(), self.sample_format()?, self.bits_per_sample())
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = Some(bpm);
    }

    pub fn set_length(&mut self, length: usize) {
        self.length = Some(length);
    }
}
