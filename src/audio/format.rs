// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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

use std::{error::Error, fmt, str::FromStr, time::Duration};

/// Sample format enumeration for exported audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Integer samples (e.g., 16-bit, 24-bit, 32-bit)
    Int,
    /// Floating point samples (32-bit float)
    Float,
}

impl FromStr for SampleFormat {
    /// Convert from string representation
    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        match s {
            "float" | "Float" => Ok(SampleFormat::Float),
            "int" | "Int" => Ok(SampleFormat::Int),
            _ => Err(format!("Unsupported sample format: {}", s).into()),
        }
    }

    type Err = Box<dyn Error>;
}

impl SampleFormat {
    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The project-wide PCM layout. Every decoded sample and every rendered mix shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
}

impl WaveFormat {
    /// Creates a new WaveFormat
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, Box<dyn Error>> {
        if sample_rate == 0 {
            return Err("Sample rate must be greater than 0".into());
        }
        if channels == 0 {
            return Err("Channel count must be greater than 0".into());
        }

        Ok(WaveFormat {
            sample_rate,
            channels,
        })
    }

    /// Number of whole frames covering the given number of seconds, rounded to the nearest frame.
    pub fn frames_for_secs(&self, secs: f64) -> usize {
        if secs <= 0.0 {
            return 0;
        }
        (secs * self.sample_rate as f64).round() as usize
    }

    /// Duration of the given number of frames.
    pub fn duration_of_frames(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }
}

impl Default for WaveFormat {
    /// 44.1kHz stereo
    fn default() -> Self {
        WaveFormat {
            sample_rate: 44100,
            channels: 2,
        }
    }
}

impl fmt::Display for WaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

/// Container layout for offline export.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFormat {
    /// Sample rate and channel layout of the written file
    pub wave: WaveFormat,
    /// Sample format (integer or float)
    pub sample_format: SampleFormat,
    /// Bits per sample
    pub bits_per_sample: u16,
}

impl TargetFormat {
    /// Creates a new TargetFormat, rejecting layouts a WAV writer can't produce.
    pub fn new(
        wave: WaveFormat,
        sample_format: SampleFormat,
        bits_per_sample: u16,
    ) -> Result<Self, Box<dyn Error>> {
        match (sample_format, bits_per_sample) {
            (SampleFormat::Int, 16 | 24 | 32) | (SampleFormat::Float, 32) => Ok(TargetFormat {
                wave,
                sample_format,
                bits_per_sample,
            }),
            _ => Err(format!(
                "Unsupported export format: {} bits {}",
                bits_per_sample, sample_format
            )
            .into()),
        }
    }

    /// The hound spec for this format.
    pub fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.wave.channels,
            sample_rate: self.wave.sample_rate,
            bits_per_sample: self.bits_per_sample,
            sample_format: match self.sample_format {
                SampleFormat::Int => hound::SampleFormat::Int,
                SampleFormat::Float => hound::SampleFormat::Float,
            },
        }
    }
}

impl Default for TargetFormat {
    /// Creates a default target format (44.1kHz stereo, 16-bit integer)
    fn default() -> Self {
        TargetFormat {
            wave: WaveFormat::default(),
            sample_format: SampleFormat::Int,
            bits_per_sample: 16,
        }
    }
}
