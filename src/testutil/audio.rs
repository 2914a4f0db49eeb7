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

use std::{error::Error, fs::File, path::Path, sync::Arc};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::samples::Sample;

/// Writes planar f32 channels to a 32-bit float WAV file.
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    channels: &[Vec<f32>],
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels: channels.len() as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let frames = channels.iter().map(|c| c.len()).max().unwrap_or(0);
    for frame in 0..frames {
        for channel in channels {
            writer.write_sample(channel.get(frame).copied().unwrap_or(0.0))?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Writes planar i16 channels to a 16-bit integer WAV file.
pub fn write_wav_i16<P: AsRef<Path>>(
    path: P,
    channels: &[Vec<i16>],
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels: channels.len() as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    let frames = channels.iter().map(|c| c.len()).max().unwrap_or(0);
    for frame in 0..frames {
        for channel in channels {
            writer.write_sample(channel.get(frame).copied().unwrap_or(0))?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// A constant-level block of `frames` frames: an easy onset to find in a rendered mix.
pub fn click(frames: usize, level: f32) -> Vec<f32> {
    vec![level; frames]
}

/// Writes a mono float WAV named `<name>.wav` into `dir` and returns it as a sample.
pub fn sample_file(
    dir: &Path,
    name: &str,
    data: Vec<f32>,
    sample_rate: u32,
) -> Result<Arc<Sample>, Box<dyn Error>> {
    let path = dir.join(format!("{}.wav", name));
    write_wav(&path, &[data], sample_rate)?;
    Ok(Arc::new(Sample::new("Test", &path, name)?))
}
