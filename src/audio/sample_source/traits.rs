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
use std::time::Duration;

use super::error::SampleSourceError;

/// A finite source of audio that hands out chunks in planar format: one Vec per channel,
/// every channel holding the same number of frames.
pub trait SampleSource: Send + Sync {
    /// Clears every channel in `output` and fills it with up to `max_frames` frames.
    /// Returns the number of frames written (0 = EOF).
    ///
    /// `output` must have exactly `channel_count()` elements.
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError>;

    /// Get the number of channels in this source
    fn channel_count(&self) -> u16;

    /// Get the sample rate of this source
    fn sample_rate(&self) -> u32;

    /// Get the duration of this source (if known)
    fn duration(&self) -> Option<Duration>;
}

impl SampleSource for Box<dyn SampleSource> {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        (**self).next_chunk(output, max_frames)
    }

    fn channel_count(&self) -> u16 {
        (**self).channel_count()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn duration(&self) -> Option<Duration> {
        (**self).duration()
    }
}

/// Checks that a caller handed over one output Vec per channel.
pub(crate) fn check_output_channels(
    output: &[Vec<f32>],
    channels: u16,
) -> Result<(), SampleSourceError> {
    if output.len() != channels as usize {
        return Err(SampleSourceError::SampleConversionFailed(format!(
            "Output has {} channels, expected {}",
            output.len(),
            channels
        )));
    }
    Ok(())
}

/// Reads a source to EOF and returns its planar contents.
pub fn read_to_end<S: SampleSource + ?Sized>(
    source: &mut S,
    chunk_frames: usize,
) -> Result<Vec<Vec<f32>>, SampleSourceError> {
    let channels = source.channel_count() as usize;
    let chunk_frames = chunk_frames.max(1);
    let mut planar = vec![Vec::new(); channels];
    let mut chunk = vec![Vec::with_capacity(chunk_frames); channels];

    loop {
        let frames = source.next_chunk(&mut chunk, chunk_frames)?;
        if frames == 0 {
            break;
        }
        for (dst, src) in planar.iter_mut().zip(chunk.iter()) {
            dst.extend_from_slice(&src[..frames]);
        }
    }

    Ok(planar)
}
