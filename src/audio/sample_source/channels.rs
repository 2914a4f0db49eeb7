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
use super::traits::{check_output_channels, SampleSource};

/// How each output channel is derived from the source channels.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Mapping {
    /// Same layout, copied through.
    Passthrough,
    /// A mono source copied to every output channel.
    Duplicate,
    /// Every source channel averaged into a mono output.
    Average,
    /// Output channel `n` reads source channel `n % source_channels`.
    ByIndex,
}

/// Adapts a source to the project channel count.
pub struct ChannelConverter<S: SampleSource> {
    source: S,
    target_channels: u16,
    mapping: Mapping,
    /// Reused planar buffer the source is read into.
    scratch: Vec<Vec<f32>>,
}

impl<S: SampleSource> ChannelConverter<S> {
    pub fn new(source: S, target_channels: u16) -> Result<Self, SampleSourceError> {
        let source_channels = source.channel_count();
        if source_channels == 0 || target_channels == 0 {
            return Err(SampleSourceError::UnsupportedChannels(
                source_channels,
                target_channels,
            ));
        }

        let mapping = if source_channels == target_channels {
            Mapping::Passthrough
        } else if source_channels == 1 {
            Mapping::Duplicate
        } else if target_channels == 1 {
            Mapping::Average
        } else {
            Mapping::ByIndex
        };

        Ok(ChannelConverter {
            source,
            target_channels,
            mapping,
            scratch: vec![Vec::new(); source_channels as usize],
        })
    }
}

impl<S: SampleSource> SampleSource for ChannelConverter<S> {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        if self.mapping == Mapping::Passthrough {
            return self.source.next_chunk(output, max_frames);
        }

        check_output_channels(output, self.target_channels)?;
        let frames = self.source.next_chunk(&mut self.scratch, max_frames)?;

        for (ch, out) in output.iter_mut().enumerate() {
            out.clear();
            if frames == 0 {
                continue;
            }
            match self.mapping {
                Mapping::Duplicate => out.extend_from_slice(&self.scratch[0][..frames]),
                Mapping::Average => {
                    let scale = 1.0 / self.scratch.len() as f32;
                    out.extend((0..frames).map(|frame| {
                        self.scratch.iter().map(|src| src[frame]).sum::<f32>() * scale
                    }));
                }
                Mapping::ByIndex | Mapping::Passthrough => {
                    let src = &self.scratch[ch % self.scratch.len()];
                    out.extend_from_slice(&src[..frames]);
                }
            }
        }

        Ok(frames)
    }

    fn channel_count(&self) -> u16 {
        self.target_channels
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }

    fn duration(&self) -> Option<Duration> {
        self.source.duration()
    }
}
