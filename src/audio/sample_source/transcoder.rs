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

use parking_lot::Mutex;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::error::SampleSourceError;
use super::traits::{check_output_channels, SampleSource};

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// Resamples a source to the target rate with rubato.
///
/// The resampler's own latency is trimmed from the front and the tail is flushed, so the output
/// holds `ceil(input_frames * ratio)` frames lined up with the input.
pub struct AudioTranscoder<S: SampleSource> {
    source: S,
    /// Sinc resampler wrapped in Mutex for Sync. None when the rates already match.
    resampler: Option<Mutex<SincFixedIn<f32>>>,
    source_rate: u32,
    target_rate: u32,
    channels: u16,

    /// Input frames waiting for a full resampler block.
    input: Vec<Vec<f32>>,
    /// Resampled frames ready to hand out, and the read position into them.
    output: Vec<Vec<f32>>,
    output_pos: usize,
    /// Scratch buffer for reading from the source.
    read_buffer: Vec<Vec<f32>>,

    /// Leading output frames still to be discarded (the resampler delay).
    to_skip: usize,
    /// Frames read from the source so far.
    frames_in: usize,
    /// Frames produced after the delay was trimmed.
    frames_out: usize,
    /// Frames handed to callers.
    frames_emitted: usize,
    source_finished: bool,
}

impl<S: SampleSource> AudioTranscoder<S> {
    /// Wraps the source, resampling it to `target_rate` if needed.
    pub fn new(source: S, target_rate: u32) -> Result<Self, SampleSourceError> {
        let source_rate = source.sample_rate();
        let channels = source.channel_count();

        let resampler = if source_rate != target_rate {
            let params = SincInterpolationParameters {
                sinc_len: 256,
                f_cutoff: 0.95,
                oversampling_factor: 128,
                interpolation: SincInterpolationType::Linear,
                window: WindowFunction::BlackmanHarris2,
            };
            let ratio = target_rate as f64 / source_rate as f64;
            let resampler =
                SincFixedIn::<f32>::new(ratio, 1.0, params, INPUT_BLOCK_SIZE, channels as usize)
                    .map_err(|_e| SampleSourceError::ResamplingFailed(source_rate, target_rate))?;
            Some(Mutex::new(resampler))
        } else {
            None
        };

        let to_skip = resampler
            .as_ref()
            .map(|r| r.lock().output_delay())
            .unwrap_or(0);

        Ok(AudioTranscoder {
            source,
            resampler,
            source_rate,
            target_rate,
            channels,
            input: vec![Vec::with_capacity(INPUT_BLOCK_SIZE); channels as usize],
            output: vec![Vec::new(); channels as usize],
            output_pos: 0,
            read_buffer: vec![Vec::with_capacity(INPUT_BLOCK_SIZE); channels as usize],
            to_skip,
            frames_in: 0,
            frames_out: 0,
            frames_emitted: 0,
            source_finished: false,
        })
    }

    fn expected_frames(&self) -> usize {
        expected_frames(self.frames_in, self.source_rate, self.target_rate)
    }

    fn available_frames(&self) -> usize {
        self.output
            .first()
            .map(|c| c.len().saturating_sub(self.output_pos))
            .unwrap_or(0)
    }

    fn input_frames(&self) -> usize {
        self.input.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Appends resampler output to the FIFO, discarding the leading delay.
    fn push_output(&mut self, resampled: Vec<Vec<f32>>) {
        let produced = resampled.first().map(|c| c.len()).unwrap_or(0);
        let skip = self.to_skip.min(produced);
        self.to_skip -= skip;

        if self.output_pos > 0 {
            for channel in self.output.iter_mut() {
                channel.drain(..self.output_pos);
            }
            self.output_pos = 0;
        }

        for (dst, src) in self.output.iter_mut().zip(resampled.iter()) {
            dst.extend_from_slice(&src[skip..]);
        }
        self.frames_out += produced - skip;
    }

    /// Runs one resampler step. Returns false once the tail has been fully flushed.
    fn process_block(&mut self) -> Result<bool, SampleSourceError> {
        let (source_rate, target_rate) = (self.source_rate, self.target_rate);
        let failed = |_e| SampleSourceError::ResamplingFailed(source_rate, target_rate);

        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(false);
        };
        let resampler = resampler.get_mut();

        let needed = resampler.input_frames_next();
        while !self.source_finished && self.input.first().map(|c| c.len()).unwrap_or(0) < needed
        {
            let want = needed - self.input.first().map(|c| c.len()).unwrap_or(0);
            let frames = self.source.next_chunk(&mut self.read_buffer, want)?;
            if frames == 0 {
                self.source_finished = true;
                break;
            }
            for (dst, src) in self.input.iter_mut().zip(self.read_buffer.iter()) {
                dst.extend_from_slice(&src[..frames]);
            }
            self.frames_in += frames;
        }

        let buffered = self.input.first().map(|c| c.len()).unwrap_or(0);
        let resampled = if buffered >= needed {
            let block: Vec<&[f32]> = self.input.iter().map(|c| &c[..needed]).collect();
            let resampled = resampler.process(&block, None).map_err(failed)?;
            for channel in self.input.iter_mut() {
                channel.drain(..needed);
            }
            resampled
        } else if buffered > 0 {
            let resampled = resampler
                .process_partial(Some(self.input.as_slice()), None)
                .map_err(failed)?;
            for channel in self.input.iter_mut() {
                channel.clear();
            }
            resampled
        } else if self.frames_out < expected_frames(self.frames_in, source_rate, target_rate) {
            // Source exhausted: flush the delay line with silence.
            resampler
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(failed)?
        } else {
            return Ok(false);
        };

        self.push_output(resampled);
        Ok(true)
    }
}

/// Number of output frames a source of `frames_in` frames resamples to. Only final once the
/// source is exhausted.
fn expected_frames(frames_in: usize, source_rate: u32, target_rate: u32) -> usize {
    (frames_in as f64 * target_rate as f64 / source_rate as f64).ceil() as usize
}

impl<S: SampleSource> SampleSource for AudioTranscoder<S> {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        if self.resampler.is_none() {
            return self.source.next_chunk(output, max_frames);
        }

        check_output_channels(output, self.channels)?;
        for channel in output.iter_mut() {
            channel.clear();
        }

        while self.available_frames() < max_frames {
            if !self.process_block()? {
                break;
            }
        }

        // The flush may overshoot; never hand out more than the input length maps to.
        let remaining = if self.source_finished && self.input_frames() == 0 {
            self.expected_frames().saturating_sub(self.frames_emitted)
        } else {
            usize::MAX
        };
        let to_copy = self.available_frames().min(max_frames).min(remaining);

        if to_copy > 0 {
            let start = self.output_pos;
            for (out, channel) in output.iter_mut().zip(self.output.iter()) {
                out.extend_from_slice(&channel[start..start + to_copy]);
            }
            self.output_pos += to_copy;
            self.frames_emitted += to_copy;
        }

        Ok(to_copy)
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.target_rate
    }

    fn duration(&self) -> Option<Duration> {
        self.source.duration()
    }
}
