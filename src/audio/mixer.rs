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
// Delay mixing for rendered positions, and the live mixer shared by the output sinks.
use std::{sync::Arc, time::Duration};

use tracing::debug;

use super::cached::{CachedSample, CachedSampleReader};
use super::sample_source::traits::check_output_channels;
use super::sample_source::{SampleSource, SampleSourceError};
use super::WaveFormat;

/// Prefixes a source with a run of silence.
pub struct DelayedSource<S: SampleSource> {
    inner: S,
    /// Silent frames still to emit before the inner source starts.
    silence_remaining: usize,
    channels: u16,
    sample_rate: u32,
}

impl<S: SampleSource> DelayedSource<S> {
    /// Delays `inner` by `delay` seconds, rounded to the nearest frame at the format's rate.
    pub fn new(inner: S, delay: f64, format: WaveFormat) -> Self {
        DelayedSource {
            silence_remaining: format.frames_for_secs(delay),
            channels: inner.channel_count(),
            sample_rate: inner.sample_rate(),
            inner,
        }
    }
}

impl<S: SampleSource> SampleSource for DelayedSource<S> {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        if self.silence_remaining == 0 {
            return self.inner.next_chunk(output, max_frames);
        }

        check_output_channels(output, self.channels)?;
        let frames = self.silence_remaining.min(max_frames);
        for channel in output.iter_mut() {
            channel.clear();
            channel.resize(frames, 0.0);
        }
        self.silence_remaining -= frames;
        Ok(frames)
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration(&self) -> Option<Duration> {
        let silence =
            Duration::from_secs_f64(self.silence_remaining as f64 / self.sample_rate as f64);
        self.inner.duration().map(|inner| inner + silence)
    }
}

/// Sums any number of same-format inputs sample by sample. Output ends when the longest input
/// ends.
pub struct MixingSource {
    inputs: Vec<MixerInput>,
    channels: u16,
    sample_rate: u32,
    scratch: Vec<Vec<f32>>,
}

struct MixerInput {
    source: Box<dyn SampleSource>,
    finished: bool,
}

impl MixingSource {
    pub fn new(format: WaveFormat) -> Self {
        MixingSource {
            inputs: Vec::new(),
            channels: format.channels,
            sample_rate: format.sample_rate,
            scratch: vec![Vec::new(); format.channels as usize],
        }
    }

    /// Adds an input. It must match the mixer's channel count and rate.
    pub fn add_input(&mut self, source: Box<dyn SampleSource>) -> Result<(), SampleSourceError> {
        if source.channel_count() != self.channels || source.sample_rate() != self.sample_rate {
            return Err(SampleSourceError::SampleConversionFailed(format!(
                "mixer input is {}Hz/{}ch, mixer is {}Hz/{}ch",
                source.sample_rate(),
                source.channel_count(),
                self.sample_rate,
                self.channels
            )));
        }
        self.inputs.push(MixerInput {
            source,
            finished: false,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl SampleSource for MixingSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        check_output_channels(output, self.channels)?;
        for channel in output.iter_mut() {
            channel.clear();
        }

        let mut mixed_frames = 0;
        for input in self.inputs.iter_mut().filter(|input| !input.finished) {
            // Inputs may hand out short chunks, so keep reading until this one covers the
            // requested span or ends.
            let mut offset = 0;
            while offset < max_frames {
                let frames = input
                    .source
                    .next_chunk(&mut self.scratch, max_frames - offset)?;
                if frames == 0 {
                    input.finished = true;
                    break;
                }

                for (out, src) in output.iter_mut().zip(self.scratch.iter()) {
                    if out.len() < offset + frames {
                        out.resize(offset + frames, 0.0);
                    }
                    for (dst, sample) in out[offset..offset + frames].iter_mut().zip(src.iter()) {
                        *dst += *sample;
                    }
                }
                offset += frames;
            }
            mixed_frames = mixed_frames.max(offset);
        }

        Ok(mixed_frames)
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration(&self) -> Option<Duration> {
        self.inputs
            .iter()
            .map(|input| input.source.duration())
            .try_fold(Duration::ZERO, |longest, duration| {
                duration.map(|d| longest.max(d))
            })
    }
}

/// Mixes every buffer at each of its delays (in seconds) into one buffer.
///
/// Returns `None` when no (buffer, delay) pair was given, so the caller can tell silence apart
/// from a rendered mix.
pub fn mix_delays(
    format: WaveFormat,
    inputs: &[(Arc<CachedSample>, Vec<f64>)],
) -> Result<Option<CachedSample>, SampleSourceError> {
    let mut mixer = MixingSource::new(format);
    for (buffer, delays) in inputs {
        for delay in delays {
            mixer.add_input(Box::new(DelayedSource::new(buffer.reader(), *delay, format)))?;
        }
    }

    if mixer.is_empty() {
        return Ok(None);
    }

    debug!(readers = mixer.len(), "Mixing delayed readers.");
    Ok(Some(CachedSample::from_source(&mut mixer, format)?))
}

/// Live mixer for an output sink: sums every active reader into the output buffer and drops
/// readers once they run out.
#[derive(Default)]
pub struct AudioMixer {
    readers: Vec<CachedSampleReader>,
}

impl AudioMixer {
    pub fn new() -> Self {
        AudioMixer::default()
    }

    pub fn add_reader(&mut self, reader: CachedSampleReader) {
        self.readers.push(reader);
    }

    /// Overwrites `output` (interleaved) with the sum of all active readers.
    pub fn process_into_output(&mut self, output: &mut [f32]) {
        output.fill(0.0);
        self.readers.retain_mut(|reader| {
            reader.mix_into(output);
            !reader.is_finished()
        });
    }

    /// Number of readers still playing.
    pub fn active_count(&self) -> usize {
        self.readers.len()
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;
    use crate::audio::sample_source::read_to_end;

    fn mono() -> WaveFormat {
        WaveFormat::new(10, 1).expect("valid format")
    }

    fn buffer(format: WaveFormat, data: Vec<f32>) -> Arc<CachedSample> {
        Arc::new(CachedSample::from_interleaved(format, data))
    }

    #[test]
    fn test_delayed_source_prefixes_silence() -> Result<(), Box<dyn Error>> {
        let format = mono();
        let sample = buffer(format, vec![1.0, 2.0]);

        // 0.25s at 10Hz is 2.5 frames, which rounds to 3.
        let mut delayed = DelayedSource::new(sample.reader(), 0.25, format);
        let duration = delayed.duration().expect("known duration");
        assert!((duration.as_secs_f64() - 0.5).abs() < 1e-6);
        let planar = read_to_end(&mut delayed, 2)?;
        assert_eq!(planar, vec![vec![0.0, 0.0, 0.0, 1.0, 2.0]]);
        Ok(())
    }

    #[test]
    fn test_zero_delay_is_passthrough() -> Result<(), Box<dyn Error>> {
        let format = mono();
        let sample = buffer(format, vec![1.0, 2.0]);
        let mut delayed = DelayedSource::new(sample.reader(), 0.0, format);
        assert_eq!(read_to_end(&mut delayed, 8)?, vec![vec![1.0, 2.0]]);
        Ok(())
    }

    #[test]
    fn test_mixing_source_sums_to_longest() -> Result<(), Box<dyn Error>> {
        let format = mono();
        let short = buffer(format, vec![1.0]);
        let long = buffer(format, vec![0.5, 0.5, 0.5]);

        let mut mixer = MixingSource::new(format);
        mixer.add_input(Box::new(short.reader()))?;
        mixer.add_input(Box::new(long.reader()))?;

        let planar = read_to_end(&mut mixer, 2)?;
        assert_eq!(planar, vec![vec![1.5, 0.5, 0.5]]);

        let mut output = vec![Vec::new()];
        assert_eq!(mixer.next_chunk(&mut output, 2)?, 0);
        Ok(())
    }

    #[test]
    fn test_mixing_source_rejects_mismatched_input() -> Result<(), Box<dyn Error>> {
        let stereo = buffer(WaveFormat::new(10, 2)?, vec![0.0, 0.0]);
        let mut mixer = MixingSource::new(mono());
        assert!(mixer.add_input(Box::new(stereo.reader())).is_err());
        Ok(())
    }

    #[test]
    fn test_mix_delays() -> Result<(), Box<dyn Error>> {
        let format = mono();
        let kick = buffer(format, vec![1.0, 1.0]);
        let hat = buffer(format, vec![0.25]);

        let mix = mix_delays(
            format,
            &[(kick.clone(), vec![0.0, 0.2]), (hat.clone(), vec![0.1])],
        )?
        .expect("a mix");

        assert_eq!(mix.data(), &[1.0, 1.25, 1.0, 1.0]);
        Ok(())
    }

    #[test]
    fn test_mix_delays_without_readers() -> Result<(), Box<dyn Error>> {
        let format = mono();
        let kick = buffer(format, vec![1.0]);
        assert!(mix_delays(format, &[])?.is_none());
        assert!(mix_delays(format, &[(kick, Vec::new())])?.is_none());
        Ok(())
    }

    #[test]
    fn test_audio_mixer_drops_finished_readers() {
        let format = WaveFormat::default();
        let first = buffer(format, vec![0.5, 0.5, 0.5, 0.5]);
        let second = buffer(format, vec![0.25, 0.25]);

        let mut mixer = AudioMixer::new();
        mixer.add_reader(first.reader());
        mixer.add_reader(second.reader());
        assert_eq!(mixer.active_count(), 2);

        let mut output = vec![9.0; 2];
        mixer.process_into_output(&mut output);
        assert_eq!(output, vec![0.75, 0.75]);
        assert_eq!(mixer.active_count(), 1);

        mixer.process_into_output(&mut output);
        assert_eq!(output, vec![0.5, 0.5]);
        assert_eq!(mixer.active_count(), 0);

        mixer.process_into_output(&mut output);
        assert_eq!(output, vec![0.0, 0.0]);
    }
}
