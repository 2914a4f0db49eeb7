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
use std::{path::Path, sync::Arc, time::Duration};

use tracing::{debug, info};

use super::sample_source::{
    create_sample_source_from_file, read_to_end, SampleSource, SampleSourceError,
};
use super::WaveFormat;
use crate::error::LoopError;

/// Frames read per decode step when draining a source.
const DECODE_CHUNK_FRAMES: usize = 4096;

/// A fully decoded, immutable buffer of interleaved f32 frames in the project format.
///
/// Buffers are shared behind an [`Arc`]; every consumer reads through its own
/// [`CachedSampleReader`] cursor, so one buffer can be played any number of times concurrently.
#[derive(Debug, Clone)]
pub struct CachedSample {
    format: WaveFormat,
    data: Arc<[f32]>,
}

impl CachedSample {
    /// Decodes the file at `path` into the given format.
    pub fn from_file<P: AsRef<Path>>(path: P, format: WaveFormat) -> Result<Self, LoopError> {
        Self::from_file_with_chunk(path, format, DECODE_CHUNK_FRAMES)
    }

    /// Like [`CachedSample::from_file`], reading `chunk_frames` frames per decode step.
    pub fn from_file_with_chunk<P: AsRef<Path>>(
        path: P,
        format: WaveFormat,
        chunk_frames: usize,
    ) -> Result<Self, LoopError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(LoopError::MissingResource(path.to_path_buf()));
        }

        let mut source = create_sample_source_from_file(path, format)?;
        let sample = Self::read_source(&mut source, format, chunk_frames)?;
        info!(
            path = ?path,
            frames = sample.frames(),
            duration = ?sample.duration(),
            "Decoded sample."
        );
        Ok(sample)
    }

    /// Drains a finite source into a buffer. The source must already be in `format`.
    pub fn from_source<S: SampleSource + ?Sized>(
        source: &mut S,
        format: WaveFormat,
    ) -> Result<Self, SampleSourceError> {
        Self::read_source(source, format, DECODE_CHUNK_FRAMES)
    }

    fn read_source<S: SampleSource + ?Sized>(
        source: &mut S,
        format: WaveFormat,
        chunk_frames: usize,
    ) -> Result<Self, SampleSourceError> {
        if source.channel_count() != format.channels || source.sample_rate() != format.sample_rate
        {
            return Err(SampleSourceError::SampleConversionFailed(format!(
                "source is {}Hz/{}ch, expected {}",
                source.sample_rate(),
                source.channel_count(),
                format
            )));
        }

        let planar = read_to_end(source, chunk_frames)?;
        debug!(frames = planar.first().map(|c| c.len()).unwrap_or(0), "Drained source.");
        Ok(Self::from_planar(format, &planar))
    }

    /// Interleaves planar channels into a buffer. Shorter channels are padded with silence.
    pub fn from_planar(format: WaveFormat, planar: &[Vec<f32>]) -> Self {
        let channels = format.channels as usize;
        let frames = planar.iter().map(|c| c.len()).max().unwrap_or(0);
        let mut data = vec![0.0f32; frames * channels];
        for (ch, channel) in planar.iter().take(channels).enumerate() {
            for (frame, sample) in channel.iter().enumerate() {
                data[frame * channels + ch] = *sample;
            }
        }
        Self::from_interleaved(format, data)
    }

    /// Wraps already interleaved samples. Any trailing partial frame is dropped.
    pub fn from_interleaved(format: WaveFormat, mut data: Vec<f32>) -> Self {
        let channels = format.channels as usize;
        data.truncate(data.len() - data.len() % channels);
        CachedSample {
            format,
            data: data.into(),
        }
    }

    /// Returns a new cursor positioned at the first frame.
    pub fn reader(self: &Arc<Self>) -> CachedSampleReader {
        CachedSampleReader {
            sample: self.clone(),
            pos: 0,
        }
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    /// The interleaved samples.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.data.len() / self.format.channels as usize
    }

    /// Total number of interleaved samples.
    pub fn samples(&self) -> usize {
        self.data.len()
    }

    pub fn duration(&self) -> Duration {
        self.format.duration_of_frames(self.frames())
    }
}

/// An independent read cursor over a [`CachedSample`].
pub struct CachedSampleReader {
    sample: Arc<CachedSample>,
    /// Position in interleaved samples.
    pos: usize,
}

impl CachedSampleReader {
    /// Adds the next interleaved samples onto `output`, returning how many were mixed in.
    /// Less than `output.len()` means the reader is now exhausted.
    pub fn mix_into(&mut self, output: &mut [f32]) -> usize {
        let data = self.sample.data();
        let available = data.len() - self.pos;
        let to_mix = available.min(output.len());
        for (out, sample) in output[..to_mix]
            .iter_mut()
            .zip(data[self.pos..self.pos + to_mix].iter())
        {
            *out += *sample;
        }
        self.pos += to_mix;
        to_mix
    }

    pub fn is_finished(&self) -> bool {
        self.pos >= self.sample.samples()
    }
}

impl SampleSource for CachedSampleReader {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        let channels = self.sample.format.channels as usize;
        super::sample_source::traits::check_output_channels(output, self.sample.format.channels)?;

        let frame_pos = self.pos / channels;
        let to_copy = (self.sample.frames() - frame_pos).min(max_frames);
        let data = self.sample.data();
        for (ch, out) in output.iter_mut().enumerate() {
            out.clear();
            out.extend(
                (frame_pos..frame_pos + to_copy).map(|frame| data[frame * channels + ch]),
            );
        }
        self.pos += to_copy * channels;
        Ok(to_copy)
    }

    fn channel_count(&self) -> u16 {
        self.sample.format.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample.format.sample_rate
    }

    fn duration(&self) -> Option<Duration> {
        Some(self.sample.duration())
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;
    use crate::testutil::write_wav;

    #[test]
    fn test_from_file_missing() {
        let result = CachedSample::from_file("/no/such/sample.wav", WaveFormat::default());
        assert!(matches!(result, Err(LoopError::MissingResource(_))));
    }

    #[test]
    fn test_from_file_converts_mono() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("kick.wav");
        write_wav(&path, &[vec![0.5, 0.25, 0.0, -0.25]], 44100)?;

        let sample = CachedSample::from_file(&path, WaveFormat::default())?;
        assert_eq!(sample.frames(), 4);
        assert_eq!(sample.samples(), 8);
        assert_eq!(sample.data(), &[0.5, 0.5, 0.25, 0.25, 0.0, 0.0, -0.25, -0.25]);
        Ok(())
    }

    #[test]
    fn test_readers_are_independent() -> Result<(), Box<dyn Error>> {
        let format = WaveFormat::new(44100, 1)?;
        let sample = Arc::new(CachedSample::from_interleaved(format, vec![0.5, 0.25, 0.125]));

        let mut first = sample.reader();
        let mut second = sample.reader();

        let mut out = vec![0.0; 2];
        assert_eq!(first.mix_into(&mut out), 2);
        assert_eq!(out, vec![0.5, 0.25]);

        // The second reader starts from the beginning regardless of the first.
        let mut out = vec![1.0; 4];
        assert_eq!(second.mix_into(&mut out), 3);
        assert_eq!(out, vec![1.5, 1.25, 1.125, 1.0]);
        assert!(second.is_finished());
        assert!(!first.is_finished());
        Ok(())
    }

    #[test]
    fn test_from_source_roundtrip_through_reader() -> Result<(), Box<dyn Error>> {
        let format = WaveFormat::default();
        let sample = Arc::new(CachedSample::from_interleaved(
            format,
            vec![0.1, -0.1, 0.2, -0.2, 0.3, -0.3],
        ));
        let copy = CachedSample::from_source(&mut sample.reader(), format)?;
        assert_eq!(copy.data(), sample.data());
        assert_eq!(copy.frames(), 3);
        Ok(())
    }

    #[test]
    fn test_from_source_rejects_other_format() -> Result<(), Box<dyn Error>> {
        let mono = Arc::new(CachedSample::from_interleaved(
            WaveFormat::new(44100, 1)?,
            vec![0.1, 0.2],
        ));
        assert!(CachedSample::from_source(&mut mono.reader(), WaveFormat::default()).is_err());
        Ok(())
    }

    #[test]
    fn test_duration_and_partial_frames() -> Result<(), Box<dyn Error>> {
        let format = WaveFormat::default();
        let sample = CachedSample::from_interleaved(format, vec![0.0; 88201]);
        assert_eq!(sample.frames(), 44100);
        assert_eq!(sample.samples(), 88200);
        assert_eq!(sample.duration(), Duration::from_secs(1));
        Ok(())
    }
}
