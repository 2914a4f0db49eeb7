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
use std::{error::Error, time::Duration};

use super::audio::AudioSampleSource;
use super::channels::ChannelConverter;
use super::error::SampleSourceError;
use super::traits::{read_to_end, SampleSource};
use super::transcoder::AudioTranscoder;
use super::create_sample_source_from_file;
use crate::audio::WaveFormat;
use crate::testutil::{write_wav, write_wav_i16};

/// In-memory planar source.
struct VecSource {
    channels: Vec<Vec<f32>>,
    pos: usize,
    sample_rate: u32,
}

impl VecSource {
    fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        VecSource {
            channels,
            pos: 0,
            sample_rate,
        }
    }
}

impl SampleSource for VecSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        let total = self.channels[0].len();
        let to_copy = total.saturating_sub(self.pos).min(max_frames);
        for (out, channel) in output.iter_mut().zip(self.channels.iter()) {
            out.clear();
            out.extend_from_slice(&channel[self.pos..self.pos + to_copy]);
        }
        self.pos += to_copy;
        Ok(to_copy)
    }

    fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f64(
            self.channels[0].len() as f64 / self.sample_rate as f64,
        ))
    }
}

#[test]
fn test_decode_float_wav() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("float.wav");
    write_wav(
        &path,
        &[vec![0.1, 0.2, 0.3], vec![-0.1, -0.2, -0.3]],
        44100,
    )?;

    let mut source = AudioSampleSource::from_file(&path)?;
    assert_eq!(source.channel_count(), 2);
    assert_eq!(source.sample_rate(), 44100);

    let planar = read_to_end(&mut source, 2)?;
    assert_eq!(planar, vec![vec![0.1, 0.2, 0.3], vec![-0.1, -0.2, -0.3]]);
    Ok(())
}

#[test]
fn test_decode_int_wav_is_scaled() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("int.wav");
    write_wav_i16(&path, &[vec![16384, -16384, 0]], 22050)?;

    let mut source = AudioSampleSource::from_file(&path)?;
    assert_eq!(source.sample_rate(), 22050);
    let planar = read_to_end(&mut source, 1024)?;
    assert_eq!(planar, vec![vec![0.5, -0.5, 0.0]]);
    Ok(())
}

#[test]
fn test_missing_file_is_io_error() {
    let result = AudioSampleSource::from_file("/definitely/not/here.wav");
    assert!(matches!(result, Err(SampleSourceError::IoError(_))));
}

#[test]
fn test_output_channel_mismatch_is_rejected() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stereo.wav");
    write_wav(&path, &[vec![0.1], vec![0.2]], 44100)?;

    let mut source = AudioSampleSource::from_file(&path)?;
    let mut output = vec![Vec::new()];
    assert!(source.next_chunk(&mut output, 16).is_err());
    Ok(())
}

#[test]
fn test_mono_is_duplicated() -> Result<(), Box<dyn Error>> {
    let mut converter = ChannelConverter::new(VecSource::new(vec![vec![0.25, 0.5]], 44100), 2)?;
    assert_eq!(converter.channel_count(), 2);
    let planar = read_to_end(&mut converter, 1)?;
    assert_eq!(planar, vec![vec![0.25, 0.5], vec![0.25, 0.5]]);
    Ok(())
}

#[test]
fn test_stereo_is_averaged_to_mono() -> Result<(), Box<dyn Error>> {
    let mut converter = ChannelConverter::new(
        VecSource::new(vec![vec![1.0, 0.5], vec![0.0, -0.5]], 44100),
        1,
    )?;
    let planar = read_to_end(&mut converter, 8)?;
    assert_eq!(planar, vec![vec![0.5, 0.0]]);
    Ok(())
}

#[test]
fn test_channels_mapped_by_index() -> Result<(), Box<dyn Error>> {
    let source = VecSource::new(vec![vec![0.1], vec![0.2], vec![0.3], vec![0.4]], 44100);
    let mut converter = ChannelConverter::new(source, 2)?;
    assert_eq!(read_to_end(&mut converter, 8)?, vec![vec![0.1], vec![0.2]]);

    let source = VecSource::new(vec![vec![0.1], vec![0.2]], 44100);
    let mut converter = ChannelConverter::new(source, 3)?;
    assert_eq!(
        read_to_end(&mut converter, 8)?,
        vec![vec![0.1], vec![0.2], vec![0.1]]
    );
    Ok(())
}

#[test]
fn test_transcoder_passthrough_at_same_rate() -> Result<(), Box<dyn Error>> {
    let mut transcoder = AudioTranscoder::new(VecSource::new(vec![vec![0.1, 0.2, 0.3]], 44100), 44100)?;
    assert_eq!(read_to_end(&mut transcoder, 2)?, vec![vec![0.1, 0.2, 0.3]]);
    Ok(())
}

#[test]
fn test_upsample_length_and_level() -> Result<(), Box<dyn Error>> {
    let source = VecSource::new(vec![vec![0.5; 2205], vec![-0.5; 2205]], 22050);
    let mut transcoder = AudioTranscoder::new(source, 44100)?;
    assert_eq!(transcoder.sample_rate(), 44100);

    let planar = read_to_end(&mut transcoder, 512)?;
    assert_eq!(planar.len(), 2);
    assert_eq!(planar[0].len(), 4410);
    assert_eq!(planar[1].len(), 4410);

    // Away from the edges a constant input stays constant.
    for (left, right) in planar[0][500..3900].iter().zip(planar[1][500..3900].iter()) {
        assert!((left - 0.5).abs() < 0.02, "left sample {} drifted", left);
        assert!((right + 0.5).abs() < 0.02, "right sample {} drifted", right);
    }
    Ok(())
}

#[test]
fn test_downsample_length() -> Result<(), Box<dyn Error>> {
    let source = VecSource::new(vec![vec![0.25; 4800]], 48000);
    let mut transcoder = AudioTranscoder::new(source, 44100)?;
    let planar = read_to_end(&mut transcoder, 1000)?;
    assert_eq!(planar[0].len(), 4410);
    Ok(())
}

#[test]
fn test_empty_source_resamples_to_nothing() -> Result<(), Box<dyn Error>> {
    let source = VecSource::new(vec![Vec::new()], 48000);
    let mut transcoder = AudioTranscoder::new(source, 44100)?;
    assert_eq!(read_to_end(&mut transcoder, 1000)?, vec![Vec::<f32>::new()]);
    Ok(())
}

#[test]
fn test_factory_converts_to_project_format() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("mono22k.wav");
    write_wav(&path, &[vec![0.5; 2205]], 22050)?;

    let mut source = create_sample_source_from_file(&path, WaveFormat::default())?;
    assert_eq!(source.channel_count(), 2);
    assert_eq!(source.sample_rate(), 44100);

    let planar = read_to_end(&mut source, 4096)?;
    assert_eq!(planar[0].len(), 4410);
    assert_eq!(planar[0], planar[1]);
    Ok(())
}
