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
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use super::error::SampleSourceError;
use super::traits::{check_output_channels, SampleSource};

/// Decodes an audio file (WAV, FLAC, MP3, ...) with symphonia and hands out planar f32 frames
/// at the file's own rate and channel count.
pub struct AudioSampleSource {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: u16,
    sample_rate: u32,
    duration: Option<Duration>,
    /// Decoded frames not yet handed out, one Vec per channel.
    pending: Vec<Vec<f32>>,
    /// Read position into `pending`.
    pending_pos: usize,
    finished: bool,
}

impl AudioSampleSource {
    /// Opens and probes the file at the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SampleSourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            SampleSourceError::IoError(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let file_path = path.to_string_lossy().to_string();
        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| {
                SampleSourceError::SampleConversionFailed(format!("'{}': {}", file_path, e))
            })?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                SampleSourceError::SampleConversionFailed(format!(
                    "'{}': no audio track found",
                    file_path
                ))
            })?;
        let track_id = track.id;
        let params = &track.codec_params;

        let sample_rate = params.sample_rate.ok_or_else(|| {
            SampleSourceError::SampleConversionFailed(format!(
                "'{}': sample rate not specified",
                file_path
            ))
        })?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .filter(|c| *c > 0)
            .ok_or_else(|| {
                SampleSourceError::SampleConversionFailed(format!(
                    "'{}': channels not specified",
                    file_path
                ))
            })?;
        let duration = params
            .n_frames
            .map(|n_frames| Duration::from_secs_f64(n_frames as f64 / sample_rate as f64));

        let decoder = get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| {
                SampleSourceError::SampleConversionFailed(format!("'{}': {}", file_path, e))
            })?;

        Ok(AudioSampleSource {
            format_reader,
            decoder,
            track_id,
            channels,
            sample_rate,
            duration,
            pending: vec![Vec::new(); channels as usize],
            pending_pos: 0,
            finished: false,
        })
    }

    /// Reads the next packet. `Ok(None)` means the stream is exhausted: some formats report the
    /// end with an UnexpectedEof IO error, others with a DecodeError.
    fn read_next_packet(&mut self) -> Result<Option<Packet>, SampleSourceError> {
        loop {
            match self.format_reader.next_packet() {
                Ok(packet) => return Ok(Some(packet)),
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None)
                }
                Err(SymphoniaError::DecodeError(_)) => return Ok(None),
                Err(e) => return Err(SampleSourceError::AudioError(e)),
            }
        }
    }

    /// Decodes packets until at least one frame lands in `pending`. Returns false at EOF.
    fn decode_more(&mut self) -> Result<bool, SampleSourceError> {
        loop {
            let packet = match self.read_next_packet()? {
                Some(packet) => packet,
                None => return Ok(false),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    self.decoder.decode(&packet)?
                }
                // A corrupt packet is skipped rather than failing the whole file.
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(e.into()),
            };

            let frames = decoded.frames();
            if frames == 0 {
                // Header packets (e.g. Vorbis) decode to nothing.
                continue;
            }

            let decoded_channels = decoded.spec().channels.count();
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
            buffer.copy_planar_ref(decoded);
            let samples = buffer.samples();

            // Drop what has been handed out before appending.
            if self.pending_pos > 0 {
                for channel in self.pending.iter_mut() {
                    channel.drain(..self.pending_pos);
                }
                self.pending_pos = 0;
            }

            for (ch, channel) in self.pending.iter_mut().enumerate() {
                if ch < decoded_channels {
                    channel.extend_from_slice(&samples[ch * frames..(ch + 1) * frames]);
                } else {
                    channel.extend(std::iter::repeat(0.0).take(frames));
                }
            }
            return Ok(true);
        }
    }

    fn pending_frames(&self) -> usize {
        self.pending
            .first()
            .map(|c| c.len().saturating_sub(self.pending_pos))
            .unwrap_or(0)
    }
}

impl SampleSource for AudioSampleSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        check_output_channels(output, self.channels)?;
        for channel in output.iter_mut() {
            channel.clear();
        }

        while !self.finished && self.pending_frames() < max_frames {
            if !self.decode_more()? {
                self.finished = true;
            }
        }

        let to_copy = self.pending_frames().min(max_frames);
        if to_copy > 0 {
            let start = self.pending_pos;
            for (out, channel) in output.iter_mut().zip(self.pending.iter()) {
                out.extend_from_slice(&channel[start..start + to_copy]);
            }
            self.pending_pos += to_copy;
        }

        Ok(to_copy)
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }
}
