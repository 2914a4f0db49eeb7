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
use std::{error::Error, fs::File, io::BufWriter, path::Path, sync::Arc, time::Duration};

use hound::WavWriter;
use parking_lot::{Mutex, RwLock};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, span, Instrument, Level, Span};

use super::{mixer::mix_delays, CachedSample, OutputSink, SampleFormat, TargetFormat};
use crate::error::LoopError;
use crate::loop_system::{LoopEvent, LoopSystem};
use crate::tracks::TrackManager;

/// Renders loop positions into cached buffers, plays them as the playhead reaches them and
/// exports the whole loop.
///
/// Lock order is the render lock, then the track set, then the loop state, then the cache.
pub struct AudioHandler {
    loop_system: Arc<LoopSystem>,
    tracks: Arc<RwLock<TrackManager>>,
    sink: Arc<dyn OutputSink>,
    export_format: TargetFormat,
    /// Serializes full renders against live renders.
    render_lock: Mutex<()>,
    span: Span,
}

impl AudioHandler {
    pub fn new(
        loop_system: Arc<LoopSystem>,
        tracks: Arc<RwLock<TrackManager>>,
        sink: Arc<dyn OutputSink>,
        export_format: TargetFormat,
    ) -> AudioHandler {
        AudioHandler {
            loop_system,
            tracks,
            sink,
            export_format,
            render_lock: Mutex::new(()),
            span: span!(Level::INFO, "render"),
        }
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    /// Returns the buffer for `position`, mixing it if the cache has none, and plays it when
    /// `play` is set. `None` means nothing triggers at that position (or it is out of range).
    pub fn render_position(
        &self,
        position: usize,
        play: bool,
    ) -> Result<Option<Arc<CachedSample>>, LoopError> {
        let _render = self.render_lock.lock();
        let tracks = self.tracks.read();
        self.render_with(&tracks, position, play)
    }

    /// Renders one position while the caller holds the track set. Holding it for the whole mix
    /// keeps an edit's invalidation from being overwritten by a stale buffer.
    fn render_with(
        &self,
        tracks: &TrackManager,
        position: usize,
        play: bool,
    ) -> Result<Option<Arc<CachedSample>>, LoopError> {
        let _enter = self.span.enter();
        if position >= tracks.length() {
            debug!(position, length = tracks.length(), "Position out of range.");
            return Ok(None);
        }

        let cache = tracks.cache();
        if let Some(buffer) = cache.get(position) {
            debug!(position, "Using cached buffer.");
            if play {
                self.play(position, &buffer);
            }
            return Ok(Some(buffer));
        }

        let inputs: Vec<(Arc<CachedSample>, Vec<f64>)> = tracks
            .tracks()
            .iter()
            .filter(|track| !track.get(position).is_empty())
            .map(|track| {
                (
                    track.buffer().clone(),
                    self.loop_system.calc_delays(track, Some(position)),
                )
            })
            .collect();

        let buffer = match mix_delays(tracks.format(), &inputs)? {
            Some(mixed) => Arc::new(mixed),
            None => {
                debug!(position, "Nothing to render.");
                return Ok(None);
            }
        };
        debug!(
            position,
            tracks = inputs.len(),
            frames = buffer.frames(),
            "Rendered position."
        );
        cache.set(position, buffer.clone());

        if play {
            self.play(position, &buffer);
        }
        Ok(Some(buffer))
    }

    /// Sink failures only affect this position's playback.
    fn play(&self, position: usize, buffer: &Arc<CachedSample>) {
        if let Err(e) = self.sink.enqueue(buffer.clone()) {
            error!(position, sink = %self.sink, err = e.as_ref(), "Unable to play position.");
        }
    }

    /// Drops the cached buffer of one position, or recreates the whole cache at the current
    /// length when `position` is `None`.
    pub fn reset_cache(&self, position: Option<usize>) {
        let tracks = self.tracks.write();
        match position {
            Some(position) => tracks.cache().clear(position),
            None => tracks.cache().reset(tracks.length()),
        }
    }

    /// Renders every position in order without playing anything.
    pub fn full_render(&self) -> Result<(), LoopError> {
        let _render = self.render_lock.lock();
        let tracks = self.tracks.read();
        for position in 0..tracks.length() {
            self.render_with(&tracks, position, false)?;
        }
        Ok(())
    }

    /// Lays every position out on one loop-long timeline. Position p starts at p beats, a silent
    /// position is a beat of silence, a buffer longer than a beat rings into the positions after
    /// it and anything past the end of the loop is cut.
    pub fn render_to_buffer(&self) -> Result<CachedSample, LoopError> {
        let _render = self.render_lock.lock();
        let tracks = self.tracks.read();
        let format = tracks.format();
        let channels = format.channels as usize;
        let beat_frames = format.frames_for_secs(60.0 / self.loop_system.bpm());
        let length = tracks.length();

        let mut timeline = vec![0.0f32; length * beat_frames * channels];
        for position in 0..length {
            if let Some(buffer) = self.render_with(&tracks, position, false)? {
                let start = position * beat_frames * channels;
                for (out, sample) in timeline[start..].iter_mut().zip(buffer.data()) {
                    *out += *sample;
                }
            }
        }

        Ok(CachedSample::from_interleaved(format, timeline))
    }

    /// Renders the whole loop to a WAV file at the export format. Returns the rendered length.
    pub fn full_render_to_file<P: AsRef<Path>>(&self, path: P) -> Result<Duration, LoopError> {
        let path = path.as_ref();
        let rendered = self.render_to_buffer()?;
        let format = rendered.format();

        let mut spec = self.export_format.wav_spec();
        spec.channels = format.channels;
        spec.sample_rate = format.sample_rate;

        let mut writer = WavWriter::new(BufWriter::new(File::create(path)?), spec)?;
        write_samples(&mut writer, &self.export_format, rendered.data())?;
        writer.finalize()?;

        let _enter = self.span.enter();
        info!(
            path = %path.display(),
            frames = rendered.frames(),
            bits = spec.bits_per_sample,
            "Exported loop."
        );
        Ok(rendered.duration())
    }

    /// Renders positions as the playhead reaches them. Every playing position change dispatches
    /// one blocking render that enqueues the result. Changes made while stopped, or received
    /// after the transport stopped, never render.
    pub fn listen(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<LoopEvent>,
    ) -> Result<JoinHandle<()>, Box<dyn Error>> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let handler = self.clone();
        Ok(runtime.spawn(
            async move {
                while let Some(event) = events.recv().await {
                    match event {
                        LoopEvent::PositionChanged {
                            position,
                            playing: true,
                        } => {
                            if !handler.loop_system.is_playing() {
                                debug!(position, "Stopped before the position was rendered.");
                                continue;
                            }
                            let handler = handler.clone();
                            tokio::task::spawn_blocking(move || {
                                if !handler.loop_system.is_playing() {
                                    return;
                                }
                                if let Err(e) = handler.render_position(position, true) {
                                    error!(position, err = %e, "Unable to render position.");
                                }
                            });
                        }
                        LoopEvent::PositionChanged { .. } => {}
                        LoopEvent::LengthChanged(length) => {
                            debug!(length, "Loop length changed.");
                        }
                    }
                }
                debug!("Loop events closed.");
            }
            .instrument(self.span.clone()),
        ))
    }
}

/// Writes interleaved f32 samples at the target format. Integer formats scale by
/// 2^(bits-1) - 1, round and clamp to the representable range.
fn write_samples<W: std::io::Write + std::io::Seek>(
    writer: &mut WavWriter<W>,
    format: &TargetFormat,
    data: &[f32],
) -> Result<(), hound::Error> {
    match format.sample_format {
        SampleFormat::Float => {
            for &sample in data {
                writer.write_sample(sample)?;
            }
        }
        SampleFormat::Int => {
            let scale = (1i64 << (format.bits_per_sample - 1)) as f64 - 1.0;
            let quantize =
                |sample: f32| (sample as f64 * scale).round().clamp(-(scale + 1.0), scale);
            if format.bits_per_sample == 16 {
                for &sample in data {
                    writer.write_sample(quantize(sample) as i16)?;
                }
            } else {
                for &sample in data {
                    writer.write_sample(quantize(sample) as i32)?;
                }
            }
        }
    }
    Ok(())
}
