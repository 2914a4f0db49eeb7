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
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use crate::audio::{cache::PositionCache, cached::CachedSample, WaveFormat};
use crate::error::LoopError;
use crate::presets::SegmentPreset;
use crate::samples::Sample;

/// A named pattern of presets, one per loop position, playing one sample.
///
/// Every edit that can change rendered audio invalidates the affected slots of the shared
/// position cache.
pub struct Track {
    name: String,
    sample: Arc<Sample>,
    buffer: Arc<CachedSample>,
    pattern: Vec<Arc<SegmentPreset>>,
    cache: Arc<PositionCache>,
    decode_chunk: usize,
}

impl Track {
    fn new(
        name: &str,
        sample: Arc<Sample>,
        length: usize,
        cache: Arc<PositionCache>,
        format: WaveFormat,
        decode_chunk: usize,
    ) -> Result<Track, LoopError> {
        let buffer = Arc::new(CachedSample::from_file_with_chunk(
            sample.path(),
            format,
            decode_chunk,
        )?);
        Ok(Track {
            name: name.to_string(),
            sample,
            buffer,
            pattern: vec![SegmentPreset::empty(); length],
            cache,
            decode_chunk,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample(&self) -> &Arc<Sample> {
        &self.sample
    }

    /// The decoded audio of the selected sample.
    pub fn buffer(&self) -> &Arc<CachedSample> {
        &self.buffer
    }

    pub fn pattern(&self) -> &[Arc<SegmentPreset>] {
        &self.pattern
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// The preset at `position`, or the empty preset if out of range.
    pub fn get(&self, position: usize) -> Arc<SegmentPreset> {
        self.pattern
            .get(position)
            .cloned()
            .unwrap_or_else(SegmentPreset::empty)
    }

    /// Replaces the preset at `position` and invalidates that position's mix. Out of range
    /// positions are ignored.
    pub fn set(&mut self, position: usize, preset: Arc<SegmentPreset>) {
        let Some(slot) = self.pattern.get_mut(position) else {
            debug!(
                track = self.name,
                position,
                length = self.pattern.len(),
                "Ignoring out of range pattern edit."
            );
            return;
        };
        *slot = preset;
        self.cache.clear(position);
    }

    /// Switches to another sample. The new file is decoded first; on failure the track keeps
    /// its current sample.
    pub fn set_sample(&mut self, sample: Arc<Sample>) -> Result<(), LoopError> {
        let buffer = CachedSample::from_file_with_chunk(
            sample.path(),
            self.buffer.format(),
            self.decode_chunk,
        )?;
        info!(track = self.name, sample = sample.name(), "Changed track sample.");
        self.sample = sample;
        self.buffer = Arc::new(buffer);
        self.cache.reset(self.cache.len());
        Ok(())
    }

    /// Sets every position to the empty preset.
    pub fn clear(&mut self) {
        self.pattern.fill(SegmentPreset::empty());
        self.cache.reset(self.cache.len());
    }

    /// Grows with empty presets or truncates from the end. Zero is ignored.
    pub(crate) fn resize(&mut self, length: usize) {
        if length == 0 {
            return;
        }
        self.pattern.resize(length, SegmentPreset::empty());
    }

    /// One character per position: `#` for a trigger, `-` for nothing.
    pub fn pattern_string(&self) -> String {
        self.pattern
            .iter()
            .map(|preset| if preset.is_empty() { '-' } else { '#' })
            .collect()
    }
}

/// Owns every track and keeps their pattern lengths in step with the loop.
pub struct TrackManager {
    tracks: Vec<Track>,
    length: usize,
    format: WaveFormat,
    cache: Arc<PositionCache>,
    decode_chunk: usize,
}

impl TrackManager {
    /// Creates an empty manager. The cache is resized to `length`.
    pub fn new(
        length: usize,
        format: WaveFormat,
        cache: Arc<PositionCache>,
        decode_chunk: usize,
    ) -> TrackManager {
        let length = length.max(1);
        cache.reset(length);
        TrackManager {
            tracks: Vec::new(),
            length,
            format,
            cache,
            decode_chunk: decode_chunk.max(1),
        }
    }

    /// Adds a track with an all-empty pattern. Returns `Ok(None)` if the name is taken, and an
    /// error if the sample can't be decoded. Existing mixes stay valid.
    pub fn add_track(
        &mut self,
        name: &str,
        sample: Arc<Sample>,
    ) -> Result<Option<&mut Track>, LoopError> {
        if self.name_exists(name) {
            debug!(track = name, "Track name already exists.");
            return Ok(None);
        }

        let track = Track::new(
            name,
            sample,
            self.length,
            self.cache.clone(),
            self.format,
            self.decode_chunk,
        )?;
        info!(track = name, sample = track.sample.name(), "Added track.");
        self.tracks.push(track);
        Ok(self.tracks.last_mut())
    }

    /// Adds a track under a generated `NewTrack<n>` name.
    pub fn add_track_auto(
        &mut self,
        sample: Arc<Sample>,
    ) -> Result<Option<&mut Track>, LoopError> {
        let mut rng = rand::thread_rng();
        let name = loop {
            let candidate = format!("NewTrack{}", rng.gen_range(0..100_000u32));
            if !self.name_exists(&candidate) {
                break candidate;
            }
        };
        self.add_track(&name, sample)
    }

    /// Removes a track and invalidates every mix. Returns false if no track had that name.
    pub fn remove_track(&mut self, name: &str) -> bool {
        let before = self.tracks.len();
        self.tracks.retain(|track| track.name != name);
        if self.tracks.len() == before {
            return false;
        }
        info!(track = name, "Removed track.");
        self.cache.reset(self.length);
        true
    }

    /// Empties every track's pattern.
    pub fn clear(&mut self) {
        for track in self.tracks.iter_mut() {
            track.pattern.fill(SegmentPreset::empty());
        }
        self.cache.reset(self.length);
    }

    pub fn track(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|track| track.name == name)
    }

    pub fn track_mut(&mut self, name: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|track| track.name == name)
    }

    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn name_exists(&self, name: &str) -> bool {
        self.tracks.iter().any(|track| track.name == name)
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Number of tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Loop length every pattern is sized to.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn format(&self) -> WaveFormat {
        self.format
    }

    pub fn cache(&self) -> &Arc<PositionCache> {
        &self.cache
    }

    /// Resizes every pattern and recreates the cache. Zero is ignored.
    pub(crate) fn resize(&mut self, length: usize) {
        if length == 0 {
            return;
        }
        for track in self.tracks.iter_mut() {
            track.resize(length);
        }
        self.length = length;
        self.cache.reset(length);
    }
}
