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
use std::{error::Error, path::Path, sync::Arc};

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::info;

use crate::audio::{self, cache::PositionCache, AudioHandler, OutputSink};
use crate::config::EngineConfig;
use crate::loop_system::LoopSystem;
use crate::presets::PresetLibrary;
use crate::samples::SampleLibrary;
use crate::tracks::TrackManager;

/// Everything one loop needs, wired together: the sample and preset libraries, the tracks, the
/// playhead and the renderer listening to it.
///
/// Creating a project spawns the render listener, so it must happen inside a tokio runtime.
pub struct Project {
    config: EngineConfig,
    samples: SampleLibrary,
    presets: PresetLibrary,
    tracks: Arc<RwLock<TrackManager>>,
    loop_system: Arc<LoopSystem>,
    handler: Arc<AudioHandler>,
    listener: JoinHandle<()>,
}

impl Project {
    /// Creates a project that plays through the sink the configuration names.
    pub fn new(config: EngineConfig) -> Result<Project, Box<dyn Error>> {
        let sink = audio::get_sink(&config)?;
        Project::with_sink(config, sink)
    }

    /// Creates a project that plays through the given sink.
    pub fn with_sink(
        config: EngineConfig,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Project, Box<dyn Error>> {
        let format = config.format();
        let length = config.length();
        let cache = Arc::new(PositionCache::new(length));
        let tracks = Arc::new(RwLock::new(TrackManager::new(
            length,
            format,
            cache,
            config.buffer_size(),
        )));
        let loop_system = Arc::new(LoopSystem::new(tracks.clone(), length, config.bpm()));
        let handler = Arc::new(AudioHandler::new(
            loop_system.clone(),
            tracks.clone(),
            sink,
            config.export_format()?,
        ));
        let listener = handler.listen(loop_system.subscribe())?;

        info!(
            %format,
            length = loop_system.length(),
            bpm = loop_system.bpm(),
            sink = %handler.sink(),
            "Created project."
        );
        Ok(Project {
            config,
            samples: SampleLibrary::new(),
            presets: PresetLibrary::new(),
            tracks,
            loop_system,
            handler,
            listener,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn samples(&self) -> &SampleLibrary {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut SampleLibrary {
        &mut self.samples
    }

    pub fn presets(&self) -> &PresetLibrary {
        &self.presets
    }

    pub fn presets_mut(&mut self) -> &mut PresetLibrary {
        &mut self.presets
    }

    pub fn tracks(&self) -> &Arc<RwLock<TrackManager>> {
        &self.tracks
    }

    pub fn loop_system(&self) -> &Arc<LoopSystem> {
        &self.loop_system
    }

    pub fn handler(&self) -> &Arc<AudioHandler> {
        &self.handler
    }

    /// Registers the file as a sample and adds a track of the same name playing it.
    pub fn add_sample_track<P: AsRef<Path>>(
        &mut self,
        name: &str,
        path: P,
    ) -> Result<(), Box<dyn Error>> {
        let path = path.as_ref();
        let sample = self
            .samples
            .add_sample(path, name)
            .ok_or_else(|| format!("unable to add sample {} from {}", name, path.display()))?;
        match self.tracks.write().add_track(name, sample)? {
            Some(_) => Ok(()),
            None => Err(format!("track {} already exists", name).into()),
        }
    }

    /// Places the named preset on a track at the given position.
    pub fn set_step(
        &self,
        track: &str,
        position: usize,
        preset: &str,
    ) -> Result<(), Box<dyn Error>> {
        let preset = self
            .presets
            .preset(preset)
            .ok_or_else(|| format!("no preset named {}", preset))?;
        let mut tracks = self.tracks.write();
        let length = tracks.length();
        if position >= length {
            return Err(format!(
                "position {} is outside the loop (length {})",
                position, length
            )
            .into());
        }
        let track = tracks
            .track_mut(track)
            .ok_or_else(|| format!("no track named {}", track))?;
        track.set(position, preset);
        Ok(())
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        self.loop_system.stop();
        self.listener.abort();
    }
}
