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
use std::{error::Error, fmt, sync::Arc};

use crate::config::EngineConfig;

pub mod cache;
pub mod cached;
pub mod cpal;
pub mod format;
pub mod handler;
pub mod mixer;
pub mod mock;
pub mod sample_source;

pub use cached::{CachedSample, CachedSampleReader};
pub use format::{SampleFormat, TargetFormat, WaveFormat};
pub use handler::AudioHandler;

/// A live destination for rendered position buffers. Enqueued buffers play from their start,
/// mixed with whatever is already playing.
pub trait OutputSink: fmt::Display + Send + Sync {
    /// Starts playing the given buffer. Returns once it is queued, not once it has played.
    fn enqueue(&self, sample: Arc<CachedSample>) -> Result<(), Box<dyn Error>>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::Device>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the output sink for the configuration. A device name starting with "mock" returns a mock
/// sink. Without a configured device, the default output device is opened.
pub fn get_sink(config: &EngineConfig) -> Result<Arc<dyn OutputSink>, Box<dyn Error>> {
    let device = match config.device() {
        Some(device) => device,
        None => return Ok(Arc::new(cpal::Device::get_default(config.format())?)),
    };

    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device)));
    }

    Ok(Arc::new(cpal::Device::get(device, config.format())?))
}
