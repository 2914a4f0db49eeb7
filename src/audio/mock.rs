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

use parking_lot::Mutex;
use tracing::debug;

use super::{CachedSample, OutputSink};

/// A mock device. Doesn't actually play anything, but remembers every buffer it was given.
#[derive(Clone)]
pub struct Device {
    name: String,
    enqueued: Arc<Mutex<Vec<Arc<CachedSample>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            enqueued: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every buffer enqueued so far, in order.
    pub fn enqueued(&self) -> Vec<Arc<CachedSample>> {
        self.enqueued.lock().clone()
    }

    /// The number of buffers enqueued so far.
    pub fn recorded_count(&self) -> usize {
        self.enqueued.lock().len()
    }
}

impl OutputSink for Device {
    fn enqueue(&self, sample: Arc<CachedSample>) -> Result<(), Box<dyn Error>> {
        debug!(
            device = self.name,
            frames = sample.frames(),
            "Enqueued buffer."
        );
        self.enqueued.lock().push(sample);
        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
