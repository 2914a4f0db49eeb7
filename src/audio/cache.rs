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

use parking_lot::RwLock;
use tracing::debug;

use super::cached::CachedSample;

/// One rendered mix (or nothing) per pattern position.
///
/// The slot count always matches the loop length: a length change replaces the whole array.
#[derive(Debug, Default)]
pub struct PositionCache {
    slots: RwLock<Vec<Option<Arc<CachedSample>>>>,
}

impl PositionCache {
    pub fn new(length: usize) -> PositionCache {
        PositionCache {
            slots: RwLock::new(vec![None; length]),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// The mix stored for `position`, if any. Out-of-range positions hold nothing.
    pub fn get(&self, position: usize) -> Option<Arc<CachedSample>> {
        self.slots.read().get(position).cloned().flatten()
    }

    /// Stores a mix. Ignored if the position is out of range.
    pub fn set(&self, position: usize, sample: Arc<CachedSample>) {
        if let Some(slot) = self.slots.write().get_mut(position) {
            *slot = Some(sample);
        }
    }

    /// Drops the mix for one position.
    pub fn clear(&self, position: usize) {
        if let Some(slot) = self.slots.write().get_mut(position) {
            if slot.take().is_some() {
                debug!(position, "Invalidated cached position.");
            }
        }
    }

    /// Drops every mix and resizes to `length` slots.
    pub fn reset(&self, length: usize) {
        *self.slots.write() = vec![None; length];
        debug!(length, "Reset position cache.");
    }

    /// A copy of every slot, in position order.
    pub fn snapshot(&self) -> Vec<Option<Arc<CachedSample>>> {
        self.slots.read().clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::WaveFormat;

    fn mix() -> Arc<CachedSample> {
        Arc::new(CachedSample::from_interleaved(
            WaveFormat::default(),
            vec![0.5, 0.5],
        ))
    }

    #[test]
    fn test_set_get_clear() {
        let cache = PositionCache::new(4);
        assert_eq!(cache.len(), 4);
        assert!(cache.get(1).is_none());

        let sample = mix();
        cache.set(1, sample.clone());
        assert!(Arc::ptr_eq(&cache.get(1).expect("cached"), &sample));

        cache.clear(1);
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let cache = PositionCache::new(2);
        cache.set(2, mix());
        cache.clear(5);
        assert!(cache.get(2).is_none());
        assert_eq!(cache.len(), 2);
        assert!(cache.snapshot().iter().all(|slot| slot.is_none()));
    }

    #[test]
    fn test_reset_resizes_and_empties() {
        let cache = PositionCache::new(2);
        cache.set(0, mix());
        cache.reset(8);
        assert_eq!(cache.len(), 8);
        assert!(cache.get(0).is_none());
    }
}
