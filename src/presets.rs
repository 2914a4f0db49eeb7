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
use std::{
    fmt,
    sync::{Arc, LazyLock},
};

use tracing::warn;

/// Name of the preset that triggers nothing.
pub const EMPTY_PRESET_NAME: &str = "Empty";

static EMPTY: LazyLock<Arc<SegmentPreset>> = LazyLock::new(|| {
    Arc::new(SegmentPreset {
        name: EMPTY_PRESET_NAME.to_string(),
        offsets: Vec::new(),
    })
});

/// A named set of sub-beat trigger offsets, each a fraction of a beat in `[0, 1)`.
#[derive(Debug, PartialEq)]
pub struct SegmentPreset {
    name: String,
    offsets: Vec<f64>,
}

impl SegmentPreset {
    /// Creates a preset. Returns `None` if any offset lies outside `[0, 1)`.
    pub fn new(name: &str, offsets: Vec<f64>) -> Option<SegmentPreset> {
        if let Some(bad) = offsets
            .iter()
            .find(|offset| !(0.0..1.0).contains(*offset))
        {
            warn!(preset = name, offset = bad, "Preset offset out of range.");
            return None;
        }

        Some(SegmentPreset {
            name: name.to_string(),
            offsets,
        })
    }

    /// The shared "no trigger" preset.
    pub fn empty() -> Arc<SegmentPreset> {
        EMPTY.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    /// True when the preset fires nothing.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

impl fmt::Display for SegmentPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.name, self.offsets)
    }
}

/// Registry of presets with unique names. The empty preset is always registered.
#[derive(Debug)]
pub struct PresetLibrary {
    presets: Vec<Arc<SegmentPreset>>,
}

impl PresetLibrary {
    pub fn new() -> PresetLibrary {
        PresetLibrary {
            presets: vec![SegmentPreset::empty()],
        }
    }

    /// Registers a preset. Returns `None` if the name is taken or an offset is out of range.
    pub fn add_preset(&mut self, offsets: Vec<f64>, name: &str) -> Option<Arc<SegmentPreset>> {
        if self.name_exists(name) {
            warn!(preset = name, "Preset name already exists.");
            return None;
        }

        let preset = Arc::new(SegmentPreset::new(name, offsets)?);
        self.presets.push(preset.clone());
        Some(preset)
    }

    pub fn preset(&self, name: &str) -> Option<Arc<SegmentPreset>> {
        self.presets
            .iter()
            .find(|preset| preset.name == name)
            .cloned()
    }

    pub fn name_exists(&self, name: &str) -> bool {
        self.presets.iter().any(|preset| preset.name == name)
    }

    /// Every preset in registration order, starting with the empty preset.
    pub fn presets(&self) -> &[Arc<SegmentPreset>] {
        &self.presets
    }

    pub fn empty(&self) -> Arc<SegmentPreset> {
        SegmentPreset::empty()
    }
}

impl Default for PresetLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_preset() {
        let empty = SegmentPreset::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.name(), EMPTY_PRESET_NAME);
        assert!(Arc::ptr_eq(&empty, &SegmentPreset::empty()));
    }

    #[test]
    fn test_library_starts_with_empty() {
        let library = PresetLibrary::new();
        assert_eq!(library.presets().len(), 1);
        assert!(library.name_exists(EMPTY_PRESET_NAME));
        assert!(library.preset(EMPTY_PRESET_NAME).expect("empty").is_empty());
    }

    #[test]
    fn test_add_preset() {
        let mut library = PresetLibrary::new();
        let double = library
            .add_preset(vec![0.0, 0.5], "Double")
            .expect("added");
        assert_eq!(double.offsets(), &[0.0, 0.5]);
        assert!(!double.is_empty());
        assert!(Arc::ptr_eq(&double, &library.preset("Double").expect("found")));
        assert!(library.preset("Triple").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut library = PresetLibrary::new();
        assert!(library.add_preset(vec![0.0], "Single").is_some());
        assert!(library.add_preset(vec![0.25], "Single").is_none());
        assert!(library.add_preset(vec![0.25], EMPTY_PRESET_NAME).is_none());
        assert_eq!(library.presets().len(), 2);
        assert_eq!(library.preset("Single").expect("found").offsets(), &[0.0]);
    }

    #[test]
    fn test_out_of_range_offsets_rejected() {
        let mut library = PresetLibrary::new();
        assert!(library.add_preset(vec![1.0], "Whole").is_none());
        assert!(library.add_preset(vec![0.0, -0.25], "Negative").is_none());
        assert!(library.add_preset(vec![f64::NAN], "Nan").is_none());
        assert_eq!(library.presets().len(), 1);
    }
}
