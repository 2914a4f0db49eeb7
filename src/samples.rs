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
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info, warn};

use crate::error::LoopError;
use crate::util::filename_display;

/// Category given to samples registered without one.
pub const DEFAULT_CATEGORY: &str = "Other";

/// File extensions the decoder is expected to handle.
const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "wave", "flac", "mp3", "ogg", "aif", "aiff"];

/// An audio file registered under a unique name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    category: String,
    path: PathBuf,
    name: String,
}

impl Sample {
    /// Creates a sample. Fails if the file does not exist. An empty category becomes
    /// [`DEFAULT_CATEGORY`].
    pub fn new<P: AsRef<Path>>(category: &str, path: P, name: &str) -> Result<Sample, LoopError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LoopError::MissingResource(path.to_path_buf()));
        }

        let category = if category.trim().is_empty() {
            DEFAULT_CATEGORY
        } else {
            category
        };

        Ok(Sample {
            category: category.to_string(),
            path: path.to_path_buf(),
            name: name.to_string(),
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, filename_display(&self.path))
    }
}

/// Returns true if the path has an extension the decoder handles.
pub fn is_supported_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| supported.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Registry of samples with unique names.
#[derive(Debug, Default)]
pub struct SampleLibrary {
    samples: Vec<Arc<Sample>>,
}

impl SampleLibrary {
    pub fn new() -> SampleLibrary {
        SampleLibrary::default()
    }

    /// Registers a sample in the default category.
    pub fn add_sample<P: AsRef<Path>>(&mut self, path: P, name: &str) -> Option<Arc<Sample>> {
        self.add_sample_with_category(path, name, DEFAULT_CATEGORY)
    }

    /// Registers a sample. Returns `None` if the file is missing or not a supported audio
    /// file, or if the name is already taken.
    pub fn add_sample_with_category<P: AsRef<Path>>(
        &mut self,
        path: P,
        name: &str,
        category: &str,
    ) -> Option<Arc<Sample>> {
        let path = path.as_ref();
        debug!(path = ?path, name, "Attempting to add sample.");

        if self.name_exists(name) {
            warn!(name, "Sample name already exists.");
            return None;
        }
        if !is_supported_audio(path) {
            warn!(path = ?path, "Not a supported audio file.");
            return None;
        }

        let sample = match Sample::new(category, path, name) {
            Ok(sample) => Arc::new(sample),
            Err(e) => {
                warn!(err = %e, "Unable to add sample.");
                return None;
            }
        };

        self.samples.push(sample.clone());
        info!(name, category = sample.category(), "Added sample.");
        Some(sample)
    }

    /// Registers every supported audio file in `dir`, named by file name. Returns how many
    /// were added.
    pub fn add_directory_as_samples<P: AsRef<Path>>(
        &mut self,
        dir: P,
        recursive: bool,
    ) -> Result<usize, LoopError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(LoopError::MissingResource(dir.to_path_buf()));
        }

        let mut paths = Vec::new();
        collect_audio_files(dir, recursive, &mut paths)?;
        paths.sort();

        let added = paths
            .iter()
            .filter(|path| {
                let name = filename_display(path).to_string();
                self.add_sample(path, &name).is_some()
            })
            .count();
        info!(dir = ?dir, added, "Added sample directory.");
        Ok(added)
    }

    pub fn sample(&self, name: &str) -> Option<Arc<Sample>> {
        self.samples
            .iter()
            .find(|sample| sample.name == name)
            .cloned()
    }

    pub fn name_exists(&self, name: &str) -> bool {
        self.samples.iter().any(|sample| sample.name == name)
    }

    pub fn samples(&self) -> &[Arc<Sample>] {
        &self.samples
    }

    /// Sample names grouped by category, in registration order within each category.
    pub fn categories(&self) -> BTreeMap<String, Vec<String>> {
        let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for sample in &self.samples {
            categories
                .entry(sample.category.clone())
                .or_default()
                .push(sample.name.clone());
        }
        categories
    }
}

fn collect_audio_files(
    dir: &Path,
    recursive: bool,
    paths: &mut Vec<PathBuf>,
) -> Result<(), LoopError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_audio_files(&path, recursive, paths)?;
            }
        } else if is_supported_audio(&path) {
            paths.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs::File};

    use super::*;

    #[test]
    fn test_sample_requires_file() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("missing.wav");
        assert!(matches!(
            Sample::new("Drums", &missing, "kick"),
            Err(LoopError::MissingResource(_))
        ));

        let path = dir.path().join("kick.wav");
        File::create(&path)?;
        let sample = Sample::new("", &path, "kick")?;
        assert_eq!(sample.category(), DEFAULT_CATEGORY);
        assert_eq!(sample.name(), "kick");
        assert_eq!(sample.path(), path.as_path());
        Ok(())
    }

    #[test]
    fn test_add_sample_rejects_duplicates_and_bad_files() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let kick = dir.path().join("kick.wav");
        let notes = dir.path().join("notes.txt");
        File::create(&kick)?;
        File::create(&notes)?;

        let mut library = SampleLibrary::new();
        assert!(library.add_sample(&kick, "kick").is_some());
        assert!(library.add_sample(&kick, "kick").is_none());
        assert!(library.add_sample(&notes, "notes").is_none());
        assert!(library
            .add_sample(dir.path().join("nope.wav"), "nope")
            .is_none());

        assert_eq!(library.samples().len(), 1);
        assert!(library.name_exists("kick"));
        assert_eq!(library.sample("kick").expect("kick").path(), kick.as_path());
        assert!(library.sample("snare").is_none());
        Ok(())
    }

    #[test]
    fn test_categories() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let mut library = SampleLibrary::new();
        for name in ["kick", "snare", "pad"] {
            let path = dir.path().join(format!("{}.wav", name));
            File::create(&path)?;
            let category = if name == "pad" { "Synth" } else { "Drums" };
            library.add_sample_with_category(&path, name, category);
        }

        let categories = library.categories();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories["Drums"], vec!["kick", "snare"]);
        assert_eq!(categories["Synth"], vec!["pad"]);
        Ok(())
    }

    #[test]
    fn test_add_directory() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;
        File::create(dir.path().join("a.wav"))?;
        File::create(dir.path().join("b.FLAC"))?;
        File::create(dir.path().join("readme.md"))?;
        File::create(nested.join("c.wav"))?;

        let mut library = SampleLibrary::new();
        assert_eq!(library.add_directory_as_samples(dir.path(), false)?, 2);
        assert!(library.name_exists("a.wav"));
        assert!(library.name_exists("b.FLAC"));
        assert!(!library.name_exists("c.wav"));

        // Already registered names are skipped on the second pass.
        assert_eq!(library.add_directory_as_samples(dir.path(), true)?, 1);
        assert!(library.name_exists("c.wav"));

        assert!(library
            .add_directory_as_samples(dir.path().join("missing"), false)
            .is_err());
        Ok(())
    }
}
