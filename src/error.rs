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
use std::path::PathBuf;

use crate::audio::sample_source::SampleSourceError;

/// Errors raised by sample loading, rendering and export.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("File not found: {0}")]
    MissingResource(PathBuf),

    #[error("Unable to decode sample: {0}")]
    Decode(#[from] SampleSourceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV export error: {0}")]
    Wav(#[from] hound::Error),
}
