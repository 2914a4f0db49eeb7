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
use std::path::Path;

use tracing::debug;

use super::audio::AudioSampleSource;
use super::channels::ChannelConverter;
use super::error::SampleSourceError;
use super::traits::SampleSource;
use super::transcoder::AudioTranscoder;
use crate::audio::WaveFormat;

/// Opens a file and returns a source producing it in the given format: channels adapted
/// first, then resampled.
pub fn create_sample_source_from_file<P: AsRef<Path>>(
    path: P,
    format: WaveFormat,
) -> Result<Box<dyn SampleSource>, SampleSourceError> {
    let path = path.as_ref();
    let decoded = AudioSampleSource::from_file(path)?;
    debug!(
        path = ?path,
        sample_rate = decoded.sample_rate(),
        channels = decoded.channel_count(),
        target = %format,
        "Opened sample source."
    );

    let converted = ChannelConverter::new(decoded, format.channels)?;
    Ok(Box::new(AudioTranscoder::new(
        converted,
        format.sample_rate,
    )?))
}
