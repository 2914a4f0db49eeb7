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
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info, span, Level};

use super::{mixer::AudioMixer, CachedSample, CachedSampleReader, OutputSink, WaveFormat};

/// A small wrapper around a cpal::Device. Once opened with [`Device::get`] or
/// [`Device::get_default`] it keeps an output
/// stream running and mixes every enqueued buffer into it.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The running output stream. Only present for opened devices.
    output_manager: Option<OutputManager>,
}

/// Owns the output stream thread. Buffers to play are handed to the stream callback as readers.
struct OutputManager {
    /// Channel for handing new readers to the stream callback.
    reader_tx: crossbeam_channel::Sender<CachedSampleReader>,
    /// Tells the output thread to drop the stream.
    shutdown: Arc<AtomicBool>,
    /// Handle to the output thread (keeps it alive).
    output_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Creates the stream callback: picks up newly enqueued readers, then mixes every active reader
/// into the device buffer.
fn create_callback<T>(
    reader_rx: crossbeam_channel::Receiver<CachedSampleReader>,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut mixer = AudioMixer::new();
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        while let Ok(reader) = reader_rx.try_recv() {
            mixer.add_reader(reader);
        }

        scratch.resize(data.len(), 0.0);
        mixer.process_into_output(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    reader_rx: crossbeam_channel::Receiver<CachedSampleReader>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device.build_output_stream(
        config,
        create_callback::<T>(reader_rx),
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

impl Drop for OutputManager {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
        }
    }
}

impl OutputManager {
    /// Starts the output thread, which creates and owns the CPAL stream at the given format.
    fn start(device: cpal::Device, format: WaveFormat) -> Result<OutputManager, Box<dyn Error>> {
        let sample_format = device.default_output_config()?.sample_format();
        let (reader_tx, reader_rx) = crossbeam_channel::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let output_thread = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                let config = cpal::StreamConfig {
                    channels: format.channels,
                    sample_rate: format.sample_rate as cpal::SampleRate,
                    buffer_size: cpal::BufferSize::Default,
                };

                let stream_result = match sample_format {
                    cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, reader_rx),
                    cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, reader_rx),
                    cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, reader_rx),
                    other => {
                        error!(format = %other, "Unsupported device sample format");
                        return;
                    }
                };

                match stream_result {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            error!("Failed to start CPAL stream: {}", e);
                            return;
                        }
                        info!(%format, "CPAL output stream started successfully");

                        // Keep the stream alive until the device goes away.
                        while !shutdown.load(Ordering::Relaxed) {
                            thread::sleep(Duration::from_millis(100));
                        }
                        debug!("CPAL output stream stopped");
                    }
                    Err(e) => {
                        error!("Failed to create CPAL stream: {}", e);
                    }
                }
            })
        };

        Ok(OutputManager {
            reader_tx,
            shutdown,
            output_thread: Some(output_thread),
        })
    }
}

impl Device {
    /// Lists cpal output devices.
    pub fn list() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let output_configs = match device.supported_output_configs() {
                    Ok(output_configs) => output_configs,
                    Err(_) => continue,
                };
                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                        output_manager: None,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device and starts its output stream at `format`.
    pub fn get(name: &str, format: WaveFormat) -> Result<Device, Box<dyn Error>> {
        let span = span!(Level::INFO, "cpal device");
        let _enter = span.enter();

        match Device::list()?
            .into_iter()
            .find(|device| device.name.trim() == name)
        {
            Some(mut device) => {
                if format.channels > device.max_channels {
                    return Err(format!(
                        "device {} supports {} channels, {} requested",
                        name, device.max_channels, format.channels
                    )
                    .into());
                }
                device.output_manager = Some(OutputManager::start(device.device.clone(), format)?);
                info!(device = name, %format, "Opened output device.");
                Ok(device)
            }
            None => Err(format!("no device found with name {}", name).into()),
        }
    }

    /// Gets the default host's default output device and starts its output stream at `format`.
    pub fn get_default(format: WaveFormat) -> Result<Device, Box<dyn Error>> {
        let span = span!(Level::INFO, "cpal device");
        let _enter = span.enter();

        let host = cpal::default_host();
        let device = {
            let _shh_stdout = shh::stdout()?;
            let _shh_stderr = shh::stderr()?;
            host.default_output_device()
        }
        .ok_or("no default output device available; name one with --config device")?;

        let max_channels = device
            .supported_output_configs()?
            .map(|output_config| output_config.channels())
            .max()
            .unwrap_or(0);
        let name = device.name()?;
        if format.channels > max_channels {
            return Err(format!(
                "default device {} supports {} channels, {} requested",
                name, max_channels, format.channels
            )
            .into());
        }

        let output_manager = OutputManager::start(device.clone(), format)?;
        info!(device = name, %format, "Opened default output device.");
        Ok(Device {
            name,
            max_channels,
            host_id: host.id(),
            device,
            output_manager: Some(output_manager),
        })
    }
}

impl OutputSink for Device {
    fn enqueue(&self, sample: Arc<CachedSample>) -> Result<(), Box<dyn Error>> {
        match &self.output_manager {
            Some(output_manager) => {
                output_manager.reader_tx.send(sample.reader())?;
                Ok(())
            }
            None => Err(format!("device {} has no open output stream", self.name).into()),
        }
    }
}
