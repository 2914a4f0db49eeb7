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
use std::{fmt::Write, sync::Arc, time::Duration};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error, info, span, warn, Instrument, Level, Span};

use crate::playsync::CancelHandle;
use crate::tracks::{Track, TrackManager};

/// Tempo used when none (or an invalid one) is given.
pub const DEFAULT_BPM: f64 = 130.0;

/// Loop length used when none is given.
pub const DEFAULT_LENGTH: usize = 4;

/// Playhead notifications, delivered to every subscriber in emission order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopEvent {
    /// The playhead moved. `playing` is the transport state when the move happened.
    PositionChanged { position: usize, playing: bool },
    /// The loop length changed.
    LengthChanged(usize),
}

struct LoopState {
    position: usize,
    length: usize,
    bpm: f64,
    playing: bool,
    /// Cancels the wait of the current play session.
    cancel: CancelHandle,
    subscribers: Vec<mpsc::UnboundedSender<LoopEvent>>,
}

impl LoopState {
    /// Sends an event to every subscriber, dropping the ones that hung up.
    fn emit(&mut self, event: LoopEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }

    fn beat_duration(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm)
    }
}

/// The playhead: advances one position per beat while playing and notifies subscribers.
///
/// Lock order is the track set first, then the loop state. Operations that touch both take
/// them in that order.
pub struct LoopSystem {
    state: Mutex<LoopState>,
    tracks: Arc<RwLock<TrackManager>>,
    span: Span,
}

impl LoopSystem {
    /// Creates a stopped loop at position 0. A zero length becomes 1 and a non-positive tempo
    /// falls back to [`DEFAULT_BPM`]. Every track is sized to the length.
    pub fn new(tracks: Arc<RwLock<TrackManager>>, length: usize, bpm: f64) -> LoopSystem {
        let length = length.max(1);
        let bpm = if bpm > 0.0 && bpm.is_finite() {
            bpm
        } else {
            DEFAULT_BPM
        };
        tracks.write().resize(length);

        LoopSystem {
            state: Mutex::new(LoopState {
                position: 0,
                length,
                bpm,
                playing: false,
                cancel: CancelHandle::new(),
                subscribers: Vec::new(),
            }),
            tracks,
            span: span!(Level::INFO, "loop"),
        }
    }

    /// Returns a receiver for every future event.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<LoopEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().subscribers.push(tx);
        rx
    }

    pub fn position(&self) -> usize {
        self.state.lock().position
    }

    pub fn length(&self) -> usize {
        self.state.lock().length
    }

    pub fn bpm(&self) -> f64 {
        self.state.lock().bpm
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Time between two positions at the current tempo.
    pub fn beat_duration(&self) -> Duration {
        self.state.lock().beat_duration()
    }

    /// Sets the tempo. Only positive, finite values are accepted; the next wait uses it.
    pub fn set_bpm(&self, bpm: f64) {
        let _enter = self.span.enter();
        if !(bpm > 0.0 && bpm.is_finite()) {
            warn!(bpm, "Ignoring invalid tempo.");
            return;
        }
        // Cached mixes place their repeats at the old tempo.
        let tracks = self.tracks.write();
        self.state.lock().bpm = bpm;
        tracks.cache().reset(tracks.length());
        info!(bpm, "Tempo changed.");
    }

    /// Toggles playback. Starting spawns the stepping task on the current tokio runtime;
    /// pausing cancels the pending step and keeps the position. Returns whether the loop is
    /// now playing.
    pub fn play(self: &Arc<Self>) -> bool {
        let _enter = self.span.enter();
        let mut state = self.state.lock();

        if state.playing {
            state.playing = false;
            state.cancel.cancel();
            info!(position = state.position, "Paused.");
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(err = %e, "Playback needs a tokio runtime.");
                return false;
            }
        };

        let cancel = CancelHandle::new();
        state.cancel = cancel.clone();
        state.playing = true;
        info!(position = state.position, bpm = state.bpm, "Playing.");
        drop(state);

        let system = self.clone();
        runtime.spawn(
            async move {
                while system.is_playing() && !cancel.is_cancelled() {
                    system.step(&cancel).await;
                }
                debug!("Stepping task finished.");
            }
            .instrument(self.span.clone()),
        );
        true
    }

    /// Stops playback and rewinds to position 0.
    pub fn stop(&self) {
        let _enter = self.span.enter();
        let mut state = self.state.lock();
        state.playing = false;
        state.cancel.cancel();
        state.position = 0;
        state.emit(LoopEvent::PositionChanged {
            position: 0,
            playing: false,
        });
        info!("Stopped.");
    }

    /// Rewinds to position 0 without changing the transport state.
    pub fn reset_position(&self) {
        let mut state = self.state.lock();
        state.position = 0;
        let playing = state.playing;
        state.emit(LoopEvent::PositionChanged {
            position: 0,
            playing,
        });
    }

    /// Waits one beat, then advances the playhead and notifies. Returns false without
    /// advancing if `cancel` fired during the wait.
    pub async fn step(&self, cancel: &CancelHandle) -> bool {
        let interval = self.beat_duration();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => return false,
        }

        let mut state = self.state.lock();
        // A cancel can land between the timer firing and taking the lock.
        if cancel.is_cancelled() {
            return false;
        }
        state.position = (state.position + 1) % state.length;
        let (position, playing) = (state.position, state.playing);
        state.emit(LoopEvent::PositionChanged { position, playing });
        debug!(position, "Stepped.");
        true
    }

    /// Changes the loop length, resizing every track and recreating the render cache. Zero is
    /// rejected and changes nothing.
    pub fn resize(&self, length: usize) {
        let _enter = self.span.enter();
        if length == 0 {
            warn!("Ignoring zero loop length.");
            return;
        }

        let mut tracks = self.tracks.write();
        let mut state = self.state.lock();
        if state.position >= length {
            state.position = 0;
            let playing = state.playing;
            state.emit(LoopEvent::PositionChanged {
                position: 0,
                playing,
            });
        }
        state.length = length;
        tracks.resize(length);
        state.emit(LoopEvent::LengthChanged(length));
        info!(length, "Loop resized.");
    }

    /// Delay in seconds of every trigger of `track` at `position` (the playhead if `None`),
    /// in offset order.
    pub fn calc_delays(&self, track: &Track, position: Option<usize>) -> Vec<f64> {
        let (current, beat) = {
            let state = self.state.lock();
            (state.position, 60.0 / state.bpm)
        };
        track
            .get(position.unwrap_or(current))
            .offsets()
            .iter()
            .map(|offset| offset * beat)
            .collect()
    }

    /// A text status of the playhead and each track's current trigger.
    pub fn overview(&self, tracks: &TrackManager) -> String {
        let (position, length, bpm) = {
            let state = self.state.lock();
            (state.position, state.length, state.bpm)
        };

        let bar: String = (0..length)
            .map(|p| if p == position { '#' } else { '-' })
            .collect();
        let mut overview = format!("{} {}\nBPM {}", position + 1, bar, bpm);
        for track in tracks.tracks() {
            let delays = self.calc_delays(track, Some(position));
            let _ = write!(
                overview,
                "\n[{}] {} | {} | {:?}",
                track.name(),
                track.pattern_string(),
                track.get(position),
                delays
            );
        }
        overview
    }
}
