/// Background music streaming
///
/// A single long-lived worker streams the current track. Everything about the
/// track lives in `MusicState` behind the BGM lock; the worker holds that lock
/// for one decode/output cycle at a time, so a control call that takes the
/// lock always lands between two buffers.
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::config::EngineConfig;
use crate::error::{AudioError, AudioResult};
use crate::messaging::{EngineEvent, EventBus, WorkerKind};

use super::buffer::PingPongBuffer;
use super::decoder::Decoder;
use super::effects::VolumeEffect;
use super::port::{OutputPort, PortConfig, PortMode, PortProvider};
use super::source::AudioSourceType;

/// Transport state of the music channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicStatus {
    /// No track, or the track was stopped
    Stopped,

    /// Track installed, port not yet configured for it
    Loading,

    /// Streaming
    Playing,

    /// Paused, resumable
    Paused,
}

/// The one music track
///
/// The source stream is owned by the decoder once opened.
pub struct MusicState {
    pub(crate) buffers: PingPongBuffer,
    pub(crate) decoder: Box<dyn Decoder>,
    pub(crate) path: PathBuf,
    pub(crate) mode: PortMode,
    pub(crate) is_playing: bool,
    pub(crate) is_paused: bool,
    pub(crate) is_new_track: bool,
    pub(crate) ended_once: bool,
    pub(crate) loop_count: u32,
    /// Requested volume on the 0..=100 scale
    pub(crate) volume: i32,
    /// Tick of the last `update` (or of the last fade request)
    pub(crate) tick: u64,
}

impl MusicState {
    pub(crate) fn new(
        decoder: Box<dyn Decoder>,
        path: &Path,
        mode: PortMode,
        buffer_size: usize,
        volume: i32,
        tick: u64,
    ) -> Self {
        Self {
            buffers: PingPongBuffer::new(buffer_size),
            decoder,
            path: path.to_path_buf(),
            mode,
            is_playing: true,
            is_paused: false,
            is_new_track: true,
            ended_once: false,
            loop_count: 0,
            volume,
            tick,
        }
    }

    pub fn status(&self) -> MusicStatus {
        if self.is_playing && self.is_new_track {
            MusicStatus::Loading
        } else if self.is_playing {
            MusicStatus::Playing
        } else if self.is_paused {
            MusicStatus::Paused
        } else {
            MusicStatus::Stopped
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_stereo(&self) -> bool {
        self.mode == PortMode::Stereo
    }
}

impl fmt::Debug for MusicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MusicState")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("status", &self.status())
            .field("ended_once", &self.ended_once)
            .field("volume", &self.volume)
            .finish()
    }
}

/// State shared by the engine and the music worker
pub(crate) struct MusicShared {
    /// The BGM lock
    pub(crate) state: Mutex<Option<MusicState>>,

    /// Signalled whenever there may be something to stream, or on shutdown
    pub(crate) wake: Condvar,

    pub(crate) shutdown: AtomicBool,

    /// Set once the music port failed; no more music is streamed
    pub(crate) halted: AtomicBool,
}

impl MusicShared {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(None),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
            halted: AtomicBool::new(false),
        }
    }

    /// Run `f` on the current track under the BGM lock, waking the worker
    /// afterwards
    pub(crate) fn with_track<R>(&self, f: impl FnOnce(&mut MusicState) -> R) -> Option<R> {
        let mut state = self.state.lock();
        let result = state.as_mut().map(f);
        self.wake.notify_one();
        result
    }

    /// Ask the worker to exit and wake it if it is waiting
    pub(crate) fn request_shutdown(&self) {
        let _state = self.state.lock();
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_all();
    }
}

/// The port side of the music worker, living on the worker thread
struct MusicOutput {
    port: Option<Box<dyn OutputPort>>,
    configured: Option<PortConfig>,
    applied_volume: i32,
}

/// The music worker
pub(crate) struct BgmStreamer {
    pub(crate) shared: Arc<MusicShared>,
    pub(crate) ports: Arc<dyn PortProvider>,
    pub(crate) events: EventBus,
    pub(crate) config: EngineConfig,
}

impl BgmStreamer {
    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("bgm-stream".to_string())
            .spawn(move || self.run())
    }

    fn run(self) {
        tracing::debug!("BGM streamer started");
        let mut output = MusicOutput {
            port: None,
            configured: None,
            applied_volume: 0,
        };

        loop {
            let mut state = self.shared.state.lock();
            if self.shared.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let streaming = matches!(state.as_ref(), Some(music) if music.is_playing);
            if !streaming {
                self.shared.wake.wait(&mut state);
                continue;
            }
            let Some(music) = state.as_mut() else {
                continue;
            };

            match self.stream_cycle(&mut output, music) {
                Ok(()) => {}
                Err(AudioError::HardwareFailure(message)) => {
                    tracing::error!("An error occurred in audio thread ({})", message);
                    // Halted: the track goes with the worker
                    self.shared.halted.store(true, Ordering::SeqCst);
                    if let Some(track) = state.take() {
                        tracing::debug!("Released music {}", track.path().display());
                    }
                    self.events
                        .publish(EngineEvent::MusicHardwareFailure { message });
                    break;
                }
                Err(other) => {
                    // Port could not be obtained: stop this track, retry
                    // on the next play or resume
                    tracing::warn!("Music stopped: {}", other);
                    music.is_playing = false;
                    music.is_new_track = true;
                }
            }

            // Hand the lock to any waiting control call
            MutexGuard::unlock_fair(state);
        }

        // Releases the port
        drop(output);
        self.events.publish(EngineEvent::WorkerExited {
            worker: WorkerKind::Music,
        });
        tracing::debug!("BGM streamer stopped");
    }

    /// One decode/output cycle. Called with the BGM lock held.
    fn stream_cycle(&self, output: &mut MusicOutput, music: &mut MusicState) -> AudioResult<()> {
        if music.is_new_track || output.port.is_none() {
            self.configure_for_track(output, music)?;
        }
        let Some(port) = output.port.as_mut() else {
            return Err(AudioError::ResourceUnavailable("music port".to_string()));
        };

        // Hot volume changes, including fades, go straight to the port
        let decoder_volume = music.decoder.volume();
        if decoder_volume != output.applied_volume {
            let volume = VolumeEffect::new(decoder_volume).to_hardware(self.config.hardware_volume_max);
            port.set_volume(volume, volume)?;
            output.applied_volume = decoder_volume;
        }

        music.buffers.swap();
        music.decoder.decode(music.buffers.active_mut());

        let loops = music.decoder.loop_count();
        if loops > music.loop_count {
            music.loop_count = loops;
            music.ended_once = true;
            self.events
                .publish(EngineEvent::MusicLooped { loop_count: loops });
        }

        // Blocks until the hardware takes the buffer; this paces the loop
        port.output(music.buffers.active())
    }

    fn configure_for_track(&self, output: &mut MusicOutput, music: &mut MusicState) -> AudioResult<()> {
        let mode = music.mode;
        let config = PortConfig::new(self.config.nsamples(mode), self.config.output_rate, mode);

        // Open lazily, then only reconfigure when the layout changes
        if output.port.is_none() {
            let port = self.ports.open(AudioSourceType::Music, config)?;
            tracing::debug!("Opened music port ({}, {} Hz)", mode, config.rate);
            output.port = Some(port);
            output.configured = Some(config);
        } else if output.configured != Some(config) {
            if let Some(port) = output.port.as_mut() {
                port.configure(config)?;
            }
            tracing::debug!("Reconfigured music port ({}, {} Hz)", mode, config.rate);
            output.configured = Some(config);
        }

        if let Some(port) = output.port.as_mut() {
            let volume = VolumeEffect::new(music.volume).to_hardware(self.config.hardware_volume_max);
            port.set_volume(volume, volume)?;
            output.applied_volume = music.volume;
        }

        music.is_new_track = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::decoder::{DecoderFormat, SampleFormat};
    use crate::audio_system::source::SourceStream;

    struct StubDecoder;

    impl Decoder for StubDecoder {
        fn open(&mut self, _stream: SourceStream) -> AudioResult<()> {
            Ok(())
        }
        fn decode(&mut self, buffer: &mut [u8]) -> usize {
            buffer.len()
        }
        fn set_format(&mut self, _rate: u32, _format: SampleFormat, _channels: u16) -> bool {
            true
        }
        fn format(&self) -> DecoderFormat {
            DecoderFormat {
                rate: 48_000,
                sample_format: SampleFormat::S16,
                channels: 2,
            }
        }
        fn set_looping(&mut self, _looping: bool) {}
        fn set_pitch(&mut self, _pitch: i32) {}
        fn set_volume(&mut self, _volume: i32) {}
        fn volume(&self) -> i32 {
            100
        }
        fn set_fade(&mut self, _from: i32, _to: i32, _duration_ms: u64) {}
        fn loop_count(&self) -> u32 {
            0
        }
        fn is_finished(&self) -> bool {
            false
        }
        fn ticks(&self) -> u64 {
            0
        }
        fn update(&mut self, _delta_ms: u64) {}
    }

    fn track() -> MusicState {
        MusicState::new(
            Box::new(StubDecoder),
            Path::new("bgm/field.ogg"),
            PortMode::Stereo,
            64,
            80,
            1,
        )
    }

    #[test]
    fn test_status_transitions() {
        let mut music = track();
        assert_eq!(music.status(), MusicStatus::Loading);

        music.is_new_track = false;
        assert_eq!(music.status(), MusicStatus::Playing);

        music.is_playing = false;
        music.is_paused = true;
        assert_eq!(music.status(), MusicStatus::Paused);

        music.is_paused = false;
        assert_eq!(music.status(), MusicStatus::Stopped);
    }

    #[test]
    fn test_with_track_without_music() {
        let shared = MusicShared::new();
        assert_eq!(shared.with_track(|m| m.volume), None);

        *shared.state.lock() = Some(track());
        assert_eq!(shared.with_track(|m| m.volume), Some(80));
        assert!(shared.with_track(|m| m.is_stereo()).unwrap());
    }

    #[test]
    fn test_request_shutdown_sets_flag() {
        let shared = MusicShared::new();
        shared.request_shutdown();
        assert!(shared.shutdown.load(Ordering::SeqCst));
    }
}
