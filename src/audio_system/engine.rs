/// Audio engine
///
/// Public controller for one music channel and a fixed set of sound effect
/// channels. Control calls only touch shared state under the BGM lock or the
/// SFX id-lock; the worker threads do all decoding and output.
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::EngineConfig;
use crate::error::{AudioError, AudioResult};
use crate::messaging::{DropReason, EngineEvent, EventBus, SubscriberId};

use super::clock::{Clock, SystemClock};
use super::codec::SymphoniaDecoderFactory;
use super::decoder::{Decoder, DecoderFactory, SampleFormat};
use super::music::{BgmStreamer, MusicShared, MusicState, MusicStatus};
use super::output::RodioPortProvider;
use super::port::{PortMode, PortProvider};
use super::sfx::{SfxPayload, SfxShared, SfxWorker, SlotState};
use super::source::{AudioSourceType, FileService, FsFileService};

/// Builder wiring collaborators into an `AudioEngine`
pub struct EngineBuilder {
    config: EngineConfig,
    files: Option<Arc<dyn FileService>>,
    decoders: Option<Arc<dyn DecoderFactory>>,
    clock: Option<Arc<dyn Clock>>,
    ports: Option<Arc<dyn PortProvider>>,
    events: EventBus,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            files: None,
            decoders: None,
            clock: None,
            ports: None,
            events: EventBus::new(),
        }
    }

    /// Set the file service (default: local filesystem)
    pub fn with_file_service(mut self, files: Arc<dyn FileService>) -> Self {
        self.files = Some(files);
        self
    }

    /// Set the decoder factory (default: symphonia)
    pub fn with_decoders(mut self, decoders: Arc<dyn DecoderFactory>) -> Self {
        self.decoders = Some(decoders);
        self
    }

    /// Set the tick source (default: system clock)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the port provider (default: rodio)
    pub fn with_ports(mut self, ports: Arc<dyn PortProvider>) -> Self {
        self.ports = Some(ports);
        self
    }

    /// Publish on an existing event bus
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Start the worker threads
    pub fn build(self) -> AudioResult<AudioEngine> {
        self.config
            .validate()
            .map_err(|e| AudioError::InvalidFormat(e.to_string()))?;

        let files = self
            .files
            .unwrap_or_else(|| Arc::new(FsFileService::new()));
        let decoders = self
            .decoders
            .unwrap_or_else(|| Arc::new(SymphoniaDecoderFactory::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let volume_max = self.config.hardware_volume_max;
        let ports = self
            .ports
            .unwrap_or_else(|| Arc::new(RodioPortProvider::new().with_volume_max(volume_max)));

        AudioEngine::start(self.config, files, decoders, clock, ports, self.events)
    }
}

/// The audio engine
pub struct AudioEngine {
    config: EngineConfig,
    files: Arc<dyn FileService>,
    decoders: Arc<dyn DecoderFactory>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    music: Arc<MusicShared>,
    sfx: Arc<SfxShared>,
    work_tx: Sender<()>,
    shutdown_tx: Option<Sender<()>>,
    music_worker: Option<JoinHandle<()>>,
    sfx_workers: Vec<JoinHandle<()>>,
}

impl AudioEngine {
    /// Engine with the default collaborators
    pub fn new(config: EngineConfig) -> AudioResult<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    fn start(
        config: EngineConfig,
        files: Arc<dyn FileService>,
        decoders: Arc<dyn DecoderFactory>,
        clock: Arc<dyn Clock>,
        ports: Arc<dyn PortProvider>,
        events: EventBus,
    ) -> AudioResult<Self> {
        let (work_tx, work_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = unbounded();

        let mut engine = Self {
            music: Arc::new(MusicShared::new()),
            sfx: Arc::new(SfxShared::new(config.channel_count, events.clone())),
            config,
            files,
            decoders,
            clock,
            events,
            work_tx,
            shutdown_tx: Some(shutdown_tx),
            music_worker: None,
            sfx_workers: Vec::new(),
        };

        // On any spawn failure the partially started engine is torn down by Drop
        let streamer = BgmStreamer {
            shared: Arc::clone(&engine.music),
            ports: Arc::clone(&ports),
            events: engine.events.clone(),
            config: engine.config.clone(),
        };
        engine.music_worker = Some(streamer.spawn().map_err(|e| {
            AudioError::ResourceUnavailable(format!("Failed to init audio thread: {}", e))
        })?);

        for index in 0..engine.config.channel_count {
            let worker = SfxWorker {
                index,
                shared: Arc::clone(&engine.sfx),
                ports: Arc::clone(&ports),
                events: engine.events.clone(),
                config: engine.config.clone(),
                work_rx: work_rx.clone(),
                shutdown_rx: shutdown_rx.clone(),
            };
            match worker.spawn() {
                Ok(handle) => engine.sfx_workers.push(handle),
                Err(e) => {
                    // Workers that never ran still count as live in the table
                    let missing = engine.config.channel_count - engine.sfx_workers.len();
                    let mut slots = engine.sfx.slots.lock();
                    for _ in 0..missing {
                        slots.worker_exited();
                    }
                    drop(slots);
                    return Err(AudioError::ResourceUnavailable(format!(
                        "Failed to init audio thread: {}",
                        e
                    )));
                }
            }
        }

        tracing::info!(
            "Audio engine started: {} SE channels, {} Hz, {} byte buffers",
            engine.config.channel_count,
            engine.config.output_rate,
            engine.config.buffer_size
        );
        Ok(engine)
    }

    /// Play a music track, replacing the current one. Failures are logged
    /// and leave music stopped.
    pub fn play_music(&self, path: impl AsRef<Path>, volume: i32, pitch: i32, fade_in_ms: u64) {
        let path = path.as_ref();
        if let Err(e) = self.try_play_music(path, volume, pitch, fade_in_ms) {
            tracing::warn!("Couldn't play music {}: {}", path.display(), e);
        }
    }

    /// `play_music` that reports why it failed
    pub fn try_play_music(
        &self,
        path: impl AsRef<Path>,
        volume: i32,
        pitch: i32,
        fade_in_ms: u64,
    ) -> AudioResult<()> {
        let path = path.as_ref();
        if self.music.shutdown.load(Ordering::SeqCst) {
            return Err(AudioError::ResourceUnavailable("engine is shut down".to_string()));
        }
        if self.music.halted.load(Ordering::SeqCst) {
            return Err(AudioError::HardwareFailure("music output is halted".to_string()));
        }

        // Stop and release the current track before touching the new one
        let previous = self.music.state.lock().take();
        if let Some(previous) = previous {
            tracing::debug!("Released music {}", previous.path().display());
        }

        let volume = volume.clamp(0, 100);
        let mut decoder = self.open_decoder(path, AudioSourceType::Music)?;
        decoder.set_fade(0, volume, fade_in_ms);
        decoder.set_pitch(pitch);
        let mode = PortMode::from_channels(decoder.format().channels);

        let track = MusicState::new(
            decoder,
            path,
            mode,
            self.config.buffer_size,
            volume,
            self.clock.ticks(),
        );

        let mut state = self.music.state.lock();
        *state = Some(track);
        self.music.wake.notify_one();
        drop(state);

        tracing::info!("Playing music: {} ({})", path.display(), mode);
        self.events.publish(EngineEvent::MusicStarted {
            path: path.to_path_buf(),
        });
        Ok(())
    }

    pub fn pause_music(&self) {
        self.music.with_track(|music| {
            if music.is_playing {
                music.is_playing = false;
                music.is_paused = true;
            }
        });
    }

    pub fn resume_music(&self) {
        self.music.with_track(|music| {
            if !music.is_playing {
                music.is_playing = true;
                music.is_paused = false;
            }
        });
    }

    /// Stop music output. No buffer is submitted after this returns.
    pub fn stop_music(&self) {
        self.music.with_track(|music| {
            music.is_playing = false;
            music.is_paused = false;
        });
    }

    pub fn set_music_volume(&self, volume: i32) {
        self.music.with_track(|music| {
            music.decoder.set_volume(volume.clamp(0, 100));
        });
    }

    pub fn set_music_pitch(&self, pitch: i32) {
        self.music.with_track(|music| music.decoder.set_pitch(pitch));
    }

    /// Fade the music to silence over `duration_ms`, timed from now
    pub fn fade_music_out(&self, duration_ms: u64) {
        let now = self.clock.ticks();
        self.music.with_track(|music| {
            let current = music.decoder.volume();
            music.decoder.set_fade(current, 0, duration_ms);
            music.tick = now;
        });
    }

    pub fn is_music_playing(&self) -> bool {
        self.music
            .state
            .lock()
            .as_ref()
            .map_or(false, |music| music.is_playing)
    }

    /// True once the current track has looped at least once
    pub fn music_played_once(&self) -> bool {
        self.music
            .state
            .lock()
            .as_ref()
            .map_or(false, |music| music.ended_once)
    }

    /// Playback position of the current track in milliseconds
    pub fn music_elapsed_ticks(&self) -> u64 {
        self.music
            .state
            .lock()
            .as_ref()
            .map_or(0, |music| music.decoder.ticks())
    }

    pub fn music_status(&self) -> MusicStatus {
        self.music
            .state
            .lock()
            .as_ref()
            .map_or(MusicStatus::Stopped, |music| music.status())
    }

    /// Whether music output was halted by a hardware failure
    pub fn is_music_halted(&self) -> bool {
        self.music.halted.load(Ordering::SeqCst)
    }

    /// Play a sound effect on a free channel. Dropped with a warning when
    /// every channel is busy; never blocks or queues.
    pub fn play_sound_effect(&self, path: impl AsRef<Path>, volume: i32, pitch: i32) {
        let path = path.as_ref();
        if let Err(e) = self.try_play_sound_effect(path, volume, pitch) {
            tracing::warn!("SE {} dropped: {}", path.display(), e);
            self.events.publish(EngineEvent::SoundEffectDropped {
                path: path.to_path_buf(),
                reason: drop_reason(&e),
            });
        }
    }

    /// `play_sound_effect` that reports the slot or why it was dropped
    pub fn try_play_sound_effect(
        &self,
        path: impl AsRef<Path>,
        volume: i32,
        pitch: i32,
    ) -> AudioResult<usize> {
        let path = path.as_ref();

        // Cheap check first so a full table costs no file open
        if !self.sfx.slots.lock().can_allocate() {
            return Err(AudioError::ResourceUnavailable(
                "No free channels available".to_string(),
            ));
        }

        let mut decoder = self.open_decoder(path, AudioSourceType::SoundEffect)?;
        decoder.set_pitch(pitch);
        decoder.set_volume(volume.clamp(0, 100));
        let mode = PortMode::from_channels(decoder.format().channels);

        let payload = SfxPayload::new(decoder, mode, self.config.buffer_size, path);
        let slot = self.sfx.allocate(payload).map_err(|_| {
            AudioError::ResourceUnavailable("No free channels available".to_string())
        })?;

        // Wake one worker for the new pending slot
        if self.work_tx.send(()).is_err() {
            tracing::debug!("No SFX worker listening for {}", path.display());
        }
        Ok(slot)
    }

    /// Stop every sound effect that is playing or waiting for a worker.
    /// Playing effects end after the buffer already submitted.
    pub fn stop_all_sound_effects(&self) {
        self.sfx.stop_all();
    }

    /// Snapshot of every SFX slot
    pub fn slot_states(&self) -> Vec<SlotState> {
        self.sfx.slots.lock().states()
    }

    /// Number of slots currently owned by a worker
    pub fn active_sound_effects(&self) -> usize {
        self.sfx.slots.lock().count(SlotState::Playing)
    }

    /// Advance the music time base to `now_ticks`
    ///
    /// `now_ticks` must be read from the `Clock` the engine was built with;
    /// fades requested through the engine are timed on that clock. Use
    /// `update_from_clock` to do both in one call.
    pub fn update(&self, now_ticks: u64) {
        let mut state = self.music.state.lock();
        // Ticks older than the last update are ignored
        if let Some(music) = state.as_mut().filter(|music| now_ticks > music.tick) {
            music.decoder.update(now_ticks - music.tick);
            music.tick = now_ticks;
        }
    }

    /// `update` using the engine's own clock
    pub fn update_from_clock(&self) {
        self.update(self.clock.ticks());
    }

    pub fn subscribe(&self) -> (Receiver<EngineEvent>, SubscriberId) {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop everything and wait for every worker to exit. Ports are released
    /// by the workers before they exit. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.music_worker.is_none() && self.sfx_workers.is_empty() && self.shutdown_tx.is_none() {
            return;
        }

        self.stop_all_sound_effects();
        self.stop_music();

        self.music.request_shutdown();
        if let Some(handle) = self.music_worker.take() {
            if handle.join().is_err() {
                tracing::error!("BGM thread panicked");
            }
        }
        if let Some(track) = self.music.state.lock().take() {
            tracing::debug!("Released music {}", track.path().display());
        }

        // Disconnecting the shutdown channel wakes every waiting worker
        drop(self.shutdown_tx.take());
        for handle in self.sfx_workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("SFX thread panicked");
            }
        }

        tracing::info!("Audio engine stopped");
    }

    fn open_decoder(&self, path: &Path, kind: AudioSourceType) -> AudioResult<Box<dyn Decoder>> {
        let mut stream = self.files.open(path).map_err(|source| AudioError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut decoder = self
            .decoders
            .create(&mut stream, path)
            .ok_or_else(|| AudioError::UnsupportedFormat {
                path: path.display().to_string(),
            })?;
        decoder.open(stream)?;

        decoder.set_looping(kind.loops());
        decoder.set_format(self.config.output_rate, SampleFormat::S16, 2);
        let format = decoder.format();
        if format.rate != self.config.output_rate {
            match kind {
                AudioSourceType::Music => tracing::warn!(
                    "Cannot resample music file {} ({} Hz). Music will be distorted.",
                    path.display(),
                    format.rate
                ),
                AudioSourceType::SoundEffect => tracing::warn!(
                    "Cannot resample sound file {} ({} Hz). Sound will be distorted.",
                    path.display(),
                    format.rate
                ),
            }
        }

        Ok(decoder)
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn drop_reason(error: &AudioError) -> DropReason {
    match error {
        AudioError::UnsupportedFormat { .. } | AudioError::InvalidFormat(_) => {
            DropReason::UnsupportedFormat
        }
        AudioError::Io { .. } | AudioError::DecodeFailed(_) => DropReason::Io,
        AudioError::HardwareFailure(_) => DropReason::HardwareHalted,
        AudioError::ResourceUnavailable(_) => DropReason::NoFreeChannel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_reason_mapping() {
        let err = AudioError::ResourceUnavailable("full".to_string());
        assert_eq!(drop_reason(&err), DropReason::NoFreeChannel);

        let err = AudioError::UnsupportedFormat {
            path: "a.xyz".to_string(),
        };
        assert_eq!(drop_reason(&err), DropReason::UnsupportedFormat);

        let err = AudioError::Io {
            path: "a.wav".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(drop_reason(&err), DropReason::Io);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = EngineConfig {
            channel_count: 0,
            ..EngineConfig::default()
        };
        assert!(EngineBuilder::new(config).build().is_err());
    }
}
