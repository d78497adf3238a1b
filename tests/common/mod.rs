// Shared fakes for engine integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use rpg_audio_engine::audio_system::{
    AudioSourceType, Decoder, DecoderFactory, DecoderFormat, FadeEffect, FileService, ManualClock,
    OutputPort, PortConfig, PortProvider, SampleFormat, SourceStream,
};
use rpg_audio_engine::{AudioEngine, AudioError, AudioResult, EngineConfig, EngineEvent};

/// Small buffers keep the workers cycling quickly
pub const BUFFER_SIZE: usize = 256;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// How a fake source decodes
#[derive(Debug, Clone, Copy)]
pub struct Track {
    /// Bytes of audio in one pass; `None` never ends
    pub bytes: Option<usize>,
    pub channels: u16,
    pub rate: u32,
}

impl Track {
    pub fn endless() -> Self {
        Self {
            bytes: None,
            channels: 2,
            rate: 48_000,
        }
    }

    /// A track lasting `buffers` full output buffers
    pub fn buffers(buffers: usize) -> Self {
        Self {
            bytes: Some(buffers * BUFFER_SIZE),
            channels: 2,
            rate: 48_000,
        }
    }
}

/// In-memory file service
#[derive(Default)]
pub struct MemoryFiles {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryFiles {
    pub fn insert(&self, path: &str, bytes: &[u8]) {
        self.files.lock().insert(PathBuf::from(path), bytes.to_vec());
    }
}

impl FileService for MemoryFiles {
    fn open(&self, path: &Path) -> io::Result<SourceStream> {
        match self.files.lock().get(path) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }
}

/// Decoder factory recognizing registered paths
#[derive(Default)]
pub struct ScriptedDecoders {
    tracks: Mutex<HashMap<PathBuf, Track>>,
    pub live: Arc<AtomicUsize>,
    pub created: AtomicUsize,
    /// Every pitch handed to any decoder, in order
    pub pitches: Arc<Mutex<Vec<i32>>>,
    /// Decode calls per source path
    pub decodes: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl ScriptedDecoders {
    pub fn insert(&self, path: &str, track: Track) {
        self.tracks.lock().insert(PathBuf::from(path), track);
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn last_pitch(&self) -> Option<i32> {
        self.pitches.lock().last().copied()
    }

    pub fn decodes(&self, path: &str) -> usize {
        self.decodes.lock().get(Path::new(path)).copied().unwrap_or(0)
    }
}

impl DecoderFactory for ScriptedDecoders {
    fn create(&self, _stream: &mut SourceStream, path: &Path) -> Option<Box<dyn Decoder>> {
        let track = *self.tracks.lock().get(path)?;
        self.live.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(ScriptedDecoder {
            track,
            path: path.to_path_buf(),
            live: Arc::clone(&self.live),
            pitches: Arc::clone(&self.pitches),
            decodes: Arc::clone(&self.decodes),
            position: 0,
            looping: false,
            loop_count: 0,
            finished: false,
            volume: 100,
            fade: None,
        }))
    }
}

pub struct ScriptedDecoder {
    track: Track,
    path: PathBuf,
    live: Arc<AtomicUsize>,
    pitches: Arc<Mutex<Vec<i32>>>,
    decodes: Arc<Mutex<HashMap<PathBuf, usize>>>,
    position: usize,
    looping: bool,
    loop_count: u32,
    finished: bool,
    volume: i32,
    fade: Option<FadeEffect>,
}

impl Decoder for ScriptedDecoder {
    fn open(&mut self, _stream: SourceStream) -> AudioResult<()> {
        Ok(())
    }

    fn decode(&mut self, buffer: &mut [u8]) -> usize {
        *self.decodes.lock().entry(self.path.clone()).or_default() += 1;

        let Some(total) = self.track.bytes else {
            buffer.fill(0x11);
            self.position += buffer.len();
            return buffer.len();
        };

        let mut written = 0;
        while written < buffer.len() && !self.finished {
            let n = (total - self.position).min(buffer.len() - written);
            buffer[written..written + n].fill(0x11);
            written += n;
            self.position += n;
            if self.position >= total {
                if self.looping {
                    self.position = 0;
                    self.loop_count += 1;
                } else {
                    self.finished = true;
                }
            }
        }
        buffer[written..].fill(0);
        written
    }

    fn set_format(&mut self, rate: u32, sample_format: SampleFormat, channels: u16) -> bool {
        rate == self.track.rate && sample_format == SampleFormat::S16 && channels == self.track.channels
    }

    fn format(&self) -> DecoderFormat {
        DecoderFormat {
            rate: self.track.rate,
            sample_format: SampleFormat::S16,
            channels: self.track.channels,
        }
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn set_pitch(&mut self, pitch: i32) {
        self.pitches.lock().push(pitch);
    }

    fn set_volume(&mut self, volume: i32) {
        self.fade = None;
        self.volume = volume;
    }

    fn volume(&self) -> i32 {
        self.fade.map_or(self.volume, |fade| fade.current())
    }

    fn set_fade(&mut self, from: i32, to: i32, duration_ms: u64) {
        self.volume = to;
        self.fade = Some(FadeEffect::new(from, to, duration_ms));
    }

    fn loop_count(&self) -> u32 {
        self.loop_count
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn ticks(&self) -> u64 {
        let frame_bytes = self.track.channels as usize * 2;
        (self.position / frame_bytes) as u64 * 1000 / self.track.rate as u64
    }

    fn update(&mut self, delta_ms: u64) {
        if let Some(fade) = self.fade.as_mut() {
            fade.advance(delta_ms);
        }
    }
}

impl Drop for ScriptedDecoder {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What the fake hardware saw
#[derive(Default)]
pub struct PortStats {
    pub music_opens: AtomicUsize,
    pub sfx_opens: AtomicUsize,
    pub live: AtomicUsize,
    pub music_outputs: AtomicUsize,
    pub sfx_outputs: AtomicUsize,
    pub music_configures: AtomicUsize,
    pub sfx_configures: AtomicUsize,
    pub music_volumes: Mutex<Vec<(i32, i32)>>,
    pub fail_music: AtomicBool,
    pub fail_sfx: AtomicBool,
    pub refuse_sfx_open: AtomicBool,
    /// Refuse this many SFX port opens, then open normally
    pub refuse_sfx_opens: AtomicUsize,
}

impl PortStats {
    pub fn music_outputs(&self) -> usize {
        self.music_outputs.load(Ordering::SeqCst)
    }

    pub fn sfx_outputs(&self) -> usize {
        self.sfx_outputs.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Port provider counting everything it is asked to do
#[derive(Default)]
pub struct CountingPorts {
    pub stats: Arc<PortStats>,
}

impl PortProvider for CountingPorts {
    fn open(&self, kind: AudioSourceType, config: PortConfig) -> AudioResult<Box<dyn OutputPort>> {
        match kind {
            AudioSourceType::Music => {
                self.stats.music_opens.fetch_add(1, Ordering::SeqCst);
            }
            AudioSourceType::SoundEffect => {
                let refused = self
                    .stats
                    .refuse_sfx_opens
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if refused || self.stats.refuse_sfx_open.load(Ordering::SeqCst) {
                    return Err(AudioError::ResourceUnavailable("no free port".to_string()));
                }
                self.stats.sfx_opens.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.stats.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingPort {
            kind,
            config,
            stats: Arc::clone(&self.stats),
        }))
    }
}

pub struct CountingPort {
    kind: AudioSourceType,
    config: PortConfig,
    stats: Arc<PortStats>,
}

impl OutputPort for CountingPort {
    fn configure(&mut self, config: PortConfig) -> AudioResult<()> {
        self.config = config;
        match self.kind {
            AudioSourceType::Music => self.stats.music_configures.fetch_add(1, Ordering::SeqCst),
            AudioSourceType::SoundEffect => self.stats.sfx_configures.fetch_add(1, Ordering::SeqCst),
        };
        Ok(())
    }

    fn set_volume(&mut self, left: i32, right: i32) -> AudioResult<()> {
        if self.kind == AudioSourceType::Music {
            self.stats.music_volumes.lock().push((left, right));
        }
        Ok(())
    }

    fn output(&mut self, pcm: &[u8]) -> AudioResult<()> {
        assert_eq!(pcm.len(), self.config.buffer_bytes());
        let (fail, outputs) = match self.kind {
            AudioSourceType::Music => (&self.stats.fail_music, &self.stats.music_outputs),
            AudioSourceType::SoundEffect => (&self.stats.fail_sfx, &self.stats.sfx_outputs),
        };
        if fail.load(Ordering::SeqCst) {
            return Err(AudioError::HardwareFailure("port rejected buffer".to_string()));
        }
        outputs.fetch_add(1, Ordering::SeqCst);

        // Stand-in for the hardware pacing
        thread::sleep(Duration::from_millis(1));
        Ok(())
    }
}

impl Drop for CountingPort {
    fn drop(&mut self) {
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An engine wired to fakes
pub struct Harness {
    pub engine: AudioEngine,
    pub files: Arc<MemoryFiles>,
    pub decoders: Arc<ScriptedDecoders>,
    pub stats: Arc<PortStats>,
    pub clock: Arc<ManualClock>,
    pub events: Receiver<EngineEvent>,
}

impl Harness {
    pub fn new(channels: usize) -> Self {
        Self::with_setup(channels, |_| {})
    }

    /// Build with a hook to adjust the fake hardware before threads start
    pub fn with_setup(channels: usize, setup: impl FnOnce(&PortStats)) -> Self {
        let config = EngineConfig {
            channel_count: channels,
            buffer_size: BUFFER_SIZE,
            ..EngineConfig::default()
        };

        let files = Arc::new(MemoryFiles::default());
        let decoders = Arc::new(ScriptedDecoders::default());
        let ports = CountingPorts::default();
        setup(&ports.stats);
        let stats = Arc::clone(&ports.stats);
        let clock = Arc::new(ManualClock::new(1));

        let events_bus = rpg_audio_engine::EventBus::new();
        let (events, _id) = events_bus.subscribe();

        let engine = AudioEngine::builder(config)
            .with_file_service(files.clone())
            .with_decoders(decoders.clone())
            .with_clock(clock.clone())
            .with_ports(Arc::new(ports))
            .with_event_bus(events_bus)
            .build()
            .expect("engine should start");

        Self {
            engine,
            files,
            decoders,
            stats,
            clock,
            events,
        }
    }

    /// Register a source both as a file and as a decodable track
    pub fn add(&self, path: &str, track: Track) {
        self.files.insert(path, b"fake audio");
        self.decoders.insert(path, track);
    }

    /// Wait for an event matching `pred`, skipping others
    pub fn wait_event(&self, pred: impl Fn(&EngineEvent) -> bool) -> Option<EngineEvent> {
        let deadline = Instant::now() + TIMEOUT;
        while let Some(left) = deadline.checked_duration_since(Instant::now()) {
            match self.events.recv_timeout(left) {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    }
}

/// Poll `cond` until it holds or the timeout passes
pub fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}
