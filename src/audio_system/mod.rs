/// Audio system module
///
/// Concurrent playback of one streamed music track and a fixed number of
/// short sound effects:
/// - One BGM streamer thread decoding and outputting the current track
/// - One SFX worker per channel, each with its own output port
/// - Non-blocking control calls from the host's main loop
///
/// ## Architecture
///
/// ```text
/// AudioEngine
///   ├── MusicShared (BGM lock + condvar) ──> bgm-stream     ──> port
///   └── SfxShared   (id-lock + slots)    ──> sfx-worker-0   ──> port
///                                          ├── sfx-worker-1 ──> port
///                                          └── ...
///
/// Slot walk: Idle -> Pending -> Playing -> Idle
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// use rpg_audio_engine::{AudioEngine, EngineConfig};
///
/// let engine = AudioEngine::new(EngineConfig::default())?;
///
/// // Looping music with a 1.5 s fade in
/// engine.play_music("Music/field.ogg", 80, 100, 1500);
///
/// // Fire-and-forget effect; dropped if every channel is busy
/// engine.play_sound_effect("Sound/cursor.wav", 100, 100);
///
/// // Once per frame
/// engine.update_from_clock();
/// ```
pub mod buffer;
pub mod clock;
pub mod codec;
pub mod decoder;
pub mod effects;
pub mod engine;
pub mod music;
pub mod output;
pub mod port;
pub mod sfx;
pub mod source;

// Re-export commonly used types
pub use buffer::PingPongBuffer;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Container, SymphoniaDecoder, SymphoniaDecoderFactory};
pub use decoder::{Decoder, DecoderFactory, DecoderFormat, SampleFormat};
pub use effects::{FadeEffect, VolumeEffect};
pub use engine::{AudioEngine, EngineBuilder};
pub use music::{MusicState, MusicStatus};
pub use output::{RodioPort, RodioPortProvider};
pub use port::{OutputPort, PortConfig, PortMode, PortProvider};
pub use sfx::{SfxPayload, SlotState, SlotTable};
pub use source::{AudioSourceType, FileService, FsFileService, ReadSeek, SourceStream};
