//! Multi-channel audio engine for tile-based RPG players
//!
//! One background music track streamed on its own thread, plus a pool of
//! sound effect workers that play short clips concurrently. Decoders, file
//! access, the tick clock and the hardware ports are all pluggable.

pub mod audio_system;
pub mod config;
pub mod error;
pub mod messaging;

pub use audio_system::{AudioEngine, EngineBuilder, MusicStatus, SlotState};
pub use config::EngineConfig;
pub use error::{AudioError, AudioResult, ConfigError};
pub use messaging::{EngineEvent, EventBus};
