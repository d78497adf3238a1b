/// Event types for the audio engine
///
/// Events represent things that have happened (past tense).
/// They are broadcast to all subscribers.
use std::path::PathBuf;

use crate::audio_system::sfx::SlotState;

/// Engine events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A music track was installed and is about to stream
    MusicStarted { path: PathBuf },

    /// The music decoder wrapped around to the start of the track
    MusicLooped { loop_count: u32 },

    /// The music port rejected a buffer; music output is halted for good
    MusicHardwareFailure { message: String },

    /// A sound effect slot changed state
    SlotTransition {
        slot: usize,
        from: SlotState,
        to: SlotState,
    },

    /// A sound effect request was dropped
    SoundEffectDropped { path: PathBuf, reason: DropReason },

    /// A sound effect port rejected a buffer; the slot was released
    SoundEffectOutputFailed { slot: usize, message: String },

    /// A worker thread left its loop
    WorkerExited { worker: WorkerKind },
}

/// Why a playback request was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Every channel is busy or no worker can serve it
    NoFreeChannel,

    /// No decoder recognizes the source
    UnsupportedFormat,

    /// The source could not be opened or read
    Io,

    /// Music output was halted by a hardware failure
    HardwareHalted,
}

/// Identity of a worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    Music,
    SoundEffect(usize),
}
