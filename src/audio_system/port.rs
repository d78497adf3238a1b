/// Hardware output ports
///
/// A port is one hardware output endpoint. Each worker thread opens its own
/// port, configures it for the current layout and pushes fixed-size PCM
/// buffers through it. `output` blocks until the hardware can take the next
/// buffer, which is what paces every worker loop. Dropping a port releases it.
use std::fmt;

use crate::error::AudioResult;

use super::source::AudioSourceType;

/// Channel layout of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortMode {
    Mono,
    Stereo,
}

impl PortMode {
    /// Layout for a decoded channel count
    pub fn from_channels(channels: u16) -> Self {
        if channels >= 2 {
            PortMode::Stereo
        } else {
            PortMode::Mono
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            PortMode::Mono => 1,
            PortMode::Stereo => 2,
        }
    }
}

impl fmt::Display for PortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortMode::Mono => write!(f, "mono"),
            PortMode::Stereo => write!(f, "stereo"),
        }
    }
}

/// Port configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// Samples per channel in one output buffer
    pub samples: usize,

    /// Output rate in Hz
    pub rate: u32,

    pub mode: PortMode,
}

impl PortConfig {
    pub fn new(samples: usize, rate: u32, mode: PortMode) -> Self {
        Self {
            samples,
            rate,
            mode,
        }
    }

    /// Bytes of interleaved S16 PCM one output call consumes
    pub fn buffer_bytes(&self) -> usize {
        self.samples * self.mode.channels() * 2
    }
}

/// An open hardware output endpoint
pub trait OutputPort {
    /// Change sample count, rate and layout
    fn configure(&mut self, config: PortConfig) -> AudioResult<()>;

    /// Set the hardware volume of both sub-channels
    fn set_volume(&mut self, left: i32, right: i32) -> AudioResult<()>;

    /// Submit one buffer of interleaved S16 PCM, blocking until the hardware
    /// is ready for the next one
    fn output(&mut self, pcm: &[u8]) -> AudioResult<()>;
}

/// Opens output ports
///
/// Shared between threads, but every port it returns stays on the thread
/// that opened it.
pub trait PortProvider: Send + Sync {
    fn open(&self, kind: AudioSourceType, config: PortConfig) -> AudioResult<Box<dyn OutputPort>>;
}
