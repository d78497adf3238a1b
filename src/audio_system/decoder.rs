/// Decoder collaborator interface
///
/// The engine never decodes anything itself. It asks a `DecoderFactory` to
/// recognize a source, then drives the returned `Decoder` one buffer at a time.
use std::path::Path;

use crate::error::AudioResult;

use super::source::SourceStream;

/// PCM sample encoding produced by a decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    S8,
    U8,
    S16,
    U16,
    S32,
    F32,
}

/// Output format reported by a decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderFormat {
    pub rate: u32,
    pub sample_format: SampleFormat,
    pub channels: u16,
}

/// Streaming decoder for one source
///
/// Volume is on a 0..=100 scale. The decoder tracks it (including fades) but
/// does not apply it to the samples; the engine applies it on the port.
pub trait Decoder: Send {
    /// Prepare decoding of `stream`
    fn open(&mut self, stream: SourceStream) -> AudioResult<()>;

    /// Fill `buffer` with PCM in the current output format, padding with
    /// silence past the end of stream. Returns the bytes of real audio written.
    fn decode(&mut self, buffer: &mut [u8]) -> usize;

    /// Request an output format; returns false when the decoder cannot
    /// produce exactly that format
    fn set_format(&mut self, rate: u32, sample_format: SampleFormat, channels: u16) -> bool;

    /// Format the decoder actually produces
    fn format(&self) -> DecoderFormat;

    fn set_looping(&mut self, looping: bool);

    /// Playback speed in percent, 100 is normal
    fn set_pitch(&mut self, pitch: i32);

    /// Set volume, cancelling any fade in progress
    fn set_volume(&mut self, volume: i32);

    fn volume(&self) -> i32;

    /// Interpolate volume from `from` to `to` over `duration_ms` of `update` time
    fn set_fade(&mut self, from: i32, to: i32, duration_ms: u64);

    /// Number of times the stream wrapped around to its start
    fn loop_count(&self) -> u32;

    /// True once a non-looping stream has been fully decoded
    fn is_finished(&self) -> bool;

    /// Current playback position in milliseconds
    fn ticks(&self) -> u64;

    /// Advance the decoder time base (fades) by `delta_ms`
    fn update(&mut self, delta_ms: u64);
}

/// Recognizes sources and builds decoders for them
pub trait DecoderFactory: Send + Sync {
    /// Returns `None` when no decoder recognizes the stream. The stream
    /// position is left at the start.
    fn create(&self, stream: &mut SourceStream, path: &Path) -> Option<Box<dyn Decoder>>;
}
