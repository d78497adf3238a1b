/// Rodio output ports
///
/// Default desktop backend. Each port owns its own output stream and sink,
/// so every worker plays independently of the others.
use std::thread;
use std::time::{Duration, Instant};

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};

use crate::error::{AudioError, AudioResult};

use super::port::{OutputPort, PortConfig, PortProvider};
use super::source::AudioSourceType;

/// How long `output` sleeps between queue checks
const PACING_INTERVAL: Duration = Duration::from_millis(1);

/// Shortest time `output` waits for the queue to drain
const MIN_DRAIN_WAIT: Duration = Duration::from_millis(250);

/// How long the queued buffer may take to play before the device is
/// considered stalled: four buffer periods, never less than `MIN_DRAIN_WAIT`
fn drain_deadline(config: PortConfig) -> Duration {
    if config.rate == 0 {
        return MIN_DRAIN_WAIT;
    }
    let period = Duration::from_micros(config.samples as u64 * 1_000_000 / config.rate as u64);
    (period * 4).max(MIN_DRAIN_WAIT)
}

/// Opens `RodioPort`s on the default output device
#[derive(Debug, Clone, Copy)]
pub struct RodioPortProvider {
    volume_max: i32,
}

impl RodioPortProvider {
    pub fn new() -> Self {
        Self { volume_max: 32768 }
    }

    /// Hardware volume that maps to unity gain
    pub fn with_volume_max(mut self, volume_max: i32) -> Self {
        self.volume_max = volume_max.max(1);
        self
    }
}

impl Default for RodioPortProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PortProvider for RodioPortProvider {
    fn open(&self, kind: AudioSourceType, config: PortConfig) -> AudioResult<Box<dyn OutputPort>> {
        let port = RodioPort::new(config, self.volume_max)?;
        tracing::debug!(
            "Opened {} port: {} samples, {} Hz, {}",
            kind,
            config.samples,
            config.rate,
            config.mode
        );
        Ok(Box::new(port))
    }
}

/// One output port backed by a rodio sink
pub struct RodioPort {
    _stream: OutputStream,
    _stream_handle: OutputStreamHandle,
    sink: Sink,
    config: PortConfig,
    volume_max: i32,
}

impl RodioPort {
    fn new(config: PortConfig, volume_max: i32) -> AudioResult<Self> {
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| AudioError::ResourceUnavailable(format!("audio output: {}", e)))?;
        let sink = Sink::try_new(&stream_handle)
            .map_err(|e| AudioError::ResourceUnavailable(format!("audio sink: {}", e)))?;

        Ok(Self {
            _stream: stream,
            _stream_handle: stream_handle,
            sink,
            config,
            volume_max,
        })
    }
}

impl OutputPort for RodioPort {
    fn configure(&mut self, config: PortConfig) -> AudioResult<()> {
        if config.samples == 0 || config.rate == 0 {
            return Err(AudioError::HardwareFailure(format!(
                "invalid port configuration: {} samples at {} Hz",
                config.samples, config.rate
            )));
        }
        self.config = config;
        Ok(())
    }

    fn set_volume(&mut self, left: i32, right: i32) -> AudioResult<()> {
        // The sink has a single gain; both sub-channels always match
        let level = left.max(right).clamp(0, self.volume_max);
        self.sink.set_volume(level as f32 / self.volume_max as f32);
        Ok(())
    }

    fn output(&mut self, pcm: &[u8]) -> AudioResult<()> {
        let expected = self.config.buffer_bytes();
        if pcm.len() != expected {
            return Err(AudioError::HardwareFailure(format!(
                "buffer of {} bytes, port expects {}",
                pcm.len(),
                expected
            )));
        }

        let samples: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let channels = self.config.mode.channels() as u16;
        self.sink
            .append(SamplesBuffer::new(channels, self.config.rate, samples));

        // Keep at most one buffer queued behind the one playing
        let deadline = Instant::now() + drain_deadline(self.config);
        while self.sink.len() > 1 {
            if Instant::now() >= deadline {
                self.sink.clear();
                return Err(AudioError::HardwareFailure(
                    "output stalled, queued audio is not draining".to_string(),
                ));
            }
            thread::sleep(PACING_INTERVAL);
        }
        Ok(())
    }
}

impl Drop for RodioPort {
    fn drop(&mut self) {
        self.sink.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::port::PortMode;

    // Opening a real port needs an audio device, so only the provider is
    // covered here

    #[test]
    fn test_provider_volume_max() {
        let provider = RodioPortProvider::new();
        assert_eq!(provider.volume_max, 32768);

        let provider = RodioPortProvider::new().with_volume_max(0);
        assert_eq!(provider.volume_max, 1);
    }

    #[test]
    fn test_drain_deadline_scales_with_buffer_period() {
        // 4800 frames at 48 kHz is a 100 ms buffer
        let long = PortConfig::new(4800, 48_000, PortMode::Stereo);
        assert_eq!(drain_deadline(long), Duration::from_millis(400));

        let short = PortConfig::new(256, 48_000, PortMode::Mono);
        assert_eq!(drain_deadline(short), MIN_DRAIN_WAIT);

        let broken = PortConfig::new(256, 0, PortMode::Stereo);
        assert_eq!(drain_deadline(broken), MIN_DRAIN_WAIT);
    }
}
