use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Symphonia decoder backend
///
/// Decodes WAV, Ogg Vorbis, FLAC, MP3 and AAC/MP4 sources to interleaved
/// signed 16-bit PCM at the source's native rate.
use crate::error::{AudioError, AudioResult};

use super::decoder::{Decoder, DecoderFactory, DecoderFormat, SampleFormat};
use super::effects::FadeEffect;
use super::source::SourceStream;

/// Container formats recognized by their leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Wav,
    Ogg,
    Flac,
    Mp3,
    Mp4,
}

impl Container {
    /// Identify a container from the first bytes of a stream
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.len() >= 12 && &header[0..4] == b"RIFF" && &header[8..12] == b"WAVE" {
            Some(Container::Wav)
        } else if header.starts_with(b"OggS") {
            Some(Container::Ogg)
        } else if header.starts_with(b"fLaC") {
            Some(Container::Flac)
        } else if header.starts_with(b"ID3")
            || (header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0)
        {
            Some(Container::Mp3)
        } else if header.len() >= 8 && &header[4..8] == b"ftyp" {
            Some(Container::Mp4)
        } else {
            None
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Container::Wav => "wav",
            Container::Ogg => "ogg",
            Container::Flac => "flac",
            Container::Mp3 => "mp3",
            Container::Mp4 => "m4a",
        }
    }
}

/// Builds `SymphoniaDecoder`s for streams it recognizes
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoderFactory;

impl SymphoniaDecoderFactory {
    pub fn new() -> Self {
        Self
    }
}

impl DecoderFactory for SymphoniaDecoderFactory {
    fn create(&self, stream: &mut SourceStream, path: &Path) -> Option<Box<dyn Decoder>> {
        let header = read_header(stream).ok()?;
        let container = Container::sniff(&header)?;
        tracing::debug!("Detected {:?} source: {}", container, path.display());
        Some(Box::new(SymphoniaDecoder::new(container)))
    }
}

/// Read up to 12 bytes and rewind
fn read_header(stream: &mut SourceStream) -> io::Result<Vec<u8>> {
    let mut header = [0u8; 12];
    let mut filled = 0;
    while filled < header.len() {
        let n = stream.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    stream.seek(SeekFrom::Start(0))?;
    Ok(header[..filled].to_vec())
}

/// Adapts a `SourceStream` to symphonia's media source
struct StreamSource {
    inner: SourceStream,
    len: Option<u64>,
}

impl StreamSource {
    fn new(mut inner: SourceStream) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            len: Some(len),
        })
    }
}

impl Read for StreamSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for StreamSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl MediaSource for StreamSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

/// An opened track
struct Track {
    reader: Box<dyn FormatReader>,
    codec: Box<dyn CodecDecoder>,
    track_id: u32,
}

/// Streaming decoder over one symphonia track
pub struct SymphoniaDecoder {
    container: Container,
    track: Option<Track>,
    rate: u32,
    channels: u16,

    /// Decoded frames not yet emitted, interleaved in the output layout
    pending: Vec<i16>,
    /// Fractional read position into `pending`, in frames
    cursor: f64,
    /// Source frames consumed since the start of the current pass
    position: u64,
    emitted_since_wrap: bool,

    looping: bool,
    loop_count: u32,
    finished: bool,
    pitch: i32,
    volume: i32,
    fade: Option<FadeEffect>,
}

impl SymphoniaDecoder {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            track: None,
            rate: 0,
            channels: 2,
            pending: Vec::new(),
            cursor: 0.0,
            position: 0,
            emitted_since_wrap: false,
            looping: false,
            loop_count: 0,
            finished: false,
            pitch: 100,
            volume: 100,
            fade: None,
        }
    }

    fn pending_frames(&self) -> usize {
        self.pending.len() / self.channels as usize
    }

    /// Decode the next packet of the track into `pending`. Returns false at
    /// end of stream.
    fn next_block(&mut self) -> AudioResult<bool> {
        let Some(track) = self.track.as_mut() else {
            return Ok(false);
        };

        loop {
            let packet = match track.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(AudioError::DecodeFailed(Box::new(e))),
            };

            if packet.track_id() != track.track_id {
                continue;
            }

            match track.codec.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let native = spec.channels.count().max(1);
                    let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                    samples.copy_interleaved_ref(decoded);

                    self.pending.clear();
                    for frame in samples.samples().chunks(native) {
                        // Mono stays mono, anything wider keeps its first two
                        self.pending.push(frame[0]);
                        if self.channels == 2 {
                            self.pending.push(*frame.get(1).unwrap_or(&frame[0]));
                        }
                    }
                    return Ok(true);
                }
                Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => {
                    // Skip corrupt packets
                    continue;
                }
                Err(e) => return Err(AudioError::DecodeFailed(Box::new(e))),
            }
        }
    }

    /// Seek back to the first frame
    fn rewind(&mut self) -> AudioResult<()> {
        let Some(track) = self.track.as_mut() else {
            return Ok(());
        };
        track
            .reader
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: 0,
                    track_id: track.track_id,
                },
            )
            .map_err(|e| AudioError::DecodeFailed(Box::new(e)))?;
        track.codec.reset();
        self.pending.clear();
        self.cursor = 0.0;
        self.position = 0;
        Ok(())
    }

    /// Refill `pending` at end of block, wrapping around when looping.
    /// Returns false once the stream is exhausted.
    fn refill(&mut self) -> AudioResult<bool> {
        loop {
            if self.next_block()? {
                return Ok(true);
            }
            // An empty pass would loop forever
            if !self.looping || !self.emitted_since_wrap {
                return Ok(false);
            }
            self.rewind()?;
            self.loop_count += 1;
            self.emitted_since_wrap = false;
        }
    }

    fn fill(&mut self, buffer: &mut [u8]) -> AudioResult<usize> {
        let channels = self.channels as usize;
        let frame_bytes = channels * 2;
        let frames = buffer.len() / frame_bytes;
        let step = self.pitch as f64 / 100.0;

        let mut written = 0;
        while written < frames {
            let index = self.cursor as usize;
            if index >= self.pending_frames() {
                self.position += self.pending_frames() as u64;
                self.cursor -= self.pending_frames() as f64;
                if !self.refill()? {
                    self.finished = true;
                    break;
                }
                continue;
            }

            let start = written * frame_bytes;
            for ch in 0..channels {
                let sample = self.pending[index * channels + ch].to_le_bytes();
                let at = start + ch * 2;
                buffer[at..at + 2].copy_from_slice(&sample);
            }
            written += 1;
            self.emitted_since_wrap = true;
            self.cursor += step;
        }

        Ok(written * frame_bytes)
    }
}

impl Decoder for SymphoniaDecoder {
    fn open(&mut self, stream: SourceStream) -> AudioResult<()> {
        let source = StreamSource::new(stream).map_err(|e| AudioError::DecodeFailed(Box::new(e)))?;
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        hint.with_extension(self.container.extension());

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| AudioError::DecodeFailed(Box::new(e)))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::InvalidFormat("no supported audio tracks".to_string()))?;

        let rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| AudioError::InvalidFormat("unknown sample rate".to_string()))?;
        let native_channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(2);
        let track_id = track.id;

        let dec_opts: DecoderOptions = Default::default();
        let codec = symphonia::default::get_codecs()
            .make(&track.codec_params, &dec_opts)
            .map_err(|e| AudioError::DecodeFailed(Box::new(e)))?;

        self.rate = rate;
        self.channels = if native_channels >= 2 { 2 } else { 1 };
        self.track = Some(Track {
            reader,
            codec,
            track_id,
        });
        self.pending.clear();
        self.cursor = 0.0;
        self.position = 0;
        self.finished = false;
        Ok(())
    }

    fn decode(&mut self, buffer: &mut [u8]) -> usize {
        let written = if self.finished {
            0
        } else {
            match self.fill(buffer) {
                Ok(written) => written,
                Err(e) => {
                    tracing::warn!("Decoding stopped: {}", e);
                    self.finished = true;
                    0
                }
            }
        };

        // Silence after the end of the stream
        buffer[written..].fill(0);
        written
    }

    fn set_format(&mut self, rate: u32, sample_format: SampleFormat, channels: u16) -> bool {
        rate == self.rate && sample_format == SampleFormat::S16 && channels == self.channels
    }

    fn format(&self) -> DecoderFormat {
        DecoderFormat {
            rate: self.rate,
            sample_format: SampleFormat::S16,
            channels: self.channels,
        }
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn set_pitch(&mut self, pitch: i32) {
        self.pitch = if pitch <= 0 { 100 } else { pitch };
    }

    fn set_volume(&mut self, volume: i32) {
        self.fade = None;
        self.volume = volume.clamp(0, 100);
    }

    fn volume(&self) -> i32 {
        self.fade.map_or(self.volume, |fade| fade.current())
    }

    fn set_fade(&mut self, from: i32, to: i32, duration_ms: u64) {
        let fade = FadeEffect::new(from, to, duration_ms);
        self.volume = fade.target();
        self.fade = if fade.is_done() { None } else { Some(fade) };
    }

    fn loop_count(&self) -> u32 {
        self.loop_count
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn ticks(&self) -> u64 {
        if self.rate == 0 {
            return 0;
        }
        let frames = self.position + self.cursor.max(0.0) as u64;
        frames * 1000 / self.rate as u64
    }

    fn update(&mut self, delta_ms: u64) {
        if let Some(fade) = self.fade.as_mut() {
            fade.advance(delta_ms);
            if fade.is_done() {
                self.fade = None;
            }
        }
    }
}
