/// Audio sources
///
/// Channel categories and the file service that opens compressed sources.
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

/// Audio channel categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioSourceType {
    /// Background music, one streamed track at a time
    Music,

    /// Short sound effect, one of several concurrent clips
    SoundEffect,
}

impl fmt::Display for AudioSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSourceType::Music => write!(f, "Music"),
            AudioSourceType::SoundEffect => write!(f, "Sound Effect"),
        }
    }
}

impl AudioSourceType {
    /// Whether the decoder for this source should loop at end of stream
    pub fn loops(&self) -> bool {
        match self {
            AudioSourceType::Music => true,
            AudioSourceType::SoundEffect => false,
        }
    }
}

/// Readable, seekable byte stream handed to decoders
pub trait ReadSeek: Read + Seek + Send + Sync {}

impl<T: Read + Seek + Send + Sync> ReadSeek for T {}

/// Open source stream
pub type SourceStream = Box<dyn ReadSeek>;

/// Opens audio sources by path
pub trait FileService: Send + Sync {
    /// Open `path` for reading
    fn open(&self, path: &Path) -> io::Result<SourceStream>;
}

/// File service backed by the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FsFileService {
    root: Option<PathBuf>,
}

impl FsFileService {
    /// Resolve paths as given
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Resolve relative paths against `root` (e.g. the game directory)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl FileService for FsFileService {
    fn open(&self, path: &Path) -> io::Result<SourceStream> {
        let file = File::open(self.resolve(path))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_source_type_display() {
        assert_eq!(AudioSourceType::Music.to_string(), "Music");
        assert_eq!(AudioSourceType::SoundEffect.to_string(), "Sound Effect");
    }

    #[test]
    fn test_source_looping() {
        assert!(AudioSourceType::Music.loops());
        assert!(!AudioSourceType::SoundEffect.loops());
    }

    #[test]
    fn test_fs_file_service_missing_file() {
        let service = FsFileService::new();
        let err = service
            .open(Path::new("definitely/not/here.ogg"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_fs_file_service_resolves_root() {
        let dir = std::env::temp_dir().join(format!("rpg-audio-source-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = File::create(dir.join("cursor.wav")).unwrap();
        file.write_all(b"RIFF").unwrap();
        drop(file);

        let service = FsFileService::with_root(&dir);
        let mut stream = service.open(Path::new("cursor.wav")).unwrap();
        let mut magic = [0u8; 4];
        stream.read_exact(&mut magic).unwrap();
        assert_eq!(&magic, b"RIFF");

        let _ = std::fs::remove_dir_all(dir);
    }
}
