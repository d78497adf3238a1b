use thiserror::Error;

/// Engine-level errors using thiserror for structured error handling.
///
/// Control operations on the engine never surface these to the caller; they
/// are logged and the request is dropped. The `try_*` entry points and the
/// collaborator traits return them so hosts can decide for themselves.

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No free resource available: {0}")]
    ResourceUnavailable(String),

    #[error("Unsupported audio format: {path}")]
    UnsupportedFormat { path: String },

    #[error("Failed to open audio source: {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode audio format")]
    DecodeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Audio hardware failure: {0}")]
    HardwareFailure(String),

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for engine and collaborator operations
pub type AudioResult<T> = Result<T, AudioError>;
