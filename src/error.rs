// Error types shared by every backend and the playback handle

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for playback operations
#[derive(Debug, Error)]
pub enum BoomboxError {
    /// Required library, device or executable is missing
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The request cannot be played by the chosen backend
    #[error("Unsupported format for {backend}: {format} ({source_desc})")]
    UnsupportedFormat {
        backend: &'static str,
        format: String,
        source_desc: String,
    },

    /// The device or child process reported an error
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),

    #[error("Permission denied: {0:?}")]
    PermissionDenied(PathBuf),

    #[error("File is empty: {0:?}")]
    EmptyFile(PathBuf),

    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BoomboxError {
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, Self::UnsupportedFormat { .. })
    }

    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

/// Result type alias for playback operations
pub type Result<T> = std::result::Result<T, BoomboxError>;
