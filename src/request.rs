// Playback requests
// What a handle plays: a verified file, a synthesized tone, or a named system sound

use std::fmt;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::audio::format::AudioFormat;
use crate::error::{BoomboxError, Result};
use crate::tone::ToneBuffer;

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackRequest {
    /// Absolute path to an audio file, checked at construction
    File(PathBuf),
    /// In-memory waveform
    Tone(ToneBuffer),
    /// Named system sound (e.g. `SystemHand`), honored by the Windows backend only
    Alias(String),
}

impl PlaybackRequest {
    /// Build a file request, failing early if the file can't be played
    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        verify_file(path.as_ref()).map(Self::File)
    }

    pub fn tone(buffer: ToneBuffer) -> Self {
        Self::Tone(buffer)
    }

    pub fn alias(name: impl Into<String>) -> Self {
        Self::Alias(name.into())
    }

    /// True for requests with nothing to play
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Tone(buffer) => buffer.is_empty(),
            Self::File(_) | Self::Alias(_) => false,
        }
    }

    /// Container format; tones are synthesized PCM and count as WAV
    pub fn format(&self) -> Result<Option<AudioFormat>> {
        match self {
            Self::File(path) => AudioFormat::detect(path).map(Some),
            Self::Tone(_) => Ok(Some(AudioFormat::Wav)),
            Self::Alias(_) => Ok(None),
        }
    }

    /// Fail unless the request is WAV audio
    pub(crate) fn require_wav(&self, backend: &'static str) -> Result<()> {
        match self.format()? {
            Some(AudioFormat::Wav) => Ok(()),
            Some(format) => Err(BoomboxError::UnsupportedFormat {
                backend,
                format: format.to_string(),
                source_desc: self.to_string(),
            }),
            None => Err(self.unsupported_alias(backend)),
        }
    }

    pub(crate) fn unsupported_alias(&self, backend: &'static str) -> BoomboxError {
        BoomboxError::UnsupportedFormat {
            backend,
            format: "sound alias".to_string(),
            source_desc: self.to_string(),
        }
    }
}

impl fmt::Display for PlaybackRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Tone(buffer) => write!(
                f,
                "tone ({} samples @ {} Hz)",
                buffer.len(),
                buffer.sample_rate()
            ),
            Self::Alias(name) => write!(f, "alias {:?}", name),
        }
    }
}

/// Check a file is accessible, early on. Prone to races, but catches the common mistakes.
pub fn verify_file(path: &Path) -> Result<PathBuf> {
    let path = std::path::absolute(path)?;
    if !path.exists() {
        return Err(BoomboxError::FileNotFound(path));
    }

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(BoomboxError::PermissionDenied(path));
        }
        Err(e) => return Err(e.into()),
    };
    if file.metadata()?.len() == 0 {
        return Err(BoomboxError::EmptyFile(path));
    }

    tracing::debug!("verified: {:?}", path);
    Ok(path)
}
