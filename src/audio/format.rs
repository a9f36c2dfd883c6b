// Audio container detection
// Header sniffing first, file extension as a fallback

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Wav,
    Aiff,
    Mp3,
    Ogg,
    Flac,
    Mp4,
    Unknown,
}

impl AudioFormat {
    /// Identify a container from its first bytes
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.len() >= 12 {
            match (&header[0..4], &header[8..12]) {
                (b"RIFF", b"WAVE") | (b"RF64", b"WAVE") => return Some(Self::Wav),
                (b"FORM", b"AIFF") | (b"FORM", b"AIFC") => return Some(Self::Aiff),
                _ => {}
            }
            if &header[4..8] == b"ftyp" {
                return Some(Self::Mp4);
            }
        }
        if header.starts_with(b"OggS") {
            return Some(Self::Ogg);
        }
        if header.starts_with(b"fLaC") {
            return Some(Self::Flac);
        }
        if header.starts_with(b"ID3") {
            return Some(Self::Mp3);
        }
        // MPEG audio frame sync
        if header.len() >= 2 && header[0] == 0xFF && header[1] & 0xE0 == 0xE0 {
            return Some(Self::Mp3);
        }
        None
    }

    pub fn from_extension(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "wav" | "wave" => Self::Wav,
            "aif" | "aiff" | "aifc" => Self::Aiff,
            "mp3" => Self::Mp3,
            "ogg" | "oga" | "opus" => Self::Ogg,
            "flac" => Self::Flac,
            "m4a" | "mp4" | "aac" => Self::Mp4,
            _ => Self::Unknown,
        }
    }

    /// Detect the format of a file on disk
    pub fn detect(path: &Path) -> Result<Self> {
        let mut header = [0u8; 12];
        let mut file = File::open(path)?;
        let mut read = 0;
        while read < header.len() {
            let n = file.read(&mut header[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }

        Ok(Self::sniff(&header[..read]).unwrap_or_else(|| Self::from_extension(path)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Wav => "WAV",
            Self::Aiff => "AIFF",
            Self::Mp3 => "MP3",
            Self::Ogg => "Ogg",
            Self::Flac => "FLAC",
            Self::Mp4 => "MP4/AAC",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sniff_headers() {
        assert_eq!(AudioFormat::sniff(b"RIFF\x24\x08\x00\x00WAVEfmt "), Some(AudioFormat::Wav));
        assert_eq!(AudioFormat::sniff(b"FORM\x00\x00\x00\x00AIFF"), Some(AudioFormat::Aiff));
        assert_eq!(AudioFormat::sniff(b"OggS\x00\x02"), Some(AudioFormat::Ogg));
        assert_eq!(AudioFormat::sniff(b"fLaC\x00\x00"), Some(AudioFormat::Flac));
        assert_eq!(AudioFormat::sniff(b"ID3\x04\x00"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::sniff(&[0xFF, 0xFB, 0x90, 0x00]), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::sniff(b"\x00\x00\x00\x20ftypM4A "), Some(AudioFormat::Mp4));
        assert_eq!(AudioFormat::sniff(b"hello"), None);
    }

    #[test]
    fn test_header_beats_extension() {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(b"OggS\x00\x02\x00\x00\x00\x00\x00\x00").unwrap();
        assert_eq!(AudioFormat::detect(file.path()).unwrap(), AudioFormat::Ogg);
    }

    #[test]
    fn test_extension_fallback() {
        let mut file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        file.write_all(b"not really audio").unwrap();
        assert_eq!(AudioFormat::detect(file.path()).unwrap(), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_extension(Path::new("bell.AIFF")), AudioFormat::Aiff);
        assert_eq!(AudioFormat::from_extension(Path::new("README")), AudioFormat::Unknown);
    }
}
