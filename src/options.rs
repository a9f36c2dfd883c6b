// Playback options
// Every recognized option is always present; backends ignore what they don't honor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Options recognized by the playback handle and its backends.
///
/// Not every backend honors every option (see [`crate::Backend::supports`]),
/// but none of them rejects an option it does not use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayOptions {
    /// Block the caller until playback ends
    #[serde(alias = "block")]
    pub wait: bool,
    /// Upper bound on a blocking wait; playback is stopped when it elapses
    pub timeout_ms: Option<u64>,
    /// Truncate playback after this many milliseconds
    pub duration_ms: Option<u64>,
    /// Executable used by the process backend
    pub binary_path: Option<PathBuf>,
    /// Output volume (0.0 to 1.0)
    pub volume: Option<f32>,
}

impl PlayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn binary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_path = Some(path.into());
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = Some(volume.clamp(0.0, 1.0));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(Duration::from_millis)
    }

    /// Options that carry a value, in declaration order
    pub fn present(&self) -> Vec<PlayOption> {
        let mut set = Vec::new();
        if self.wait {
            set.push(PlayOption::Wait);
        }
        if self.timeout_ms.is_some() {
            set.push(PlayOption::TimeoutMs);
        }
        if self.duration_ms.is_some() {
            set.push(PlayOption::DurationMs);
        }
        if self.binary_path.is_some() {
            set.push(PlayOption::BinaryPath);
        }
        if self.volume.is_some() {
            set.push(PlayOption::Volume);
        }
        set
    }
}

/// Names of the recognized options, used for capability queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayOption {
    Wait,
    TimeoutMs,
    DurationMs,
    BinaryPath,
    Volume,
}

impl PlayOption {
    pub const ALL: [PlayOption; 5] = [
        Self::Wait,
        Self::TimeoutMs,
        Self::DurationMs,
        Self::BinaryPath,
        Self::Volume,
    ];
}

impl fmt::Display for PlayOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Wait => "wait",
            Self::TimeoutMs => "timeout_ms",
            Self::DurationMs => "duration_ms",
            Self::BinaryPath => "binary_path",
            Self::Volume => "volume",
        };
        f.write_str(name)
    }
}
