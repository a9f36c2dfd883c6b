// Audio playback module
// Backend trait, per-platform backend selection and the shared playback machinery

pub mod appkit;
pub mod cpal_backend;
pub mod decoder;
pub mod format;
pub mod output;
pub mod process;
pub mod resample;
pub mod task;
pub mod winapi;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{BoomboxError, Result};
use crate::options::{PlayOption, PlayOptions};
use crate::request::PlaybackRequest;

pub use appkit::AppKitBackend;
pub use cpal_backend::CpalBackend;
pub use format::AudioFormat;
pub use process::ProcessBackend;
pub use task::{Job, Playback, PlaybackState, PlaybackTask, StopSignal, WaitStatus};
pub use winapi::WinApiBackend;

/// The closed set of playback strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Windows `PlaySound`
    WinApi,
    /// macOS `NSSound`
    AppKit,
    /// Portable device output (cpal), WAV only
    Cpal,
    /// External command-line player
    Process,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [Self::WinApi, Self::AppKit, Self::Cpal, Self::Process];

    pub fn name(&self) -> &'static str {
        match self {
            Self::WinApi => "winapi",
            Self::AppKit => "appkit",
            Self::Cpal => "cpal",
            Self::Process => "process",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A playback strategy. Holds at most one live playback; starting a new
/// one stops the previous.
pub trait Backend: Send {
    fn kind(&self) -> BackendKind;

    /// Whether this backend honors `option`
    fn supports(&self, option: PlayOption) -> bool;

    /// Reject requests this backend can't play, before touching the device
    fn check(&self, request: &PlaybackRequest) -> Result<()>;

    /// Build the blocking playback body for `request`
    fn prepare(&self, request: &PlaybackRequest, options: &PlayOptions) -> Result<Job>;

    fn task_slot(&self) -> &Option<PlaybackTask>;

    fn task_slot_mut(&mut self) -> &mut Option<PlaybackTask>;

    /// Fail early when these options can't work on this machine
    fn ready(&self, _options: &PlayOptions) -> Result<()> {
        Ok(())
    }

    /// Start playing without blocking, replacing any current playback
    fn launch(&mut self, request: &PlaybackRequest, options: &PlayOptions) -> Result<Playback> {
        self.check(request)?;
        self.stop();

        let ignored: Vec<String> = options
            .present()
            .into_iter()
            .filter(|option| !self.supports(*option))
            .map(|option| option.to_string())
            .collect();
        if !ignored.is_empty() {
            tracing::debug!("{} ignores options: {}", self.kind(), ignored.join(", "));
        }

        let job = self.prepare(request, options)?;
        let task = PlaybackTask::spawn(self.kind().name(), job, options.duration())?;
        let playback = task.playback();
        tracing::info!("{} playing {}", self.kind(), request);
        *self.task_slot_mut() = Some(task);
        Ok(playback)
    }

    /// Start playing, then block until done if `options.wait` is set
    fn start(&mut self, request: &PlaybackRequest, options: &PlayOptions) -> Result<Playback> {
        let playback = self.launch(request, options)?;
        if options.wait {
            playback.wait(options.timeout());
        }
        Ok(playback)
    }

    /// Stop the current playback, if any. Idempotent.
    fn stop(&mut self) {
        if let Some(task) = self.task_slot_mut().as_mut() {
            task.stop();
        }
    }

    fn wait(&self, timeout: Option<Duration>) -> WaitStatus {
        match self.playback() {
            Some(playback) => playback.wait(timeout),
            None => WaitStatus::Completed(PlaybackState::Idle),
        }
    }

    fn state(&self) -> PlaybackState {
        self.task_slot()
            .as_ref()
            .map(PlaybackTask::state)
            .unwrap_or(PlaybackState::Idle)
    }

    fn playback(&self) -> Option<Playback> {
        self.task_slot().as_ref().map(PlaybackTask::playback)
    }
}

/// Construct a backend of the given kind on this machine
pub fn create_backend(kind: BackendKind) -> Result<Box<dyn Backend>> {
    Ok(match kind {
        BackendKind::WinApi => Box::new(WinApiBackend::new()?),
        BackendKind::AppKit => Box::new(AppKitBackend::new()?),
        BackendKind::Cpal => Box::new(CpalBackend::new()?),
        BackendKind::Process => Box::new(ProcessBackend::new()),
    })
}

/// Platform preference order
pub fn default_backend_kinds() -> Vec<BackendKind> {
    if cfg!(windows) {
        vec![BackendKind::WinApi, BackendKind::Process]
    } else if cfg!(target_os = "macos") {
        vec![BackendKind::AppKit, BackendKind::Process]
    } else if cfg!(unix) {
        vec![BackendKind::Cpal, BackendKind::Process]
    } else {
        vec![BackendKind::Process]
    }
}

/// First backend in platform order that can be constructed and accepts `options`
pub fn select_backend(options: &PlayOptions) -> Result<Box<dyn Backend>> {
    let mut failures = Vec::new();

    for kind in default_backend_kinds() {
        let attempt = create_backend(kind).and_then(|backend| {
            backend.ready(options)?;
            Ok(backend)
        });
        match attempt {
            Ok(backend) => {
                tracing::debug!("selected backend: {}", kind);
                return Ok(backend);
            }
            Err(e) => {
                tracing::debug!("backend {} unavailable: {}", kind, e);
                failures.push(format!("{} ({})", kind, e));
            }
        }
    }

    Err(BoomboxError::BackendUnavailable(format!(
        "no usable backend, tried: {}",
        failures.join(", ")
    )))
}

/// Select a backend for default options
pub fn default_backend() -> Result<Box<dyn Backend>> {
    select_backend(&PlayOptions::default())
}
