// Windows PlaySound backend
// Plays WAV files, synthesized tones and named system sounds through winmm

#[cfg(windows)]
mod windows_sound;

#[cfg(windows)]
pub use windows_sound::*;

// Stub for non-Windows platforms
#[cfg(not(windows))]
mod stub {
    use crate::audio::task::{Job, PlaybackTask};
    use crate::audio::{Backend, BackendKind};
    use crate::error::{BoomboxError, Result};
    use crate::options::{PlayOption, PlayOptions};
    use crate::request::PlaybackRequest;

    fn unavailable() -> BoomboxError {
        BoomboxError::BackendUnavailable("PlaySound is only available on Windows".to_string())
    }

    pub struct WinApiBackend {
        task: Option<PlaybackTask>,
    }

    impl WinApiBackend {
        pub fn new() -> Result<Self> {
            Err(unavailable())
        }
    }

    impl Backend for WinApiBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::WinApi
        }

        fn supports(&self, option: PlayOption) -> bool {
            !matches!(option, PlayOption::BinaryPath | PlayOption::Volume)
        }

        fn check(&self, _request: &PlaybackRequest) -> Result<()> {
            Err(unavailable())
        }

        fn prepare(&self, _request: &PlaybackRequest, _options: &PlayOptions) -> Result<Job> {
            Err(unavailable())
        }

        fn task_slot(&self) -> &Option<PlaybackTask> {
            &self.task
        }

        fn task_slot_mut(&mut self) -> &mut Option<PlaybackTask> {
            &mut self.task
        }
    }
}

#[cfg(not(windows))]
pub use stub::*;
