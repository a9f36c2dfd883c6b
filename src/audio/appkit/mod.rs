// macOS NSSound backend
// Plays any format Core Audio understands, plus synthesized tones

#[cfg(target_os = "macos")]
mod macos_sound;

#[cfg(target_os = "macos")]
pub use macos_sound::*;

// Stub for non-macOS platforms
#[cfg(not(target_os = "macos"))]
mod stub {
    use crate::audio::task::{Job, PlaybackTask};
    use crate::audio::{Backend, BackendKind};
    use crate::error::{BoomboxError, Result};
    use crate::options::{PlayOption, PlayOptions};
    use crate::request::PlaybackRequest;

    fn unavailable() -> BoomboxError {
        BoomboxError::BackendUnavailable("NSSound is only available on macOS".to_string())
    }

    pub struct AppKitBackend {
        task: Option<PlaybackTask>,
    }

    impl AppKitBackend {
        pub fn new() -> Result<Self> {
            Err(unavailable())
        }
    }

    impl Backend for AppKitBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::AppKit
        }

        fn supports(&self, option: PlayOption) -> bool {
            !matches!(option, PlayOption::BinaryPath)
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

#[cfg(not(target_os = "macos"))]
pub use stub::*;
