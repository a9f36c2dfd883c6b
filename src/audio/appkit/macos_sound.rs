// NSSound implementation using objc2 crates

use objc2::rc::{autoreleasepool, Retained};
use objc2::AllocAnyThread;
use objc2_app_kit::NSSound;
use objc2_foundation::{NSData, NSString};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::task::{Job, PlaybackTask, StopSignal};
use crate::audio::{Backend, BackendKind};
use crate::error::{BoomboxError, Result};
use crate::options::{PlayOption, PlayOptions};
use crate::request::PlaybackRequest;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

enum Source {
    File(PathBuf),
    Wav(Vec<u8>),
}

pub struct AppKitBackend {
    task: Option<PlaybackTask>,
}

impl AppKitBackend {
    pub fn new() -> Result<Self> {
        Ok(Self { task: None })
    }
}

impl Backend for AppKitBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::AppKit
    }

    fn supports(&self, option: PlayOption) -> bool {
        !matches!(option, PlayOption::BinaryPath)
    }

    fn check(&self, request: &PlaybackRequest) -> Result<()> {
        match request {
            PlaybackRequest::Alias(_) => Err(request.unsupported_alias("appkit")),
            PlaybackRequest::File(_) | PlaybackRequest::Tone(_) => Ok(()),
        }
    }

    fn prepare(&self, request: &PlaybackRequest, options: &PlayOptions) -> Result<Job> {
        let source = match request {
            PlaybackRequest::File(path) => Source::File(path.clone()),
            PlaybackRequest::Tone(buffer) => Source::Wav(buffer.to_wav_bytes()?),
            PlaybackRequest::Alias(_) => return Err(request.unsupported_alias("appkit")),
        };
        let label = request.to_string();
        let volume = options.volume;

        // NSSound instances stay on the worker thread
        Ok(Box::new(move |signal: &StopSignal| -> Result<()> {
            autoreleasepool(|_| {
                let sound = load(&source).ok_or_else(|| {
                    BoomboxError::PlaybackFailed(format!("NSSound could not load {}", label))
                })?;

                unsafe {
                    if let Some(volume) = volume {
                        sound.setVolume(volume);
                    }
                    if !sound.play() {
                        return Err(BoomboxError::PlaybackFailed(format!(
                            "NSSound could not play {}",
                            label
                        )));
                    }
                }

                while unsafe { sound.isPlaying() } {
                    if signal.sleep(POLL_INTERVAL) {
                        unsafe {
                            sound.stop();
                        }
                        break;
                    }
                }
                Ok(())
            })
        }))
    }

    fn task_slot(&self) -> &Option<PlaybackTask> {
        &self.task
    }

    fn task_slot_mut(&mut self) -> &mut Option<PlaybackTask> {
        &mut self.task
    }
}

fn load(source: &Source) -> Option<Retained<NSSound>> {
    unsafe {
        match source {
            Source::File(path) => {
                let path = NSString::from_str(&path.to_string_lossy());
                NSSound::initWithContentsOfFile_byReference(NSSound::alloc(), &path, true)
            }
            Source::Wav(bytes) => {
                let data = NSData::with_bytes(bytes);
                NSSound::initWithData(NSSound::alloc(), &data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports() {
        let backend = AppKitBackend::new().unwrap();
        assert!(backend.supports(PlayOption::Volume));
        assert!(!backend.supports(PlayOption::BinaryPath));
        assert!(backend
            .check(&PlaybackRequest::alias("Glass"))
            .unwrap_err()
            .is_unsupported_format());
    }
}
