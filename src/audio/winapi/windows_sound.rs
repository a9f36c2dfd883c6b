// PlaySound implementation using windows-rs crate

use windows::core::PCWSTR;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Media::Audio::{
    PlaySoundW, SND_ALIAS, SND_FILENAME, SND_FLAGS, SND_MEMORY, SND_NODEFAULT, SND_SYNC,
};

use crate::audio::task::{Job, PlaybackTask, StopSignal};
use crate::audio::{Backend, BackendKind};
use crate::error::{BoomboxError, Result};
use crate::options::{PlayOption, PlayOptions};
use crate::request::PlaybackRequest;

/// What gets handed to PlaySound
enum Sound {
    /// NUL-terminated UTF-16 path or alias name
    Name(Vec<u16>, SND_FLAGS),
    /// Complete WAV image
    Memory(Vec<u8>),
}

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// `PlaySound` backend. The winmm player is process-wide: a second
/// backend playing at the same time cuts the first one off.
pub struct WinApiBackend {
    task: Option<PlaybackTask>,
}

impl WinApiBackend {
    pub fn new() -> Result<Self> {
        Ok(Self { task: None })
    }
}

impl Backend for WinApiBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::WinApi
    }

    fn supports(&self, option: PlayOption) -> bool {
        !matches!(option, PlayOption::BinaryPath | PlayOption::Volume)
    }

    fn check(&self, request: &PlaybackRequest) -> Result<()> {
        match request {
            PlaybackRequest::Alias(_) => Ok(()),
            _ => request.require_wav("winapi"),
        }
    }

    fn prepare(&self, request: &PlaybackRequest, _options: &PlayOptions) -> Result<Job> {
        let sound = match request {
            PlaybackRequest::File(path) => {
                Sound::Name(wide(&path.to_string_lossy()), SND_FILENAME)
            }
            PlaybackRequest::Alias(name) => Sound::Name(wide(name), SND_ALIAS),
            PlaybackRequest::Tone(buffer) => Sound::Memory(buffer.to_wav_bytes()?),
        };
        let label = request.to_string();

        Ok(Box::new(move |signal: &StopSignal| -> Result<()> {
            // A NULL sound stops whatever PlaySound is playing
            signal.on_raise(|| unsafe {
                let _ = PlaySoundW(PCWSTR::null(), HMODULE::default(), SND_FLAGS(0));
            });
            if signal.is_raised() {
                return Ok(());
            }

            let played = unsafe {
                match &sound {
                    Sound::Name(name, kind) => PlaySoundW(
                        PCWSTR(name.as_ptr()),
                        HMODULE::default(),
                        *kind | SND_NODEFAULT | SND_SYNC,
                    ),
                    Sound::Memory(bytes) => PlaySoundW(
                        PCWSTR(bytes.as_ptr() as *const u16),
                        HMODULE::default(),
                        SND_MEMORY | SND_NODEFAULT | SND_SYNC,
                    ),
                }
            };

            if !played.as_bool() && !signal.is_raised() {
                return Err(BoomboxError::PlaybackFailed(format!(
                    "PlaySound could not play {}",
                    label
                )));
            }
            Ok(())
        }))
    }

    fn task_slot(&self) -> &Option<PlaybackTask> {
        &self.task
    }

    fn task_slot_mut(&mut self) -> &mut Option<PlaybackTask> {
        &mut self.task
    }
}
