// External player backend
// Runs a command-line player (afplay, paplay/aplay, PowerShell) as a child process

use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use super::task::{Job, PlaybackTask, StopSignal};
use super::{Backend, BackendKind};
use crate::error::{BoomboxError, Result};
use crate::options::{PlayOption, PlayOptions};
use crate::request::PlaybackRequest;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
#[cfg(unix)]
const TERM_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
enum PlayerCommand {
    /// `<program> <file>`
    Program(PathBuf),
    /// PowerShell's `Media.SoundPlayer`, WAV only
    PowerShell(PathBuf),
}

impl PlayerCommand {
    fn program(&self) -> &Path {
        match self {
            Self::Program(path) | Self::PowerShell(path) => path,
        }
    }

    fn command(&self, sound: &Path) -> Command {
        match self {
            Self::Program(program) => {
                let mut command = Command::new(program);
                command.arg(sound);
                command
            }
            Self::PowerShell(powershell) => {
                let quoted = sound.to_string_lossy().replace('\'', "''");
                let script = format!("(New-Object Media.SoundPlayer '{}').PlaySync()", quoted);
                let mut command = Command::new(powershell);
                command.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
                #[cfg(windows)]
                {
                    use std::os::windows::process::CommandExt;
                    use windows::Win32::System::Threading::CREATE_NO_WINDOW;
                    command.creation_flags(CREATE_NO_WINDOW.0);
                }
                command
            }
        }
    }
}

pub struct ProcessBackend {
    default_player: Option<PlayerCommand>,
    task: Option<PlaybackTask>,
}

impl ProcessBackend {
    /// Never fails; a missing default player surfaces in [`Backend::ready`]
    pub fn new() -> Self {
        let default_player = find_default_player();
        match &default_player {
            Some(player) => tracing::debug!("default CLI player: {:?}", player.program()),
            None => tracing::debug!("no default CLI player found"),
        }
        Self {
            default_player,
            task: None,
        }
    }

    /// Player used when no `binary_path` is given
    pub fn default_player(&self) -> Option<&Path> {
        self.default_player.as_ref().map(PlayerCommand::program)
    }

    fn player(&self, options: &PlayOptions) -> Result<PlayerCommand> {
        match (&options.binary_path, &self.default_player) {
            (Some(path), _) => resolve_binary(path).map(PlayerCommand::Program).ok_or_else(|| {
                BoomboxError::BackendUnavailable(format!("CLI player not found: {}", path.display()))
            }),
            (None, Some(player)) => Ok(player.clone()),
            (None, None) => Err(BoomboxError::BackendUnavailable(
                "CLI player not found, set binary_path".to_string(),
            )),
        }
    }
}

impl Default for ProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for ProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Process
    }

    fn supports(&self, option: PlayOption) -> bool {
        !matches!(option, PlayOption::Volume)
    }

    fn check(&self, request: &PlaybackRequest) -> Result<()> {
        match request {
            PlaybackRequest::Alias(_) => Err(request.unsupported_alias("process")),
            PlaybackRequest::File(_) | PlaybackRequest::Tone(_) => Ok(()),
        }
    }

    fn ready(&self, options: &PlayOptions) -> Result<()> {
        self.player(options).map(|_| ())
    }

    fn prepare(&self, request: &PlaybackRequest, options: &PlayOptions) -> Result<Job> {
        let player = self.player(options)?;
        if let PlayerCommand::PowerShell(_) = player {
            request.require_wav("process")?;
        }

        // Players only take paths, so tones go through a temp file that
        // lives as long as the job
        let (sound, temp) = match request {
            PlaybackRequest::File(path) => (path.clone(), None),
            PlaybackRequest::Tone(buffer) => {
                let file = tempfile::Builder::new()
                    .prefix("boombox-tone-")
                    .suffix(".wav")
                    .tempfile()?;
                buffer.write_wav(file.path())?;
                (file.path().to_path_buf(), Some(file))
            }
            PlaybackRequest::Alias(_) => return Err(request.unsupported_alias("process")),
        };

        let mut child = PlayerProcess(spawn_player(&player, &sound)?);
        let program = player.program().display().to_string();

        Ok(Box::new(move |signal: &StopSignal| -> Result<()> {
            let _temp = temp;
            loop {
                if let Some(status) = child.0.try_wait()? {
                    if status.success() {
                        return Ok(());
                    }
                    return Err(BoomboxError::PlaybackFailed(format!(
                        "{} exited with {}",
                        program, status
                    )));
                }
                if signal.sleep(POLL_INTERVAL) {
                    terminate(&mut child.0);
                    return Ok(());
                }
            }
        }))
    }

    fn task_slot(&self) -> &Option<PlaybackTask> {
        &self.task
    }

    fn task_slot_mut(&mut self) -> &mut Option<PlaybackTask> {
        &mut self.task
    }
}

/// A spawned player, terminated if dropped while still running
/// (e.g. when its job never gets to run)
struct PlayerProcess(Child);

impl Drop for PlayerProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            terminate(&mut self.0);
        }
    }
}

fn spawn_player(player: &PlayerCommand, sound: &Path) -> Result<Child> {
    tracing::debug!("spawning {:?} for {:?}", player.program(), sound);
    player
        .command(sound)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => BoomboxError::BackendUnavailable(
                format!("cannot run {}: {}", player.program().display(), e),
            ),
            _ => e.into(),
        })
}

// Ask politely first so the player can release the device, then kill
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        let pid = child.id() as libc::pid_t;
        // SAFETY: pid belongs to a child we have not reaped yet
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        let deadline = std::time::Instant::now() + TERM_GRACE;
        while std::time::Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => std::thread::sleep(Duration::from_millis(10)),
                Err(_) => break,
            }
        }
    }

    if let Err(e) = child.kill() {
        tracing::warn!("failed to kill player {}: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        tracing::warn!("failed to reap player {}: {}", child.id(), e);
    }
}

/// An explicit path must name a file; a bare name is looked up on `PATH`
fn resolve_binary(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.components().count() == 1 {
        return path.to_str().and_then(search_path);
    }
    None
}

/// Find an executable on `PATH`
pub fn search_path(binary: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

fn find_default_player() -> Option<PlayerCommand> {
    if cfg!(windows) {
        search_path("powershell.exe").map(PlayerCommand::PowerShell)
    } else if cfg!(target_os = "macos") {
        search_path("afplay").map(PlayerCommand::Program)
    } else if cfg!(unix) {
        ["paplay", "aplay"]
            .iter()
            .find_map(|name| search_path(name))
            .map(PlayerCommand::Program)
    } else {
        None
    }
}

#[cfg(test)]
mod command_tests {
    use super::*;

    #[test]
    fn test_powershell_command_quotes_path() {
        let player = PlayerCommand::PowerShell(PathBuf::from("powershell"));
        let command = player.command(Path::new("C:\\sounds\\it's.wav"));

        assert_eq!(command.get_program(), "powershell");
        let args: Vec<_> = command.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args[..3], ["-NoProfile", "-NonInteractive", "-Command"]);
        assert_eq!(
            args[3],
            "(New-Object Media.SoundPlayer 'C:\\sounds\\it''s.wav').PlaySync()"
        );
    }
}
