// Boombox - cross-platform sound playback
// Module declarations
pub mod audio;
pub mod error;
pub mod handle;
pub mod options;
pub mod request;
pub mod settings;
pub mod tone;

use std::path::Path;

pub use audio::{
    create_backend, default_backend, default_backend_kinds, select_backend, AudioFormat, Backend,
    BackendKind, PlaybackState, WaitStatus,
};
pub use error::{BoomboxError, Result};
pub use handle::Handle;
pub use options::{PlayOption, PlayOptions};
pub use request::{verify_file, PlaybackRequest};
pub use settings::Settings;
pub use tone::{make_tone, make_tone_with, synthesize, ToneBuffer};

/// Play a file on the default backend.
///
/// Blocks when `options.wait` is set; otherwise keep the returned handle
/// alive for as long as the sound should play.
pub fn play(path: impl AsRef<Path>, options: PlayOptions) -> Result<Handle> {
    let handle = Handle::open(path, options)?;
    handle.play()?;
    Ok(handle)
}
