// Boombox demo
// Plays a file, interrupts a second playback, then beeps

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use boombox::{make_tone, Handle, PlayOptions};

fn example_sound() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\Windows\Media\chord.wav")
    } else if cfg!(target_os = "macos") {
        PathBuf::from("/System/Library/Sounds/Glass.aiff")
    } else {
        PathBuf::from("/usr/share/sounds/alsa/Front_Center.wav")
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let debug = args.iter().any(|a| a == "-d");

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("boombox {}", env!("CARGO_PKG_VERSION"));

    let path = args
        .iter()
        .find(|a| a.as_str() != "-d")
        .map(PathBuf::from)
        .unwrap_or_else(example_sound);

    // Blocking, truncated to two seconds
    let options = PlayOptions::new().wait(true).duration_ms(2_000);
    let handle = Handle::open(&path, options)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    tracing::info!("playing {} on {}", path.display(), handle.backend_kind());
    handle.play().context("Failed to play")?;
    tracing::info!("done: {:?}", handle.state());

    // Non-blocking, stopped early
    let handle = Handle::open(&path, PlayOptions::new())?;
    handle.play()?;
    thread::sleep(Duration::from_millis(500));
    handle.stop();
    tracing::info!("interrupted: {:?}", handle.state());

    let beep = make_tone(500.0, 2_000, 0.1, PlayOptions::new().wait(true))
        .context("Failed to build tone")?;
    beep.play().context("Failed to play tone")?;
    tracing::info!("tone: {:?}", beep.state());

    #[cfg(windows)]
    {
        use boombox::PlaybackRequest;
        let alias = Handle::new(
            PlaybackRequest::alias("SystemHand"),
            PlayOptions::new().wait(true),
        )?;
        alias.play()?;
    }

    Ok(())
}
