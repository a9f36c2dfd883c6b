// Persisted playback preferences
#[allow(clippy::module_inception)]
mod settings;

pub use settings::Settings;
