// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::{create_backend, select_backend, Backend, BackendKind};
use crate::error::Result;
use crate::handle::Handle;
use crate::options::PlayOptions;
use crate::request::PlaybackRequest;

/// Playback preferences stored as `settings.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: i32, // Settings schema version for future migrations
    /// Backend to use instead of the platform order
    pub backend: Option<BackendKind>,
    /// Defaults applied to every handle built from these settings
    pub options: PlayOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            backend: None,
            options: PlayOptions::default(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn get_settings_path(dir: &Path) -> PathBuf {
        dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(dir: &Path) -> Result<Self> {
        let path = Self::get_settings_path(dir);

        if !path.exists() {
            tracing::info!("No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let settings: Settings = serde_json::from_str(&content)?;

        tracing::info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, dir: &Path) -> Result<()> {
        // Ensure directory exists
        fs::create_dir_all(dir)?;

        let path = Self::get_settings_path(dir);
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)?;

        tracing::info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// The preferred backend, or the platform's first usable one
    pub fn backend(&self) -> Result<Box<dyn Backend>> {
        match self.backend {
            Some(kind) => create_backend(kind),
            None => select_backend(&self.options),
        }
    }

    /// Bind `request` to a backend using these settings
    pub fn handle(&self, request: PlaybackRequest) -> Result<Handle> {
        Handle::with_backend(request, self.backend()?, self.options.clone())
    }
}
