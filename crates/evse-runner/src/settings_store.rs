//! Persistent storage for bridge settings.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use evse_bridge::Settings;
use tracing::debug;

use crate::error::RunnerResult;

/// Somewhere to keep [`Settings`] across restarts.
pub trait SettingsStore {
    /// Stored settings, or defaults if nothing has been stored.
    fn load(&self) -> RunnerResult<Settings>;
    fn save(&mut self, settings: &Settings) -> RunnerResult<()>;
    /// Forget the stored settings.
    fn clear(&mut self) -> RunnerResult<()>;
}

/// Settings kept as a JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonSettingsStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> RunnerResult<Settings> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", self.path.display());
                Ok(Settings::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, settings: &Settings) -> RunnerResult<()> {
        let temp = self.temp_path();
        fs::write(&temp, serde_json::to_vec_pretty(settings)?)?;
        fs::rename(&temp, &self.path)?;
        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }

    fn clear(&mut self) -> RunnerResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Settings kept in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemorySettingsStore {
    pub settings: Option<Settings>,
    pub saves: usize,
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> RunnerResult<Settings> {
        Ok(self.settings.unwrap_or_default())
    }

    fn save(&mut self, settings: &Settings) -> RunnerResult<()> {
        self.settings = Some(*settings);
        self.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> RunnerResult<()> {
        self.settings = None;
        Ok(())
    }
}
