use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

const DEBUG_SYNC_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sync_interval_secs: u64,
    pub shortcut_debounce_ms: u64,
    pub images_dir: Option<PathBuf>,
    pub session_quotes: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sync_interval_secs: 60,
            shortcut_debounce_ms: 500,
            images_dir: None,
            session_quotes: Vec::new(),
        }
    }
}

impl Settings {
    pub fn shortcut_debounce(&self) -> Duration {
        Duration::from_millis(self.shortcut_debounce_ms)
    }

    /// Sync period, shortened when `FOCUSRING_DEBUG` is set.
    pub fn sync_interval(&self) -> Duration {
        if debug_mode() {
            Duration::from_secs(DEBUG_SYNC_INTERVAL_SECS)
        } else {
            Duration::from_secs(self.sync_interval_secs.max(1))
        }
    }
}

pub fn debug_mode() -> bool {
    std::env::var("FOCUSRING_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    /// Loads settings from `path`, writing defaults if the file is missing.
    /// An unreadable document falls back to defaults without overwriting it.
    pub fn new(path: PathBuf) -> Result<Self> {
        let existed = path.exists();
        let data = if existed {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring malformed settings at {}: {err}", path.display());
                Settings::default()
            })
        } else {
            Settings::default()
        };

        let store = Self {
            path,
            data: RwLock::new(data),
        };
        if !existed {
            store.persist(&store.read())?;
        }
        Ok(store)
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn settings(&self) -> Settings {
        self.read().clone()
    }

    pub fn set_session_quotes(&self, quotes: Vec<String>) -> Result<()> {
        let mut guard = self.write();
        guard.session_quotes = quotes;
        self.persist(&guard)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
