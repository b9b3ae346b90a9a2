//! JSON-file persistence for the operator-facing collaborators. Missing or
//! unreadable files fall back to defaults; failed saves are logged and
//! suppressed so the game keeps running with an unchanged file.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use skillshot_core::persist::{HighScore, HighScoreStore, OperatorSettings, SettingsStore};

pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> OperatorSettings {
        match fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(settings) => settings,
                Err(err) => {
                    tracing::warn!("settings file {:?} is corrupt ({err}); using defaults", self.path);
                    OperatorSettings::default()
                },
            },
            Err(err) if err.kind() == ErrorKind::NotFound => OperatorSettings::default(),
            Err(err) => {
                tracing::warn!("cannot read settings {:?} ({err}); using defaults", self.path);
                OperatorSettings::default()
            },
        }
    }

    fn save(&self, settings: &OperatorSettings) {
        let text = match serde_json::to_string_pretty(settings) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("cannot serialize settings: {err}");
                return;
            },
        };
        if let Err(err) = fs::write(&self.path, text) {
            tracing::warn!("cannot write settings {:?}: {err}", self.path);
        }
    }
}

pub struct JsonHighScoreStore {
    path: PathBuf,
}

impl JsonHighScoreStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl HighScoreStore for JsonHighScoreStore {
    fn load(&self) -> Vec<HighScore> {
        match fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!("high-score file {:?} is corrupt ({err}); starting empty", self.path);
                    Vec::new()
                },
            },
            Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                tracing::warn!("cannot read high scores {:?} ({err}); starting empty", self.path);
                Vec::new()
            },
        }
    }

    fn save(&self, entries: &[HighScore]) {
        let text = match serde_json::to_string_pretty(entries) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!("cannot serialize high scores: {err}");
                return;
            },
        };
        if let Err(err) = fs::write(&self.path, text) {
            tracing::warn!("cannot write high scores {:?}: {err}", self.path);
        }
    }
}
