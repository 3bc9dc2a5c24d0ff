use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::session::RewardFormula;

pub const DATA_DIR_ENV: &str = "SKILL_FORGE_DATA_DIR";
pub const QUIZ_URL_ENV: &str = "SKILL_FORGE_QUIZ_URL";
const DEFAULT_DATA_DIR: &str = ".skill_forge";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub user_id: String,
    pub username: String,
    /// Base URL of the quiz proxy; empty means quizzes are unavailable.
    pub quiz_endpoint: String,
    pub request_timeout_secs: u64,
    pub default_duration_minutes: u64,
    pub reward_formula: RewardFormula,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            user_id: "local".into(),
            username: String::new(),
            quiz_endpoint: String::new(),
            request_timeout_secs: 60,
            default_duration_minutes: 25,
            reward_formula: RewardFormula::Linear,
        }
    }
}

impl UserSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn default_duration_seconds(&self) -> u64 {
        self.default_duration_minutes.max(1).saturating_mul(60)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored settings with environment overrides applied.
    pub fn effective(&self) -> UserSettings {
        let mut settings = self.snapshot();
        if let Ok(url) = env::var(QUIZ_URL_ENV) {
            if !url.trim().is_empty() {
                settings.quiz_endpoint = url;
            }
        }
        settings
    }

    pub fn snapshot(&self) -> UserSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update<F>(&self, change: F) -> Result<UserSettings>
    where
        F: FnOnce(&mut UserSettings),
    {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        change(&mut guard);
        self.persist(&guard)?;
        Ok(guard.clone())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

pub fn data_dir() -> PathBuf {
    env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.snapshot(), UserSettings::default());
        assert_eq!(store.snapshot().default_duration_seconds(), 1500);
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.snapshot(), UserSettings::default());
    }

    #[test]
    fn updates_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        store
            .update(|settings| {
                settings.user_id = "u-42".into();
                settings.reward_formula = RewardFormula::Legacy;
            })
            .unwrap();

        let reloaded = SettingsStore::new(path).unwrap().snapshot();
        assert_eq!(reloaded.user_id, "u-42");
        assert_eq!(reloaded.reward_formula, RewardFormula::Legacy);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"quizEndpoint":"http://proxy","rewardFormula":"legacy"}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().snapshot();
        assert_eq!(settings.quiz_endpoint, "http://proxy");
        assert_eq!(settings.reward_formula, RewardFormula::Legacy);
        assert_eq!(settings.request_timeout_secs, 60);
    }

    #[test]
    fn huge_duration_saturates() {
        let settings = UserSettings {
            default_duration_minutes: u64::MAX,
            ..UserSettings::default()
        };
        assert_eq!(settings.default_duration_seconds(), u64::MAX);
    }
}
