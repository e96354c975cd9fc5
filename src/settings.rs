use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use crate::models::{category::DEFAULT_SPECIALIZATION_TOKENS, CategoryRules};

/// Backoff for status writes that failed to reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TournamentSettings {
    pub slot_minutes: u32,
    pub first_slot: NaiveTime,
    pub last_slot: NaiveTime,
    pub poll_interval_secs: u64,
    pub tick_interval_ms: u64,
    pub heartbeat_every_ticks: u32,
    /// Duration used for matches whose field is unknown.
    pub fallback_match_minutes: u32,
    pub specialization_tokens: Vec<String>,
    pub retry: RetryPolicy,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            slot_minutes: 15,
            first_slot: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            last_slot: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            poll_interval_secs: 30,
            tick_interval_ms: 1_000,
            heartbeat_every_ticks: 10,
            fallback_match_minutes: 10,
            specialization_tokens: DEFAULT_SPECIALIZATION_TOKENS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            retry: RetryPolicy::default(),
        }
    }
}

impl TournamentSettings {
    pub fn category_rules(&self) -> CategoryRules {
        CategoryRules::new(self.specialization_tokens.iter().cloned())
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<TournamentSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            TournamentSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> TournamentSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, settings: TournamentSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &TournamentSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "slotMinutes": 10, "retry": { "maxBackoffMs": 1000 } }"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let settings = store.get();
        assert_eq!(settings.slot_minutes, 10);
        assert_eq!(settings.poll_interval_secs, 30);
        assert_eq!(settings.retry.max_backoff_ms, 1000);
        assert_eq!(settings.retry.initial_backoff_ms, 500);
        assert_eq!(settings.category_rules(), CategoryRules::default());
    }

    #[test]
    fn update_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.get();
        settings.fallback_match_minutes = 8;
        store.update(settings.clone()).unwrap();

        assert_eq!(SettingsStore::new(path).unwrap().get(), settings);
    }
}
