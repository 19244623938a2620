use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

use crate::pit_window::{PitWindowError, PitWindowScheduler};

pub const SETTINGS_PATH_ENV: &str = "PITSTOPPER_SETTINGS";
const DEFAULT_SETTINGS_FILE: &str = "pitstopper-settings.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PitWindowSettings {
    pub race_start_hour: u32,
    pub race_start_minute: u32,
    pub pit_window_opens_after: u32,
    pub pit_window_duration: u32,
}

impl Default for PitWindowSettings {
    fn default() -> Self {
        Self {
            race_start_hour: 9,
            race_start_minute: 0,
            pit_window_opens_after: 17,
            pit_window_duration: 6,
        }
    }
}

impl PitWindowSettings {
    pub fn build_scheduler(&self) -> Result<PitWindowScheduler, PitWindowError> {
        PitWindowScheduler::new(
            self.race_start_hour,
            self.race_start_minute,
            self.pit_window_opens_after,
            self.pit_window_duration,
        )
    }

    pub fn race_start_formatted(&self) -> String {
        format!("{:02}:{:02}", self.race_start_hour, self.race_start_minute)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserSettings {
    pit_window: Option<PitWindowSettings>,
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
                log::warn!(
                    "Ignoring unreadable settings file {}: {}",
                    path.display(),
                    err
                );
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

    /// Settings path from `PITSTOPPER_SETTINGS`, or a file in the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn pit_window(&self) -> PitWindowSettings {
        self.read().pit_window.unwrap_or_default()
    }

    /// True once pit window settings were saved, rather than running on defaults.
    pub fn has_settings(&self) -> bool {
        self.read().pit_window.is_some()
    }

    pub fn update_pit_window(&self, settings: PitWindowSettings) -> Result<()> {
        settings
            .build_scheduler()
            .context("Refusing to save pit window settings")?;

        let mut guard = self.write();
        let mut updated = guard.clone();
        updated.pit_window = Some(settings);
        self.persist(&updated)?;
        *guard = updated;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let mut guard = self.write();
        let cleared = UserSettings::default();
        self.persist(&cleared)?;
        *guard = cleared;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert!(!store.has_settings());
        assert_eq!(store.pit_window(), PitWindowSettings::default());
        assert_eq!(store.pit_window().race_start_formatted(), "09:00");
    }

    #[test]
    fn test_update_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let custom = PitWindowSettings {
            race_start_hour: 14,
            race_start_minute: 30,
            pit_window_opens_after: 20,
            pit_window_duration: 10,
        };

        let store = SettingsStore::new(path.clone()).unwrap();
        store.update_pit_window(custom).unwrap();
        assert!(store.has_settings());

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.pit_window(), custom);
        assert_eq!(reloaded.pit_window().build_scheduler().unwrap().cycle_minutes(), 25);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        let invalid = PitWindowSettings {
            pit_window_duration: 0,
            ..PitWindowSettings::default()
        };

        assert!(store.update_pit_window(invalid).is_err());
        assert!(!store.has_settings());
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        // a directory at the settings path makes every write fail
        fs::create_dir(&path).unwrap();

        let result = store.update_pit_window(PitWindowSettings {
            race_start_hour: 14,
            ..PitWindowSettings::default()
        });
        assert!(result.is_err());
        assert!(!store.has_settings());
        assert_eq!(store.pit_window().race_start_hour, 9);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.pit_window(), PitWindowSettings::default());
    }

    #[test]
    fn test_clear_resets_to_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        store
            .update_pit_window(PitWindowSettings {
                race_start_hour: 10,
                ..PitWindowSettings::default()
            })
            .unwrap();
        store.clear().unwrap();
        assert!(!store.has_settings());
        assert_eq!(store.pit_window().race_start_hour, 9);
    }
}
