//! Live settings shared by the scheduler and the observer surface.

use std::sync::RwLock;

use crate::config::loader::validate_settings;
use crate::config::schema::Settings;
use crate::error::ConfigError;

/// Holds the current [`Settings`]. Readers always get a copy, so a job admitted
/// with one value never sees a later change.
pub struct SettingsStore {
    current: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(initial: Settings) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn get(&self) -> Settings {
        match self.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                log::warn!("Settings lock was poisoned, recovering");
                *poisoned.into_inner()
            }
        }
    }

    /// Validates and replaces the settings, returning the previous value.
    pub fn replace(&self, next: Settings) -> Result<Settings, ConfigError> {
        validate_settings(&next)?;

        let mut guard = match self.current.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Settings lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let previous = *guard;
        *guard = next;
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_returns_previous() {
        let store = SettingsStore::new(Settings::default());
        let next = Settings {
            articles_per_hour: 30,
            concurrent_jobs: 5,
            auto_publish: true,
        };

        let previous = store.replace(next).unwrap();
        assert_eq!(previous, Settings::default());
        assert_eq!(store.get(), next);
    }

    #[test]
    fn test_invalid_replace_keeps_current() {
        let store = SettingsStore::new(Settings::default());
        let invalid = Settings {
            concurrent_jobs: 0,
            ..Settings::default()
        };

        assert!(store.replace(invalid).is_err());
        assert_eq!(store.get(), Settings::default());
    }
}
