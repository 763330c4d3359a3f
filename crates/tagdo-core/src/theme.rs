use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, THEME_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(anyhow!("invalid theme: {other} (expected light or dark)")),
        }
    }
}

/// Saved preference first, then the system preference, then light.
#[tracing::instrument(skip(store))]
pub fn load_theme(store: &dyn KeyValueStore, system: Option<Theme>) -> Theme {
    let stored = match store.get(THEME_KEY) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "failed reading theme preference");
            None
        }
    };

    if let Some(raw) = stored {
        match raw.parse::<Theme>() {
            Ok(theme) => return theme,
            Err(err) => debug!(error = %err, "ignoring stored theme"),
        }
    }

    system.unwrap_or_default()
}

#[tracing::instrument(skip(store))]
pub fn save_theme(store: &mut dyn KeyValueStore, theme: Theme) {
    if let Err(err) = store.set(THEME_KEY, theme.as_str()) {
        warn!(error = %format!("{err:#}"), "failed persisting theme preference");
    }
}

/// Flips the stored preference and returns the new one.
pub fn toggle_theme(store: &mut dyn KeyValueStore, system: Option<Theme>) -> Theme {
    let next = load_theme(store, system).toggled();
    save_theme(store, next);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn falls_back_to_system_then_light() {
        let store = MemoryStore::new();
        assert_eq!(load_theme(&store, None), Theme::Light);
        assert_eq!(load_theme(&store, Some(Theme::Dark)), Theme::Dark);
    }

    #[test]
    fn stored_value_wins_and_garbage_is_ignored() {
        let store = MemoryStore::with_entry(THEME_KEY, "dark");
        assert_eq!(load_theme(&store, Some(Theme::Light)), Theme::Dark);

        let store = MemoryStore::with_entry(THEME_KEY, "sepia");
        assert_eq!(load_theme(&store, Some(Theme::Dark)), Theme::Dark);
    }

    #[test]
    fn toggle_persists_new_value() {
        let mut store = MemoryStore::new();
        assert_eq!(toggle_theme(&mut store, None), Theme::Dark);
        assert_eq!(store.raw(THEME_KEY), Some("dark"));
        assert_eq!(toggle_theme(&mut store, None), Theme::Light);
        assert_eq!(store.raw(THEME_KEY), Some("light"));
    }

    #[test]
    fn write_failure_does_not_panic() {
        let mut store = MemoryStore::new();
        store.fail_writes = true;
        save_theme(&mut store, Theme::Dark);
        assert_eq!(load_theme(&store, None), Theme::Light);
    }
}
