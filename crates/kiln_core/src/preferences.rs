//! # Preferences
//!
//! Layered string key/value preferences stored as flat TOML tables.
//!
//! ```text
//!   core defaults (required) ──┐
//!   game defaults (optional) ──┼──> merged map ──> saved back to user file
//!   user file     (optional) ──┘
//! ```
//!
//! The defaults layers define which keys exist; the user layer and runtime
//! `set` calls may only change them. Saving the merged map every start means
//! keys added by a new engine or game version show up in the user file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};

/// Files that make up a preference set.
#[derive(Clone, Debug)]
pub struct PreferenceSources {
    /// Engine-wide defaults. Must exist.
    pub core_defaults: PathBuf,
    /// Per-game defaults, applied over the core defaults if present.
    pub game_defaults: Option<PathBuf>,
    /// User customizations; read if present and always rewritten.
    pub user: PathBuf,
}

/// String-keyed preference map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Preferences {
    values: BTreeMap<String, String>,
}

impl Preferences {
    /// Builds the merged preference set described by `sources` and saves it
    /// to the user file.
    ///
    /// # Errors
    ///
    /// Fails if the core defaults are missing or any present file is
    /// malformed, or if the merged file cannot be written.
    pub fn load_layered(sources: &PreferenceSources) -> CoreResult<Self> {
        let mut prefs = Self::default();
        prefs.merge_file(&sources.core_defaults, true)?;

        if let Some(game) = &sources.game_defaults {
            if game.exists() {
                prefs.merge_file(game, true)?;
            }
        }

        if sources.user.exists() {
            prefs.merge_file(&sources.user, false)?;
        }

        prefs.save(&sources.user)?;
        tracing::info!(
            "Loaded {} preferences, saved to {}",
            prefs.len(),
            sources.user.display()
        );
        Ok(prefs)
    }

    /// Parses a preference table from TOML text. Every key is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedPreferences`] if the text is not a flat
    /// table of scalars.
    pub fn from_toml_str(text: &str) -> CoreResult<Self> {
        let mut prefs = Self::default();
        for (key, value) in parse_table(text, Path::new("<inline>"))? {
            prefs.values.insert(key, value);
        }
        Ok(prefs)
    }

    /// Overlays the table in `path`.
    ///
    /// With `define` set, new keys are added; otherwise unknown keys are
    /// skipped.
    fn merge_file(&mut self, path: &Path, define: bool) -> CoreResult<()> {
        let text = fs::read_to_string(path).map_err(|source| CoreError::PreferenceIo {
            path: path.to_path_buf(),
            source,
        })?;

        for (key, value) in parse_table(&text, path)? {
            if define {
                self.values.insert(key, value);
            } else if !self.set(&key, &value) {
                tracing::warn!("Ignoring unknown preference {} in {}", key, path.display());
            }
        }
        Ok(())
    }

    /// Value of `key`, if defined.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Changes an existing preference.
    ///
    /// Returns `false` and leaves the map untouched if `key` is unknown.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        match self.values.get_mut(key) {
            Some(slot) => {
                value.clone_into(slot);
                true
            }
            None => false,
        }
    }

    /// Number of preferences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no preferences are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates preferences in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serializes the map as a TOML table of strings.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedPreferences`] if serialization fails.
    pub fn to_toml_string(&self) -> CoreResult<String> {
        toml::to_string(&self.values).map_err(|e| CoreError::MalformedPreferences {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })
    }

    /// Writes the map to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PreferenceIo`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let text = self.to_toml_string()?;
        let io_error = |source| CoreError::PreferenceIo {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(path, text).map_err(io_error)
    }
}

/// Parses a flat TOML table, stringifying scalar values.
fn parse_table(text: &str, path: &Path) -> CoreResult<Vec<(String, String)>> {
    let malformed = |reason: String| CoreError::MalformedPreferences {
        path: path.to_path_buf(),
        reason,
    };

    let table: toml::Table = text.parse().map_err(|e: toml::de::Error| malformed(e.to_string()))?;

    table
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => return Err(malformed(format!("{key} is not a scalar: {other}"))),
            };
            Ok((key, text))
        })
        .collect()
}
