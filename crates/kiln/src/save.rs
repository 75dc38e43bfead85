//! # Save Store
//!
//! Two-phase save protocol over a base directory:
//!
//! ```text
//!   <base>/
//!   ├── __slot one/      pending: begin_save wrote it, complete_save not yet
//!   │   ├── state.toml
//!   │   └── data/
//!   └── slot one/        committed
//!       ├── state.toml
//!       └── data/
//! ```
//!
//! `begin_save` stages into the `__` directory and the module writes its
//! files into `data/`. `complete_save` moves the committed save aside to
//! `__<name>.old`, renames the staging directory into place and only then
//! deletes the old copy. A commit interrupted between the two renames is
//! rolled back when the store is next opened.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{SaveError, SaveResult};

/// Marks a staging directory.
pub const PENDING_SAVE_PREFIX: &str = "__";

/// State file inside each save directory.
pub const STATE_FILE: &str = "state.toml";

/// Module data directory inside each save directory.
pub const DATA_DIR: &str = "data";

/// Suffix of a committed save moved aside during a commit. Not a valid save
/// name character, so it never collides with a staging directory.
const RETIRED_SUFFIX: &str = ".old";

/// Serialized save header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveState {
    /// Game that wrote the save.
    pub game_uid: String,
    /// Game version that wrote the save.
    pub game_version: String,
    /// Free-form values recorded by the game.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A staged save awaiting [`SaveStore::complete_save`].
#[derive(Debug, Clone)]
pub struct PendingSave {
    name: String,
    data_dir: PathBuf,
}

impl PendingSave {
    /// Save name.
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory the module writes its save files into.
    #[must_use]
    #[inline]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Save slots under one base directory.
#[derive(Debug)]
pub struct SaveStore {
    base: PathBuf,
    game_uid: String,
    game_version: String,
    /// Built on first use, then kept in step with commits and removals.
    saves: Mutex<Option<Vec<String>>>,
}

impl SaveStore {
    /// Opens the store at `base`, creating the directory if needed and
    /// rolling back commits that were interrupted.
    ///
    /// # Errors
    ///
    /// [`SaveError::Io`] if the directory cannot be created or an
    /// interrupted commit cannot be rolled back.
    pub fn new(
        base: impl Into<PathBuf>,
        game_uid: impl Into<String>,
        game_version: impl Into<String>,
    ) -> SaveResult<Self> {
        let base = base.into();
        fs::create_dir_all(&base).map_err(|e| SaveError::io(&base, e))?;
        recover_retired(&base)?;
        Ok(Self {
            base,
            game_uid: game_uid.into(),
            game_version: game_version.into(),
            saves: Mutex::new(None),
        })
    }

    /// Base directory.
    #[must_use]
    #[inline]
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    /// Stages a save: creates `__<name>/data/` and writes the state file.
    /// A stale staging directory from an earlier attempt is discarded.
    ///
    /// # Errors
    ///
    /// - [`SaveError::InvalidSaveName`] before touching the disk
    /// - [`SaveError::Io`] / [`SaveError::InvalidState`] on write failure
    pub fn begin_save(&self, name: &str) -> SaveResult<PendingSave> {
        self.begin_save_with(name, BTreeMap::new())
    }

    /// [`SaveStore::begin_save`] with extra metadata in the state file.
    ///
    /// # Errors
    ///
    /// As [`SaveStore::begin_save`].
    pub fn begin_save_with(
        &self,
        name: &str,
        metadata: BTreeMap<String, String>,
    ) -> SaveResult<PendingSave> {
        validate_name(name)?;

        let pending = self.pending_dir(name);
        if pending.exists() {
            fs::remove_dir_all(&pending).map_err(|e| SaveError::io(&pending, e))?;
        }
        let data_dir = pending.join(DATA_DIR);
        fs::create_dir_all(&data_dir).map_err(|e| SaveError::io(&data_dir, e))?;

        let state = SaveState {
            game_uid: self.game_uid.clone(),
            game_version: self.game_version.clone(),
            metadata,
        };
        let state_path = pending.join(STATE_FILE);
        let text = toml::to_string(&state).map_err(|e| SaveError::InvalidState {
            path: state_path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&state_path, text).map_err(|e| SaveError::io(&state_path, e))?;

        tracing::debug!("Staged save {name:?} at {}", pending.display());
        Ok(PendingSave {
            name: name.to_owned(),
            data_dir,
        })
    }

    /// Commits a staged save over any previous save with the same name.
    ///
    /// # Errors
    ///
    /// - [`SaveError::InvalidSaveName`]
    /// - [`SaveError::NoPendingSave`] if nothing is staged; nothing changes
    /// - [`SaveError::Io`] if a rename fails; the previous save is kept
    pub fn complete_save(&self, name: &str) -> SaveResult<()> {
        validate_name(name)?;

        let pending = self.pending_dir(name);
        if !pending.is_dir() {
            return Err(SaveError::NoPendingSave(name.to_owned()));
        }

        let committed = self.committed_dir(name);
        let retired = self.retired_dir(name);
        commit_dir(&pending, &committed, &retired, |from, to| fs::rename(from, to))?;

        // An unscanned list picks the new directory up on its first scan.
        if let Some(list) = self.saves.lock().as_mut() {
            if !list.iter().any(|s| s == name) {
                list.push(name.to_owned());
            }
        }

        tracing::info!("Committed save {name:?}");
        Ok(())
    }

    /// Copies the committed state file into `buffer`, returning its length.
    ///
    /// Pass an empty buffer to learn the required size.
    ///
    /// # Errors
    ///
    /// - [`SaveError::NotFound`] if no committed save has this name
    /// - [`SaveError::BufferTooSmall`] with the required size; `buffer` is
    ///   left untouched
    pub fn load(&self, name: &str, buffer: &mut [u8]) -> SaveResult<usize> {
        validate_name(name)?;
        let state_path = self.committed_dir(name).join(STATE_FILE);
        if !state_path.is_file() {
            return Err(SaveError::NotFound(name.to_owned()));
        }

        let bytes = fs::read(&state_path).map_err(|e| SaveError::io(&state_path, e))?;
        if buffer.len() < bytes.len() {
            return Err(SaveError::BufferTooSmall {
                required: bytes.len(),
            });
        }
        buffer[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Parses the committed state file.
    ///
    /// # Errors
    ///
    /// [`SaveError::NotFound`] or [`SaveError::InvalidState`].
    pub fn load_state(&self, name: &str) -> SaveResult<SaveState> {
        validate_name(name)?;
        let state_path = self.committed_dir(name).join(STATE_FILE);
        let text = fs::read_to_string(&state_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SaveError::NotFound(name.to_owned()),
            _ => SaveError::io(&state_path, e),
        })?;
        toml::from_str(&text).map_err(|e| SaveError::InvalidState {
            path: state_path,
            reason: e.to_string(),
        })
    }

    /// Data directory of a committed save.
    ///
    /// # Errors
    ///
    /// [`SaveError::InvalidSaveName`] or [`SaveError::NotFound`].
    pub fn data_dir(&self, name: &str) -> SaveResult<PathBuf> {
        validate_name(name)?;
        let dir = self.committed_dir(name).join(DATA_DIR);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(SaveError::NotFound(name.to_owned()))
        }
    }

    /// Deletes a save, committed and staged.
    ///
    /// # Errors
    ///
    /// [`SaveError::NotFound`] if neither exists, or [`SaveError::Io`].
    pub fn remove_save(&self, name: &str) -> SaveResult<()> {
        validate_name(name)?;
        let mut removed = false;
        for dir in [self.committed_dir(name), self.pending_dir(name)] {
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| SaveError::io(&dir, e))?;
                removed = true;
            }
        }
        if !removed {
            return Err(SaveError::NotFound(name.to_owned()));
        }

        if let Some(list) = self.saves.lock().as_mut() {
            list.retain(|s| s != name);
        }
        tracing::info!("Removed save {name:?}");
        Ok(())
    }

    /// Committed save names. The directory is scanned on the first call
    /// only; later calls see commits and removals made through this store.
    ///
    /// # Errors
    ///
    /// [`SaveError::Io`] if the first scan fails.
    pub fn saves(&self) -> SaveResult<Vec<String>> {
        let mut saves = self.saves.lock();
        Ok(self.ensure_scanned(&mut saves)?.clone())
    }

    fn ensure_scanned<'a>(&self, saves: &'a mut Option<Vec<String>>) -> SaveResult<&'a mut Vec<String>> {
        if saves.is_none() {
            *saves = Some(self.scan()?);
        }
        Ok(saves.get_or_insert_with(Vec::new))
    }

    fn scan(&self) -> SaveResult<Vec<String>> {
        let entries = fs::read_dir(&self.base).map_err(|e| SaveError::io(&self.base, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SaveError::io(&self.base, e))?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with(PENDING_SAVE_PREFIX) {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();
        tracing::debug!("Scanned {} saves in {}", names.len(), self.base.display());
        Ok(names)
    }

    fn pending_dir(&self, name: &str) -> PathBuf {
        self.base.join(format!("{PENDING_SAVE_PREFIX}{name}"))
    }

    fn committed_dir(&self, name: &str) -> PathBuf {
        self.base.join(name)
    }

    fn retired_dir(&self, name: &str) -> PathBuf {
        self.base.join(format!("{PENDING_SAVE_PREFIX}{name}{RETIRED_SUFFIX}"))
    }
}

/// Swaps `pending` in as `committed`. The previous committed directory is
/// parked at `retired` until the new one is in place, and put back if the
/// second rename fails.
fn commit_dir<R>(pending: &Path, committed: &Path, retired: &Path, rename: R) -> SaveResult<()>
where
    R: Fn(&Path, &Path) -> io::Result<()>,
{
    if retired.exists() {
        fs::remove_dir_all(retired).map_err(|e| SaveError::io(retired, e))?;
    }

    let had_previous = committed.exists();
    if had_previous {
        rename(committed, retired).map_err(|e| SaveError::io(committed, e))?;
    }

    if let Err(e) = rename(pending, committed) {
        if had_previous {
            if let Err(restore) = rename(retired, committed) {
                tracing::error!(
                    "Previous save left at {} ({restore})",
                    retired.display()
                );
            }
        }
        return Err(SaveError::io(pending, e));
    }

    if had_previous {
        if let Err(e) = fs::remove_dir_all(retired) {
            tracing::warn!("Could not delete {}: {e}", retired.display());
        }
    }
    Ok(())
}

/// Puts back saves parked by a commit that never finished, and deletes the
/// parked copies of commits that did.
fn recover_retired(base: &Path) -> SaveResult<()> {
    let entries = fs::read_dir(base).map_err(|e| SaveError::io(base, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| SaveError::io(base, e))?;
        let file_name = entry.file_name();
        let Some(name) = file_name
            .to_str()
            .and_then(|n| n.strip_prefix(PENDING_SAVE_PREFIX))
            .and_then(|n| n.strip_suffix(RETIRED_SUFFIX))
        else {
            continue;
        };
        if validate_name(name).is_err() {
            continue;
        }

        let retired = entry.path();
        let committed = base.join(name);
        if committed.exists() {
            fs::remove_dir_all(&retired).map_err(|e| SaveError::io(&retired, e))?;
        } else {
            fs::rename(&retired, &committed).map_err(|e| SaveError::io(&retired, e))?;
            tracing::warn!("Restored save {name:?} from an interrupted commit");
        }
    }
    Ok(())
}

/// Accepts non-empty names of ASCII alphanumerics and spaces.
///
/// # Errors
///
/// [`SaveError::InvalidSaveName`] otherwise.
pub fn validate_name(name: &str) -> SaveResult<()> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ');
    if valid {
        Ok(())
    } else {
        Err(SaveError::InvalidSaveName(name.to_owned()))
    }
}
