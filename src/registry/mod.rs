//! Durable mapping from watched folder path to its configuration.
//!
//! The registry is the single source of truth for watch configuration. Every
//! mutation rewrites the full `watched_folders.json` store; startup reads it
//! back (or migrates the legacy `scan_dirs.json` store once, deleting it
//! afterwards). Store failures are absorbed with a warning — the in-memory
//! state stays authoritative and the subsystem never takes the host down over
//! a bad config file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::params::{AddTorrentParams, WatchedFolderOptions};
use crate::paths::{self, InvalidPathError};

/// File name of the persisted configuration store.
pub const STORE_FILE_NAME: &str = "watched_folders.json";

/// File name of the legacy configuration store, migrated once and deleted.
pub const LEGACY_STORE_FILE_NAME: &str = "scan_dirs.json";

/// Watched-folder configuration registry with whole-file persistence.
///
/// Keys are always absolute, lexically normalized paths; two spellings of the
/// same folder collapse to one entry.
#[derive(Debug)]
pub struct WatchedFolderRegistry {
    conf_dir: PathBuf,
    folders: BTreeMap<PathBuf, WatchedFolderOptions>,
}

impl WatchedFolderRegistry {
    /// Loads the registry from `conf_dir`.
    ///
    /// Missing store: attempts the one-time legacy migration. Unreadable or
    /// malformed store: logs a warning and starts with zero watched folders.
    #[must_use]
    pub fn load(conf_dir: impl Into<PathBuf>) -> Self {
        let mut registry = Self {
            conf_dir: conf_dir.into(),
            folders: BTreeMap::new(),
        };

        let store_path = registry.store_path();
        if !store_path.exists() {
            registry.load_legacy();
            return registry;
        }

        let data = match fs::read(&store_path) {
            Ok(data) => data,
            Err(err) => {
                warn!(
                    path = %store_path.display(),
                    error = %err,
                    "couldn't load watched folders configuration"
                );
                return registry;
            }
        };

        let parsed: BTreeMap<String, WatchedFolderOptions> = match serde_json::from_slice(&data) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    path = %store_path.display(),
                    error = %err,
                    "couldn't parse watched folders configuration"
                );
                return registry;
            }
        };

        for (folder, options) in parsed {
            match paths::clean_watch_path(Path::new(&folder)) {
                Ok(clean) => {
                    registry.folders.insert(clean, options);
                }
                Err(err) => warn!(folder, error = %err, "skipping invalid watched folder entry"),
            }
        }

        registry
    }

    /// Migrates the legacy per-folder scalar store, if present.
    ///
    /// Legacy values: integer `0` means "save into the watched folder itself,
    /// manual path management"; anything else is treated as a literal save
    /// path, also with manual path management. On success the new store is
    /// written and the legacy file deleted.
    fn load_legacy(&mut self) {
        let legacy_path = self.conf_dir.join(LEGACY_STORE_FILE_NAME);
        if !legacy_path.exists() {
            return;
        }

        let entries: BTreeMap<String, Value> = match fs::read(&legacy_path)
            .map_err(|err| err.to_string())
            .and_then(|data| serde_json::from_slice(&data).map_err(|err| err.to_string()))
        {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    path = %legacy_path.display(),
                    error = %err,
                    "couldn't migrate legacy watched folders configuration"
                );
                return;
            }
        };

        for (folder, value) in entries {
            let clean = match paths::clean_watch_path(Path::new(&folder)) {
                Ok(clean) => clean,
                Err(err) => {
                    warn!(folder, error = %err, "skipping invalid legacy watched folder");
                    continue;
                }
            };

            let mut params = AddTorrentParams::default();
            if value == Value::from(0) {
                params.save_path.clone_from(&clean);
            } else {
                params.save_path =
                    PathBuf::from(value.as_str().map_or_else(|| value.to_string(), String::from));
            }
            params.use_auto_tmm = Some(false);

            self.folders.insert(
                clean,
                WatchedFolderOptions {
                    add_torrent_params: params,
                    recursive: false,
                },
            );
        }

        info!(count = self.folders.len(), "migrated legacy watched folders configuration");
        self.store();
        if let Err(err) = fs::remove_file(&legacy_path) {
            warn!(
                path = %legacy_path.display(),
                error = %err,
                "couldn't remove legacy watched folders configuration"
            );
        }
    }

    /// Inserts or updates a watched folder and persists the registry.
    ///
    /// Returns the normalized path that now keys the entry.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPathError`] for empty or relative paths; the registry
    /// is left untouched in that case.
    pub fn set(
        &mut self,
        path: &Path,
        options: WatchedFolderOptions,
    ) -> Result<PathBuf, InvalidPathError> {
        let clean = paths::clean_watch_path(path)?;
        self.folders.insert(clean.clone(), options);
        self.store();
        Ok(clean)
    }

    /// Removes a watched folder and persists the registry.
    ///
    /// Returns the removed entry, or `None` if the path was not watched
    /// (a no-op, logged at debug level).
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPathError`] for empty or relative paths.
    pub fn remove(
        &mut self,
        path: &Path,
    ) -> Result<Option<(PathBuf, WatchedFolderOptions)>, InvalidPathError> {
        let clean = paths::clean_watch_path(path)?;
        match self.folders.remove(&clean) {
            Some(options) => {
                self.store();
                Ok(Some((clean, options)))
            }
            None => {
                debug!(path = %clean.display(), "remove of unwatched folder ignored");
                Ok(None)
            }
        }
    }

    /// Returns a snapshot of all watched folders.
    #[must_use]
    pub fn folders(&self) -> BTreeMap<PathBuf, WatchedFolderOptions> {
        self.folders.clone()
    }

    /// Returns `true` if `path` (already normalized) is registered.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.folders.contains_key(path)
    }

    fn store_path(&self) -> PathBuf {
        self.conf_dir.join(STORE_FILE_NAME)
    }

    /// Writes the whole registry to disk. Failure is logged, not propagated:
    /// the in-memory state remains authoritative until the next mutation
    /// retries the write.
    fn store(&self) {
        let serializable: BTreeMap<String, &WatchedFolderOptions> = self
            .folders
            .iter()
            .map(|(path, options)| (path.display().to_string(), options))
            .collect();

        let store_path = self.store_path();
        let result = serde_json::to_vec_pretty(&serializable)
            .map_err(|err| err.to_string())
            .and_then(|data| fs::write(&store_path, data).map_err(|err| err.to_string()));

        if let Err(err) = result {
            warn!(
                path = %store_path.display(),
                error = %err,
                "couldn't store watched folders configuration"
            );
        }
    }
}
