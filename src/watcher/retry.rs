//! Bounded-retry bookkeeping for descriptor files that failed to parse.
//!
//! A torrent file dropped into a watched folder can be observed mid-write, so
//! a parse failure is presumed transient until proven otherwise by repeated
//! failure. Failed files enter the ledger with a zeroed counter; each sweep
//! re-attempts the parse and either emits the result, drops a vanished entry,
//! increments the counter, or — once the ceiling is reached — renames the
//! file with a rejection suffix and gives up for good.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::scanner;
use super::IngestEvent;
use crate::params::WatchedFolderOptions;
use crate::parse::TorrentParser;

/// Suffix appended (via rename) to files that exhausted their retry budget.
/// A terminal, user-visible failure marker left on disk.
pub const REJECTED_FILE_SUFFIX: &str = ".qbt_rejected";

/// Per-folder, per-file retry counters for deferred descriptor files.
///
/// Keyed by the watched root folder, so sweep-time option lookups always
/// resolve to the registered configuration even for files found deep inside
/// a recursive watch.
#[derive(Debug)]
pub(crate) struct RetryLedger {
    max_retries: u32,
    entries: HashMap<PathBuf, HashMap<PathBuf, u32>>,
}

impl RetryLedger {
    pub(crate) fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            entries: HashMap::new(),
        }
    }

    /// Records a scan-time parse failure. The counter starts at zero and is
    /// only created once: re-scanning an already-deferred file is a no-op.
    /// Returns `true` if the entry is new.
    pub(crate) fn record_failure(&mut self, root: &Path, file: &Path) -> bool {
        let files = self.entries.entry(root.to_path_buf()).or_default();
        if files.contains_key(file) {
            return false;
        }
        files.insert(file.to_path_buf(), 0);
        true
    }

    /// Discards all deferred files under a removed watched folder.
    pub(crate) fn remove_folder(&mut self, root: &Path) {
        self.entries.remove(root);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, root: &Path, file: &Path) -> bool {
        self.entries
            .get(root)
            .is_some_and(|files| files.contains_key(file))
    }

    /// One retry pass over every deferred file.
    ///
    /// For each entry: vanished files are dropped; a successful parse is
    /// emitted with the effective save path recomputed from the file's
    /// current parent directory, then the source file is deleted; a failure
    /// at or past the ceiling renames the file with
    /// [`REJECTED_FILE_SUFFIX`] and drops the entry; any other failure
    /// increments the counter.
    pub(crate) fn sweep(
        &mut self,
        parser: &dyn TorrentParser,
        events: &UnboundedSender<IngestEvent>,
        watched: &HashMap<PathBuf, WatchedFolderOptions>,
    ) {
        let max_retries = self.max_retries;
        self.entries.retain(|root, files| {
            // The folder was unwatched while a sweep was pending.
            let Some(options) = watched.get(root) else {
                return false;
            };

            files.retain(|file, attempts| {
                retry_file(parser, events, options, root, file, attempts, max_retries)
            });

            !files.is_empty()
        });
    }
}

/// Returns `true` if the entry should stay in the ledger.
fn retry_file(
    parser: &dyn TorrentParser,
    events: &UnboundedSender<IngestEvent>,
    options: &WatchedFolderOptions,
    root: &Path,
    file: &Path,
    attempts: &mut u32,
    max_retries: u32,
) -> bool {
    if !file.exists() {
        debug!(file = %file.display(), "deferred torrent file vanished, dropping entry");
        return false;
    }

    match parser.parse_torrent_file(file) {
        Ok(info) => {
            let dir = file.parent().unwrap_or(root);
            let params = scanner::effective_params(options, dir, root);
            scanner::emit(events, IngestEvent::TorrentReady { info, params });
            scanner::remove_drop_file(file);
            false
        }
        Err(err) if *attempts >= max_retries => {
            warn!(
                file = %file.display(),
                error = %err,
                "rejecting torrent file that repeatedly failed to parse"
            );
            reject_file(file);
            false
        }
        Err(_) => {
            *attempts += 1;
            true
        }
    }
}

/// Renames `file` in place, appending the rejection suffix to its name.
fn reject_file(file: &Path) {
    let mut rejected_name = file.file_name().map_or_else(OsString::new, OsString::from);
    rejected_name.push(REJECTED_FILE_SUFFIX);
    let rejected_path = file.with_file_name(rejected_name);
    if let Err(err) = fs::rename(file, &rejected_path) {
        warn!(
            file = %file.display(),
            error = %err,
            "failed to rename rejected torrent file"
        );
    }
}
