//! Recursive discovery and classification of dropped files.
//!
//! One scan pass walks a watched folder, ingests every `*.torrent` and
//! `*.magnet` file it can, defers unparsable descriptors to the retry ledger,
//! and — for recursive watches — descends into sub-directories that are not
//! themselves separately watched folders.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::retry::RetryLedger;
use super::IngestEvent;
use crate::params::{AddTorrentParams, WatchedFolderOptions};
use crate::parse::TorrentParser;
use crate::paths;

/// Extension of torrent descriptor files.
pub const TORRENT_FILE_EXTENSION: &str = "torrent";

/// Extension of magnet-list files (one magnet link per line).
pub const MAGNET_FILE_EXTENSION: &str = "magnet";

/// Shared references for one scan pass. The folder configuration itself is
/// passed by value-copy alongside, so a concurrent update cannot affect an
/// in-flight scan.
pub(crate) struct ScanEnv<'a> {
    pub parser: &'a dyn TorrentParser,
    pub events: &'a UnboundedSender<IngestEvent>,
    /// All currently watched folders, consulted for the shadowing rule.
    pub watched: &'a HashMap<PathBuf, WatchedFolderOptions>,
}

/// Scans `dir` (a directory at or under the watched `root`) for drop files.
///
/// Files are processed in directory-listing order. Sub-directories that are
/// themselves registered watched folders manage themselves and are skipped.
pub(crate) fn scan_folder(
    env: &ScanEnv<'_>,
    dir: &Path,
    root: &Path,
    options: &WatchedFolderOptions,
    ledger: &mut RetryLedger,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(folder = %dir.display(), error = %err, "failed to list watched folder");
            return;
        }
    };

    let params = effective_params(options, dir, root);
    let mut subdirs = Vec::new();

    for entry in entries {
        let Ok(entry) = entry else {
            continue;
        };
        let path = entry.path();

        if path.is_dir() {
            subdirs.push(path);
            continue;
        }
        if !path.is_file() {
            continue;
        }

        match path.extension().and_then(OsStr::to_str) {
            Some(MAGNET_FILE_EXTENSION) => ingest_magnet_list(env, &path, &params),
            Some(TORRENT_FILE_EXTENSION) => ingest_descriptor(env, &path, &params, root, ledger),
            _ => {}
        }
    }

    if options.recursive {
        for subdir in subdirs {
            let subdir = paths::clean_path(&subdir);
            // An explicitly watched sub-folder manages itself and must not
            // be double-processed by the parent's recursive walk.
            if env.watched.contains_key(&subdir) {
                continue;
            }
            scan_folder(env, &subdir, root, options, ledger);
        }
    }
}

/// Computes the add-time options effective for files found in `dir`: the
/// configured options, with the save path extended by `dir`'s relative path
/// under `root` when scanning a sub-directory.
pub(crate) fn effective_params(
    options: &WatchedFolderOptions,
    dir: &Path,
    root: &Path,
) -> AddTorrentParams {
    let mut params = options.add_torrent_params.clone();
    if dir != root
        && let Ok(subdir) = dir.strip_prefix(root)
    {
        params.save_path = paths::clean_path(&params.save_path.join(subdir));
    }
    params
}

/// Drains a magnet-list file: every non-empty line is parsed and emitted on
/// success; malformed lines are dropped with a debug log (magnet text has no
/// partial-write ambiguity, so there is nothing to retry). The file is
/// deleted once fully consumed. An open failure leaves the file untouched.
fn ingest_magnet_list(env: &ScanEnv<'_>, path: &Path, params: &AddTorrentParams) {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "failed to open magnet file");
            return;
        }
    };

    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(file = %path.display(), error = %err, "failed to read magnet file");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match env.parser.parse_magnet_line(line) {
            Ok(magnet) => emit(
                env.events,
                IngestEvent::MagnetReady {
                    magnet,
                    params: params.clone(),
                },
            ),
            Err(err) => debug!(file = %path.display(), error = %err, "skipping malformed magnet line"),
        }
    }

    remove_drop_file(path);
}

/// Attempts to ingest a descriptor file: emit and delete on success, defer
/// to the retry ledger on failure (the file may still be mid-write).
fn ingest_descriptor(
    env: &ScanEnv<'_>,
    path: &Path,
    params: &AddTorrentParams,
    root: &Path,
    ledger: &mut RetryLedger,
) {
    match env.parser.parse_torrent_file(path) {
        Ok(info) => {
            emit(
                env.events,
                IngestEvent::TorrentReady {
                    info,
                    params: params.clone(),
                },
            );
            remove_drop_file(path);
        }
        Err(err) => {
            if ledger.record_failure(root, path) {
                debug!(
                    file = %path.display(),
                    error = %err,
                    "deferring unparsable torrent file for retry"
                );
            }
        }
    }
}

/// Forwards an ingest event to the downstream consumer.
pub(crate) fn emit(events: &UnboundedSender<IngestEvent>, event: IngestEvent) {
    if events.send(event).is_err() {
        debug!("ingest event receiver dropped");
    }
}

/// Deletes an ingested drop file; failure is logged, not propagated
/// (re-scanning an undeleted file is idempotent downstream).
pub(crate) fn remove_drop_file(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!(file = %path.display(), error = %err, "failed to remove ingested file");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use tempfile::TempDir;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use crate::parse::{MagnetUri, ParseError, TorrentInfo};

    /// Parser accepting well-framed descriptors and `magnet:`-prefixed lines.
    struct StubParser;

    impl TorrentParser for StubParser {
        fn parse_torrent_file(&self, path: &Path) -> Result<TorrentInfo, ParseError> {
            let data = fs::read(path).map_err(|err| ParseError::read(path, err))?;
            if data.starts_with(b"d") && data.ends_with(b"e") {
                Ok(TorrentInfo::new(data))
            } else {
                Err(ParseError::invalid_descriptor(path))
            }
        }

        fn parse_magnet_line(&self, line: &str) -> Result<MagnetUri, ParseError> {
            if line.starts_with("magnet:") {
                Ok(MagnetUri::new(line))
            } else {
                Err(ParseError::invalid_magnet(line))
            }
        }
    }

    struct Fixture {
        tmp: TempDir,
        events: UnboundedReceiver<IngestEvent>,
        tx: mpsc::UnboundedSender<IngestEvent>,
        watched: HashMap<PathBuf, WatchedFolderOptions>,
        ledger: RetryLedger,
    }

    impl Fixture {
        fn new() -> Self {
            let (tx, events) = mpsc::unbounded_channel();
            Self {
                tmp: TempDir::new().unwrap(),
                events,
                tx,
                watched: HashMap::new(),
                ledger: RetryLedger::new(5),
            }
        }

        fn scan(&mut self, options: &WatchedFolderOptions) {
            let env = ScanEnv {
                parser: &StubParser,
                events: &self.tx,
                watched: &self.watched,
            };
            let root = self.tmp.path().to_path_buf();
            scan_folder(&env, &root, &root, options, &mut self.ledger);
        }

        fn drain(&mut self) -> Vec<IngestEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }
    }

    fn options(save_path: &str, recursive: bool) -> WatchedFolderOptions {
        let mut options = WatchedFolderOptions::default();
        options.add_torrent_params.save_path = PathBuf::from(save_path);
        options.recursive = recursive;
        options
    }

    // ==================== Descriptor files ====================

    #[test]
    fn test_valid_descriptor_emitted_and_deleted() {
        let mut fx = Fixture::new();
        let file = fx.tmp.path().join("drop.torrent");
        fs::write(&file, b"d4:name4:teste").unwrap();

        fx.scan(&options("/dst", false));

        let events = fx.drain();
        assert_eq!(events.len(), 1);
        match &events[0] {
            IngestEvent::TorrentReady { params, .. } => {
                assert_eq!(params.save_path, PathBuf::from("/dst"));
            }
            other => panic!("expected TorrentReady, got {other:?}"),
        }
        assert!(!file.exists());
    }

    #[test]
    fn test_failed_descriptor_deferred_not_deleted() {
        let mut fx = Fixture::new();
        let file = fx.tmp.path().join("partial.torrent");
        fs::write(&file, b"d4:name4:tes").unwrap();

        fx.scan(&options("/dst", false));

        assert!(fx.drain().is_empty());
        assert!(file.exists(), "failed descriptor must be left on disk");
        let root = fx.tmp.path().to_path_buf();
        assert!(fx.ledger.contains(&root, &file));
    }

    #[test]
    fn test_rescan_of_deferred_file_is_noop() {
        let mut fx = Fixture::new();
        let file = fx.tmp.path().join("partial.torrent");
        fs::write(&file, b"x").unwrap();
        let opts = options("/dst", false);

        fx.scan(&opts);
        fx.scan(&opts);

        assert!(fx.drain().is_empty());
        let root = fx.tmp.path().to_path_buf();
        assert!(fx.ledger.contains(&root, &file));
    }

    #[test]
    fn test_unrelated_files_ignored() {
        let mut fx = Fixture::new();
        fs::write(fx.tmp.path().join("readme.txt"), b"hello").unwrap();
        fs::write(fx.tmp.path().join("notes"), b"hello").unwrap();

        fx.scan(&options("/dst", false));

        assert!(fx.drain().is_empty());
        assert!(fx.ledger.is_empty());
    }

    // ==================== Magnet-list files ====================

    #[test]
    fn test_magnet_list_emits_valid_lines_and_deletes_file() {
        let mut fx = Fixture::new();
        let file = fx.tmp.path().join("links.magnet");
        fs::write(
            &file,
            "magnet:?xt=urn:btih:aaa\nthis is not a magnet\n\nmagnet:?xt=urn:btih:bbb\n",
        )
        .unwrap();

        fx.scan(&options("/dst", false));

        let events = fx.drain();
        assert_eq!(events.len(), 2, "one event per valid line");
        for event in &events {
            assert!(matches!(event, IngestEvent::MagnetReady { .. }));
        }
        assert!(!file.exists(), "file is deleted despite the malformed line");
    }

    #[test]
    fn test_magnet_lines_emitted_in_file_order() {
        let mut fx = Fixture::new();
        let file = fx.tmp.path().join("links.magnet");
        fs::write(&file, "magnet:?xt=urn:btih:first\nmagnet:?xt=urn:btih:second\n").unwrap();

        fx.scan(&options("/dst", false));

        let events = fx.drain();
        let uris: Vec<&str> = events
            .iter()
            .map(|event| match event {
                IngestEvent::MagnetReady { magnet, .. } => magnet.as_str(),
                other => panic!("expected MagnetReady, got {other:?}"),
            })
            .collect();
        assert_eq!(
            uris,
            ["magnet:?xt=urn:btih:first", "magnet:?xt=urn:btih:second"]
        );
    }

    // ==================== Recursion & save-path remap ====================

    #[test]
    fn test_subdirectory_save_path_remapped() {
        let mut fx = Fixture::new();
        let subdir = fx.tmp.path().join("season-1");
        fs::create_dir(&subdir).unwrap();
        fs::write(subdir.join("ep.torrent"), b"d4:name4:teste").unwrap();

        fx.scan(&options("/dst", true));

        let events = fx.drain();
        assert_eq!(events.len(), 1);
        match &events[0] {
            IngestEvent::TorrentReady { params, .. } => {
                assert_eq!(params.save_path, PathBuf::from("/dst/season-1"));
            }
            other => panic!("expected TorrentReady, got {other:?}"),
        }
    }

    #[test]
    fn test_non_recursive_scan_skips_subdirectories() {
        let mut fx = Fixture::new();
        let subdir = fx.tmp.path().join("nested");
        fs::create_dir(&subdir).unwrap();
        let file = subdir.join("drop.torrent");
        fs::write(&file, b"d4:name4:teste").unwrap();

        fx.scan(&options("/dst", false));

        assert!(fx.drain().is_empty());
        assert!(file.exists());
    }

    #[test]
    fn test_watched_subfolder_shadowed_from_parent_scan() {
        let mut fx = Fixture::new();
        let subdir = fx.tmp.path().join("managed");
        fs::create_dir(&subdir).unwrap();
        let file = subdir.join("drop.torrent");
        fs::write(&file, b"d4:name4:teste").unwrap();

        // The sub-folder is separately registered: the parent's recursive
        // walk must not process it.
        fx.watched
            .insert(paths::clean_path(&subdir), options("/other", false));

        fx.scan(&options("/dst", true));

        assert!(fx.drain().is_empty());
        assert!(file.exists());
    }

    #[test]
    fn test_effective_params_at_root_unchanged() {
        let opts = options("/dst", true);
        let params = effective_params(&opts, Path::new("/watch"), Path::new("/watch"));
        assert_eq!(params.save_path, PathBuf::from("/dst"));
    }

    #[test]
    fn test_effective_params_nested_subdir() {
        let opts = options("/dst", true);
        let params = effective_params(&opts, Path::new("/watch/a/b"), Path::new("/watch"));
        assert_eq!(params.save_path, PathBuf::from("/dst/a/b"));
    }
}
