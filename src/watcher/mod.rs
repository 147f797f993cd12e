//! Watched-folder ingestion service.
//!
//! [`FolderWatchService`] is the public entry point: it loads the persisted
//! folder configuration, spawns the dispatcher task, and hands back a stream
//! of [`IngestEvent`]s. Configuration changes go through the service (which
//! persists them) and are forwarded to the dispatcher over a command channel,
//! so no locks are shared between the caller and the monitoring task.

mod retry;
mod scanner;
mod worker;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::params::{AddTorrentParams, WatchedFolderOptions};
use crate::parse::{MagnetUri, TorrentInfo, TorrentParser};
use crate::paths::InvalidPathError;
use crate::registry::WatchedFolderRegistry;
use crate::{mounts, paths};

pub use retry::REJECTED_FILE_SUFFIX;
pub use scanner::{MAGNET_FILE_EXTENSION, TORRENT_FILE_EXTENSION};

use worker::Worker;

/// A successfully ingested drop file, ready to be handed to a torrent
/// session.
#[derive(Debug)]
pub enum IngestEvent {
    /// One magnet link from a magnet-list file.
    MagnetReady {
        magnet: MagnetUri,
        params: AddTorrentParams,
    },
    /// A parsed torrent descriptor file.
    TorrentReady {
        info: TorrentInfo,
        params: AddTorrentParams,
    },
}

/// Instructions from the service facade to the dispatcher task.
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    SetFolder {
        path: PathBuf,
        options: WatchedFolderOptions,
    },
    RemoveFolder {
        path: PathBuf,
    },
    Shutdown,
}

/// Dispatcher tunables. The defaults match production behavior; tests shrink
/// the intervals and substitute the filesystem probe.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    /// Interval between scan passes over poll-monitored folders.
    pub poll_interval: Duration,
    /// Quiet period between a change notification and the folder scan.
    pub debounce_delay: Duration,
    /// Interval between retry sweeps over deferred descriptor files.
    pub retry_interval: Duration,
    /// Parse attempts after the initial failure before a file is rejected.
    pub max_parse_retries: u32,
    /// Probe deciding whether a folder sits on a network filesystem.
    pub network_fs_probe: fn(&Path) -> bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            debounce_delay: Duration::from_millis(2000),
            retry_interval: Duration::from_secs(10),
            max_parse_retries: 5,
            network_fs_probe: mounts::is_network_filesystem,
        }
    }
}

/// Handle to the folder watch subsystem.
///
/// Owns the persisted registry and the dispatcher task. Dropping the handle
/// closes the command channel, which stops the task; [`shutdown`] does the
/// same but waits for it to finish.
///
/// [`shutdown`]: FolderWatchService::shutdown
pub struct FolderWatchService {
    registry: WatchedFolderRegistry,
    commands: UnboundedSender<WorkerCommand>,
    worker: JoinHandle<()>,
}

impl FolderWatchService {
    /// Starts the service with default [`WatchOptions`], restoring all
    /// folders persisted under `conf_dir`.
    ///
    /// Returns the service handle and the ingest event stream.
    pub fn spawn(
        conf_dir: impl Into<PathBuf>,
        parser: Arc<dyn TorrentParser>,
    ) -> (Self, UnboundedReceiver<IngestEvent>) {
        Self::spawn_with_options(conf_dir, parser, WatchOptions::default())
    }

    /// Starts the service with explicit tunables.
    pub fn spawn_with_options(
        conf_dir: impl Into<PathBuf>,
        parser: Arc<dyn TorrentParser>,
        options: WatchOptions,
    ) -> (Self, UnboundedReceiver<IngestEvent>) {
        let registry = WatchedFolderRegistry::load(conf_dir);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(Worker::new(options, parser, event_tx).run(command_rx));

        let service = Self {
            registry,
            commands: command_tx,
            worker,
        };

        let folders = service.registry.folders();
        if !folders.is_empty() {
            info!(count = folders.len(), "restoring persisted watched folders");
        }
        for (path, folder_options) in folders {
            service.send(WorkerCommand::SetFolder {
                path,
                options: folder_options,
            });
        }

        (service, event_rx)
    }

    /// Registers a watched folder or reconfigures an existing one. The
    /// change is persisted before the dispatcher is told about it.
    ///
    /// Returns the normalized path under which the folder is registered.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPathError`] if the path is empty or relative.
    pub fn set_watched_folder(
        &mut self,
        path: &Path,
        options: WatchedFolderOptions,
    ) -> Result<PathBuf, InvalidPathError> {
        let path = self.registry.set(path, options.clone())?;
        self.send(WorkerCommand::SetFolder {
            path: path.clone(),
            options,
        });
        Ok(path)
    }

    /// Unregisters a watched folder. Removing a folder that is not watched
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPathError`] if the path is empty or relative.
    pub fn remove_watched_folder(&mut self, path: &Path) -> Result<(), InvalidPathError> {
        if let Some((path, _)) = self.registry.remove(path)? {
            self.send(WorkerCommand::RemoveFolder { path });
        }
        Ok(())
    }

    /// Snapshot of the current watched-folder configuration.
    #[must_use]
    pub fn folders(&self) -> BTreeMap<PathBuf, WatchedFolderOptions> {
        self.registry.folders()
    }

    /// Returns `true` if `path` normalizes to a registered watched folder.
    #[must_use]
    pub fn is_watched(&self, path: &Path) -> bool {
        paths::clean_watch_path(path)
            .is_ok_and(|path| self.registry.contains(&path))
    }

    /// Stops the dispatcher task and waits for it to finish. Pending
    /// debounced scans and retry sweeps are abandoned; the on-disk
    /// configuration is already persisted.
    pub async fn shutdown(self) {
        self.send(WorkerCommand::Shutdown);
        if self.worker.await.is_err() {
            debug!("folder watch worker ended abnormally");
        }
    }

    fn send(&self, command: WorkerCommand) {
        if self.commands.send(command).is_err() {
            debug!("folder watch worker is gone, dropping command");
        }
    }
}
