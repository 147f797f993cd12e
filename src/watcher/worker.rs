//! Monitor dispatcher: the single task that owns all watch state.
//!
//! Each watched folder is monitored in one of two modes. Push mode arms a
//! native filesystem watcher and coalesces change notifications through a
//! debounce queue; poll mode re-scans on a fixed interval. Recursive watches
//! and folders on network filesystems always poll, as do all folders when the
//! native watcher cannot be created. Deferred parse failures are re-attempted
//! on their own timer, which only runs while the retry ledger is non-empty.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::retry::RetryLedger;
use super::scanner::{self, ScanEnv};
use super::{IngestEvent, WatchOptions, WorkerCommand};
use crate::params::WatchedFolderOptions;
use crate::parse::TorrentParser;

/// Returns `true` if a folder must be polled rather than push-monitored.
fn poll_required(recursive: bool, network: bool, push_available: bool) -> bool {
    recursive || network || !push_available
}

/// Pending per-folder scan deadlines. Rapid bursts of change notifications
/// for one folder collapse into a single scan: scheduling a folder that is
/// already pending keeps the earlier deadline.
#[derive(Debug, Default)]
struct DebounceQueue {
    deadlines: BTreeMap<PathBuf, Instant>,
}

impl DebounceQueue {
    fn schedule(&mut self, folder: &Path, deadline: Instant) {
        self.deadlines
            .entry(folder.to_path_buf())
            .and_modify(|existing| {
                if deadline < *existing {
                    *existing = deadline;
                }
            })
            .or_insert(deadline);
    }

    fn remove(&mut self, folder: &Path) {
        self.deadlines.remove(folder);
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Removes and returns every folder whose deadline has passed.
    fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let due: Vec<PathBuf> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(folder, _)| folder.clone())
            .collect();
        for folder in &due {
            self.deadlines.remove(folder);
        }
        due
    }
}

/// The dispatcher task state. Owned exclusively by [`Worker::run`]; the rest
/// of the crate talks to it through [`WorkerCommand`]s.
pub(crate) struct Worker {
    options: WatchOptions,
    parser: Arc<dyn TorrentParser>,
    events: UnboundedSender<IngestEvent>,
    watcher: Option<RecommendedWatcher>,
    watched: HashMap<PathBuf, WatchedFolderOptions>,
    push_watched: HashSet<PathBuf>,
    poll_watched: HashSet<PathBuf>,
    debounce: DebounceQueue,
    retries: RetryLedger,
    next_poll: Option<Instant>,
    next_retry: Option<Instant>,
}

impl Worker {
    pub(crate) fn new(
        options: WatchOptions,
        parser: Arc<dyn TorrentParser>,
        events: UnboundedSender<IngestEvent>,
    ) -> Self {
        let retries = RetryLedger::new(options.max_parse_retries);
        Self {
            options,
            parser,
            events,
            watcher: None,
            watched: HashMap::new(),
            push_watched: HashSet::new(),
            poll_watched: HashSet::new(),
            debounce: DebounceQueue::default(),
            retries,
            next_poll: None,
            next_retry: None,
        }
    }

    /// The dispatcher loop. Runs until a [`WorkerCommand::Shutdown`] arrives
    /// or the command channel closes.
    pub(crate) async fn run(mut self, mut commands: UnboundedReceiver<WorkerCommand>) {
        let (fs_tx, mut fs_rx) = mpsc::unbounded_channel();
        self.watcher = match notify::recommended_watcher(move |result| {
            let _ = fs_tx.send(result);
        }) {
            Ok(watcher) => Some(watcher),
            Err(err) => {
                warn!(error = %err, "native filesystem watcher unavailable, all folders will poll");
                None
            }
        };

        loop {
            let debounce_deadline = self.debounce.next_deadline();
            let poll_deadline = self.next_poll;
            let retry_deadline = self.next_retry;

            tokio::select! {
                command = commands.recv() => match command {
                    Some(WorkerCommand::SetFolder { path, options }) => {
                        self.set_folder(path, options);
                    }
                    Some(WorkerCommand::RemoveFolder { path }) => self.remove_folder(&path),
                    Some(WorkerCommand::Shutdown) | None => break,
                },
                result = fs_rx.recv() => {
                    if let Some(result) = result {
                        self.handle_fs_event(result);
                    }
                }
                () = sleep_until(deadline_or_far(debounce_deadline)),
                    if debounce_deadline.is_some() =>
                {
                    self.run_due_scans();
                }
                () = sleep_until(deadline_or_far(poll_deadline)), if poll_deadline.is_some() => {
                    self.run_poll_pass();
                }
                () = sleep_until(deadline_or_far(retry_deadline)), if retry_deadline.is_some() => {
                    self.run_retry_sweep();
                }
            }
        }

        debug!("folder watch worker stopped");
    }

    /// Registers or reconfigures a watched folder. The monitoring mode is
    /// re-chosen only when the folder is new or its recursive flag changed;
    /// a pure options update (save path, category, ...) keeps the existing
    /// watch untouched.
    fn set_folder(&mut self, path: PathBuf, options: WatchedFolderOptions) {
        let previous = self.watched.insert(path.clone(), options.clone());
        let rearm = match &previous {
            None => true,
            Some(previous) => previous.recursive != options.recursive,
        };

        if rearm {
            self.disable_monitoring(&path);
            self.enable_monitoring(&path, &options);
        }
    }

    fn enable_monitoring(&mut self, path: &Path, options: &WatchedFolderOptions) {
        let network = (self.options.network_fs_probe)(path);
        if network {
            debug!(folder = %path.display(), "folder is on a network filesystem");
        }

        if !poll_required(options.recursive, network, self.watcher.is_some())
            && let Some(watcher) = self.watcher.as_mut()
        {
            match watcher.watch(path, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.push_watched.insert(path.to_path_buf());
                    info!(folder = %path.display(), mode = "push", "watching folder");
                    // Pick up files dropped before the watch was armed, on
                    // the same debounced schedule as a change notification.
                    self.debounce
                        .schedule(path, Instant::now() + self.options.debounce_delay);
                    return;
                }
                Err(err) => {
                    warn!(
                        folder = %path.display(),
                        error = %err,
                        "native watch failed, falling back to polling"
                    );
                }
            }
        }

        self.poll_watched.insert(path.to_path_buf());
        info!(folder = %path.display(), mode = "poll", "watching folder");
        if self.next_poll.is_none() {
            // First pass runs immediately; later passes follow the interval.
            self.next_poll = Some(Instant::now());
        }
    }

    fn disable_monitoring(&mut self, path: &Path) {
        if self.push_watched.remove(path)
            && let Some(watcher) = self.watcher.as_mut()
            && let Err(err) = watcher.unwatch(path)
        {
            debug!(folder = %path.display(), error = %err, "failed to disarm native watch");
        }
        self.poll_watched.remove(path);
        self.debounce.remove(path);
        if self.poll_watched.is_empty() {
            self.next_poll = None;
        }
    }

    /// Unregisters a watched folder, discarding its pending scans and retry
    /// entries. Removing an unknown folder is a no-op.
    fn remove_folder(&mut self, path: &Path) {
        if self.watched.remove(path).is_none() {
            return;
        }
        self.disable_monitoring(path);
        self.retries.remove_folder(path);
        if self.retries.is_empty() {
            self.next_retry = None;
        }
        info!(folder = %path.display(), "stopped watching folder");
    }

    /// Maps a native change notification back to its push-watched folder and
    /// schedules a debounced scan.
    fn handle_fs_event(&mut self, result: notify::Result<Event>) {
        let event = match result {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "filesystem watch error");
                return;
            }
        };

        let deadline = Instant::now() + self.options.debounce_delay;
        for path in &event.paths {
            let folder = if self.push_watched.contains(path.as_path()) {
                Some(path.clone())
            } else {
                path.parent()
                    .filter(|parent| self.push_watched.contains(*parent))
                    .map(Path::to_path_buf)
            };
            if let Some(folder) = folder {
                self.debounce.schedule(&folder, deadline);
            }
        }
    }

    fn run_due_scans(&mut self) {
        for folder in self.debounce.take_due(Instant::now()) {
            self.process_watched_folder(&folder);
        }
        self.arm_retry_timer();
    }

    fn run_poll_pass(&mut self) {
        self.next_poll = Some(Instant::now() + self.options.poll_interval);
        let folders: Vec<PathBuf> = self.poll_watched.iter().cloned().collect();
        for folder in folders {
            self.process_watched_folder(&folder);
        }
        self.arm_retry_timer();
    }

    fn run_retry_sweep(&mut self) {
        self.retries
            .sweep(self.parser.as_ref(), &self.events, &self.watched);
        self.next_retry = if self.retries.is_empty() {
            None
        } else {
            Some(Instant::now() + self.options.retry_interval)
        };
    }

    /// Starts the retry timer if scans left deferred files behind. The timer
    /// stops itself once the ledger drains.
    fn arm_retry_timer(&mut self) {
        if !self.retries.is_empty() && self.next_retry.is_none() {
            self.next_retry = Some(Instant::now() + self.options.retry_interval);
        }
    }

    fn process_watched_folder(&mut self, folder: &Path) {
        let Some(options) = self.watched.get(folder) else {
            return;
        };
        let env = ScanEnv {
            parser: self.parser.as_ref(),
            events: &self.events,
            watched: &self.watched,
        };
        scanner::scan_folder(&env, folder, folder, options, &mut self.retries);
    }
}

/// `sleep_until` argument for a disabled branch; never actually awaited to
/// completion.
fn deadline_or_far(deadline: Option<Instant>) -> Instant {
    deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(60 * 60 * 24))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Mode choice ====================

    #[test]
    fn test_local_flat_folder_uses_push() {
        assert!(!poll_required(false, false, true));
    }

    #[test]
    fn test_recursive_folder_must_poll() {
        assert!(poll_required(true, false, true));
    }

    #[test]
    fn test_network_folder_must_poll() {
        assert!(poll_required(false, true, true));
    }

    #[test]
    fn test_missing_native_watcher_forces_poll() {
        assert!(poll_required(false, false, false));
    }

    // ==================== Debounce queue ====================

    #[test]
    fn test_debounce_keeps_earlier_deadline() {
        let mut queue = DebounceQueue::default();
        let early = Instant::now();
        let late = early + Duration::from_secs(5);

        queue.schedule(Path::new("/watch"), early);
        queue.schedule(Path::new("/watch"), late);

        assert_eq!(queue.next_deadline(), Some(early));
    }

    #[test]
    fn test_debounce_next_deadline_is_minimum() {
        let mut queue = DebounceQueue::default();
        let now = Instant::now();

        queue.schedule(Path::new("/b"), now + Duration::from_secs(3));
        queue.schedule(Path::new("/a"), now + Duration::from_secs(1));

        assert_eq!(queue.next_deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_debounce_take_due_splits_on_deadline() {
        let mut queue = DebounceQueue::default();
        let now = Instant::now();

        queue.schedule(Path::new("/due"), now);
        queue.schedule(Path::new("/later"), now + Duration::from_secs(10));

        let due = queue.take_due(now);
        assert_eq!(due, [PathBuf::from("/due")]);
        assert_eq!(
            queue.next_deadline(),
            Some(now + Duration::from_secs(10)),
            "undue entry stays queued"
        );
    }

    #[test]
    fn test_debounce_remove_clears_entry() {
        let mut queue = DebounceQueue::default();
        queue.schedule(Path::new("/watch"), Instant::now());
        queue.remove(Path::new("/watch"));
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn test_debounce_empty_has_no_deadline() {
        let queue = DebounceQueue::default();
        assert_eq!(queue.next_deadline(), None);
    }
}
