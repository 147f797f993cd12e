//! Add-time torrent options and per-folder watch configuration.
//!
//! These are the value types carried alongside every ingested descriptor or
//! magnet link, and the unit of configuration persisted per watched folder.
//! The serde representation matches the on-disk `watched_folders.json` format
//! field-for-field, so [`WatchedFolderOptions`] doubles as the store schema.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Sentinel for "no transfer rate cap".
pub const NO_LIMIT: i64 = -1;

/// Sentinel for "inherit the global seeding-time limit".
pub const USE_GLOBAL_SEEDING_TIME: i64 = -2;

/// Sentinel for "inherit the global share-ratio limit".
pub const USE_GLOBAL_RATIO: f64 = -2.0;

/// How the torrent engine should manage a newly added torrent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TorrentOperatingMode {
    /// The engine starts/stops the torrent according to queueing rules.
    #[default]
    AutoManaged,
    /// The torrent starts immediately and ignores queueing rules.
    Forced,
}

/// Layout of multi-file torrent content on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TorrentContentLayout {
    /// Keep the layout embedded in the descriptor.
    Original,
    /// Always create a root subfolder.
    Subfolder,
    /// Never create a root subfolder.
    NoSubfolder,
}

/// Options applied to every torrent/magnet ingested from a watched folder.
///
/// This is a plain value aggregate: it is cloned into each scan pass and
/// remapped per sub-directory, never shared, so a concurrent configuration
/// update cannot affect an in-flight scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddTorrentParams {
    /// Category assigned to the added torrent.
    pub category: String,

    /// Tags assigned to the added torrent.
    pub tags: BTreeSet<String>,

    /// Destination directory for downloaded content.
    pub save_path: PathBuf,

    /// Queueing behavior for the added torrent.
    pub operating_mode: TorrentOperatingMode,

    /// Whether the torrent is added in the stopped state. `None` inherits
    /// the engine default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stopped: Option<bool>,

    /// Skip hash verification of existing data.
    pub skip_checking: bool,

    /// Content layout override. `None` inherits the engine default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_layout: Option<TorrentContentLayout>,

    /// Automatic torrent management (save path follows the category).
    /// `None` inherits the engine default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_auto_tmm: Option<bool>,

    /// Upload rate cap in bytes/s, [`NO_LIMIT`] for none.
    pub upload_limit: i64,

    /// Download rate cap in bytes/s, [`NO_LIMIT`] for none.
    pub download_limit: i64,

    /// Seeding time limit in minutes, [`USE_GLOBAL_SEEDING_TIME`] to inherit.
    pub seeding_time_limit: i64,

    /// Share ratio limit, [`USE_GLOBAL_RATIO`] to inherit.
    pub ratio_limit: f64,
}

impl Default for AddTorrentParams {
    fn default() -> Self {
        Self {
            category: String::new(),
            tags: BTreeSet::new(),
            save_path: PathBuf::new(),
            operating_mode: TorrentOperatingMode::AutoManaged,
            stopped: None,
            skip_checking: false,
            content_layout: None,
            use_auto_tmm: None,
            upload_limit: NO_LIMIT,
            download_limit: NO_LIMIT,
            seeding_time_limit: USE_GLOBAL_SEEDING_TIME,
            ratio_limit: USE_GLOBAL_RATIO,
        }
    }
}

/// Per-folder watch configuration: add-time options plus the recursive flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchedFolderOptions {
    /// Options stamped onto everything ingested from this folder.
    pub add_torrent_params: AddTorrentParams,

    /// Whether sub-directories are scanned too (forces poll monitoring).
    pub recursive: bool,
}
