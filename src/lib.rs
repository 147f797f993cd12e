//! Dropfolder Core Library
//!
//! This library provides the core functionality for the dropfolder tool,
//! which monitors watched folders for dropped .torrent descriptor files and
//! .magnet link lists and turns them into ingest events.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`params`] - Per-folder add-time options (save path, limits, layout)
//! - [`parse`] - Descriptor and magnet-line parsing behind a trait seam
//! - [`paths`] - Watch-path validation and lexical normalization
//! - [`registry`] - Persistent watched-folder configuration store
//! - [`mounts`] - Network-filesystem probe for the monitoring mode choice
//! - [`watcher`] - The monitoring service: dispatcher, scanner, retries

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod mounts;
pub mod params;
pub mod parse;
pub mod paths;
pub mod registry;
pub mod watcher;

// Re-export commonly used types
pub use params::{
    AddTorrentParams, TorrentContentLayout, TorrentOperatingMode, WatchedFolderOptions, NO_LIMIT,
    USE_GLOBAL_RATIO, USE_GLOBAL_SEEDING_TIME,
};
pub use parse::{MagnetUri, ParseError, StandardParser, TorrentInfo, TorrentParser};
pub use paths::{clean_path, clean_watch_path, InvalidPathError};
pub use registry::{WatchedFolderRegistry, LEGACY_STORE_FILE_NAME, STORE_FILE_NAME};
pub use watcher::{
    FolderWatchService, IngestEvent, WatchOptions, MAGNET_FILE_EXTENSION, REJECTED_FILE_SUFFIX,
    TORRENT_FILE_EXTENSION,
};
