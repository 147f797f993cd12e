//! Watch-path validation and lexical normalization.
//!
//! Watched folder paths must be absolute; they are normalized lexically
//! (`.` removed, `..` resolved) without touching the filesystem, so a folder
//! can be configured before it exists.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Rejection of a user-supplied watched folder path.
///
/// Surfaced synchronously to the configuration caller; never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPathError {
    /// The path was empty.
    #[error("watched folder path cannot be empty")]
    Empty,

    /// The path was relative.
    #[error("watched folder path cannot be relative: {0}")]
    Relative(PathBuf),
}

/// Validates and normalizes a watched folder path.
///
/// # Errors
///
/// Returns [`InvalidPathError`] if the path is empty or relative.
pub fn clean_watch_path(path: &Path) -> Result<PathBuf, InvalidPathError> {
    if path.as_os_str().is_empty() {
        return Err(InvalidPathError::Empty);
    }
    if path.is_relative() {
        return Err(InvalidPathError::Relative(path.to_path_buf()));
    }

    Ok(clean_path(path))
}

/// Lexically normalizes a path: drops `.` components and resolves `..`
/// against preceding components (but not past the root).
#[must_use]
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    cleaned.components().next_back(),
                    Some(Component::Normal(_))
                ) && cleaned.pop();
                if !popped && !starts_with_root(&cleaned) {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

fn starts_with_root(path: &Path) -> bool {
    matches!(
        path.components().next(),
        Some(Component::RootDir | Component::Prefix(_))
    )
}
