//! Parsing collaborator seam for torrent descriptors and magnet links.
//!
//! The watch subsystem treats metadata parsing as an external capability: it
//! only needs to know whether a dropped file parses and, if so, obtain an
//! opaque value to hand downstream. [`TorrentParser`] is that seam.
//!
//! [`StandardParser`] is the built-in implementation. It performs shallow
//! validation only — enough to distinguish a fully written descriptor from a
//! partial one and a magnet URI from arbitrary text. Deployments that sit in
//! front of a real torrent engine inject a parser backed by the engine's
//! metadata decoder instead.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

/// Errors produced by descriptor/magnet parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The descriptor file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The file content is not a valid torrent descriptor.
    #[error("not a valid torrent descriptor: {path}")]
    InvalidDescriptor {
        /// The file that failed validation.
        path: PathBuf,
    },

    /// The text line is not a valid magnet link.
    #[error("not a valid magnet link: {line}")]
    InvalidMagnet {
        /// The offending line.
        line: String,
    },
}

impl ParseError {
    /// Creates a read error.
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid-descriptor error.
    pub fn invalid_descriptor(path: impl Into<PathBuf>) -> Self {
        Self::InvalidDescriptor { path: path.into() }
    }

    /// Creates an invalid-magnet error.
    pub fn invalid_magnet(line: impl Into<String>) -> Self {
        Self::InvalidMagnet { line: line.into() }
    }
}

/// A validated magnet link.
///
/// Stored as the original URI text; the content identifier grammar is the
/// downstream engine's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetUri {
    uri: String,
}

impl MagnetUri {
    /// Wraps an already-validated magnet URI.
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    /// The magnet URI text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

/// A parsed torrent descriptor, kept as an opaque blob for the downstream
/// consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentInfo {
    data: Vec<u8>,
}

impl TorrentInfo {
    /// Wraps raw descriptor bytes that have already been validated.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// The raw descriptor bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Parsing capability injected into the watch subsystem.
///
/// Implementations must be cheap to call repeatedly: descriptor files are
/// re-parsed on every retry sweep until they succeed or are rejected.
pub trait TorrentParser: Send + Sync {
    /// Parses a torrent descriptor file.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] if the file cannot be read or is not (yet) a
    /// complete descriptor. Failures here are treated as transient by the
    /// caller and drive the bounded-retry policy.
    fn parse_torrent_file(&self, path: &Path) -> Result<TorrentInfo, ParseError>;

    /// Parses one line of a magnet-list file.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidMagnet`] for malformed lines. Callers
    /// drop malformed lines without retrying.
    fn parse_magnet_line(&self, line: &str) -> Result<MagnetUri, ParseError>;
}

/// Built-in shallow validator.
///
/// Descriptors: the file must be non-empty, start with a bencode dictionary
/// marker (`d`), and end with its terminator (`e`). A descriptor observed
/// mid-write fails this check and is retried later.
///
/// Magnets: the line must parse as a URI with the `magnet` scheme and carry
/// at least one `xt` (exact topic) parameter.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardParser;

impl TorrentParser for StandardParser {
    fn parse_torrent_file(&self, path: &Path) -> Result<TorrentInfo, ParseError> {
        let data = fs::read(path).map_err(|err| ParseError::read(path, err))?;

        let trimmed_len = data
            .iter()
            .rposition(|byte| !byte.is_ascii_whitespace())
            .map_or(0, |pos| pos + 1);
        let content = &data[..trimmed_len];

        if content.first() != Some(&b'd') || content.last() != Some(&b'e') {
            return Err(ParseError::invalid_descriptor(path));
        }

        Ok(TorrentInfo::new(data))
    }

    fn parse_magnet_line(&self, line: &str) -> Result<MagnetUri, ParseError> {
        let url = Url::parse(line).map_err(|_| ParseError::invalid_magnet(line))?;
        if url.scheme() != "magnet" {
            return Err(ParseError::invalid_magnet(line));
        }

        let has_exact_topic = url.query_pairs().any(|(key, _)| key == "xt");
        if !has_exact_topic {
            return Err(ParseError::invalid_magnet(line));
        }

        Ok(MagnetUri::new(line))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const VALID_MAGNET: &str =
        "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=example";

    // ==================== Magnet lines ====================

    #[test]
    fn test_parse_magnet_line_valid() {
        let magnet = StandardParser.parse_magnet_line(VALID_MAGNET).unwrap();
        assert_eq!(magnet.as_str(), VALID_MAGNET);
    }

    #[test]
    fn test_parse_magnet_line_wrong_scheme_rejected() {
        let result = StandardParser.parse_magnet_line("https://example.com/file.torrent");
        assert!(matches!(result, Err(ParseError::InvalidMagnet { .. })));
    }

    #[test]
    fn test_parse_magnet_line_missing_exact_topic_rejected() {
        let result = StandardParser.parse_magnet_line("magnet:?dn=example");
        assert!(matches!(result, Err(ParseError::InvalidMagnet { .. })));
    }

    #[test]
    fn test_parse_magnet_line_plain_text_rejected() {
        let result = StandardParser.parse_magnet_line("not a magnet at all");
        assert!(matches!(result, Err(ParseError::InvalidMagnet { .. })));
    }

    // ==================== Descriptor files ====================

    #[test]
    fn test_parse_torrent_file_valid_framing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ok.torrent");
        std::fs::write(&path, b"d4:name4:teste").unwrap();

        let info = StandardParser.parse_torrent_file(&path).unwrap();
        assert_eq!(info.data(), b"d4:name4:teste");
    }

    #[test]
    fn test_parse_torrent_file_trailing_newline_accepted() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("ok.torrent");
        std::fs::write(&path, b"d4:name4:teste\n").unwrap();

        assert!(StandardParser.parse_torrent_file(&path).is_ok());
    }

    #[test]
    fn test_parse_torrent_file_truncated_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("partial.torrent");
        // Simulates a descriptor observed mid-write.
        std::fs::write(&path, b"d4:name4:tes").unwrap();

        let result = StandardParser.parse_torrent_file(&path);
        assert!(matches!(result, Err(ParseError::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_parse_torrent_file_empty_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("empty.torrent");
        std::fs::write(&path, b"").unwrap();

        let result = StandardParser.parse_torrent_file(&path);
        assert!(matches!(result, Err(ParseError::InvalidDescriptor { .. })));
    }

    #[test]
    fn test_parse_torrent_file_missing_is_read_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("missing.torrent");

        let result = StandardParser.parse_torrent_file(&path);
        assert!(matches!(result, Err(ParseError::Read { .. })));
    }

    #[test]
    fn test_parse_error_display_includes_path() {
        let err = ParseError::invalid_descriptor("/drop/bad.torrent");
        let msg = err.to_string();
        assert!(msg.contains("/drop/bad.torrent"), "Expected path in: {msg}");
    }
}
