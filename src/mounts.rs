//! Filesystem-kind probe: is a path on a network-mounted filesystem?
//!
//! Network mounts (NFS, CIFS, sshfs, ...) do not reliably deliver native
//! directory-change notifications, so the monitor dispatcher polls them
//! instead. This is the only consumer of this module.

use std::path::Path;

#[cfg(target_os = "linux")]
use tracing::warn;

/// Filesystem types that are network-backed and therefore unsuitable for
/// push monitoring.
#[cfg(target_os = "linux")]
const NETWORK_FS_TYPES: &[&str] = &[
    "nfs",
    "nfs4",
    "cifs",
    "smb3",
    "smbfs",
    "sshfs",
    "fuse.sshfs",
    "9p",
    "afs",
    "ncpfs",
    "glusterfs",
    "fuse.glusterfs",
    "davfs",
    "fuse.davfs2",
];

/// Returns `true` if `path` resides on a network filesystem.
///
/// On Linux this inspects the mount table; the mount point with the longest
/// prefix match wins. On other platforms (and whenever the mount table is
/// unreadable) the probe answers `false`, which keeps push monitoring as the
/// default.
#[must_use]
#[cfg(target_os = "linux")]
pub fn is_network_filesystem(path: &Path) -> bool {
    match std::fs::read_to_string("/proc/self/mounts") {
        Ok(table) => mount_fstype(&table, path).is_some_and(fstype_is_network),
        Err(err) => {
            warn!(error = %err, "could not read mount table, assuming local filesystem");
            false
        }
    }
}

/// Returns `true` if `path` resides on a network filesystem.
#[must_use]
#[cfg(not(target_os = "linux"))]
pub fn is_network_filesystem(_path: &Path) -> bool {
    false
}

/// Looks up the fstype of the mount containing `path` in a
/// `/proc/self/mounts`-format table.
#[cfg(any(target_os = "linux", test))]
fn mount_fstype<'a>(table: &'a str, path: &Path) -> Option<&'a str> {
    let mut best: Option<(&str, &str)> = None;
    for line in table.lines() {
        let mut fields = line.split_whitespace();
        let Some(_device) = fields.next() else {
            continue;
        };
        let Some(mount_point) = fields.next() else {
            continue;
        };
        let Some(fstype) = fields.next() else {
            continue;
        };

        // Octal escapes (e.g. "\040" for spaces) are left as-is: a path
        // containing them simply won't match, which degrades to "local".
        if path.starts_with(mount_point)
            && best.is_none_or(|(point, _)| mount_point.len() > point.len())
        {
            best = Some((mount_point, fstype));
        }
    }
    best.map(|(_, fstype)| fstype)
}

#[cfg(any(target_os = "linux", test))]
fn fstype_is_network(fstype: &str) -> bool {
    #[cfg(not(target_os = "linux"))]
    const NETWORK_FS_TYPES: &[&str] = &["nfs", "nfs4", "cifs", "sshfs", "fuse.sshfs", "9p"];

    NETWORK_FS_TYPES.contains(&fstype)
}
