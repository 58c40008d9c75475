//! Host-specific pieces: free space, protected paths, drive discovery, symlinks.

use std::io;
use std::path::{Path, PathBuf};

/// What the backup engine needs from the operating system beyond plain file I/O.
pub trait Platform {
    /// Bytes available to the current user on the filesystem holding `path`.
    fn available_bytes(&self, path: &Path) -> io::Result<u64>;

    /// Whether an error met while reading `path` during a walk should skip the
    /// entry instead of failing the copy.
    fn is_ignorable_walk_error(&self, path: &Path, err: &io::Error) -> bool;

    /// Removes an old run directory and everything in it.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HostPlatform;

impl Platform for HostPlatform {
    fn available_bytes(&self, path: &Path) -> io::Result<u64> {
        fs4::available_space(path)
    }

    fn is_ignorable_walk_error(&self, path: &Path, err: &io::Error) -> bool {
        is_protected_path_error(path, err)
    }
}

#[cfg(windows)]
const PROTECTED_DIR_NAMES: &[&str] = &[
    "System Volume Information",
    "$RECYCLE.BIN",
    "Config.Msi",
    "Recovery",
    "$WinREAgent",
];

#[cfg(windows)]
fn is_protected_path_error(path: &Path, err: &io::Error) -> bool {
    use std::path::Component;

    err.kind() == io::ErrorKind::PermissionDenied
        && path.components().any(|c| match c {
            Component::Normal(name) => name.to_str().is_some_and(|name| {
                PROTECTED_DIR_NAMES
                    .iter()
                    .any(|protected| name.eq_ignore_ascii_case(protected))
            }),
            _ => false,
        })
}

#[cfg(not(windows))]
fn is_protected_path_error(_path: &Path, _err: &io::Error) -> bool {
    false
}

/// Drives and mount points that may hold a backup destination, in search order.
#[cfg(windows)]
pub fn candidate_destinations() -> Vec<PathBuf> {
    ('A'..='Z')
        .map(|letter| PathBuf::from(format!("{letter}:\\")))
        .filter(|drive| drive.exists())
        .collect()
}

/// Drives and mount points that may hold a backup destination, in search order.
#[cfg(not(windows))]
pub fn candidate_destinations() -> Vec<PathBuf> {
    ["/mnt", "/media", "/Volumes"]
        .into_iter()
        .filter_map(|mount_point| std::fs::read_dir(mount_point).ok())
        .flat_map(|entries| {
            let mut dirs: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
                .map(|entry| entry.path())
                .collect();
            dirs.sort();
            dirs
        })
        .collect()
}

#[cfg(unix)]
pub fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
pub fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(original, link)
}
