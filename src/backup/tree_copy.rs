//! Selective replication of a source tree into a run directory.
//!
//! Both [`count_tree`] and [`copy_tree`] walk the source in pre-order with
//! children sorted by name, pruning every directory the patterns reject, so
//! the count is the exact number of progress ticks a copy produces.

use crate::backup::pattern::{should_include, Pattern};
use crate::backup::platform::{symlink_dir, Platform};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;

use std::fs::{self, File, Metadata, Permissions};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

fn filtered_walk<'a>(
    src: &Path,
    include: &'a [Pattern],
    exclude: &'a [Pattern],
) -> impl Iterator<Item = walkdir::Result<DirEntry>> + 'a {
    let root = src.to_path_buf();
    WalkDir::new(src)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            match entry.path().strip_prefix(&root) {
                Ok(relative) => {
                    let included = should_include(relative, include, exclude);
                    if !included {
                        tracing::trace!("Skipping {:?}, filtered out", entry.path());
                    }
                    included
                }
                Err(_) => false,
            }
        })
}

fn is_ignorable(err: &walkdir::Error, platform: &dyn Platform) -> bool {
    match (err.path(), err.io_error()) {
        (Some(path), Some(io_err)) => platform.is_ignorable_walk_error(path, io_err),
        _ => false,
    }
}

/// Yields included entries below the root, dropping errors the platform ignores.
fn included_entries<'a>(
    src: &Path,
    include: &'a [Pattern],
    exclude: &'a [Pattern],
    platform: &'a dyn Platform,
) -> impl Iterator<Item = Result<DirEntry>> + 'a {
    filtered_walk(src, include, exclude).filter_map(move |res| match res {
        Ok(entry) if entry.depth() == 0 => None,
        Ok(entry) => Some(Ok(entry)),
        Err(e) if is_ignorable(&e, platform) => {
            tracing::debug!("Skipping protected path: {e}");
            None
        }
        Err(e) => Some(Err(Error::from(e))),
    })
}

/// Number of entries a copy of `src` would create. A file source counts as one.
pub fn count_tree(
    src: &Path,
    include: &[Pattern],
    exclude: &[Pattern],
    platform: &dyn Platform,
) -> Result<u64> {
    let metadata = fs::metadata(src)
        .map_err(Error::from)
        .with_msg(format!("Accessing source path {src:?} failed"))?;
    if !metadata.is_dir() {
        return Ok(1);
    }

    let mut count = 0;
    for entry in included_entries(src, include, exclude, platform) {
        entry?;
        count += 1;
    }
    tracing::debug!("Counted {count} entries to copy in {:?}", src);
    Ok(count)
}

/// Copies the included part of `src` below `dst`, calling `on_progress` once per created entry.
///
/// `dst` is created when missing. Directory permissions, `dst`'s included, are
/// applied deepest first after every entry is written, so read-only source
/// directories still receive their content.
pub fn copy_tree(
    src: &Path,
    dst: &Path,
    include: &[Pattern],
    exclude: &[Pattern],
    platform: &dyn Platform,
    on_progress: &mut dyn FnMut(),
) -> Result<()> {
    tracing::info!(
        "Copying {:?} to {:?} with {} include and {} exclude patterns",
        src,
        dst,
        include.len(),
        exclude.len()
    );
    let root_permissions = fs::metadata(src)
        .map_err(Error::from)
        .with_msg(format!("Reading metadata of {src:?} failed"))?
        .permissions();
    create_dir(dst)?;

    let mut dir_permissions = vec![(dst.to_path_buf(), root_permissions)];
    for entry in included_entries(src, include, exclude, platform) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src)?;
        copy_entry(
            &entry,
            &dst.join(relative),
            platform,
            &mut dir_permissions,
            on_progress,
        )?;
    }

    for (dir, permissions) in dir_permissions.into_iter().rev() {
        fs::set_permissions(&dir, permissions)
            .map_err(Error::from)
            .with_msg(format!("Setting permissions of {dir:?} failed"))?;
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(Error::from)
        .with_msg(format!("Creating directory {path:?} failed"))
}

fn copy_entry(
    entry: &DirEntry,
    target: &Path,
    platform: &dyn Platform,
    dir_permissions: &mut Vec<(PathBuf, Permissions)>,
    on_progress: &mut dyn FnMut(),
) -> Result<()> {
    let src = entry.path();
    let file_type = entry.file_type();

    if file_type.is_dir() {
        let Some(metadata) = source_metadata(src, platform)? else {
            return Ok(());
        };
        create_dir(target)?;
        dir_permissions.push((target.to_path_buf(), metadata.permissions()));
        on_progress();
        return Ok(());
    }

    if file_type.is_symlink() {
        let Some(resolved) = source_metadata(src, platform)? else {
            return Ok(());
        };
        if resolved.is_dir() {
            let link_target = fs::read_link(src)
                .map_err(Error::from)
                .with_msg(format!("Reading link {src:?} failed"))?;
            tracing::trace!("Recreating directory link {:?} -> {:?}", target, link_target);
            symlink_dir(&link_target, target)
                .map_err(Error::from)
                .with_msg(format!("Creating link {target:?} failed"))?;
            on_progress();
            return Ok(());
        }
    }

    copy_file(src, target, on_progress)
}

/// Metadata of `path`, following links. `None` when the platform says to skip it.
fn source_metadata(path: &Path, platform: &dyn Platform) -> Result<Option<Metadata>> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if platform.is_ignorable_walk_error(path, &e) => {
            tracing::debug!("Skipping protected path {:?}: {e}", path);
            Ok(None)
        }
        Err(e) => Err(Error::from(e).with_msg(format!("Reading metadata of {path:?} failed"))),
    }
}

/// Copies one file byte for byte, then gives the copy the source's permissions.
///
/// `on_progress` runs once the content is written, before permissions are set.
pub fn copy_file(src: &Path, dst: &Path, on_progress: &mut dyn FnMut()) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .map_err(Error::from)
            .with_msg(format!("Creating directory {parent:?} failed"))?;
    }

    let mut reader = File::open(src)
        .map_err(Error::from)
        .with_msg(format!("Opening {src:?} failed"))?;
    let permissions = reader
        .metadata()
        .map_err(Error::from)
        .with_msg(format!("Reading metadata of {src:?} failed"))?
        .permissions();
    let mut writer = File::create(dst)
        .map_err(Error::from)
        .with_msg(format!("Creating {dst:?} failed"))?;

    let bytes = io::copy(&mut reader, &mut writer)
        .map_err(Error::from)
        .with_msg(format!("Copying {src:?} to {dst:?} failed"))?;
    drop(writer);
    tracing::trace!("Copied {bytes} bytes {:?} -> {:?}", src, dst);
    on_progress();

    fs::set_permissions(dst, permissions)
        .map_err(Error::from)
        .with_msg(format!("Setting permissions of {dst:?} failed"))
}

/// Relative paths of everything below `root`, sorted. Used by tests across modules.
#[cfg(test)]
pub(crate) fn list_tree(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|e| e.unwrap().path().strip_prefix(root).unwrap().to_path_buf())
        .collect()
}
