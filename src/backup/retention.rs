//! Retention of past run directories.
//!
//! Run directories are named `<prefix>-<YYYYMMDD-HHMMSS>`, so sorting their
//! names lexically also sorts them chronologically. [`cleanup`] relies on that
//! to find the oldest ones.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use bon::Builder;
use derive_more::Into;
use getset::CopyGetters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::fs::read_dir;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};
use validator::Validate;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

pub const MIN_BACKUPS_TO_KEEP: u16 = 1;
pub const MIN_FREE_SPACE: DiskSize = DiskSize::from_mib(10);

/// A byte count written in configuration as `<N>mb` or `<N>gb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Into, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiskSize(u64);

impl DiskSize {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn from_mib(mib: u64) -> Self {
        Self(mib * MIB)
    }

    pub const fn from_gib(gib: u64) -> Self {
        Self(gib * GIB)
    }

    pub const fn bytes(self) -> u64 {
        self.0
    }

    /// Parses `^\d+(mb|gb)$`, ignoring surrounding whitespace and case.
    pub fn parse(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        let invalid = || Error::InvalidDiskSize(value.to_string());

        let (digits, multiplier) = if let Some(digits) = normalized.strip_suffix("mb") {
            (digits, MIB)
        } else if let Some(digits) = normalized.strip_suffix("gb") {
            (digits, GIB)
        } else {
            return Err(invalid());
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        digits
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(multiplier))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl FromStr for DiskSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DiskSize {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DiskSize> for String {
    fn from(value: DiskSize) -> Self {
        value.to_string()
    }
}

impl Display for DiskSize {
    /// Whole mebibytes below 1 GiB, one decimal of gibibytes above.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.0 < GIB {
            write!(f, "{}mb", self.0 / MIB)
        } else {
            write!(f, "{:.1}gb", self.0 as f64 / GIB as f64)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, CopyGetters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get_copy = "pub")]
pub struct RetentionConfig {
    #[serde(default = "default_backups_to_keep")]
    #[validate(range(min = 1))]
    #[builder(default = default_backups_to_keep())]
    backups_to_keep: u16,
    #[serde(default = "default_min_free_space")]
    #[builder(default = default_min_free_space())]
    min_free_space: DiskSize,
}

fn default_backups_to_keep() -> u16 {
    MIN_BACKUPS_TO_KEEP
}

fn default_min_free_space() -> DiskSize {
    MIN_FREE_SPACE
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            backups_to_keep: default_backups_to_keep(),
            min_free_space: default_min_free_space(),
        }
    }
}

impl RetentionConfig {
    /// Raises values below the allowed minimum up to it. Never lowers anything.
    pub fn clamp_to_floor(&mut self) {
        if self.backups_to_keep < MIN_BACKUPS_TO_KEEP {
            warn!(
                "\"backups_to_keep\" value increased from '{}' to '{}', which is allowed minimum",
                self.backups_to_keep, MIN_BACKUPS_TO_KEEP
            );
            self.backups_to_keep = MIN_BACKUPS_TO_KEEP;
        }
        if self.min_free_space < MIN_FREE_SPACE {
            warn!(
                "\"min_free_space\" value increased from '{}' to '{}', which is allowed minimum",
                self.min_free_space, MIN_FREE_SPACE
            );
            self.min_free_space = MIN_FREE_SPACE;
        }
    }
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Deletes the oldest `<prefix>-*` directories under `root` so at most `keep` remain.
///
/// A directory that cannot be removed is logged and skipped. Only failing to
/// list `root` is returned as an error.
pub fn cleanup<P: AsRef<Path>>(root: P, prefix: &str, keep: usize) -> Result<CleanupReport> {
    cleanup_with(root, prefix, keep, |dir| std::fs::remove_dir_all(dir))
}

/// [`cleanup`] with a caller supplied way of removing one run directory.
pub fn cleanup_with<P, F>(
    root: P,
    prefix: &str,
    keep: usize,
    mut remove: F,
) -> Result<CleanupReport>
where
    P: AsRef<Path>,
    F: FnMut(&Path) -> std::io::Result<()>,
{
    let root = root.as_ref();
    let marker = format!("{prefix}-");

    let run_dirs = read_dir(root)
        .map_err(Error::from)
        .with_msg(format!("Listing backups in {root:?} failed"))?
        .filter_map(|res| match res {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry in {:?}: {e}", root);
                None
            }
        })
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(&marker))
        })
        .map(|entry| entry.path())
        .sorted_unstable()
        .collect_vec();

    let mut report = CleanupReport::default();
    if run_dirs.len() <= keep {
        debug!(
            "Found {} backups in {:?}, keeping up to {keep}, nothing to remove",
            run_dirs.len(),
            root
        );
        return Ok(report);
    }

    let excess = run_dirs.len() - keep;
    for dir in run_dirs.into_iter().take(excess) {
        info!("Removing old backup {:?}", dir);
        match remove(&dir) {
            Ok(()) => report.removed.push(dir),
            Err(e) => {
                warn!("Removing old backup {:?} failed: {e}", dir);
                report.failed.push(dir);
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn names_in(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .sorted()
            .collect()
    }

    #[test]
    fn test_parse_disk_size() {
        assert_eq!(DiskSize::parse("10gb").unwrap().bytes(), 10_737_418_240);
        assert_eq!(DiskSize::parse("10mb").unwrap().bytes(), 10_485_760);
        assert_eq!(DiskSize::parse(" 100MB ").unwrap(), DiskSize::from_mib(100));
        assert_eq!(DiskSize::parse("2Gb").unwrap(), DiskSize::from_gib(2));
        assert_eq!(DiskSize::parse("0mb").unwrap().bytes(), 0);
    }

    #[test]
    fn test_parse_disk_size_invalid() {
        for value in ["", "mb", "10", "10tb", "-5mb", "1.5gb", "10 gb", "ten mb", "+1gb"] {
            let result = DiskSize::parse(value);
            assert!(
                matches!(result, Err(Error::InvalidDiskSize(_))),
                "{value:?} should be rejected"
            );
        }
        assert!(DiskSize::parse("99999999999999999999gb").is_err());
        assert!(DiskSize::parse("18446744073709551615gb").is_err());
    }

    #[test]
    fn test_disk_size_display() {
        assert_eq!(DiskSize::from_mib(10).to_string(), "10mb");
        assert_eq!(DiskSize::from_bytes(5_000_000_000).to_string(), "4.7gb");
        assert_eq!(DiskSize::from_gib(10).to_string(), "10.0gb");
    }

    #[test]
    fn test_retention_config_deserialization() {
        let config: RetentionConfig =
            serde_json::from_str(r#"{"backups_to_keep": 3, "min_free_space": "10gb"}"#).unwrap();
        assert_eq!(config.backups_to_keep(), 3);
        assert_eq!(config.min_free_space(), DiskSize::from_gib(10));

        let config: RetentionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RetentionConfig::default());

        assert!(serde_json::from_str::<RetentionConfig>(r#"{"min_free_space": "10kb"}"#).is_err());
        assert!(serde_json::from_str::<RetentionConfig>(r#"{"keep": 1}"#).is_err());
    }

    #[test]
    fn test_clamp_to_floor_raises_only() {
        let mut config = RetentionConfig::builder()
            .backups_to_keep(0)
            .min_free_space(DiskSize::from_mib(1))
            .build();
        assert!(config.validate().is_err());
        config.clamp_to_floor();
        assert_eq!(config.backups_to_keep(), MIN_BACKUPS_TO_KEEP);
        assert_eq!(config.min_free_space(), MIN_FREE_SPACE);
        assert!(config.validate().is_ok());

        let mut config = RetentionConfig::builder()
            .backups_to_keep(7)
            .min_free_space(DiskSize::from_gib(20))
            .build();
        config.clamp_to_floor();
        assert_eq!(config.backups_to_keep(), 7);
        assert_eq!(config.min_free_space(), DiskSize::from_gib(20));
    }

    #[test]
    fn test_cleanup_removes_oldest() {
        let root = TempDir::new().unwrap();
        for ts in [
            "20240101-000000",
            "20240102-000000",
            "20240103-000000",
            "20240104-000000",
            "20240105-000000",
        ] {
            std::fs::create_dir(root.path().join(format!("smbkp-{ts}"))).unwrap();
        }
        std::fs::write(root.path().join("smbkp-20240102-000000/file"), "x").unwrap();

        let report = cleanup(root.path(), "smbkp", 3).unwrap();

        assert_eq!(report.removed.len(), 2);
        assert!(report.failed.is_empty());
        assert_eq!(
            names_in(root.path()),
            vec![
                "smbkp-20240103-000000",
                "smbkp-20240104-000000",
                "smbkp-20240105-000000"
            ]
        );
    }

    #[test]
    fn test_cleanup_noop_within_limit() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("smbkp-20240101-000000")).unwrap();
        std::fs::create_dir(root.path().join("smbkp-20240102-000000")).unwrap();

        let report = cleanup(root.path(), "smbkp", 2).unwrap();

        assert!(report.removed.is_empty());
        assert_eq!(names_in(root.path()).len(), 2);
    }

    #[test]
    fn test_cleanup_ignores_unrelated_entries() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("smbkp-20240101-000000")).unwrap();
        std::fs::create_dir(root.path().join("smbkp-20240102-000000")).unwrap();
        std::fs::create_dir(root.path().join("smbkpx-20230101-000000")).unwrap();
        std::fs::create_dir(root.path().join("aaa")).unwrap();
        std::fs::write(root.path().join("smbkp-20200101-000000"), "not a dir").unwrap();

        let report = cleanup(root.path(), "smbkp", 1).unwrap();

        assert_eq!(
            report.removed,
            vec![root.path().join("smbkp-20240101-000000")]
        );
        assert_eq!(
            names_in(root.path()),
            vec![
                "aaa",
                "smbkp-20200101-000000",
                "smbkp-20240102-000000",
                "smbkpx-20230101-000000"
            ]
        );
    }

    #[test]
    fn test_cleanup_continues_after_failed_removal() {
        let root = TempDir::new().unwrap();
        for ts in ["20240101-000000", "20240102-000000", "20240103-000000", "20240104-000000"] {
            std::fs::create_dir(root.path().join(format!("smbkp-{ts}"))).unwrap();
        }
        let stuck = root.path().join("smbkp-20240101-000000");

        let report = cleanup_with(root.path(), "smbkp", 2, |dir| {
            if dir == stuck {
                Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
            } else {
                std::fs::remove_dir_all(dir)
            }
        })
        .unwrap();

        assert_eq!(report.failed, vec![stuck]);
        assert_eq!(
            report.removed,
            vec![root.path().join("smbkp-20240102-000000")]
        );
        assert_eq!(
            names_in(root.path()),
            vec![
                "smbkp-20240101-000000",
                "smbkp-20240103-000000",
                "smbkp-20240104-000000"
            ]
        );
    }

    #[test]
    fn test_cleanup_missing_root() {
        let root = TempDir::new().unwrap();
        let result = cleanup(root.path().join("missing"), "smbkp", 1);
        assert!(result.is_err());
        assert!(result.unwrap_err().is_not_found());
    }
}
