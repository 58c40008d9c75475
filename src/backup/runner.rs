//! Runs every configured item into a fresh run directory, then applies retention.

use crate::backup::backup_config::{BackupConfig, BackupItem};
use crate::backup::console::{Answer, Console, ProgressBar};
use crate::backup::platform::Platform;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention::{cleanup_with, DiskSize};
use crate::backup::tree_copy::{copy_file, copy_tree, count_tree};
use bon::Builder;
use chrono::NaiveDateTime;
use itertools::Itertools;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub const RUN_DIR_PREFIX: &str = "smbkp";
const RUN_DIR_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

pub fn run_dir_name(prefix: &str, started: NaiveDateTime) -> String {
    format!("{prefix}-{}", started.format(RUN_DIR_TIME_FORMAT))
}

#[derive(Clone, Copy, Debug, Default, Builder)]
pub struct RunOptions {
    /// Stop after the first failed item (or ask, when interactive).
    #[builder(default)]
    pub exit_on_error: bool,
    /// Never prompt. Every question takes its non-confirming default.
    #[builder(default)]
    pub non_interactive: bool,
}

#[derive(Debug)]
pub struct BackupResult {
    pub item: BackupItem,
    pub error: Option<Error>,
    pub elapsed: Duration,
}

impl BackupResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
pub enum RunStatus {
    Completed,
    Aborted(Error),
    Cancelled,
    NothingToBackUp,
}

#[derive(Debug)]
pub struct RunReport {
    pub run_dir: Option<PathBuf>,
    pub results: Vec<BackupResult>,
    pub status: RunStatus,
    pub cleanup_ran: bool,
}

impl RunReport {
    fn without_run(status: RunStatus) -> Self {
        Self {
            run_dir: None,
            results: vec![],
            status,
            cleanup_ran: false,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    /// No item failed and the run was not aborted.
    pub fn is_success(&self) -> bool {
        !matches!(self.status, RunStatus::Aborted(_)) && self.failed_count() == 0
    }
}

pub struct BackupRunner<'a> {
    config: &'a BackupConfig,
    destination: &'a Path,
    platform: &'a dyn Platform,
    options: RunOptions,
}

impl<'a> BackupRunner<'a> {
    pub fn new(
        config: &'a BackupConfig,
        destination: &'a Path,
        platform: &'a dyn Platform,
        options: RunOptions,
    ) -> Self {
        Self {
            config,
            destination,
            platform,
            options,
        }
    }

    /// Directory holding every run directory of this config.
    pub fn backup_root(&self) -> PathBuf {
        self.destination.join(self.config.bkp_dest_dir())
    }

    /// Performs one backup run named after `started`.
    ///
    /// Errors are returned only for problems found before the run directory is
    /// created. Item failures end up in the report.
    pub fn run(&self, console: &mut Console, started: NaiveDateTime) -> Result<RunReport> {
        let backup_root = self.backup_root();
        let run_started = Instant::now();

        self.check_free_space()?;
        self.log_review(&backup_root);

        if self.config.bkp_items().is_empty() {
            warn!("No items listed under 'bkp_items' in the config file, nothing to back up");
            return Ok(RunReport::without_run(RunStatus::NothingToBackUp));
        }

        if !self.options.non_interactive
            && ask(console, "Proceed with backup? (only \"yes\" will be accepted)") != Answer::Yes
        {
            warn!("Backup cancelled by user");
            return Ok(RunReport::without_run(RunStatus::Cancelled));
        }

        let run_dir = create_run_dir(&backup_root, started)?;
        let mut report = RunReport {
            run_dir: Some(run_dir.clone()),
            results: vec![],
            status: RunStatus::Completed,
            cleanup_ran: false,
        };

        let items = self.config.bkp_items();
        for (i, item) in items.iter().enumerate() {
            info!("[{}/{}] Backing up {:?}", i + 1, items.len(), item.source());
            let result = self.backup_item(item, &run_dir, console);
            let reason = result.error.as_ref().map(Error::to_string);
            report.results.push(result);

            if let Some(reason) = reason {
                if self.should_stop(console) {
                    report.status = RunStatus::Aborted(Error::BackupStopped {
                        item: item.source().clone(),
                        reason,
                    });
                    log_summary(&report, run_started.elapsed());
                    return Ok(report);
                }
            }
        }

        log_summary(&report, run_started.elapsed());

        if self.should_clean_up(&report, console) {
            let keep = usize::from(self.config.retention().backups_to_keep());
            let remove = |dir: &Path| self.platform.remove_dir_all(dir);
            match cleanup_with(&backup_root, RUN_DIR_PREFIX, keep, remove) {
                Ok(cleaned) => info!(
                    "Removed {} old backups, {} could not be removed",
                    cleaned.removed.len(),
                    cleaned.failed.len()
                ),
                Err(e) => warn!("Cleaning up old backups failed: {e}"),
            }
            report.cleanup_ran = true;
        }

        Ok(report)
    }

    fn check_free_space(&self) -> Result<()> {
        let available = self
            .platform
            .available_bytes(self.destination)
            .map_err(Error::from)
            .with_msg(format!("Reading free space of {:?} failed", self.destination))?;
        let available = DiskSize::from_bytes(available);
        let required = self.config.retention().min_free_space();
        info!("Available free space: {available}");
        if available < required {
            return Err(Error::InsufficientFreeSpace {
                available,
                required,
            });
        }
        Ok(())
    }

    fn log_review(&self, backup_root: &Path) {
        let retention = self.config.retention();
        info!("Backup destination: {:?}", backup_root);
        info!("Minimum required free space: {}", retention.min_free_space());
        info!("Backups to keep: {}", retention.backups_to_keep());
        info!("Non-interactive: {}", self.options.non_interactive);
        info!("Exit on error: {}", self.options.exit_on_error);
        info!("Items to back up: {}", self.config.bkp_items().len());
        for (i, item) in self.config.bkp_items().iter().enumerate() {
            info!("  [{}] {:?} -> {:?}", i + 1, item.source(), item.destination());
            if !item.include().is_empty() {
                info!("      include: {}", item.include().iter().join(", "));
            }
            if !item.exclude().is_empty() {
                info!("      exclude: {}", item.exclude().iter().join(", "));
            }
        }
    }

    fn backup_item(
        &self,
        item: &BackupItem,
        run_dir: &Path,
        console: &mut Console,
    ) -> BackupResult {
        let started = Instant::now();
        let error = self.copy_item(item, run_dir, console).err();
        let elapsed = started.elapsed();
        match &error {
            None => info!("Backed up {:?} in {elapsed:?}", item.source()),
            Some(e) if e.is_not_found() => error!("{e}"),
            Some(e) => error!("({elapsed:?}) {e}"),
        }
        BackupResult {
            item: item.clone(),
            error,
            elapsed,
        }
    }

    fn copy_item(&self, item: &BackupItem, run_dir: &Path, console: &mut Console) -> Result<()> {
        let source = item.source();
        let total = count_tree(source, item.include(), item.exclude(), self.platform)
            .with_msg(format!("Counting entries of {source:?} failed"))?;
        let metadata = fs::metadata(source)
            .map_err(Error::from)
            .with_msg(format!("Reading metadata of {source:?} failed"))?;
        let target = run_dir.join(item.destination());

        let mut bar = ProgressBar::new(total);
        let copied = {
            let mut on_progress = || {
                if let Some(percent) = bar.advance() {
                    console.draw_progress(percent);
                }
            };
            if metadata.is_dir() {
                copy_tree(
                    source,
                    &target,
                    item.include(),
                    item.exclude(),
                    self.platform,
                    &mut on_progress,
                )
            } else {
                copy_file(source, &target, &mut on_progress)
            }
        };

        if copied.is_ok() {
            console.draw_progress(100);
        }
        if copied.is_ok() || bar.processed() > 0 {
            console.end_progress();
        }
        copied
    }

    /// Failure policy after an item failed.
    fn should_stop(&self, console: &mut Console) -> bool {
        if !self.options.exit_on_error {
            return false;
        }
        if self.options.non_interactive {
            return true;
        }
        ask(console, "Exit due to error? (only \"no\" continues)") != Answer::No
    }

    fn should_clean_up(&self, report: &RunReport, console: &mut Console) -> bool {
        let failed = report.failed_count();
        if failed == 0 {
            return true;
        }
        if self.options.non_interactive {
            warn!("{failed} items failed, keeping old backups");
            return false;
        }
        let question = format!(
            "{failed} items failed. Remove old backups anyway? (only \"yes\" will be accepted)"
        );
        let answer = ask(console, &question);
        if answer != Answer::Yes {
            info!("Keeping old backups");
        }
        answer == Answer::Yes
    }
}

/// Asks `question`. A failure to read counts as a non-confirming answer.
fn ask(console: &mut Console, question: &str) -> Answer {
    console.ask(question).unwrap_or_else(|e| {
        warn!("Reading answer failed: {e}");
        Answer::Other
    })
}

fn create_run_dir(backup_root: &Path, started: NaiveDateTime) -> Result<PathBuf> {
    fs::create_dir_all(backup_root)
        .map_err(Error::from)
        .with_msg(format!("Creating {backup_root:?} failed"))?;
    let run_dir = backup_root.join(run_dir_name(RUN_DIR_PREFIX, started));
    match fs::create_dir(&run_dir) {
        Ok(()) => {
            info!("Created backup directory {:?}", run_dir);
            Ok(run_dir)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::RunDirExists(run_dir)),
        Err(e) => Err(Error::from(e).with_msg(format!("Creating {run_dir:?} failed"))),
    }
}

fn log_summary(report: &RunReport, elapsed: Duration) {
    let failed = report.failed_count();
    info!(
        "Backup finished in {elapsed:?}: {} items, {} successful, {failed} failed",
        report.results.len(),
        report.results.len() - failed
    );
    for (i, result) in report.results.iter().enumerate() {
        match &result.error {
            None => info!("  [{}] OK {:?} ({:?})", i + 1, result.item.source(), result.elapsed),
            Some(e) => warn!(
                "  [{}] FAILED {:?} ({:?}):\n{}",
                i + 1,
                result.item.source(),
                result.elapsed,
                indent::indent_all_with("    ", e.to_string())
            ),
        }
    }
}
