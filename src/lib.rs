//! # smbkp
//!
//! A single-shot backup tool that copies configured sources into a
//! timestamped directory on a destination drive and keeps the newest runs.
//!
//! ## Features
//!
//! - **Selective copies**: per-item include/exclude glob patterns
//! - **Progress**: one redraw per whole percent while an item is copied
//! - **Failure policy**: continue, abort, or ask after a failed item
//! - **Retention**: keep the newest `backups_to_keep` run directories
//! - **Free space guard**: refuse to start below `min_free_space`
//!
//! ## Quick Start
//!
//! ```no_run
//! use smbkp::backup::backup_config::BackupConfig;
//! use smbkp::backup::console::Console;
//! use smbkp::backup::platform::HostPlatform;
//! use smbkp::backup::runner::{BackupRunner, RunOptions};
//! use std::path::Path;
//!
//! let destination = Path::new("/media/usb");
//! let config = BackupConfig::load(destination.join(".smbkp.yaml"))?;
//!
//! let runner = BackupRunner::new(&config, destination, &HostPlatform, RunOptions::default());
//! let report = runner.run(&mut Console::stdio(), chrono::Local::now().naive_local())?;
//! println!("{} items failed", report.failed_count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
