use chrono::Local;
use clap::{ArgAction, Parser};
use smbkp::backup::backup_config::BackupConfig;
use smbkp::backup::console::Console;
use smbkp::backup::locate::locate;
use smbkp::backup::platform::{candidate_destinations, HostPlatform};
use smbkp::backup::result_error::result::Result;
use smbkp::backup::runner::{BackupRunner, RunOptions, RunReport, RunStatus};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};

/// Copy configured folders to a backup drive and keep the newest copies
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file, requires --bkp-dest
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backup destination, searched on mounted drives when omitted
    #[arg(short, long)]
    bkp_dest: Option<PathBuf>,

    /// Stop after the first failed item
    #[arg(short, long)]
    exit_on_error: bool,

    /// Never ask questions, use the safe answer instead
    #[arg(short, long)]
    non_interactive: bool,

    /// More logging, repeat for even more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(report) => {
            match &report.status {
                RunStatus::Aborted(e) => error!("{e}"),
                _ => error!("Backup completed with {} failures", report.failed_count()),
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<RunReport> {
    let located = locate(args.bkp_dest, args.config, candidate_destinations())?;
    info!("Config file: {:?}", located.config_file);
    let config = BackupConfig::load(&located.config_file)?;

    let options = RunOptions::builder()
        .exit_on_error(args.exit_on_error)
        .non_interactive(args.non_interactive)
        .build();
    let runner = BackupRunner::new(&config, &located.destination, &HostPlatform, options);
    let report = runner.run(&mut Console::stdio(), Local::now().naive_local())?;

    if matches!(report.status, RunStatus::Completed) && report.is_success() {
        info!("Backup completed successfully");
    }
    Ok(report)
}
