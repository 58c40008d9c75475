use crate::backup::result_error::WithMsg;
use crate::backup::retention::DiskSize;
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error("{0:?} has invalid format, expected a number followed by 'mb' or 'gb' (e.g. '100mb', '10gb')")]
    InvalidDiskSize(String),
    #[error("Backup destination {0:?} does not exist or is not accessible")]
    DestinationNotFound(PathBuf),
    #[error("\"--bkp-dest\" is not provided, but it is required when \"--config\" is specified")]
    ConfigWithoutDestination,
    #[error("No backup destination found. Place '{0}' in the root of the destination drive or use --bkp-dest")]
    NoDestinationFound(&'static str),
    #[error("Available free space ({available}) is less than required minimum ({required})")]
    InsufficientFreeSpace {
        available: DiskSize,
        required: DiskSize,
    },
    #[error("Backup directory {0:?} already exists")]
    RunDirExists(PathBuf),
    #[error("Backup stopped due to error in {item:?}:\n{}", indent::indent_all_with("  ", reason))]
    BackupStopped { item: PathBuf, reason: String },
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl Error {
    /// The I/O error kind at the bottom of the context chain, if any.
    pub fn io_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Io(e) => Some(e.kind()),
            Error::WalkDir(e) => e.io_error().map(std::io::Error::kind),
            Error::WithMsg { error, .. } => error.io_kind(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.io_kind() == Some(ErrorKind::NotFound)
    }
}
