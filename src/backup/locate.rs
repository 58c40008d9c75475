//! Resolution of the backup destination and its config file from command line flags.

use crate::backup::backup_config::DEFAULT_CONFIG_FILE_NAME;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Located {
    pub destination: PathBuf,
    pub config_file: PathBuf,
}

/// Picks the destination and config file.
///
/// An explicit `bkp_dest` must exist. `config` is only accepted together with
/// `bkp_dest`. Without either, the first of `candidates` holding
/// [`DEFAULT_CONFIG_FILE_NAME`] wins.
pub fn locate<I>(
    bkp_dest: Option<PathBuf>,
    config: Option<PathBuf>,
    candidates: I,
) -> Result<Located>
where
    I: IntoIterator<Item = PathBuf>,
{
    match (bkp_dest, config) {
        (None, Some(_)) => Err(Error::ConfigWithoutDestination),
        (Some(destination), config) => {
            if !destination.is_dir() {
                return Err(Error::DestinationNotFound(destination));
            }
            let config_file =
                config.unwrap_or_else(|| destination.join(DEFAULT_CONFIG_FILE_NAME));
            Ok(Located {
                destination,
                config_file,
            })
        }
        (None, None) => {
            let destination = candidates
                .into_iter()
                .inspect(|candidate| {
                    debug!("Looking for {DEFAULT_CONFIG_FILE_NAME} in {:?}", candidate)
                })
                .find(|candidate| has_config(candidate))
                .ok_or(Error::NoDestinationFound(DEFAULT_CONFIG_FILE_NAME))?;
            info!("Found backup destination {:?}", destination);
            Ok(Located {
                config_file: destination.join(DEFAULT_CONFIG_FILE_NAME),
                destination,
            })
        }
    }
}

fn has_config(dir: &Path) -> bool {
    dir.join(DEFAULT_CONFIG_FILE_NAME).is_file()
}
