use crate::backup::pattern::Pattern;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::retention::RetentionConfig;
use crate::backup::validate::{
    validate_absolute_path, validate_contained_relative_path, validate_dir_name,
};
use bon::Builder;
use getset::Getters;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;
use validator::{Validate, ValidationError};

/// Name of the config file looked up at the root of a destination.
pub const DEFAULT_CONFIG_FILE_NAME: &str = ".smbkp.yaml";

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct BackupConfig {
    /// Directory below the destination root that holds the run directories.
    #[serde(default = "default_bkp_dest_dir")]
    #[validate(custom(function = validate_dir_name))]
    #[builder(default = default_bkp_dest_dir(), into)]
    bkp_dest_dir: String,
    #[serde(default)]
    #[validate(nested)]
    #[builder(default)]
    retention: RetentionConfig,
    #[serde(default)]
    #[validate(nested)]
    #[builder(default)]
    bkp_items: Vec<BackupItem>,
}

fn default_bkp_dest_dir() -> String {
    "smbkp".to_string()
}

/// One source to copy into every run, with its filters.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_item_destination))]
#[getset(get = "pub")]
pub struct BackupItem {
    #[validate(custom(function = validate_absolute_path))]
    #[builder(into)]
    source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[getset(skip)]
    #[builder(into)]
    destination: Option<PathBuf>,
    #[serde(default)]
    #[builder(default)]
    include: Vec<Pattern>,
    #[serde(default)]
    #[builder(default)]
    exclude: Vec<Pattern>,
}

impl BackupItem {
    /// Path of the copy relative to the run directory. Falls back to the source's
    /// file name when no destination is configured.
    pub fn destination(&self) -> &Path {
        match &self.destination {
            Some(destination) => destination,
            None => self.source.file_name().map(Path::new).unwrap_or(Path::new("")),
        }
    }
}

fn validate_item_destination(item: &BackupItem) -> std::result::Result<(), ValidationError> {
    validate_contained_relative_path(item.destination())
}

impl BackupConfig {
    /// Reads, clamps and validates a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from {:?}", path);
        let file = File::open(path)
            .map_err(Error::from)
            .with_msg(format!("Open config file failed: {path:?}"))?;
        let mut config: BackupConfig = serde_yml::from_reader(file)
            .map_err(Error::from)
            .with_msg(format!("Parse YAML config failed: {path:?}"))?;
        config.retention.clamp_to_floor();
        config
            .validate()
            .map_err(Error::from)
            .with_msg(format!("Config validation failed: {path:?}"))?;
        Ok(config)
    }
}
