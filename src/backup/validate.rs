//! Validation functions for configuration values.
//!
//! Used through `#[validate(custom(function = ...))]` on the config structs.

use sanitize_filename::{is_sanitized, sanitize};
use validator::ValidationError;

use std::path::{Component, Path};
use std::result;

pub fn validate_dir_name<S: AsRef<str>>(name: S) -> result::Result<(), ValidationError> {
    let name = name.as_ref();
    if name.is_empty() || name == "." || name == ".." {
        return Err(ValidationError::new("InvalidDirectoryName")
            .with_message(format!("{name:?} is not a usable directory name").into()));
    }
    if !is_sanitized(name) {
        return Err(ValidationError::new("InvalidDirectoryName").with_message(
            format!(
                "Invalid directory name, try sanitizing like {:?}",
                sanitize(name)
            )
            .into(),
        ));
    }

    Ok(())
}

pub fn validate_absolute_path<P: AsRef<Path>>(path: P) -> result::Result<(), ValidationError> {
    let path = path.as_ref();
    if !path.is_absolute() {
        return Err(ValidationError::new("InvalidSource")
            .with_message(format!("{path:?} is not an absolute path").into()));
    }

    Ok(())
}

/// A path that stays inside whatever directory it is joined to.
pub fn validate_contained_relative_path<P: AsRef<Path>>(
    path: P,
) -> result::Result<(), ValidationError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(ValidationError::new("InvalidDestination")
            .with_message("destination must not be empty".into()));
    }
    if let Some(component) = path
        .components()
        .find(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(ValidationError::new("InvalidDestination").with_message(
            format!(
                "{path:?} must be a relative path without {:?}",
                component.as_os_str()
            )
            .into(),
        ));
    }

    Ok(())
}
